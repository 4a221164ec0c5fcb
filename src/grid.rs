//! Decoded raster layers.
//!
//! A [`GridLayer`] holds one composite's physical values with separate
//! no-data and clutter masks, so a substituted value is never mistaken for
//! a real reading. Row 0 is the first row of the payload, which for RADOLAN
//! grids is the southern edge.

use crate::composite::CompositeHeader;
use crate::projection::{Georeferenced, ResamplePlan, SpatialRef};
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use serde::Serialize;
use std::path::PathBuf;

/// One decoded composite
#[derive(Debug, Clone)]
pub struct GridLayer {
    /// Physical values with caller-chosen substitutes in masked cells
    pub values: Array2<f64>,
    pub no_data: Array2<bool>,
    pub clutter: Array2<bool>,
    pub header: CompositeHeader,
    /// File the layer was decoded from
    pub source: PathBuf,
    pub spatial: SpatialRef,
}

impl GridLayer {
    /// (rows, columns)
    pub fn dims(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.header.timestamp
    }

    pub fn summary(&self) -> GridSummary {
        GridSummary::from_views(self.values.view(), self.no_data.view(), self.clutter.view())
    }
}

impl Georeferenced for GridLayer {
    fn spatial(&self) -> &SpatialRef {
        &self.spatial
    }

    fn spatial_mut(&mut self) -> &mut SpatialRef {
        &mut self.spatial
    }

    fn grid_dims(&self) -> (usize, usize) {
        self.dims()
    }

    fn resample(self, plan: &ResamplePlan, fill: f64) -> Self {
        Self {
            values: plan.apply(self.values.view(), fill),
            no_data: plan.apply(self.no_data.view(), true),
            clutter: plan.apply(self.clutter.view(), false),
            spatial: plan.target.clone(),
            ..self
        }
    }
}

/// Value statistics over the unmasked cells of a grid
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GridSummary {
    pub valid_cells: usize,
    pub no_data_cells: usize,
    pub clutter_cells: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

impl GridSummary {
    pub fn from_views(
        values: ArrayView2<'_, f64>,
        no_data: ArrayView2<'_, bool>,
        clutter: ArrayView2<'_, bool>,
    ) -> Self {
        let mut summary = Self::default();
        let mut sum = 0.0;

        for ((&value, &missing), &cluttered) in values.iter().zip(no_data.iter()).zip(clutter.iter())
        {
            if missing {
                summary.no_data_cells += 1;
            } else if cluttered {
                summary.clutter_cells += 1;
            } else {
                summary.valid_cells += 1;
                sum += value;
                summary.min = Some(summary.min.map_or(value, |min| min.min(value)));
                summary.max = Some(summary.max.map_or(value, |max| max.max(value)));
            }
        }

        if summary.valid_cells > 0 {
            summary.mean = Some(sum / summary.valid_cells as f64);
        }
        summary
    }

    /// Merge statistics of another grid into this one
    pub fn merge(&mut self, other: &GridSummary) {
        let total = self.valid_cells + other.valid_cells;
        self.mean = match (self.mean, other.mean) {
            (Some(a), Some(b)) => Some(
                (a * self.valid_cells as f64 + b * other.valid_cells as f64) / total as f64,
            ),
            (a, b) => a.or(b),
        };
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.valid_cells = total;
        self.no_data_cells += other.no_data_cells;
        self.clutter_cells += other.clutter_cells;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_summary_skips_masked_cells() {
        let values = array![[1.0, -1.0], [3.0, -2.0]];
        let no_data = array![[false, true], [false, false]];
        let clutter = array![[false, false], [false, true]];

        let summary = GridSummary::from_views(values.view(), no_data.view(), clutter.view());
        assert_eq!(summary.valid_cells, 2);
        assert_eq!(summary.no_data_cells, 1);
        assert_eq!(summary.clutter_cells, 1);
        assert_eq!(summary.min, Some(1.0));
        assert_eq!(summary.max, Some(3.0));
        assert_eq!(summary.mean, Some(2.0));
    }

    #[test]
    fn test_summary_merge() {
        let mut a = GridSummary {
            valid_cells: 2,
            mean: Some(1.0),
            min: Some(0.0),
            max: Some(2.0),
            ..Default::default()
        };
        let b = GridSummary {
            valid_cells: 2,
            no_data_cells: 3,
            mean: Some(3.0),
            min: Some(2.0),
            max: Some(4.0),
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.valid_cells, 4);
        assert_eq!(a.no_data_cells, 3);
        assert_eq!(a.mean, Some(2.0));
        assert_eq!(a.min, Some(0.0));
        assert_eq!(a.max, Some(4.0));
    }
}
