//! Grid stack assembly.
//!
//! Decoded layers of one archive are combined into a single three
//! dimensional stack `(layer, row, col)`. All layers must share the first
//! layer's grid dimensions.

use crate::composite::CompositeHeader;
use crate::error::{RadolanError, Result};
use crate::grid::{GridLayer, GridSummary};
use crate::projection::{Georeferenced, ResamplePlan, SpatialRef};
use chrono::{DateTime, Utc};
use ndarray::{Array3, Axis, s};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// 1-based member positions to keep, in the given order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection(Vec<usize>);

impl Selection {
    pub fn new(positions: Vec<usize>) -> Self {
        Self(positions)
    }

    pub fn positions(&self) -> &[usize] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pick the selected items out of `items`
    ///
    /// Positions are 1-based. Any position outside `1..=items.len()` fails
    /// the whole selection.
    pub fn apply<T>(&self, items: Vec<T>) -> Result<Vec<T>> {
        let available = items.len();
        if let Some(&position) = self
            .0
            .iter()
            .find(|&&position| position == 0 || position > available)
        {
            return Err(RadolanError::SelectionOutOfRange {
                position,
                available,
            });
        }

        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        let mut picked = Vec::with_capacity(self.0.len());
        for &position in &self.0 {
            match slots[position - 1].take() {
                Some(item) => picked.push(item),
                None => {
                    return Err(RadolanError::configuration(format!(
                        "member position {position} selected more than once"
                    )));
                }
            }
        }
        Ok(picked)
    }
}

impl std::str::FromStr for Selection {
    type Err = String;

    /// Parse a comma separated list such as `1,3,5`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<usize>()
                    .map_err(|_| format!("invalid member position '{part}'"))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Selection)
    }
}

/// Per-stack metadata
#[derive(Debug, Clone, Serialize)]
pub struct StackMetadata {
    /// First member's header, with the declared length summed over members
    pub header: CompositeHeader,
    /// Source files in stack order
    pub files: Vec<PathBuf>,
    /// Member timestamps in stack order
    pub timestamps: Vec<DateTime<Utc>>,
}

/// Layers of one archive stacked along the first axis
#[derive(Debug, Clone)]
pub struct GridStack {
    pub values: Array3<f64>,
    pub no_data: Array3<bool>,
    pub clutter: Array3<bool>,
    pub metadata: StackMetadata,
    pub spatial: SpatialRef,
}

impl GridStack {
    pub fn len(&self) -> usize {
        self.values.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (rows, columns) of every layer
    pub fn dims(&self) -> (usize, usize) {
        let (_, rows, cols) = self.values.dim();
        (rows, cols)
    }

    /// Copy of layer `index` (0-based)
    pub fn layer(&self, index: usize) -> Option<GridLayer> {
        if index >= self.len() {
            return None;
        }
        let mut header = self.metadata.header.clone();
        header.timestamp = self.metadata.timestamps[index];
        header.declared_length = header.header_len.saturating_add(header.expected_payload_len());

        Some(GridLayer {
            values: self.values.index_axis(Axis(0), index).to_owned(),
            no_data: self.no_data.index_axis(Axis(0), index).to_owned(),
            clutter: self.clutter.index_axis(Axis(0), index).to_owned(),
            header,
            source: self.metadata.files[index].clone(),
            spatial: self.spatial.clone(),
        })
    }

    /// Split the stack back into layers
    pub fn into_layers(self) -> Vec<GridLayer> {
        (0..self.len()).filter_map(|i| self.layer(i)).collect()
    }

    /// Statistics across all layers
    pub fn summary(&self) -> GridSummary {
        let mut summary = GridSummary::default();
        for i in 0..self.len() {
            summary.merge(&GridSummary::from_views(
                self.values.index_axis(Axis(0), i),
                self.no_data.index_axis(Axis(0), i),
                self.clutter.index_axis(Axis(0), i),
            ));
        }
        summary
    }
}

impl Georeferenced for GridStack {
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
        let (rows, cols) = plan.dims();
        let depth = self.len();
        let mut values = Array3::from_elem((depth, rows, cols), fill);
        let mut no_data = Array3::from_elem((depth, rows, cols), true);
        let mut clutter = Array3::from_elem((depth, rows, cols), false);

        for i in 0..depth {
            values
                .slice_mut(s![i, .., ..])
                .assign(&plan.apply(self.values.index_axis(Axis(0), i), fill));
            no_data
                .slice_mut(s![i, .., ..])
                .assign(&plan.apply(self.no_data.index_axis(Axis(0), i), true));
            clutter
                .slice_mut(s![i, .., ..])
                .assign(&plan.apply(self.clutter.index_axis(Axis(0), i), false));
        }

        Self {
            values,
            no_data,
            clutter,
            metadata: self.metadata,
            spatial: plan.target.clone(),
        }
    }
}

/// Stack `layers`, optionally restricted to `selection`
///
/// The selection is applied before the dimension check, so unselected
/// members never take part in it. Layer order follows the input order (or
/// the selection order).
pub fn assemble(layers: Vec<GridLayer>, selection: Option<&Selection>) -> Result<GridStack> {
    let layers = match selection {
        Some(selection) if !selection.is_empty() => selection.apply(layers)?,
        _ => layers,
    };

    let first = layers.first().ok_or(RadolanError::EmptyStack)?;
    let expected = first.dims();
    if let Some((member_index, layer)) = layers
        .iter()
        .enumerate()
        .find(|(_, layer)| layer.dims() != expected)
    {
        return Err(RadolanError::DimensionMismatch {
            expected,
            actual: layer.dims(),
            member_index,
        });
    }

    let depth = layers.len();
    let (rows, cols) = expected;
    let mut header = first.header.clone();
    header.declared_length = layers.iter().map(|layer| layer.header.declared_length).sum();
    let spatial = first.spatial.clone();

    let mut values = Array3::<f64>::zeros((depth, rows, cols));
    let mut no_data = Array3::from_elem((depth, rows, cols), false);
    let mut clutter = Array3::from_elem((depth, rows, cols), false);
    let mut files = Vec::with_capacity(depth);
    let mut timestamps = Vec::with_capacity(depth);

    for (i, layer) in layers.into_iter().enumerate() {
        values.slice_mut(s![i, .., ..]).assign(&layer.values);
        no_data.slice_mut(s![i, .., ..]).assign(&layer.no_data);
        clutter.slice_mut(s![i, .., ..]).assign(&layer.clutter);
        timestamps.push(layer.header.timestamp);
        files.push(layer.source);
    }

    debug!("Assembled stack of {} layers ({}x{})", depth, rows, cols);

    Ok(GridStack {
        values,
        no_data,
        clutter,
        metadata: StackMetadata {
            header,
            files,
            timestamps,
        },
        spatial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::decode;
    use crate::testdata::SyntheticComposite;
    use tempfile::TempDir;

    fn layers(temp_dir: &TempDir, count: usize, rows: usize, cols: usize) -> Vec<GridLayer> {
        (0..count)
            .map(|hour| {
                let path = SyntheticComposite::ramp(rows, cols)
                    .hours_later(hour as i64)
                    .write_to(temp_dir.path())
                    .unwrap();
                decode(&path, -1.0, -2.0).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_assemble_in_input_order() {
        let temp_dir = TempDir::new().unwrap();
        let input = layers(&temp_dir, 3, 4, 5);
        let expected: Vec<_> = input.iter().map(|layer| layer.timestamp()).collect();

        let stack = assemble(input, None).unwrap();
        assert_eq!(stack.values.dim(), (3, 4, 5));
        assert_eq!(stack.metadata.timestamps, expected);
        assert_eq!(stack.metadata.files.len(), 3);
    }

    #[test]
    fn test_selection_keeps_chosen_members() {
        let temp_dir = TempDir::new().unwrap();
        let input = layers(&temp_dir, 10, 3, 3);
        let all: Vec<_> = input.iter().map(|layer| layer.timestamp()).collect();

        let stack = assemble(input, Some(&Selection::new(vec![1, 3, 5]))).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.metadata.timestamps, vec![all[0], all[2], all[4]]);
    }

    #[test]
    fn test_selection_out_of_range() {
        let temp_dir = TempDir::new().unwrap();
        let input = layers(&temp_dir, 2, 2, 2);

        match assemble(input, Some(&Selection::new(vec![1, 3]))).unwrap_err() {
            RadolanError::SelectionOutOfRange {
                position,
                available,
            } => {
                assert_eq!(position, 3);
                assert_eq!(available, 2);
            }
            other => panic!("Expected SelectionOutOfRange, got {other:?}"),
        }

        let input = layers(&temp_dir, 2, 2, 2);
        assert!(assemble(input, Some(&Selection::new(vec![0]))).is_err());
    }

    #[test]
    fn test_repeated_position_is_rejected() {
        let err = Selection::new(vec![1, 1]).apply(vec!["a", "b"]).unwrap_err();
        assert!(matches!(err, RadolanError::Configuration { .. }));
    }

    #[test]
    fn test_dimension_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let mut input = layers(&temp_dir, 1, 900, 900);
        let odd_dir = TempDir::new().unwrap();
        input.extend(layers(&odd_dir, 1, 900, 899));

        match assemble(input, None).unwrap_err() {
            RadolanError::DimensionMismatch {
                expected,
                actual,
                member_index,
            } => {
                assert_eq!(expected, (900, 900));
                assert_eq!(actual, (900, 899));
                assert_eq!(member_index, 1);
            }
            other => panic!("Expected DimensionMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(assemble(Vec::new(), None), Err(RadolanError::EmptyStack)));
    }

    #[test]
    fn test_stack_splits_back_into_layers() {
        let temp_dir = TempDir::new().unwrap();
        let input = layers(&temp_dir, 2, 3, 2);
        let originals = input.clone();

        let stack = assemble(input, None).unwrap();
        assert_eq!(
            stack.metadata.header.declared_length,
            originals.iter().map(|l| l.header.declared_length).sum::<usize>()
        );

        let split = stack.into_layers();
        assert_eq!(split.len(), 2);
        for (layer, original) in split.iter().zip(&originals) {
            assert_eq!(layer.values, original.values);
            assert_eq!(layer.timestamp(), original.timestamp());
            assert_eq!(layer.header.declared_length, original.header.declared_length);
            assert_eq!(layer.source, original.source);
        }
    }

    #[test]
    fn test_selection_from_str() {
        let selection: Selection = "1, 3,5".parse().unwrap();
        assert_eq!(selection.positions(), &[1, 3, 5]);
        assert!("1,x".parse::<Selection>().is_err());
    }
}
