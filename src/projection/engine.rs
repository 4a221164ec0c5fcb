//! Geospatial engines used for reprojection.
//!
//! The pipeline only needs one capability from an engine: a nearest
//! neighbour resampling plan from a projected grid onto a regular
//! longitude/latitude grid. [`StereographicEngine`] provides that for the
//! polar stereographic definitions RADOLAN products use.

use super::{Crs, Extent, SpatialRef};
use crate::constants::GEOGRAPHIC_CRS;
use crate::error::{RadolanError, Result};
use ndarray::{Array2, ArrayView2};
use std::f64::consts::FRAC_PI_4;
use std::fmt::Debug;

/// Points sampled along each edge when bounding the geographic footprint
const EDGE_SAMPLES: usize = 64;

/// Pluggable reprojection capability
pub trait GeoEngine: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Plan a resampling of a `(rows, cols)` grid in `source` onto a
    /// geographic grid of the same dimensions
    fn plan_geographic(&self, source: &SpatialRef, dims: (usize, usize)) -> Result<ResamplePlan>;
}

/// Target grid plus, for every target cell, the source cell it samples
#[derive(Debug, Clone)]
pub struct ResamplePlan {
    pub target: SpatialRef,
    pub rows: usize,
    pub cols: usize,
    /// Row-major; `None` where the target cell lies outside the source grid
    pub sources: Vec<Option<(usize, usize)>>,
}

impl ResamplePlan {
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Gather `source` into the target grid, writing `fill` outside it
    pub fn apply<T: Clone>(&self, source: ArrayView2<'_, T>, fill: T) -> Array2<T> {
        Array2::from_shape_fn((self.rows, self.cols), |(r, c)| {
            match self.sources[r * self.cols + c] {
                Some(index) => source[index].clone(),
                None => fill.clone(),
            }
        })
    }

    /// True for target cells with no source cell
    pub fn outside_mask(&self) -> Array2<bool> {
        Array2::from_shape_fn((self.rows, self.cols), |(r, c)| {
            self.sources[r * self.cols + c].is_none()
        })
    }
}

/// Spherical north-polar stereographic parameters
#[derive(Debug, Clone, Copy, PartialEq)]
struct PolarStereographic {
    radius: f64,
    k0: f64,
    lon_0: f64,
    x_0: f64,
    y_0: f64,
    to_meter: f64,
}

impl PolarStereographic {
    fn from_crs(crs: &Crs) -> Result<Self> {
        let unsupported = |reason: String| RadolanError::Projection { reason };

        if crs.projection() != "stere" {
            return Err(unsupported(format!(
                "cannot reproject from '{}', only polar stereographic is supported",
                crs.projection()
            )));
        }
        let lat_0 = crs.param_f64("lat_0").unwrap_or(0.0);
        if (lat_0 - 90.0).abs() > 1e-9 {
            return Err(unsupported(format!(
                "stereographic origin latitude {lat_0} is not the north pole"
            )));
        }

        let lat_ts = crs.param_f64("lat_ts").unwrap_or(90.0);
        let k0 = crs
            .param_f64("k")
            .or_else(|| crs.param_f64("k_0"))
            .unwrap_or_else(|| (1.0 + lat_ts.to_radians().sin()) / 2.0);
        let radius = crs
            .param_f64("a")
            .or_else(|| crs.param_f64("R"))
            .unwrap_or(6_378_137.0);

        Ok(Self {
            radius,
            k0,
            lon_0: crs.param_f64("lon_0").unwrap_or(0.0),
            x_0: crs.param_f64("x_0").unwrap_or(0.0),
            y_0: crs.param_f64("y_0").unwrap_or(0.0),
            to_meter: crs.param_f64("to_meter").unwrap_or(1.0),
        })
    }

    /// (lon, lat) in degrees to projected (x, y) in CRS units
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let rho = 2.0 * self.radius * self.k0 * (FRAC_PI_4 - lat.to_radians() / 2.0).tan();
        let dlon = (lon - self.lon_0).to_radians();
        let x = rho * dlon.sin() + self.x_0;
        let y = -rho * dlon.cos() + self.y_0;
        (x / self.to_meter, y / self.to_meter)
    }

    /// Projected (x, y) in CRS units to (lon, lat) in degrees
    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let x = x * self.to_meter - self.x_0;
        let y = y * self.to_meter - self.y_0;
        let rho = x.hypot(y);
        let lat = 90.0 - 2.0 * (rho / (2.0 * self.radius * self.k0)).atan().to_degrees();
        let lon = self.lon_0 + x.atan2(-y).to_degrees();
        (lon, lat)
    }
}

/// Built-in engine for north-polar stereographic grids
#[derive(Debug, Clone, Default)]
pub struct StereographicEngine;

impl StereographicEngine {
    pub fn new() -> Self {
        Self
    }

    /// Geographic coordinates of a projected point under `crs`
    pub fn inverse_point(&self, crs: &Crs, x: f64, y: f64) -> Result<(f64, f64)> {
        Ok(PolarStereographic::from_crs(crs)?.inverse(x, y))
    }

    /// Projected coordinates of a geographic point under `crs`
    pub fn forward_point(&self, crs: &Crs, lon: f64, lat: f64) -> Result<(f64, f64)> {
        Ok(PolarStereographic::from_crs(crs)?.forward(lon, lat))
    }
}

fn footprint(projection: &PolarStereographic, extent: &Extent) -> Result<Extent> {
    let mut lons = Vec::with_capacity(EDGE_SAMPLES * 4);
    let mut lats = Vec::with_capacity(EDGE_SAMPLES * 4);
    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        let x = extent.xmin + t * extent.width();
        let y = extent.ymin + t * extent.height();
        for (px, py) in [
            (x, extent.ymin),
            (x, extent.ymax),
            (extent.xmin, y),
            (extent.xmax, y),
        ] {
            let (lon, lat) = projection.inverse(px, py);
            lons.push(lon);
            lats.push(lat);
        }
    }

    let min = |v: &[f64]| v.iter().copied().fold(f64::INFINITY, f64::min);
    let max = |v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Extent::from_tuple([min(&lons[..]), max(&lons[..]), min(&lats[..]), max(&lats[..])])
}

impl GeoEngine for StereographicEngine {
    fn name(&self) -> &str {
        "stereographic"
    }

    fn plan_geographic(&self, source: &SpatialRef, (rows, cols): (usize, usize)) -> Result<ResamplePlan> {
        let (Some(crs), Some(extent)) = (&source.crs, &source.extent) else {
            return Err(RadolanError::Projection {
                reason: "source grid needs both a CRS and an extent".to_string(),
            });
        };
        let projection = PolarStereographic::from_crs(crs)?;
        let target_extent = footprint(&projection, extent)?;

        let (dx, dy) = extent.cell_size((rows, cols));
        let (dlon, dlat) = target_extent.cell_size((rows, cols));

        // Row 0 is the southern edge in both grids
        let mut sources = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            let lat = target_extent.ymin + (r as f64 + 0.5) * dlat;
            for c in 0..cols {
                let lon = target_extent.xmin + (c as f64 + 0.5) * dlon;
                let (x, y) = projection.forward(lon, lat);
                let col = ((x - extent.xmin) / dx).floor();
                let row = ((y - extent.ymin) / dy).floor();
                let inside = col >= 0.0 && row >= 0.0 && col < cols as f64 && row < rows as f64;
                sources.push(inside.then_some((row as usize, col as usize)));
            }
        }

        Ok(ResamplePlan {
            target: SpatialRef {
                crs: Some(Crs::parse(GEOGRAPHIC_CRS)?),
                extent: Some(target_extent),
            },
            rows,
            cols,
            sources,
        })
    }
}
