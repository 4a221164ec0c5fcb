//! Spatial reference attachment for decoded grids.
//!
//! Attaching a [`ProjectionSpec`] stamps a CRS and extent onto a layer or
//! stack without touching its cells. Reprojection to geographic coordinates
//! is a capability of an injected [`GeoEngine`]; it is only required when a
//! caller actually asks for it.

pub mod engine;

pub use engine::{GeoEngine, ResamplePlan, StereographicEngine};

use crate::constants::{
    RADOLAN_CRS, RADOLAN_EXTENT, RW_EXTENT, SEASONAL_CRS, SEASONAL_EXTENT,
};
use crate::error::{RadolanError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// PROJ parameters that must carry a numeric value
const NUMERIC_PARAMS: &[&str] = &[
    "lat_0", "lat_ts", "lon_0", "k", "k_0", "a", "b", "x_0", "y_0", "to_meter",
];

/// Validated PROJ-style CRS definition (`+proj=stere +lat_0=90 ...`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    definition: String,
    params: BTreeMap<String, Option<String>>,
}

impl Crs {
    pub fn parse(definition: &str) -> Result<Self> {
        let invalid = |reason: String| RadolanError::InvalidCrs {
            crs: definition.to_string(),
            reason,
        };

        let mut params = BTreeMap::new();
        for token in definition.split_whitespace() {
            let body = token
                .strip_prefix('+')
                .ok_or_else(|| invalid(format!("token '{token}' does not start with '+'")))?;
            let (key, value) = match body.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (body, None),
            };

            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid(format!("invalid parameter name in '{token}'")));
            }
            if value.is_some_and(str::is_empty) {
                return Err(invalid(format!("parameter '{key}' has an empty value")));
            }
            if let Some(value) = value {
                if NUMERIC_PARAMS.contains(&key) && value.parse::<f64>().is_err() {
                    return Err(invalid(format!("parameter '{key}' is not numeric: {value}")));
                }
            }
            if params
                .insert(key.to_string(), value.map(str::to_string))
                .is_some()
            {
                return Err(invalid(format!("parameter '{key}' given twice")));
            }
        }

        if !matches!(params.get("proj"), Some(Some(_))) {
            return Err(invalid("missing +proj=<name>".to_string()));
        }

        Ok(Self {
            definition: definition.to_string(),
            params,
        })
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Projection name, e.g. `stere` or `longlat`
    pub fn projection(&self) -> &str {
        self.param("proj").unwrap_or_default()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|value| value.as_deref())
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.param(key).and_then(|value| value.parse().ok())
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self.projection(), "longlat" | "latlong" | "lonlat" | "latlon")
    }
}

impl TryFrom<String> for Crs {
    type Error = RadolanError;

    fn try_from(value: String) -> Result<Self> {
        Crs::parse(&value)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.definition
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.definition)
    }
}

/// Bounding box in the CRS linear unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Extent {
    /// Build from `(xmin, xmax, ymin, ymax)`
    pub fn from_tuple([xmin, xmax, ymin, ymax]: [f64; 4]) -> Result<Self> {
        let values = [xmin, xmax, ymin, ymax];
        if values.iter().any(|v| !v.is_finite()) || xmin >= xmax || ymin >= ymax {
            return Err(RadolanError::Projection {
                reason: format!("invalid extent {values:?}, expected (xmin, xmax, ymin, ymax)"),
            });
        }
        Ok(Self {
            xmin,
            xmax,
            ymin,
            ymax,
        })
    }

    pub fn as_tuple(&self) -> [f64; 4] {
        [self.xmin, self.xmax, self.ymin, self.ymax]
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Cell size (dx, dy) for a grid of the given dimensions
    pub fn cell_size(&self, (rows, cols): (usize, usize)) -> (f64, f64) {
        (self.width() / cols as f64, self.height() / rows as f64)
    }
}

/// CRS and extent carried by a grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialRef {
    pub crs: Option<Crs>,
    pub extent: Option<Extent>,
}

/// Named or explicit spatial reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectionSpec {
    /// National 900 x 900 km composite grid
    Radolan,
    /// RW product grid
    Rw,
    /// Seasonal grids on the ellipsoidal stereographic definition
    Seasonal,
    Custom { crs: String, extent: [f64; 4] },
}

impl ProjectionSpec {
    /// Concrete CRS and extent for this projection
    pub fn resolve(&self) -> Result<(Crs, Extent)> {
        let (crs, extent) = match self {
            ProjectionSpec::Radolan => (RADOLAN_CRS, RADOLAN_EXTENT),
            ProjectionSpec::Rw => (RADOLAN_CRS, RW_EXTENT),
            ProjectionSpec::Seasonal => (SEASONAL_CRS, SEASONAL_EXTENT),
            ProjectionSpec::Custom { crs, extent } => (crs.as_str(), *extent),
        };
        Ok((Crs::parse(crs)?, Extent::from_tuple(extent)?))
    }

    pub fn spatial_ref(&self) -> Result<SpatialRef> {
        let (crs, extent) = self.resolve()?;
        Ok(SpatialRef {
            crs: Some(crs),
            extent: Some(extent),
        })
    }
}

impl FromStr for ProjectionSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "radolan" => Ok(ProjectionSpec::Radolan),
            "rw" => Ok(ProjectionSpec::Rw),
            "seasonal" => Ok(ProjectionSpec::Seasonal),
            other => Err(format!(
                "unknown projection '{other}' (expected radolan, rw or seasonal)"
            )),
        }
    }
}

/// Anything that carries a spatial reference and can be resampled
pub trait Georeferenced: Sized {
    fn spatial(&self) -> &SpatialRef;

    fn spatial_mut(&mut self) -> &mut SpatialRef;

    /// (rows, columns) of one layer
    fn grid_dims(&self) -> (usize, usize);

    /// Apply a resampling plan; cells outside the source become no-data
    fn resample(self, plan: &ResamplePlan, fill: f64) -> Self;
}

/// Attaches projections, holding the optional geospatial engine
#[derive(Debug, Clone, Default)]
pub struct Projector {
    engine: Option<Arc<dyn GeoEngine>>,
    fill: f64,
}

impl Projector {
    pub fn new(engine: Option<Arc<dyn GeoEngine>>) -> Self {
        Self { engine, fill: 0.0 }
    }

    /// Value written into reprojected cells that fall outside the source grid
    pub fn with_fill(mut self, fill: f64) -> Self {
        self.fill = fill;
        self
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Stamp `spec` onto `grid`, then reproject to geographic if requested
    ///
    /// With `spec == None` the existing CRS and extent are kept.
    pub fn attach<G: Georeferenced>(
        &self,
        mut grid: G,
        spec: Option<&ProjectionSpec>,
        reproject_to_geographic: bool,
    ) -> Result<G> {
        if let Some(spec) = spec {
            *grid.spatial_mut() = spec.spatial_ref()?;
            debug!("Attached projection {:?}", spec);
        }

        if !reproject_to_geographic {
            return Ok(grid);
        }

        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| RadolanError::DependencyUnavailable {
                capability: "reproject-to-geographic".to_string(),
            })?;

        let source = grid.spatial().clone();
        match &source.crs {
            None => {
                return Err(RadolanError::Projection {
                    reason: "grid carries no CRS to reproject from".to_string(),
                });
            }
            Some(crs) if crs.is_geographic() => return Ok(grid),
            Some(_) => {}
        }

        let plan = engine.plan_geographic(&source, grid.grid_dims())?;
        debug!(
            "Reprojecting {:?} grid to {:?} with {}",
            grid.grid_dims(),
            plan.dims(),
            engine.name()
        );
        Ok(grid.resample(&plan, self.fill))
    }
}

#[cfg(test)]
mod tests;
