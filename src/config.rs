//! Configuration for the ingestion pipeline.
//!
//! Holds the processing parameters shared by the library and the CLI:
//! parallelism, missing-value substitutes, cell layout, member selection,
//! output mode, projection and staging location.

use crate::composite::{CellLayout, LayoutVersion};
use crate::error::{RadolanError, Result};
use crate::models::{NestingMode, OutputMode};
use crate::projection::ProjectionSpec;
use crate::stack::Selection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Substitute written into no-data cells unless configured otherwise
pub const DEFAULT_NA_SUBSTITUTE: f64 = -9999.0;

/// Substitute written into clutter cells unless configured otherwise
pub const DEFAULT_CLUTTER_SUBSTITUTE: f64 = -1111.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum members decoded concurrently per archive, and archives in flight
    pub workers: usize,

    /// Value written into cells flagged as no-data
    pub na_substitute: f64,

    /// Value written into cells flagged as clutter
    pub clutter_substitute: f64,

    /// Bit layout of the 16-bit cell words
    pub layout: LayoutVersion,

    /// 1-based member positions to keep; empty keeps all members
    pub selection: Selection,

    pub output_mode: OutputMode,

    /// Spatial reference to stamp onto decoded grids
    pub projection: Option<ProjectionSpec>,

    /// Resample onto a geographic grid after attaching the projection
    pub reproject_to_geographic: bool,

    /// Root directory for staged archive members
    pub staging_root: PathBuf,

    /// Glob restricting which archive members are staged
    pub member_pattern: Option<String>,

    pub nesting: NestingMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            na_substitute: DEFAULT_NA_SUBSTITUTE,
            clutter_substitute: DEFAULT_CLUTTER_SUBSTITUTE,
            layout: LayoutVersion::default(),
            selection: Selection::default(),
            output_mode: OutputMode::default(),
            projection: None,
            reproject_to_geographic: false,
            staging_root: default_staging_root(),
            member_pattern: None,
            nesting: NestingMode::default(),
        }
    }
}

/// Platform cache directory, falling back to the system temp directory
pub fn default_staging_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("radolan_ingest")
        .join("staging")
}

impl PipelineConfig {
    /// Set the number of concurrent workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the no-data and clutter substitutes
    pub fn with_substitutes(mut self, na: f64, clutter: f64) -> Self {
        self.na_substitute = na;
        self.clutter_substitute = clutter;
        self
    }

    pub fn with_layout(mut self, layout: LayoutVersion) -> Self {
        self.layout = layout;
        self
    }

    /// Keep only the given 1-based member positions
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_projection(mut self, projection: ProjectionSpec) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Reproject to geographic coordinates (needs a geospatial engine)
    pub fn with_reprojection(mut self) -> Self {
        self.reproject_to_geographic = true;
        self
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    pub fn with_member_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.member_pattern = Some(pattern.into());
        self
    }

    pub fn with_nesting(mut self, nesting: NestingMode) -> Self {
        self.nesting = nesting;
        self
    }

    /// Cell layout resolved from the configured version
    pub fn cell_layout(&self) -> CellLayout {
        self.layout.layout()
    }

    /// Check the configuration before any archive is touched
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(RadolanError::configuration("workers must be at least 1"));
        }

        let positions = self.selection.positions();
        if positions.contains(&0) {
            return Err(RadolanError::configuration(
                "member positions are 1-based, 0 is not a valid selection",
            ));
        }
        let mut seen = positions.to_vec();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != positions.len() {
            return Err(RadolanError::configuration(
                "member selection contains duplicate positions",
            ));
        }

        if let Some(pattern) = &self.member_pattern {
            glob::Pattern::new(pattern).map_err(|e| {
                RadolanError::configuration(format!("invalid member pattern '{pattern}': {e}"))
            })?;
        }

        if let Some(projection) = &self.projection {
            projection.resolve()?;
        }

        if self.staging_root.as_os_str().is_empty() {
            return Err(RadolanError::configuration("staging root must not be empty"));
        }

        debug!("Validated configuration: {:?}", self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.workers >= 1);
        assert_eq!(config.output_mode, OutputMode::Stack);
        assert!(config.staging_root.ends_with("radolan_ingest/staging"));
        config.validate().unwrap();
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::default()
            .with_workers(2)
            .with_substitutes(-1.0, -2.0)
            .with_selection(Selection::new(vec![2, 1]))
            .with_output_mode(OutputMode::Layers)
            .with_projection(ProjectionSpec::Rw)
            .with_member_pattern("*---bin")
            .with_nesting(NestingMode::Nested);

        assert_eq!(config.workers, 2);
        assert_eq!(config.na_substitute, -1.0);
        assert_eq!(config.clutter_substitute, -2.0);
        assert_eq!(config.selection.positions(), &[2, 1]);
        assert_eq!(config.projection, Some(ProjectionSpec::Rw));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            PipelineConfig::default().with_workers(0),
            PipelineConfig::default().with_selection(Selection::new(vec![0, 1])),
            PipelineConfig::default().with_selection(Selection::new(vec![1, 1])),
            PipelineConfig::default().with_member_pattern("[unclosed"),
            PipelineConfig::default().with_staging_root(""),
        ];
        for config in cases {
            match config.validate() {
                Err(RadolanError::Configuration { .. }) => {}
                other => panic!("Expected Configuration error for {config:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_checks_custom_crs() {
        let config = PipelineConfig::default().with_projection(ProjectionSpec::Custom {
            crs: "+lat_0=90".to_string(),
            extent: [0.0, 1.0, 0.0, 1.0],
        });
        assert!(matches!(config.validate(), Err(RadolanError::InvalidCrs { .. })));
    }
}
