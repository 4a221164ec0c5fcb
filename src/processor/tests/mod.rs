//! Pipeline tests against synthetic archives
//!
//! Every test stages into its own temporary directory.

pub mod basic_processing;

use crate::config::PipelineConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Config staging into `temp_dir/staging` with two workers
pub(crate) fn test_config(temp_dir: &TempDir) -> PipelineConfig {
    PipelineConfig::default()
        .with_workers(2)
        .with_staging_root(temp_dir.path().join("staging"))
}

/// Directory holding input archives
pub(crate) fn input_dir(temp_dir: &TempDir) -> PathBuf {
    let dir = temp_dir.path().join("inputs");
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub(crate) fn archive_path(dir: &Path, month: usize) -> PathBuf {
    dir.join(format!("RW-2018{month:02}.tar.gz"))
}
