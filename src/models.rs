//! Core data structures and types for RADOLAN ingestion.
//!
//! Defines input file kinds, pipeline modes and processing statistics
//! shared between the library and the command-line front end.

use crate::constants::{ARCHIVE_SUFFIXES, BINARY_MARKER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Kinds of files distributed on the DWD open data server
///
/// Determined once at batch entry and passed along explicitly; the pipeline
/// never re-inspects a file name to pick a decode path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    /// Delimited station observations (`produkt_*.txt`, zipped)
    Observational,
    /// Fixed-width station descriptions (`*_Beschreibung_Stationen.txt`)
    Metadata,
    /// Multi-annual means and extremes
    MultiAnnual,
    /// RADOLAN binary composites, bare or packed in tar archives
    BinaryGrid,
    /// Raster files readable by a general raster library (GeoTIFF, NetCDF)
    RasterGrid,
    /// ESRI ASCII grids (`*.asc`, `*.asc.gz`)
    AscGrid,
}

impl FileKind {
    /// Detect the file kind from its name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();

        if name.contains(BINARY_MARKER)
            || name.starts_with("raa01")
            || ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
        {
            Some(FileKind::BinaryGrid)
        } else if name.ends_with(".asc") || name.ends_with(".asc.gz") {
            Some(FileKind::AscGrid)
        } else if name.ends_with(".tif") || name.ends_with(".tiff") || name.ends_with(".nc") {
            Some(FileKind::RasterGrid)
        } else if name.contains("beschreibung_stationen") {
            Some(FileKind::Metadata)
        } else if path.to_string_lossy().contains("multi_annual") {
            Some(FileKind::MultiAnnual)
        } else if name.ends_with(".zip") || name.starts_with("produkt") || name.ends_with(".txt") {
            Some(FileKind::Observational)
        } else {
            None
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Observational => "observational",
            FileKind::Metadata => "metadata",
            FileKind::MultiAnnual => "multi-annual",
            FileKind::BinaryGrid => "binary-grid",
            FileKind::RasterGrid => "raster-grid",
            FileKind::AscGrid => "asc-grid",
        };
        f.write_str(name)
    }
}

/// What the pipeline returns per archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// Assemble all members into one homogeneous stack
    #[default]
    Stack,
    /// Return decoded layers individually, collecting member failures
    Layers,
}

/// How many archive layers to unpack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NestingMode {
    /// Inspect the outer table of contents and decide
    #[default]
    Auto,
    /// Members are binary composites
    Single,
    /// Members are archives of binary composites
    Nested,
}

/// Processing statistics
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub archives_processed: usize,
    pub archives_failed: usize,
    pub members_extracted: usize,
    pub layers_decoded: usize,
    pub layers_failed: usize,
    pub processing_time_ms: u128,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detects_binary_grids() {
        for name in [
            "raa01-rw_10000-1801010050-dwd---bin",
            "raa01-rw_10000-1801010050-dwd---bin.gz",
            "RW-201801.tar.gz",
            "SF201712.tar",
            "YW2017.002_201801.tgz",
        ] {
            assert_eq!(
                FileKind::from_path(&PathBuf::from(name)),
                Some(FileKind::BinaryGrid),
                "{name}"
            );
        }
    }

    #[test]
    fn test_detects_other_kinds() {
        assert_eq!(
            FileKind::from_path(Path::new("grids_germany_seasonal_air_temp_mean_201802.asc.gz")),
            Some(FileKind::AscGrid)
        );
        assert_eq!(
            FileKind::from_path(Path::new("KL_Tageswerte_Beschreibung_Stationen.txt")),
            Some(FileKind::Metadata)
        );
        assert_eq!(
            FileKind::from_path(Path::new("multi_annual/mean_81-10/Temperatur_1981-2010.txt")),
            Some(FileKind::MultiAnnual)
        );
        assert_eq!(
            FileKind::from_path(Path::new("tageswerte_KL_00003_19310101_20110331_hist.zip")),
            Some(FileKind::Observational)
        );
        assert_eq!(FileKind::from_path(Path::new("notes.pdf")), None);
    }
}
