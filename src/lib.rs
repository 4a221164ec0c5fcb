//! RADOLAN Ingest Library
//!
//! A Rust library for turning DWD RADOLAN radar composites, as distributed in
//! (nested) tar archives, into gridded arrays with masks and spatial
//! reference information.
//!
//! This library provides tools for:
//! - Staging archive members idempotently into a local directory
//! - Decoding binary composites with their ETX-terminated headers
//! - Stacking decoded layers of one archive into a single 3-D grid
//! - Attaching the RADOLAN projections and optionally reprojecting
//! - Running batches of archives concurrently with isolated failures

pub mod cli;
pub mod composite;
pub mod config;
pub mod constants;
pub mod error;
pub mod filesystem;
pub mod grid;
pub mod models;
pub mod processor;
pub mod projection;
pub mod stack;
pub mod staging;
#[cfg(any(test, feature = "testdata"))]
pub mod testdata;

pub use composite::{CompositeDecoder, CompositeHeader, decode, read_header};
pub use config::PipelineConfig;
pub use error::{RadolanError, Result};
pub use grid::{GridLayer, GridSummary};
pub use models::{FileKind, NestingMode, OutputMode, ProcessingStats};
pub use processor::{
    GridOutput, LayerBatch, Pipeline, PipelineOutput, ProgressEvent, ProgressSink, collect_stats,
};
pub use projection::{Crs, Extent, GeoEngine, Projector, ProjectionSpec, SpatialRef};
pub use stack::{GridStack, Selection, assemble};
pub use staging::{StagingReport, ensure_extracted, ensure_extracted_nested, stage_archive};
