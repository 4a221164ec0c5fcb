//! Binary RADOLAN composite decoding.
//!
//! A composite file is an ETX-terminated ASCII header followed by
//! `rows * cols` little-endian 16-bit cell words in row-major order.
//! Decoding is pure given the file bytes; every structural violation is a
//! per-file error and nothing is padded or truncated.

pub mod header;
pub mod layout;

pub use header::{CompositeHeader, parse_header};
pub use layout::{Cell, CellLayout, LayoutVersion};

use crate::constants::{CELL_WIDTH, MAX_HEADER_LEN};
use crate::error::{RadolanError, Result};
use crate::filesystem::open_maybe_gzip;
use crate::grid::GridLayer;
use crate::projection::SpatialRef;
use ndarray::Array2;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Decoder parameterised by the cell bit layout
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeDecoder {
    layout: CellLayout,
}

impl CompositeDecoder {
    pub fn new(layout: CellLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &CellLayout {
        &self.layout
    }

    /// Decode one composite file
    pub fn decode(
        &self,
        path: &Path,
        na_substitute: f64,
        clutter_substitute: f64,
    ) -> Result<GridLayer> {
        let bytes = read_composite_bytes(path)?;
        self.decode_bytes(path, &bytes, na_substitute, clutter_substitute)
    }

    /// Decode a composite already held in memory; `path` is used for reporting
    pub fn decode_bytes(
        &self,
        path: &Path,
        bytes: &[u8],
        na_substitute: f64,
        clutter_substitute: f64,
    ) -> Result<GridLayer> {
        let header = parse_header(path, bytes)?;
        let expected = header.expected_payload_len();

        if header.declared_payload_len() != expected {
            return Err(RadolanError::format(
                path,
                format!(
                    "header declares {} payload bytes but a {}x{} grid needs {}",
                    header.declared_payload_len(),
                    header.rows,
                    header.cols,
                    expected
                ),
            ));
        }

        let payload = &bytes[header.header_len..];
        if payload.len() != expected {
            return Err(RadolanError::PayloadLength {
                path: path.to_path_buf(),
                expected,
                actual: payload.len(),
            });
        }

        let divisor = header.divisor();
        let cells = header.rows * header.cols;
        let mut values = Vec::with_capacity(cells);
        let mut no_data = Vec::with_capacity(cells);
        let mut clutter = Vec::with_capacity(cells);
        let mut secondary = 0usize;

        for chunk in payload.chunks_exact(CELL_WIDTH) {
            let word = u16::from_le_bytes([chunk[0], chunk[1]]);
            if self.layout.is_secondary(word) {
                secondary += 1;
            }
            let (value, missing, cluttered) = match self.layout.classify(word, divisor) {
                Cell::NoData => (na_substitute, true, false),
                Cell::Clutter => (clutter_substitute, false, true),
                Cell::Value(value) => (value, false, false),
            };
            values.push(value);
            no_data.push(missing);
            clutter.push(cluttered);
        }

        let shape = header.dims();
        let shape_error =
            |e: ndarray::ShapeError| RadolanError::format(path, format!("grid shape: {e}"));

        debug!(
            "Decoded {} ({}x{}, layout {:?}, {} secondary cells)",
            path.display(),
            shape.0,
            shape.1,
            self.layout.version,
            secondary
        );

        Ok(GridLayer {
            values: Array2::from_shape_vec(shape, values).map_err(shape_error)?,
            no_data: Array2::from_shape_vec(shape, no_data).map_err(shape_error)?,
            clutter: Array2::from_shape_vec(shape, clutter).map_err(shape_error)?,
            header,
            source: path.to_path_buf(),
            spatial: SpatialRef::default(),
        })
    }
}

/// Decode one composite with the default cell layout
pub fn decode(path: &Path, na_substitute: f64, clutter_substitute: f64) -> Result<GridLayer> {
    CompositeDecoder::default().decode(path, na_substitute, clutter_substitute)
}

/// Parse only the header of a composite without reading the payload
pub fn read_header(path: &Path) -> Result<CompositeHeader> {
    let mut bytes = Vec::with_capacity(MAX_HEADER_LEN);
    open_maybe_gzip(path)?
        .take(MAX_HEADER_LEN as u64)
        .read_to_end(&mut bytes)?;
    parse_header(path, &bytes)
}

/// Read a composite, inflating it when it is gzip-compressed
pub fn read_composite_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    open_maybe_gzip(path)?.read_to_end(&mut bytes)?;
    Ok(bytes)
}
