//! Application constants for RADOLAN ingestion
//!
//! Header grammar tokens, supported product codes, cell flag masks and the
//! published projection constants of the composite grids.

// =============================================================================
// Header Grammar
// =============================================================================

/// End-of-text byte terminating the ASCII preamble
pub const HEADER_TERMINATOR: u8 = 0x03;

/// Upper bound for the preamble search; real headers are a few hundred bytes
pub const MAX_HEADER_LEN: usize = 4096;

/// Fixed-width prefix: product (2), DDhhmm (6), WMO number (5), MMYY (4)
pub const HEADER_PREFIX_LEN: usize = 17;

/// Bytes per cell in 16-bit composite products
pub const CELL_WIDTH: usize = 2;

/// Two-letter field tokens following the fixed prefix, in wire order
pub mod tokens {
    pub const PRODUCT_LENGTH: &str = "BY";
    pub const FORMAT_VERSION: &str = "VS";
    pub const SOFTWARE_VERSION: &str = "SW";
    pub const PRECISION: &str = "PR";
    pub const INTERVAL: &str = "INT";
    pub const GRID: &str = "GP";
    pub const FORECAST_LEAD: &str = "VV";
    pub const MODULE_FLAGS: &str = "MF";
    pub const QUANTIFICATION: &str = "QN";
    pub const RADAR_SITES: &str = "MS";
}

// =============================================================================
// Product Codes
// =============================================================================

/// Composite products stored with 16-bit cells
///
/// RW/RY/RZ/YW are hourly and 5-minute precipitation analyses, SF/SQ/SH the
/// daily, 6-hourly and 12-hourly sums, RV/RS the nowcasting products.
pub const SUPPORTED_PRODUCTS: &[&str] = &[
    "RW", "RY", "RZ", "YW", "SF", "SQ", "SH", "RV", "RS", "RQ", "W1", "W2", "W3", "W4",
];

/// Reflectivity products use 1-byte cells and are not decoded here
pub const BYTE_CELL_PRODUCTS: &[&str] = &["RX", "WX", "EX", "WN", "PG"];

// =============================================================================
// Cell Flags
// =============================================================================

/// Bit masks of the 16-bit composite cell word
pub mod cell_flags {
    /// Low 12 bits carry the magnitude in the documented layout
    pub const MAGNITUDE_12: u16 = 0x0FFF;

    /// Low 13 bits: magnitude including bit 12
    pub const MAGNITUDE_13: u16 = 0x1FFF;

    /// Secondary data (interpolated from neighbouring sites)
    pub const SECONDARY: u16 = 0x1000;

    /// Value outside the valid sensor range
    pub const NO_DATA: u16 = 0x2000;

    /// Negative sign
    pub const NEGATIVE: u16 = 0x4000;

    /// Non-meteorological echo
    pub const CLUTTER: u16 = 0x8000;
}

// =============================================================================
// Projection Constants
// =============================================================================

/// Polar stereographic sphere used by the national composite, in kilometres
pub const RADOLAN_CRS: &str = "+proj=stere +lat_0=90 +lat_ts=90 +lon_0=10 +k=0.93301270189 +x_0=0 +y_0=0 +a=6370040 +b=6370040 +to_meter=1000 +no_defs";

/// 900 x 900 km national composite grid
pub const RADOLAN_EXTENT: [f64; 4] = [-523.4622, 376.5378, -4658.645, -3758.645];

/// RW product grid, shifted relative to the national composite
pub const RW_EXTENT: [f64; 4] = [-443.4622, 456.5378, -4758.645, -3858.645];

/// Ellipsoidal stereographic definition used by seasonal grids, in metres
pub const SEASONAL_CRS: &str = "+proj=stere +lat_0=90 +lat_ts=60 +lon_0=10 +a=6378137 +b=6356752.3142451802 +x_0=543196.83521776402 +y_0=3622588.8619310018 +no_defs";

/// 900 x 1100 km extended grid shifted by the seasonal false origin
pub const SEASONAL_EXTENT: [f64; 4] = [-130265.365, 769734.635, -1386056.138, -286056.138];

/// Geographic target of reprojection
pub const GEOGRAPHIC_CRS: &str = "+proj=longlat +datum=WGS84 +no_defs";

// =============================================================================
// File Names
// =============================================================================

/// Archive suffixes recognised as binary grid containers
pub const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar"];

/// Marker that DWD binary composites carry in their file names
pub const BINARY_MARKER: &str = "---bin";

/// Sub-directory of the staging root holding outer archive members
pub const OUTER_STAGING_DIR: &str = "outer";

/// Sub-directory of the staging root holding inner archive members
pub const INNER_STAGING_DIR: &str = "inner";

/// Prefix of in-flight extraction temp files
pub const PARTIAL_PREFIX: &str = ".partial-";
