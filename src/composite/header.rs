//! RADOLAN composite header parsing.
//!
//! The preamble is ASCII text terminated by ETX. It starts with a fixed
//! 17-character prefix (product code, `DDhhmm`, WMO number, `MMYY`) followed
//! by two- or three-letter tokens that are not separated by whitespace,
//! e.g. `BY1620162VS 3SW   2.28.1PR E-01INT  60GP 900x 900MS 66<boo,ros,...>`.

use crate::constants::{
    BYTE_CELL_PRODUCTS, CELL_WIDTH, HEADER_PREFIX_LEN, HEADER_TERMINATOR, MAX_HEADER_LEN,
    SUPPORTED_PRODUCTS, tokens,
};
use crate::error::{RadolanError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z0-9]{2})(\d{2})(\d{2})(\d{2})(\d{5})(\d{2})(\d{2})$").expect("valid regex")
});

/// `MS 66<boo,ros,...>` and other length-prefixed bracket sections
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]{2})\s*(\d+)\s*<([^>]*)>").expect("valid regex"));

static BY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"BY\s*(\d+)").expect("valid regex"));
static VS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"VS\s*(\d+)").expect("valid regex"));
static SW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SW\s*([0-9][0-9.]*)").expect("valid regex"));
static PR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"PR\s*E([+-]?\d+)").expect("valid regex"));
static INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"INT\s*(\d+)").expect("valid regex"));
static GP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"GP\s*(\d+)\s*x\s*(\d+)").expect("valid regex"));
static VV_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"VV\s*(\d+)").expect("valid regex"));
static MF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"MF\s*(\d+)").expect("valid regex"));
static QN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"QN\s*(\d+)").expect("valid regex"));

/// Parsed preamble of one composite file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeHeader {
    /// Two-character product code, e.g. `RW`
    pub product: String,
    /// Nominal time of the product
    pub timestamp: DateTime<Utc>,
    pub wmo_number: u32,
    pub rows: usize,
    pub cols: usize,
    /// Decimal places: `PR E-01` is 1, values are divided by `10^precision`
    pub precision: i32,
    /// Contributing radar sites, in header order
    pub radars: Vec<String>,
    /// Product length from the `BY` token, header included
    pub declared_length: usize,
    /// Header length including the ETX terminator
    pub header_len: usize,
    pub interval_minutes: Option<u32>,
    pub format_version: Option<u32>,
    pub software_version: Option<String>,
    pub forecast_lead_minutes: Option<u32>,
    /// Tokens consumed opaquely (`MF`, `QN`, other bracket sections)
    pub extra: BTreeMap<String, String>,
    /// Preamble text without the terminator
    pub raw: String,
}

impl CompositeHeader {
    /// Payload length the header declares
    pub fn declared_payload_len(&self) -> usize {
        self.declared_length.saturating_sub(self.header_len)
    }

    /// Payload length implied by the grid dimensions
    ///
    /// Saturates for dimensions that were not produced by [`parse_header`],
    /// which rejects grids whose payload size overflows.
    pub fn expected_payload_len(&self) -> usize {
        grid_payload_len(self.rows, self.cols).unwrap_or(usize::MAX)
    }

    /// Divisor applied to raw magnitudes
    pub fn divisor(&self) -> f64 {
        10f64.powi(self.precision)
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

/// Payload bytes of a `rows x cols` grid, `None` on overflow
fn grid_payload_len(rows: usize, cols: usize) -> Option<usize> {
    rows.checked_mul(cols)?.checked_mul(CELL_WIDTH)
}

/// Locate the ETX terminator within the bounded preamble window
pub fn find_terminator(path: &Path, bytes: &[u8]) -> Result<usize> {
    let window = &bytes[..bytes.len().min(MAX_HEADER_LEN)];
    window
        .iter()
        .position(|&b| b == HEADER_TERMINATOR)
        .ok_or_else(|| {
            RadolanError::format(
                path,
                format!("no header terminator within the first {} bytes", window.len()),
            )
        })
}

/// Parse the header at the start of `bytes`
///
/// `bytes` may hold the whole file or only its leading part, as long as the
/// terminator is included.
pub fn parse_header(path: &Path, bytes: &[u8]) -> Result<CompositeHeader> {
    let terminator = find_terminator(path, bytes)?;
    // Latin-1: every byte maps to one char, no locale involved
    let text: String = bytes[..terminator].iter().map(|&b| b as char).collect();

    let mut builder = HeaderBuilder::new(terminator + 1, text.clone());
    builder.parse_prefix(path, &text)?;
    builder.parse_tokens(text.get(HEADER_PREFIX_LEN..).unwrap_or_default());
    let header = builder.build(path)?;

    debug!(
        "Parsed {} header for {}: {}x{}, precision {}, {} radars",
        header.product,
        path.display(),
        header.rows,
        header.cols,
        header.precision,
        header.radars.len()
    );

    Ok(header)
}

/// Builder collecting header tokens
struct HeaderBuilder {
    header_len: usize,
    raw: String,
    product: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    wmo_number: Option<u32>,
    declared_length: Option<usize>,
    grid: Option<(usize, usize)>,
    precision: i32,
    radars: Vec<String>,
    interval_minutes: Option<u32>,
    format_version: Option<u32>,
    software_version: Option<String>,
    forecast_lead_minutes: Option<u32>,
    extra: BTreeMap<String, String>,
}

impl HeaderBuilder {
    fn new(header_len: usize, raw: String) -> Self {
        Self {
            header_len,
            raw,
            product: None,
            timestamp: None,
            wmo_number: None,
            declared_length: None,
            grid: None,
            precision: 0,
            radars: Vec::new(),
            interval_minutes: None,
            format_version: None,
            software_version: None,
            forecast_lead_minutes: None,
            extra: BTreeMap::new(),
        }
    }

    fn parse_prefix(&mut self, path: &Path, text: &str) -> Result<()> {
        let prefix = text.get(..HEADER_PREFIX_LEN).ok_or_else(|| {
            RadolanError::format(path, format!("header shorter than {HEADER_PREFIX_LEN} bytes"))
        })?;

        let caps = PREFIX_RE.captures(prefix).ok_or_else(|| {
            RadolanError::format(path, format!("malformed header prefix '{prefix}'"))
        })?;

        let product = caps[1].to_string();
        if !SUPPORTED_PRODUCTS.contains(&product.as_str()) {
            if BYTE_CELL_PRODUCTS.contains(&product.as_str()) {
                debug!("Product {} uses 1-byte cells", product);
            }
            return Err(RadolanError::UnsupportedFormat {
                path: path.to_path_buf(),
                product_code: product,
            });
        }

        let field = |i: usize| caps[i].parse::<u32>().unwrap_or_default();
        let (day, hour, minute) = (field(2), field(3), field(4));
        let (month, year) = (field(6), 2000 + field(7) as i32);

        let timestamp = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .ok_or_else(|| {
                RadolanError::format(path, format!("invalid product time in prefix '{prefix}'"))
            })?
            .and_utc();

        self.product = Some(product);
        self.timestamp = Some(timestamp);
        self.wmo_number = Some(field(5));
        Ok(())
    }

    fn parse_tokens(&mut self, rest: &str) {
        for caps in SECTION_RE.captures_iter(rest) {
            if &caps[1] == tokens::RADAR_SITES {
                self.radars = caps[3]
                    .split(',')
                    .map(|site| site.trim().to_string())
                    .filter(|site| !site.is_empty())
                    .collect();
            } else {
                self.extra.insert(caps[1].to_string(), caps[3].to_string());
            }
        }

        // Bracket contents may hold arbitrary text, so tokens are matched outside them
        let plain = SECTION_RE.replace_all(rest, " ");

        let capture = |re: &Regex| re.captures(&plain).map(|caps| caps[1].to_string());
        let number = |re: &Regex| capture(re).and_then(|value| value.parse::<u32>().ok());

        self.declared_length = capture(&BY_RE).and_then(|value| value.parse().ok());
        self.format_version = number(&VS_RE);
        self.software_version = capture(&SW_RE);
        self.interval_minutes = number(&INT_RE);
        self.forecast_lead_minutes = number(&VV_RE);
        if let Some(exponent) = capture(&PR_RE).and_then(|value| value.parse::<i32>().ok()) {
            self.precision = -exponent;
        }
        if let Some(caps) = GP_RE.captures(&plain) {
            if let (Ok(rows), Ok(cols)) = (caps[1].parse(), caps[2].parse()) {
                self.grid = Some((rows, cols));
            }
        }
        for (token, re) in [(tokens::MODULE_FLAGS, &*MF_RE), (tokens::QUANTIFICATION, &*QN_RE)] {
            if let Some(value) = capture(re) {
                self.extra.insert(token.to_string(), value);
            }
        }
    }

    fn build(self, path: &Path) -> Result<CompositeHeader> {
        let missing = |token: &str| {
            RadolanError::format(path, format!("missing mandatory header token {token}"))
        };

        let declared_length = self
            .declared_length
            .ok_or_else(|| missing(tokens::PRODUCT_LENGTH))?;
        let (rows, cols) = self.grid.ok_or_else(|| missing(tokens::GRID))?;

        if rows == 0 || cols == 0 {
            return Err(RadolanError::format(
                path,
                format!("degenerate grid {rows}x{cols}"),
            ));
        }
        if grid_payload_len(rows, cols).is_none() {
            return Err(RadolanError::format(
                path,
                format!("grid {rows}x{cols} overflows the addressable payload size"),
            ));
        }
        if declared_length < self.header_len {
            return Err(RadolanError::format(
                path,
                format!(
                    "declared product length {declared_length} is shorter than the {}-byte header",
                    self.header_len
                ),
            ));
        }

        Ok(CompositeHeader {
            product: self.product.ok_or_else(|| missing("product code"))?,
            timestamp: self.timestamp.ok_or_else(|| missing("product time"))?,
            wmo_number: self.wmo_number.unwrap_or_default(),
            rows,
            cols,
            precision: self.precision,
            radars: self.radars,
            declared_length,
            header_len: self.header_len,
            interval_minutes: self.interval_minutes,
            format_version: self.format_version,
            software_version: self.software_version,
            forecast_lead_minutes: self.forecast_lead_minutes,
            extra: self.extra,
            raw: self.raw,
        })
    }
}
