//! Synthetic composite and archive generation.
//!
//! Builds byte-exact RADOLAN files with known cell words and packs them into
//! tar / tar.gz archives, so decoding, staging and the full pipeline can be
//! exercised without real DWD downloads.

use crate::constants::{HEADER_TERMINATOR, cell_flags};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Description of a composite to encode
#[derive(Debug, Clone)]
pub struct SyntheticComposite {
    pub product: String,
    pub timestamp: DateTime<Utc>,
    pub rows: usize,
    pub cols: usize,
    /// Decimal places written as `PR E-0n`
    pub precision: u32,
    pub radars: Vec<String>,
    /// Raw cell words in row-major order
    pub cells: Vec<u16>,
}

impl SyntheticComposite {
    /// RW product at 2018-01-26 10:50 UTC with precision 1
    pub fn new(rows: usize, cols: usize, cells: Vec<u16>) -> Self {
        Self {
            product: "RW".to_string(),
            timestamp: Utc.with_ymd_and_hms(2018, 1, 26, 10, 50, 0).unwrap(),
            rows,
            cols,
            precision: 1,
            radars: vec!["boo".to_string(), "ros".to_string(), "emd".to_string()],
            cells,
        }
    }

    /// Grid where cell `i` holds magnitude `i % 4096`
    pub fn ramp(rows: usize, cols: usize) -> Self {
        let cells = (0..rows * cols).map(|i| (i % 4096) as u16).collect();
        Self::new(rows, cols, cells)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_product(mut self, product: &str) -> Self {
        self.product = product.to_string();
        self
    }

    /// Shift the timestamp by whole hours
    pub fn hours_later(self, hours: i64) -> Self {
        let timestamp = self.timestamp + Duration::hours(hours);
        self.with_timestamp(timestamp)
    }

    /// DWD file name, e.g. `raa01-rw_10000-1801261050-dwd---bin`
    pub fn file_name(&self) -> String {
        let ts = self.timestamp;
        format!(
            "raa01-{}_10000-{:02}{:02}{:02}{:02}{:02}-dwd---bin",
            self.product.to_lowercase(),
            ts.year() % 100,
            ts.month(),
            ts.day(),
            ts.hour(),
            ts.minute()
        )
    }

    /// Header text without the terminator, for a given payload length
    fn header_text(&self, payload_len: usize) -> String {
        let ts = self.timestamp;
        let prefix = format!(
            "{}{:02}{:02}{:02}10000{:02}{:02}",
            self.product,
            ts.day(),
            ts.hour(),
            ts.minute(),
            ts.month(),
            ts.year() % 100
        );
        let sites = self.radars.join(",");
        let tail = format!(
            "VS 3SW   2.28.1PR E-{:02}INT  60GP{:>4}x{:>4}MS{:>3}<{}>",
            self.precision,
            self.rows,
            self.cols,
            sites.len() + 2,
            sites
        );
        // "BY" + 7 digits
        let header_len = prefix.len() + 9 + tail.len() + 1;
        format!("{prefix}BY{:07}{tail}", header_len + payload_len)
    }

    /// Encode header and payload; `payload_adjust` trims (negative) or pads
    /// (positive) the payload after the header has been written
    pub fn encode_with_adjust(&self, payload_adjust: isize) -> Vec<u8> {
        let payload_len = self.rows * self.cols * 2;
        let mut bytes = self.header_text(payload_len).into_bytes();
        bytes.push(HEADER_TERMINATOR);
        for word in &self.cells {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        if payload_adjust < 0 {
            bytes.truncate(bytes.len().saturating_sub(payload_adjust.unsigned_abs()));
        } else {
            bytes.extend(std::iter::repeat_n(0u8, payload_adjust as usize));
        }
        bytes
    }

    pub fn encode(&self) -> Vec<u8> {
        self.encode_with_adjust(0)
    }

    /// Write the composite into `dir` under its DWD file name
    pub fn write_to(&self, dir: &Path) -> io::Result<std::path::PathBuf> {
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.encode())?;
        Ok(path)
    }
}

/// Cell word carrying the no-data flag
pub fn no_data_cell() -> u16 {
    cell_flags::NO_DATA
}

/// Cell word carrying the clutter flag over `magnitude`
pub fn clutter_cell(magnitude: u16) -> u16 {
    magnitude | cell_flags::CLUTTER
}

/// Write `members` into a tar archive at `path`, gzip-compressed if requested
pub fn write_tar(path: &Path, members: &[(String, Vec<u8>)], gzip: bool) -> io::Result<()> {
    let file = File::create(path)?;
    if gzip {
        let encoder = GzEncoder::new(file, Compression::fast());
        let encoder = append_members(tar::Builder::new(encoder), members)?;
        encoder.finish()?;
    } else {
        append_members(tar::Builder::new(file), members)?.flush()?;
    }
    Ok(())
}

fn append_members<W: Write>(
    mut builder: tar::Builder<W>,
    members: &[(String, Vec<u8>)],
) -> io::Result<W> {
    for (name, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_slice())?;
    }
    builder.into_inner()
}

/// Write an archive of hourly composites starting at the default timestamp
pub fn write_hourly_archive(
    path: &Path,
    count: usize,
    rows: usize,
    cols: usize,
    gzip: bool,
) -> io::Result<Vec<String>> {
    let members: Vec<(String, Vec<u8>)> = (0..count)
        .map(|hour| {
            let composite = SyntheticComposite::ramp(rows, cols).hours_later(hour as i64);
            (composite.file_name(), composite.encode())
        })
        .collect();
    write_tar(path, &members, gzip)?;
    Ok(members.into_iter().map(|(name, _)| name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::parse_header;

    #[test]
    fn test_encoded_header_is_consistent() {
        let composite = SyntheticComposite::ramp(3, 5);
        let bytes = composite.encode();
        let header = parse_header(Path::new("synthetic"), &bytes).unwrap();

        assert_eq!(header.dims(), (3, 5));
        assert_eq!(header.declared_length, bytes.len());
        assert_eq!(header.radars, vec!["boo", "ros", "emd"]);
    }

    #[test]
    fn test_file_name_follows_dwd_convention() {
        let composite = SyntheticComposite::ramp(1, 1).hours_later(2);
        assert_eq!(composite.file_name(), "raa01-rw_10000-1801261250-dwd---bin");
    }
}
