//! Bit layout of the 16-bit composite cell word.
//!
//! The flag positions are not fixed by a single published table, so the
//! decoder takes the layout as a value. Layouts are versioned by name and
//! should be checked against sample files before decoded values are trusted.

use crate::constants::cell_flags;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Classification of one decoded cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    /// Physical value after precision scaling
    Value(f64),
    /// Outside the valid sensor range
    NoData,
    /// Non-meteorological echo
    Clutter,
}

/// Named cell layout versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutVersion {
    #[default]
    CompositeV1,
    RadolanSecondary,
}

impl LayoutVersion {
    pub fn layout(self) -> CellLayout {
        match self {
            LayoutVersion::CompositeV1 => CellLayout::composite_v1(),
            LayoutVersion::RadolanSecondary => CellLayout::radolan_secondary(),
        }
    }
}

impl FromStr for LayoutVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "composite-v1" => Ok(LayoutVersion::CompositeV1),
            "radolan-secondary" => Ok(LayoutVersion::RadolanSecondary),
            other => Err(format!(
                "unknown cell layout '{other}' (expected composite-v1 or radolan-secondary)"
            )),
        }
    }
}

/// Masks describing where magnitude and flags live in a cell word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellLayout {
    pub version: LayoutVersion,
    pub magnitude_mask: u16,
    pub no_data_mask: u16,
    pub clutter_mask: u16,
    /// Sign flag; `None` when the product carries unsigned magnitudes only
    pub negative_mask: Option<u16>,
    /// Informational flag that does not alter the value
    pub secondary_mask: Option<u16>,
}

impl CellLayout {
    /// 13-bit magnitude with no-data, sign and clutter in the top three bits
    pub const fn composite_v1() -> Self {
        Self {
            version: LayoutVersion::CompositeV1,
            magnitude_mask: cell_flags::MAGNITUDE_13,
            no_data_mask: cell_flags::NO_DATA,
            clutter_mask: cell_flags::CLUTTER,
            negative_mask: Some(cell_flags::NEGATIVE),
            secondary_mask: None,
        }
    }

    /// 12-bit magnitude with bit 12 flagging secondary (interpolated) data
    pub const fn radolan_secondary() -> Self {
        Self {
            version: LayoutVersion::RadolanSecondary,
            magnitude_mask: cell_flags::MAGNITUDE_12,
            no_data_mask: cell_flags::NO_DATA,
            clutter_mask: cell_flags::CLUTTER,
            negative_mask: Some(cell_flags::NEGATIVE),
            secondary_mask: Some(cell_flags::SECONDARY),
        }
    }

    /// Classify a raw cell word; no-data takes precedence over clutter
    pub fn classify(&self, word: u16, divisor: f64) -> Cell {
        if word & self.no_data_mask != 0 {
            return Cell::NoData;
        }
        if word & self.clutter_mask != 0 {
            return Cell::Clutter;
        }

        let magnitude = f64::from(word & self.magnitude_mask) / divisor;
        match self.negative_mask {
            Some(mask) if word & mask != 0 => Cell::Value(-magnitude),
            _ => Cell::Value(magnitude),
        }
    }

    /// Whether the secondary-data flag is set
    pub fn is_secondary(&self, word: u16) -> bool {
        self.secondary_mask.is_some_and(|mask| word & mask != 0)
    }
}

impl Default for CellLayout {
    fn default() -> Self {
        Self::composite_v1()
    }
}
