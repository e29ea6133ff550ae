//! Human-readable transfer sizes with automatic unit selection

use crate::error::{MirrorError, Result};
use std::fmt;

/// Display units, smallest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    B,
    KB,
    MB,
    GB,
}

impl Unit {
    pub const ALL: [Unit; 4] = [Unit::B, Unit::KB, Unit::MB, Unit::GB];

    pub fn magnitude(self) -> u64 {
        match self {
            Unit::B => 1,
            Unit::KB => 1024,
            Unit::MB => 1024 * 1024,
            Unit::GB => 1024 * 1024 * 1024,
        }
    }

    /// Largest unit whose magnitude the value strictly exceeds
    pub fn select(bytes: u64) -> Option<Unit> {
        Unit::ALL
            .iter()
            .rev()
            .copied()
            .find(|unit| bytes > unit.magnitude())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Unit::B => "B",
            Unit::KB => "KB",
            Unit::MB => "MB",
            Unit::GB => "GB",
        };
        f.write_str(symbol)
    }
}

/// Format a byte count as e.g. `1.50 KB`.
///
/// Unit thresholds are strict: exactly 1024 bytes is still shown in bytes.
/// Zero has no matching unit and is an error, so callers that can see an
/// empty total must guard for it.
pub fn format_size(bytes: u64) -> Result<String> {
    let unit = Unit::select(bytes).ok_or(MirrorError::NoMatchingUnit(bytes))?;
    let scaled = bytes as f64 / unit.magnitude() as f64;
    Ok(format!("{:.2} {}", scaled, unit))
}
