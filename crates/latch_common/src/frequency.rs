//! Clock frequency values with unit parsing and display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A clock frequency stored in Hertz.
///
/// Parses from strings like `"100MHz"`, `"33KHz"`, `"1GHz"`, or a bare
/// number interpreted as Hz. Used to derive the VCD tick count per clock.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frequency(f64);

impl Frequency {
    /// Creates a frequency from a value in Hertz.
    pub fn new(hz: f64) -> Self {
        Self(hz)
    }

    /// Returns the frequency in Hertz.
    pub fn hz(&self) -> f64 {
        self.0
    }

    /// Returns the frequency in megahertz.
    pub fn mhz(&self) -> f64 {
        self.0 / 1e6
    }
}

impl fmt::Debug for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frequency({self})")
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hz = self.0;
        if hz >= 1e9 {
            write!(f, "{}GHz", hz / 1e9)
        } else if hz >= 1e6 {
            write!(f, "{}MHz", hz / 1e6)
        } else if hz >= 1e3 {
            write!(f, "{}KHz", hz / 1e3)
        } else {
            write!(f, "{hz}Hz")
        }
    }
}

/// Error type for parsing frequency strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid frequency: '{input}'")]
pub struct ParseFrequencyError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseFrequencyError {
            input: s.to_string(),
        };

        let lower = s.to_ascii_lowercase();
        for (suffix, scale) in [("ghz", 1e9), ("mhz", 1e6), ("khz", 1e3), ("hz", 1.0)] {
            if let Some(num) = lower.strip_suffix(suffix) {
                let val: f64 = num.trim().parse().map_err(|_| err())?;
                return Ok(Frequency(val * scale));
            }
        }

        // Bare number, interpreted as Hz.
        let val: f64 = s.parse().map_err(|_| err())?;
        Ok(Frequency(val))
    }
}
