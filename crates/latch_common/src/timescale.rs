//! The VCD timescale: a mantissa of 1, 10, or 100 and a time unit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The numeric part of a VCD timescale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimescaleValue {
    /// 1 unit per tick.
    #[default]
    T1,
    /// 10 units per tick.
    T10,
    /// 100 units per tick.
    T100,
}

impl TimescaleValue {
    fn multiplier(self) -> f64 {
        match self {
            TimescaleValue::T1 => 1.0,
            TimescaleValue::T10 => 10.0,
            TimescaleValue::T100 => 100.0,
        }
    }
}

/// The unit part of a VCD timescale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Seconds.
    #[default]
    S,
    /// Milliseconds.
    Ms,
    /// Microseconds.
    Us,
    /// Nanoseconds.
    Ns,
    /// Picoseconds.
    Ps,
    /// Femtoseconds.
    Fs,
}

impl TimeUnit {
    fn seconds(self) -> f64 {
        match self {
            TimeUnit::S => 1.0,
            TimeUnit::Ms => 1e-3,
            TimeUnit::Us => 1e-6,
            TimeUnit::Ns => 1e-9,
            TimeUnit::Ps => 1e-12,
            TimeUnit::Fs => 1e-15,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TimeUnit::S => "s",
            TimeUnit::Ms => "ms",
            TimeUnit::Us => "us",
            TimeUnit::Ns => "ns",
            TimeUnit::Ps => "ps",
            TimeUnit::Fs => "fs",
        }
    }
}

/// A VCD timescale, displayed as e.g. `1 ns` or `100 ps`.
///
/// The default is `1 s`, matching a trace writer that has not been given an
/// operating point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timescale {
    /// Mantissa (1, 10, or 100).
    pub value: TimescaleValue,
    /// Time unit.
    pub unit: TimeUnit,
}

impl Timescale {
    /// Creates a timescale from its two parts.
    pub fn new(value: TimescaleValue, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    /// Returns the duration of one VCD tick in seconds.
    pub fn seconds_per_tick(&self) -> f64 {
        self.value.multiplier() * self.unit.seconds()
    }
}

impl fmt::Display for Timescale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value.multiplier() as u32, self.unit.label())
    }
}
