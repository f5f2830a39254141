//! Shared foundational types for the latch simulation library.
//!
//! This crate provides the value-level building blocks the simulation kernel
//! is parameterized over: the [`SignalValue`] trait (bit-width oracle plus a
//! raw-bits view for trace output), VCD bitstring rendering helpers, clock
//! [`Frequency`] values, and the VCD [`Timescale`] type.

#![warn(missing_docs)]

pub mod bitstring;
pub mod frequency;
pub mod timescale;
pub mod value;

pub use bitstring::{bitstring, index_suffix, undefined};
pub use frequency::{Frequency, ParseFrequencyError};
pub use timescale::{TimeUnit, Timescale, TimescaleValue};
pub use value::SignalValue;
