//! Error types for design construction and simulation.
//!
//! Structural mistakes (declaring signals outside a module, an output port
//! on the root) and resource failures (trace file cannot be opened) are
//! [`SimError`]s surfaced at the call that caused them. Failures raised from
//! a user `evaluate` hook travel as [`EvalError`] and terminate the
//! simulation cleanly through the exit-status machinery rather than through
//! `Result` propagation.

use std::io;

/// Errors that can occur while building a design or configuring a run.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A module ID did not refer to a module in this kernel.
    #[error("no module with id {0} in this simulation")]
    UnknownModule(u32),

    /// An output wire was declared on the root module, which has no parent
    /// to sensitize.
    #[error("output wire '{name}' cannot be declared on the root module")]
    OutputOnRoot {
        /// The name the wire was declared with.
        name: String,
    },

    /// A behavior was bound to a module that already has one.
    #[error("module '{name}' already has a bound behavior")]
    AlreadyBound {
        /// The module's instance name.
        name: String,
    },

    /// The VCD start clock was not strictly before the stop clock.
    #[error("VCD start clock ({start}) must be less than stop clock ({stop})")]
    VcdWindow {
        /// Configured start clock.
        start: u32,
        /// Configured stop clock.
        stop: u32,
    },

    /// The VCD output file could not be created.
    #[error("VCD I/O error: {0}")]
    VcdIo(#[from] io::Error),
}

/// A failure raised from a user `evaluate`, `pre_clock`, or `post_clock`
/// hook.
///
/// The scheduler catches these, records the message, and terminates the
/// simulation at the current clock with [`SimStatus::RuntimeError`]
/// (see [`crate::kernel::SimReport`]).
///
/// [`SimStatus::RuntimeError`]: crate::kernel::SimStatus::RuntimeError
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EvalError {
    /// Description of the failure.
    pub message: String,
}

impl EvalError {
    /// Creates a new evaluation error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for EvalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for EvalError {
    fn from(message: &str) -> Self {
        Self {
            message: message.into(),
        }
    }
}
