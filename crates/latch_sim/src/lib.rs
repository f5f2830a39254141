//! Cycle-accurate two-phase simulation kernel for module/wire/register
//! designs.
//!
//! Designs are a hierarchy of modules containing wires (combinational
//! signals) and registers (edge-triggered flip-flops), evaluated one clock
//! at a time. Each clock commits register sources into their replicas on
//! the positive edge, propagates combinational changes to quiescence with
//! an event-driven fixed-point loop, then latches wire snapshots on the
//! negative edge. A Value Change Dump (VCD) trace and per-register
//! transition tables can be recorded along the way.
//!
//! # Usage
//!
//! ```
//! use latch_sim::{EvalContext, EvalError, Module, SimKernel, Reg, Wire};
//!
//! struct Counter {
//!     count: Reg<u8>,
//!     out: Wire<u8>,
//! }
//!
//! impl Module for Counter {
//!     fn evaluate(&mut self, cx: &mut EvalContext<'_>) -> Result<(), EvalError> {
//!         cx.nb(self.count, cx.q(self.count).wrapping_add(1));
//!         cx.set(self.out, cx.q(self.count));
//!         Ok(())
//!     }
//! }
//!
//! let mut kernel = SimKernel::new("tb");
//! let root = kernel.root();
//! let counter = Counter {
//!     count: kernel.register_init(root, "count", 0).unwrap(),
//!     out: kernel.wire(root, "out").unwrap(),
//! };
//! let count = counter.count;
//! kernel.bind(root, counter).unwrap();
//! kernel.set_cycle_limit(Some(8));
//! let report = kernel.run();
//! assert_eq!(report.exit_code(), -1); // stopped by the clock limit
//! assert_eq!(kernel.q(count), 7);
//! ```
//!
//! # Modules
//!
//! - `arena` — dense ID-indexed storage
//! - `error` — construction and evaluation error types
//! - `module` — hierarchy nodes and the [`Module`] behavior trait
//! - `signal` — wires and the assignment/trigger algorithm
//! - `register` — flip-flops with non-blocking write semantics
//! - `kernel` — the scheduler and two-phase clock loop
//! - `vcd` — Value Change Dump output
//! - `trace` — per-register transition tables

#![warn(missing_docs)]

pub mod arena;
pub mod error;
pub mod kernel;
pub mod module;
pub mod register;
pub mod signal;
pub mod trace;
pub mod vcd;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use latch_common::{Frequency, SignalValue, TimeUnit, Timescale, TimescaleValue};

pub use error::{EvalError, SimError};
pub use kernel::{EvalContext, SimKernel, SimReport, SimStatus, StepResult};
pub use module::{Module, ModuleId};
pub use register::{Reg, RegId};
pub use signal::{Wire, WireId, WireKind};
pub use trace::{TraceTable, ValueChangeRecord};
pub use vcd::VcdWriter;

/// Configuration for a simulation run.
///
/// This is the contract with the embedder (a CLI or test harness): watchdog
/// limits and the VCD output window arrive here rather than through
/// argument parsing of our own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Maximum number of clocks per run.
    pub cycle_limit: Option<u32>,
    /// Maximum number of fixed-point iterations within one clock.
    pub iteration_limit: Option<u32>,
    /// Maximum number of consecutive clocks with no scheduled activity.
    pub idle_limit: Option<u32>,
    /// Path of the VCD trace file. `None` disables tracing.
    pub vcd_path: Option<PathBuf>,
    /// Clock at which VCD change emission begins.
    pub vcd_start_clock: Option<u32>,
    /// Clock at which VCD change emission stops. Must be greater than the
    /// start clock when both are set.
    pub vcd_stop_clock: Option<u32>,
    /// Clock frequency used to derive the VCD tick count per clock.
    pub vcd_frequency: Option<Frequency>,
    /// VCD timescale. Defaults to `1 s` when unset.
    pub vcd_timescale: Option<Timescale>,
}

/// Configures a kernel from `config` and runs it to completion.
pub fn simulate(kernel: &mut SimKernel, config: &SimConfig) -> Result<SimReport, SimError> {
    kernel.configure(config)?;
    Ok(kernel.run())
}
