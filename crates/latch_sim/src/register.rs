//! Registers: edge-triggered flip-flops with non-blocking write semantics.
//!
//! A register holds a source stage *D* and a replica stage *Q*, each with
//! its own X flag. Writes always land in D; observers always read Q. The
//! positive clock edge copies D into Q for every register before any
//! combinational evaluation runs. When the scheduler re-evaluates a module
//! within the same clock, [`RegSlot::restore_replica`] first discards the
//! speculative D written by the earlier evaluation, which is what makes
//! fixed-point iteration safe.

use std::any::Any;
use std::marker::PhantomData;

use latch_common::{bitstring, undefined, SignalValue};
use serde::{Deserialize, Serialize};

use crate::arena::ArenaId;
use crate::module::ModuleId;
use crate::signal::Formatter;

/// Opaque ID of a register in a simulation.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub struct RegId(u32);

impl RegId {
    /// Creates a `RegId` from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl ArenaId for RegId {
    fn from_raw(index: u32) -> Self {
        Self(index)
    }

    fn as_raw(self) -> u32 {
        self.0
    }
}

/// A typed handle to a register.
///
/// Reading through the handle yields the replica (Q); writing updates the
/// source (D) and takes effect on the next positive edge.
pub struct Reg<T> {
    id: RegId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Reg<T> {
    pub(crate) fn new(id: RegId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped ID of this register.
    pub fn id(self) -> RegId {
        self.id
    }
}

impl<T> Clone for Reg<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Reg<T> {}

impl<T> std::fmt::Debug for Reg<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reg({})", self.id.as_raw())
    }
}

/// The full state of a typed register.
pub(crate) struct RegState<T: SignalValue> {
    pub(crate) name: String,
    pub(crate) owner: ModuleId,
    pub(crate) vcd_id: String,
    pub(crate) width: u32,
    /// Source stage D: receives non-blocking writes.
    pub(crate) source: T,
    /// Replica stage Q: the observable state.
    pub(crate) replica: T,
    /// Declaration-time value.
    pub(crate) init_value: T,
    /// X flag of the source stage.
    pub(crate) source_x: bool,
    /// X flag of the replica stage.
    pub(crate) replica_x: bool,
    /// Declaration-time X flag.
    pub(crate) init_x: bool,
    pub(crate) tracing: bool,
    pub(crate) formatter: Option<Formatter<T>>,
}

impl<T: SignalValue> RegState<T> {
    pub(crate) fn new(
        name: impl Into<String>,
        owner: ModuleId,
        vcd_id: String,
        init: Option<T>,
    ) -> Self {
        let x = init.is_none();
        let seed = init.unwrap_or_default();
        Self {
            name: name.into(),
            owner,
            vcd_id,
            width: T::WIDTH,
            source: seed,
            replica: seed,
            init_value: seed,
            source_x: x,
            replica_x: x,
            init_x: x,
            tracing: false,
            formatter: None,
        }
    }

    fn format(&self, v: &T) -> String {
        match &self.formatter {
            Some(f) => f(v, self.width),
            None => bitstring(v.to_vcd_bits(), self.width),
        }
    }
}

/// The type-erased capability set of a register.
pub(crate) trait RegSlot: Any {
    fn name(&self) -> &str;
    fn owner(&self) -> ModuleId;
    fn width(&self) -> u32;
    fn set_width(&mut self, width: u32);
    fn vcd_id(&self) -> &str;
    /// Whether the upcoming commit changes observable state:
    /// `(Xq ≠ Xd) ∨ (¬Xd ∧ Q ≠ D)`.
    fn pos_edge_changed(&self) -> bool;
    /// Positive-edge commit: Q ← D, Xq ← Xd.
    fn commit(&mut self);
    /// Rollback before re-evaluation: D ← Q, Xd ← Xq.
    fn restore_replica(&mut self);
    /// Restore declaration-time state in both stages.
    fn reset_to_instance_state(&mut self);
    /// Force both stages to X; returns whether the replica was concrete
    /// (which counts as an observable change).
    fn reset_to_x(&mut self) -> bool;
    /// Replica (Q) as a VCD string; X takes precedence.
    fn format_q(&self) -> String;
    /// Source (D) as a VCD string; X takes precedence.
    fn format_d(&self) -> String;
    /// All-X string at this register's width.
    fn format_x(&self) -> String;
    fn tracing(&self) -> bool;
    fn set_tracing(&mut self, enabled: bool);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: SignalValue> RegSlot for RegState<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> ModuleId {
        self.owner
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn set_width(&mut self, width: u32) {
        self.width = width;
    }

    fn vcd_id(&self) -> &str {
        &self.vcd_id
    }

    fn pos_edge_changed(&self) -> bool {
        self.replica_x != self.source_x || (!self.source_x && self.replica != self.source)
    }

    fn commit(&mut self) {
        self.replica = self.source;
        self.replica_x = self.source_x;
    }

    fn restore_replica(&mut self) {
        self.source = self.replica;
        self.source_x = self.replica_x;
    }

    fn reset_to_instance_state(&mut self) {
        self.source = self.init_value;
        self.replica = self.init_value;
        self.source_x = self.init_x;
        self.replica_x = self.init_x;
    }

    fn reset_to_x(&mut self) -> bool {
        let changed = !self.replica_x;
        self.source_x = true;
        self.replica_x = true;
        changed
    }

    fn format_q(&self) -> String {
        if self.replica_x {
            undefined(self.width)
        } else {
            self.format(&self.replica)
        }
    }

    fn format_d(&self) -> String {
        if self.source_x {
            undefined(self.width)
        } else {
            self.format(&self.source)
        }
    }

    fn format_x(&self) -> String {
        undefined(self.width)
    }

    fn tracing(&self) -> bool {
        self.tracing
    }

    fn set_tracing(&mut self, enabled: bool) {
        self.tracing = enabled;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
