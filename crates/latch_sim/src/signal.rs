//! Wires: combinational signals with X-state tracking.
//!
//! A wire carries a current value *V*, the value it had at the start of the
//! clock *V₀*, its declaration-time value *Vᵢ*, and an X (unknown) flag for
//! each of the three. Assignment performs a two-axis test: changed relative
//! to the start of the clock (feeding the trace writer's changed-wires set)
//! versus changed relative to now (feeding the combinational scheduler).
//!
//! Typed access goes through the [`Wire`] handle; the scheduler and VCD
//! writer see only the type-erased [`WireSlot`] capability set.

use std::any::Any;
use std::marker::PhantomData;

use latch_common::{bitstring, undefined, SignalValue};
use serde::{Deserialize, Serialize};

use crate::arena::ArenaId;
use crate::module::ModuleId;

/// Opaque ID of a wire in a simulation.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub struct WireId(u32);

impl WireId {
    /// Creates a `WireId` from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl ArenaId for WireId {
    fn from_raw(index: u32) -> Self {
        Self(index)
    }

    fn as_raw(self) -> u32 {
        self.0
    }
}

/// Sensitization policy of a wire, fixed at declaration.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum WireKind {
    /// Input port: changes re-evaluate the owning module.
    Input,
    /// Internal wire: changes re-evaluate the owning module.
    Internal,
    /// Quiet wire: visible in the VCD, never re-triggers anything.
    Quiet,
    /// Output port: changes re-evaluate the owning module's parent.
    Output,
}

/// A typed handle to a wire.
///
/// Handles are plain copyable IDs; all operations on the wire go through
/// the kernel or an [`EvalContext`](crate::kernel::EvalContext).
pub struct Wire<T> {
    id: WireId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Wire<T> {
    pub(crate) fn new(id: WireId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped ID of this wire.
    pub fn id(self) -> WireId {
        self.id
    }
}

impl<T> Clone for Wire<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Wire<T> {}

impl<T> std::fmt::Debug for Wire<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Wire({})", self.id.as_raw())
    }
}

/// Outcome of a wire assignment: what the kernel must do with it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct AssignEffect {
    /// Whether the wire now differs from its start-of-clock state and so
    /// belongs in the changed-wires set (false removes it).
    pub(crate) in_changed_set: bool,
    /// Whether the sensitized module must be scheduled.
    pub(crate) trigger: bool,
}

/// Formatter override for a typed signal.
pub(crate) type Formatter<T> = Box<dyn Fn(&T, u32) -> String>;

/// The full state of a typed wire.
pub(crate) struct WireState<T: SignalValue> {
    pub(crate) name: String,
    pub(crate) kind: WireKind,
    pub(crate) owner: ModuleId,
    pub(crate) sensitized: Option<ModuleId>,
    pub(crate) vcd_id: String,
    pub(crate) width: u32,
    /// Current value V.
    pub(crate) value: T,
    /// Start-of-clock value V₀, committed at the negative edge.
    pub(crate) start_value: T,
    /// Declaration-time value Vᵢ.
    pub(crate) init_value: T,
    /// Current X flag.
    pub(crate) is_x: bool,
    /// Start-of-clock X flag X₀.
    pub(crate) start_x: bool,
    /// Declaration-time X flag Xᵢ.
    pub(crate) init_x: bool,
    pub(crate) formatter: Option<Formatter<T>>,
}

impl<T: SignalValue> WireState<T> {
    pub(crate) fn new(
        name: impl Into<String>,
        kind: WireKind,
        owner: ModuleId,
        sensitized: Option<ModuleId>,
        vcd_id: String,
        init: Option<T>,
    ) -> Self {
        let x = init.is_none();
        let seed = init.unwrap_or_default();
        Self {
            name: name.into(),
            kind,
            owner,
            sensitized,
            vcd_id,
            width: T::WIDTH,
            value: seed,
            start_value: seed,
            init_value: seed,
            is_x: x,
            start_x: x,
            init_x: x,
            formatter: None,
        }
    }

    /// Assigns a concrete value, reporting changed-set membership and
    /// whether the sensitized module must run.
    pub(crate) fn assign(&mut self, v: T) -> AssignEffect {
        let effect = AssignEffect {
            in_changed_set: self.start_x || v != self.start_value,
            trigger: self.is_x || v != self.value,
        };
        self.value = v;
        self.is_x = false;
        effect
    }

    /// Assigns the X marker. A ¬X→X transition counts as a change for the
    /// sensitized module.
    pub(crate) fn assign_x(&mut self) -> AssignEffect {
        let effect = AssignEffect {
            in_changed_set: !self.start_x,
            trigger: !self.is_x,
        };
        self.is_x = true;
        effect
    }

    fn format(&self, v: &T) -> String {
        match &self.formatter {
            Some(f) => f(v, self.width),
            None => bitstring(v.to_vcd_bits(), self.width),
        }
    }
}

/// The type-erased capability set of a wire, used by the scheduler and the
/// VCD writer.
pub(crate) trait WireSlot: Any {
    fn name(&self) -> &str;
    fn kind(&self) -> WireKind;
    fn owner(&self) -> ModuleId;
    fn sensitized(&self) -> Option<ModuleId>;
    fn width(&self) -> u32;
    fn set_width(&mut self, width: u32);
    fn vcd_id(&self) -> &str;
    /// Current value as a VCD string; X takes precedence over the value.
    fn format_current(&self) -> String;
    /// All-X string at this wire's width.
    fn format_x(&self) -> String;
    /// Negative-edge commit: V₀ ← V, X₀ ← X.
    fn negedge_commit(&mut self);
    /// Restore declaration-time state without triggering anything.
    fn reset_to_instance_state(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: SignalValue> WireSlot for WireState<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> WireKind {
        self.kind
    }

    fn owner(&self) -> ModuleId {
        self.owner
    }

    fn sensitized(&self) -> Option<ModuleId> {
        self.sensitized
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

    fn format_current(&self) -> String {
        if self.is_x {
            undefined(self.width)
        } else {
            self.format(&self.value)
        }
    }

    fn format_x(&self) -> String {
        undefined(self.width)
    }

    fn negedge_commit(&mut self) {
        self.start_value = self.value;
        self.start_x = self.is_x;
    }

    fn reset_to_instance_state(&mut self) {
        self.value = self.init_value;
        self.start_value = self.init_value;
        self.is_x = self.init_x;
        self.start_x = self.init_x;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
