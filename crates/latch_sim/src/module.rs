//! Module hierarchy nodes and the user behavior trait.
//!
//! A design is a tree of named modules. Each module owns the wires and
//! registers declared inside it (by ID) and optionally a boxed [`Module`]
//! behavior supplying the combinational `evaluate` hook. The tree itself
//! lives in the kernel's module arena; nodes refer to their parent and
//! children by [`ModuleId`].

use serde::{Deserialize, Serialize};

use crate::arena::ArenaId;
use crate::error::EvalError;
use crate::kernel::EvalContext;
use crate::register::RegId;
use crate::signal::WireId;

/// Opaque ID of a module in a simulation's hierarchy.
///
/// The root module of every kernel has ID 0. IDs order by declaration,
/// which is the scheduler's deterministic tie-break order.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub struct ModuleId(u32);

impl ModuleId {
    /// Creates a `ModuleId` from a raw index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl ArenaId for ModuleId {
    fn from_raw(index: u32) -> Self {
        Self(index)
    }

    fn as_raw(self) -> u32 {
        self.0
    }
}

/// The combinational behavior of a module.
///
/// `evaluate` is called whenever a wire the module is sensitized to
/// changes, whenever one of its registers commits a new value on a
/// positive edge, and at least once in the first clock of a run (the
/// kick-start). All reads and writes go through the passed
/// [`EvalContext`]; writes to wires may re-trigger this or other modules
/// within the same clock until the design quiesces.
///
/// `pre_clock` and `post_clock` are invoked on the root module's behavior
/// only, at the start and end of each clock.
pub trait Module: 'static {
    /// Recomputes this module's combinational outputs and register inputs.
    fn evaluate(&mut self, cx: &mut EvalContext<'_>) -> Result<(), EvalError>;

    /// Called on the root behavior before the positive edge of each clock.
    fn pre_clock(&mut self, cx: &mut EvalContext<'_>, clock: u32) -> Result<(), EvalError> {
        let _ = (cx, clock);
        Ok(())
    }

    /// Called on the root behavior after the negative edge of each clock.
    fn post_clock(&mut self, cx: &mut EvalContext<'_>, clock: u32) -> Result<(), EvalError> {
        let _ = (cx, clock);
        Ok(())
    }
}

/// A node in the module tree.
///
/// Child collections are in declaration order; the scheduler and the VCD
/// definition pass walk them depth-first.
pub(crate) struct ModuleNode {
    pub(crate) name: String,
    pub(crate) parent: Option<ModuleId>,
    pub(crate) children: Vec<ModuleId>,
    pub(crate) wires: Vec<WireId>,
    pub(crate) registers: Vec<RegId>,
    pub(crate) behavior: Option<Box<dyn Module>>,
    /// Whether `evaluate` ran in the current clock; a second run in the
    /// same clock must first roll back this module's register D stages.
    pub(crate) eval_called: bool,
    /// Latched request to evaluate at the start of the next clock.
    pub(crate) needs_eval: bool,
}

impl ModuleNode {
    pub(crate) fn new(name: impl Into<String>, parent: Option<ModuleId>) -> Self {
        Self {
            name: name.into(),
            parent,
            children: Vec::new(),
            wires: Vec::new(),
            registers: Vec::new(),
            behavior: None,
            eval_called: false,
            needs_eval: false,
        }
    }
}
