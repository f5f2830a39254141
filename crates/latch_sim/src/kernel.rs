//! The simulation kernel: hierarchy owner, scheduler, and two-phase clock
//! loop.
//!
//! [`SimKernel`] is the root of a design. It owns the module tree, every
//! wire and register slot, the run queue, the changed-signal sets, and the
//! optional VCD writer — there is no process-wide state, so independent
//! kernels in one process never interfere.
//!
//! Each clock proceeds in two phases. The positive edge commits every
//! register's D stage into its Q stage, scheduling the owning modules of
//! those that changed. The fixed-point loop then drains the run queue:
//! evaluated modules write wires and register D stages, wire changes
//! schedule their sensitized modules, and the loop repeats until the design
//! quiesces (or a watchdog fires). The negative edge then latches every
//! changed wire's start-of-clock snapshot and emits trace output.
//!
//! Re-evaluating a module within one clock first rolls its registers' D
//! stages back to Q, so a second evaluation sees the same register state as
//! the first — this is what makes the fixed-point iteration safe.

use std::collections::BTreeSet;
use std::io::{self, Write};

use latch_common::{index_suffix, SignalValue};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::arena::Arena;
use crate::error::SimError;
use crate::module::{Module, ModuleId, ModuleNode};
use crate::register::{Reg, RegId, RegSlot, RegState};
use crate::signal::{AssignEffect, Wire, WireId, WireKind, WireSlot, WireState};
use crate::trace::TraceTable;
use crate::vcd::VcdWriter;
use crate::SimConfig;

/// How a simulation run ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum SimStatus {
    /// Clean exit requested by the design.
    Normal,
    /// The configured clock-cycle limit was reached.
    ClockLimit,
    /// Too many consecutive clocks with no scheduled activity.
    IdleLimit,
    /// The fixed-point loop exceeded its iteration limit within one clock.
    IterationLimit,
    /// A user hook returned an error.
    RuntimeError,
}

impl SimStatus {
    /// The process-style exit code for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            SimStatus::Normal => 0,
            SimStatus::ClockLimit => -1,
            SimStatus::IdleLimit => -2,
            SimStatus::IterationLimit => -3,
            SimStatus::RuntimeError => -4,
        }
    }
}

/// The result of a completed simulation run.
#[derive(Clone, Debug)]
pub struct SimReport {
    /// How the run ended.
    pub status: SimStatus,
    /// Diagnostic message accompanying a non-normal exit.
    pub message: Option<String>,
    /// Number of clocks executed by this run.
    pub clocks: u32,
    /// Number of clocks executed across all runs of this kernel.
    pub total_clocks: u32,
}

impl SimReport {
    /// The process-style exit code for this run.
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// The result of a single clock step.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StepResult {
    /// Simulation can continue.
    Continued,
    /// An exit condition is set; further steps do nothing.
    Done,
}

enum DumpKind {
    Current,
    AllX,
}

/// The simulation root: owns the design and drives the clock loop.
pub struct SimKernel {
    modules: Arena<ModuleId, ModuleNode>,
    wires: Arena<WireId, Box<dyn WireSlot>>,
    registers: Arena<RegId, Box<dyn RegSlot>>,
    /// Modules scheduled for (re-)evaluation within the current clock.
    run_queue: BTreeSet<ModuleId>,
    /// Wires differing from their start-of-clock state.
    changed_wires: BTreeSet<WireId>,
    /// Registers whose last positive edge changed observable state.
    changed_registers: BTreeSet<RegId>,
    clock: u32,
    idle_cycles: u32,
    cycle_limit: Option<u32>,
    iteration_limit: Option<u32>,
    idle_limit: Option<u32>,
    exit: Option<(SimStatus, Option<String>)>,
    writer: Option<VcdWriter>,
    had_stop_event: bool,
    trace: TraceTable,
    trace_sink: Box<dyn Write>,
    vcd_ids: u32,
    started: bool,
    run_start_clock: u32,
    total_clocks: u32,
}

impl SimKernel {
    /// Creates a kernel with a root module of the given name.
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut modules = Arena::new();
        modules.alloc(ModuleNode::new(root_name, None));
        Self {
            modules,
            wires: Arena::new(),
            registers: Arena::new(),
            run_queue: BTreeSet::new(),
            changed_wires: BTreeSet::new(),
            changed_registers: BTreeSet::new(),
            clock: 0,
            idle_cycles: 0,
            cycle_limit: None,
            iteration_limit: None,
            idle_limit: None,
            exit: None,
            writer: None,
            had_stop_event: false,
            trace: TraceTable::new(),
            trace_sink: Box::new(io::stdout()),
            vcd_ids: 0,
            started: false,
            run_start_clock: 0,
            total_clocks: 0,
        }
    }

    /// Returns the root module's ID.
    pub fn root(&self) -> ModuleId {
        ModuleId::from_raw(0)
    }

    /// Returns the current clock number.
    pub fn clock(&self) -> u32 {
        self.clock
    }

    // ---- hierarchy construction ----

    fn check_module(&self, m: ModuleId) -> Result<(), SimError> {
        if self.modules.contains(m) {
            Ok(())
        } else {
            Err(SimError::UnknownModule(m.as_raw()))
        }
    }

    /// Adds a child module under `parent`.
    pub fn add_module(&mut self, parent: ModuleId, name: &str) -> Result<ModuleId, SimError> {
        self.check_module(parent)?;
        let id = self.modules.alloc(ModuleNode::new(name, Some(parent)));
        self.modules.get_mut(parent).children.push(id);
        Ok(id)
    }

    /// Binds the behavior evaluated for `module`.
    pub fn bind<M: Module>(&mut self, module: ModuleId, behavior: M) -> Result<(), SimError> {
        self.check_module(module)?;
        if self.modules.get(module).behavior.is_some() {
            return Err(SimError::AlreadyBound {
                name: self.instance_name(module),
            });
        }
        self.modules.get_mut(module).behavior = Some(Box::new(behavior));
        Ok(())
    }

    /// Returns a module's parent, or `None` for the root.
    pub fn parent(&self, m: ModuleId) -> Option<ModuleId> {
        self.modules.get(m).parent
    }

    /// Returns a module's children in declaration order.
    pub fn children(&self, m: ModuleId) -> &[ModuleId] {
        &self.modules.get(m).children
    }

    /// Returns a module's hierarchical instance name, path segments joined
    /// by `.` from the root.
    pub fn instance_name(&self, m: ModuleId) -> String {
        let node = self.modules.get(m);
        match node.parent {
            None => node.name.clone(),
            Some(p) => format!("{}.{}", self.instance_name(p), node.name),
        }
    }

    /// Returns a wire's hierarchical instance name.
    pub fn wire_name(&self, w: WireId) -> String {
        let slot = self.wires.get(w);
        format!("{}.{}", self.instance_name(slot.owner()), slot.name())
    }

    /// Returns the declared kind of a wire.
    pub fn wire_kind(&self, w: WireId) -> WireKind {
        self.wires.get(w).kind()
    }

    /// Returns a register's hierarchical instance name.
    pub fn register_name(&self, r: RegId) -> String {
        let slot = self.registers.get(r);
        format!("{}.{}", self.instance_name(slot.owner()), slot.name())
    }

    // ---- signal declaration ----

    fn next_vcd_id(&mut self) -> String {
        let id = format!("@{:x}", self.vcd_ids);
        self.vcd_ids += 1;
        id
    }

    fn declare_wire<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        kind: WireKind,
        init: Option<T>,
    ) -> Result<Wire<T>, SimError> {
        self.check_module(module)?;
        let sensitized = match kind {
            WireKind::Input | WireKind::Internal => Some(module),
            WireKind::Quiet => None,
            WireKind::Output => match self.modules.get(module).parent {
                Some(parent) => Some(parent),
                None => {
                    return Err(SimError::OutputOnRoot { name: name.into() });
                }
            },
        };
        let had_init = init.is_some();
        let vcd_id = self.next_vcd_id();
        let id = self
            .wires
            .alloc(Box::new(WireState::new(name, kind, module, sensitized, vcd_id, init)));
        self.modules.get_mut(module).wires.push(id);
        // An initialized wire makes its value visible in the first clock.
        if had_init {
            if let Some(m) = sensitized {
                self.run_queue.insert(m);
            }
        }
        Ok(Wire::new(id))
    }

    /// Declares an input port on `module`, starting X.
    pub fn input<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
    ) -> Result<Wire<T>, SimError> {
        self.declare_wire(module, name, WireKind::Input, None)
    }

    /// Declares an input port with an initial value.
    pub fn input_init<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        init: T,
    ) -> Result<Wire<T>, SimError> {
        self.declare_wire(module, name, WireKind::Input, Some(init))
    }

    /// Declares an internal wire on `module`, starting X.
    pub fn wire<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
    ) -> Result<Wire<T>, SimError> {
        self.declare_wire(module, name, WireKind::Internal, None)
    }

    /// Declares an internal wire with an initial value.
    pub fn wire_init<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        init: T,
    ) -> Result<Wire<T>, SimError> {
        self.declare_wire(module, name, WireKind::Internal, Some(init))
    }

    /// Declares a quiet wire: visible in the VCD, never re-triggers.
    pub fn quiet_wire<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
    ) -> Result<Wire<T>, SimError> {
        self.declare_wire(module, name, WireKind::Quiet, None)
    }

    /// Declares a quiet wire with an initial value.
    pub fn quiet_wire_init<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        init: T,
    ) -> Result<Wire<T>, SimError> {
        self.declare_wire(module, name, WireKind::Quiet, Some(init))
    }

    /// Declares an output port on `module`, sensitizing its parent.
    /// Fails on the root module.
    pub fn output<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
    ) -> Result<Wire<T>, SimError> {
        self.declare_wire(module, name, WireKind::Output, None)
    }

    /// Declares an output port with an initial value.
    pub fn output_init<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        init: T,
    ) -> Result<Wire<T>, SimError> {
        self.declare_wire(module, name, WireKind::Output, Some(init))
    }

    /// Declares a register on `module`, starting X in both stages.
    pub fn register<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
    ) -> Result<Reg<T>, SimError> {
        self.declare_register(module, name, None)
    }

    /// Declares a register with an initial value in both stages.
    pub fn register_init<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        init: T,
    ) -> Result<Reg<T>, SimError> {
        self.declare_register(module, name, Some(init))
    }

    fn declare_register<T: SignalValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        init: Option<T>,
    ) -> Result<Reg<T>, SimError> {
        self.check_module(module)?;
        let vcd_id = self.next_vcd_id();
        let id = self
            .registers
            .alloc(Box::new(RegState::new(name, module, vcd_id, init)));
        self.modules.get_mut(module).registers.push(id);
        Ok(Reg::new(id))
    }

    // ---- typed state access ----

    fn wire_state<T: SignalValue>(&self, w: Wire<T>) -> &WireState<T> {
        match self.wires.get(w.id()).as_any().downcast_ref() {
            Some(state) => state,
            None => unreachable!("typed wire handle does not match its slot"),
        }
    }

    fn wire_state_mut<T: SignalValue>(&mut self, w: Wire<T>) -> &mut WireState<T> {
        match self.wires.get_mut(w.id()).as_any_mut().downcast_mut() {
            Some(state) => state,
            None => unreachable!("typed wire handle does not match its slot"),
        }
    }

    fn reg_state<T: SignalValue>(&self, r: Reg<T>) -> &RegState<T> {
        match self.registers.get(r.id()).as_any().downcast_ref() {
            Some(state) => state,
            None => unreachable!("typed register handle does not match its slot"),
        }
    }

    fn reg_state_mut<T: SignalValue>(&mut self, r: Reg<T>) -> &mut RegState<T> {
        match self.registers.get_mut(r.id()).as_any_mut().downcast_mut() {
            Some(state) => state,
            None => unreachable!("typed register handle does not match its slot"),
        }
    }

    // ---- signal observation and testbench-level driving ----

    /// Returns a wire's current value. The X flag is tracked separately;
    /// use [`wire_is_x`](Self::wire_is_x) to interpret the result.
    pub fn value<T: SignalValue>(&self, w: Wire<T>) -> T {
        self.wire_state(w).value
    }

    /// Returns whether a wire is currently X.
    pub fn wire_is_x<T: SignalValue>(&self, w: Wire<T>) -> bool {
        self.wire_state(w).is_x
    }

    /// Returns whether a wire was X at the start of the current clock.
    pub fn wire_was_x<T: SignalValue>(&self, w: Wire<T>) -> bool {
        self.wire_state(w).start_x
    }

    /// Returns a register's replica (Q) value, the observable state.
    pub fn q<T: SignalValue>(&self, r: Reg<T>) -> T {
        self.reg_state(r).replica
    }

    /// Returns whether a register's replica (Q) is X.
    pub fn q_is_x<T: SignalValue>(&self, r: Reg<T>) -> bool {
        self.reg_state(r).replica_x
    }

    /// Returns whether a register's source (D) is X, i.e. whether the next
    /// positive edge will make the register X.
    pub fn d_will_be_x<T: SignalValue>(&self, r: Reg<T>) -> bool {
        self.reg_state(r).source_x
    }

    fn apply_wire_effect(&mut self, id: WireId, effect: AssignEffect, sens: Option<ModuleId>) {
        if effect.in_changed_set {
            self.changed_wires.insert(id);
        } else {
            self.changed_wires.remove(&id);
        }
        if effect.trigger {
            if let Some(m) = sens {
                self.run_queue.insert(m);
            }
        }
    }

    /// Assigns a concrete value to a wire, clearing its X state and
    /// scheduling the sensitized module if the value changed.
    pub fn drive<T: SignalValue>(&mut self, w: Wire<T>, v: T) {
        let (effect, sens) = {
            let state = self.wire_state_mut(w);
            (state.assign(v), state.sensitized)
        };
        self.apply_wire_effect(w.id(), effect, sens);
    }

    /// Assigns the X marker to a wire. A ¬X→X transition counts as a
    /// change for the sensitized module.
    pub fn drive_x<T: SignalValue>(&mut self, w: Wire<T>) {
        let (effect, sens) = {
            let state = self.wire_state_mut(w);
            (state.assign_x(), state.sensitized)
        };
        self.apply_wire_effect(w.id(), effect, sens);
    }

    /// Forces both stages of a register to X. A concrete replica counts
    /// as a change: the owning module is scheduled and the register joins
    /// the changed set.
    pub fn reset_register_to_x<T: SignalValue>(&mut self, r: Reg<T>) {
        let changed = self.registers.get_mut(r.id()).reset_to_x();
        if changed {
            let owner = self.registers.get(r.id()).owner();
            self.run_queue.insert(owner);
            self.changed_registers.insert(r.id());
        }
    }

    // ---- widths, formatters, tracing ----

    /// Returns a wire's bit width.
    pub fn wire_width(&self, w: WireId) -> u32 {
        self.wires.get(w).width()
    }

    /// Overrides a wire's bit width.
    pub fn set_wire_width<T: SignalValue>(&mut self, w: Wire<T>, width: u32) {
        self.wires.get_mut(w.id()).set_width(width);
    }

    /// Returns a register's bit width.
    pub fn reg_width(&self, r: RegId) -> u32 {
        self.registers.get(r).width()
    }

    /// Overrides a register's bit width.
    pub fn set_reg_width<T: SignalValue>(&mut self, r: Reg<T>, width: u32) {
        self.registers.get_mut(r.id()).set_width(width);
    }

    /// Installs a custom VCD value formatter on a wire.
    pub fn set_wire_formatter<T: SignalValue>(
        &mut self,
        w: Wire<T>,
        formatter: impl Fn(&T, u32) -> String + 'static,
    ) {
        self.wire_state_mut(w).formatter = Some(Box::new(formatter));
    }

    /// Installs a custom VCD value formatter on a register.
    pub fn set_reg_formatter<T: SignalValue>(
        &mut self,
        r: Reg<T>,
        formatter: impl Fn(&T, u32) -> String + 'static,
    ) {
        self.reg_state_mut(r).formatter = Some(Box::new(formatter));
    }

    /// Enables or disables the per-clock transition trace on a register.
    pub fn trace_register<T: SignalValue>(&mut self, r: Reg<T>, enabled: bool) {
        self.registers.get_mut(r.id()).set_tracing(enabled);
        if enabled {
            let name = self.register_name(r.id());
            let width = self.registers.get(r.id()).width();
            self.trace.enroll(&name, width);
        }
    }

    /// Redirects trace-table output (stdout by default).
    pub fn set_trace_sink(&mut self, sink: Box<dyn Write>) {
        self.trace_sink = sink;
    }

    // ---- configuration ----

    /// Sets the maximum number of clocks per run.
    pub fn set_cycle_limit(&mut self, limit: Option<u32>) {
        self.cycle_limit = limit;
    }

    /// Sets the maximum number of fixed-point iterations per clock.
    pub fn set_iteration_limit(&mut self, limit: Option<u32>) {
        self.iteration_limit = limit;
    }

    /// Sets the maximum number of consecutive idle clocks.
    pub fn set_idle_limit(&mut self, limit: Option<u32>) {
        self.idle_limit = limit;
    }

    /// Attaches a VCD writer.
    pub fn set_vcd_writer(&mut self, writer: VcdWriter) {
        self.writer = Some(writer);
    }

    /// Returns the attached VCD writer, if any.
    pub fn vcd_writer_mut(&mut self) -> Option<&mut VcdWriter> {
        self.writer.as_mut()
    }

    /// Applies an embedder-supplied configuration: watchdog limits and the
    /// VCD output window.
    pub fn configure(&mut self, config: &SimConfig) -> Result<(), SimError> {
        if let (Some(start), Some(stop)) = (config.vcd_start_clock, config.vcd_stop_clock) {
            if start >= stop {
                return Err(SimError::VcdWindow { start, stop });
            }
        }
        self.cycle_limit = config.cycle_limit;
        self.iteration_limit = config.iteration_limit;
        self.idle_limit = config.idle_limit;
        if let Some(path) = &config.vcd_path {
            let mut writer = VcdWriter::create(path)?;
            if let Some(frequency) = config.vcd_frequency {
                writer.set_operating_point(frequency, config.vcd_timescale.unwrap_or_default());
            }
            writer.set_start_clock(config.vcd_start_clock);
            writer.set_stop_clock(config.vcd_stop_clock);
            self.writer = Some(writer);
        }
        Ok(())
    }

    /// Requests a clean exit at the end of the current clock.
    pub fn end_simulation(&mut self, status: SimStatus, message: Option<&str>) {
        self.exit = Some((status, message.map(String::from)));
    }

    /// Returns the diagnostic message of the last non-normal exit, if any.
    pub fn error_string(&self) -> Option<&str> {
        self.exit.as_ref().and_then(|(_, m)| m.as_deref())
    }

    /// Resets every wire and register to its declaration-time state
    /// without triggering any module.
    pub fn reset_to_instance_state(&mut self) {
        for slot in self.wires.values_mut() {
            slot.reset_to_instance_state();
        }
        for slot in self.registers.values_mut() {
            slot.reset_to_instance_state();
        }
        self.changed_wires.clear();
        self.changed_registers.clear();
        self.run_queue.clear();
    }

    // ---- the clock loop ----

    /// Pre-order walk of the module tree, children in declaration order.
    fn module_order(&self) -> Vec<ModuleId> {
        let mut order = Vec::with_capacity(self.modules.len());
        let mut stack = vec![self.root()];
        while let Some(m) = stack.pop() {
            order.push(m);
            for child in self.modules.get(m).children.iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    fn emit_definitions(&self, m: ModuleId, writer: &mut VcdWriter, is_root: bool) {
        let node = self.modules.get(m);
        writer.emit_scope(&node.name);
        if is_root {
            writer.emit_clock_var();
        }
        for wid in &node.wires {
            let slot = self.wires.get(*wid);
            writer.emit_var("wire", slot.width(), slot.vcd_id(), slot.name());
        }
        for rid in &node.registers {
            let slot = self.registers.get(*rid);
            let label = format!("{}{}", slot.name(), index_suffix(slot.width()));
            writer.emit_var("reg", slot.width(), slot.vcd_id(), &label);
        }
        for child in &node.children {
            self.emit_definitions(*child, writer, false);
        }
        writer.emit_upscope();
    }

    fn dump_all(&self, writer: &mut VcdWriter, kind: DumpKind) {
        for m in self.module_order() {
            let node = self.modules.get(m);
            for wid in &node.wires {
                let slot = self.wires.get(*wid);
                let value = match kind {
                    DumpKind::Current => slot.format_current(),
                    DumpKind::AllX => slot.format_x(),
                };
                writer.emit_change(&value, slot.width(), slot.vcd_id());
            }
            for rid in &node.registers {
                let slot = self.registers.get(*rid);
                let value = match kind {
                    DumpKind::Current => slot.format_q(),
                    DumpKind::AllX => slot.format_x(),
                };
                writer.emit_change(&value, slot.width(), slot.vcd_id());
            }
        }
    }

    /// Header, hierarchy, initial `$dumpvars`, and the leading `$dumpoff`
    /// when the start clock is in the future.
    fn vcd_prologue(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        writer.emit_header();
        self.emit_definitions(self.root(), &mut writer, true);
        writer.emit_end_definitions();

        writer.pos_edge_tick(0);
        writer.emit_dumpvars();
        writer.pos_edge_clock();
        self.dump_all(&mut writer, DumpKind::Current);
        writer.emit_dumpend();
        writer.set_emitting(true);

        if writer.start_clock().is_some_and(|s| s > 0) {
            writer.emit_dumpoff();
            writer.x_clock();
            self.dump_all(&mut writer, DumpKind::AllX);
            writer.emit_dumpend();
            writer.set_emitting(false);
        } else {
            writer.neg_edge_tick(0);
            writer.neg_edge_clock();
        }
        self.writer = Some(writer);
    }

    fn start(&mut self, emit_prologue: bool) {
        if emit_prologue {
            self.vcd_prologue();
        }
        // Kick-start: every module is evaluated at least once in the first
        // clock of the run.
        let all: Vec<ModuleId> = self.modules.iter().map(|(id, _)| id).collect();
        self.run_queue.extend(all);
        self.idle_cycles = 0;
        self.started = true;
    }

    fn call_root_hook(&mut self, pre: bool, clock: u32) {
        let root = self.root();
        let Some(mut behavior) = self.modules.get_mut(root).behavior.take() else {
            return;
        };
        let result = {
            let mut cx = EvalContext {
                kernel: &mut *self,
                current: root,
                snapshot: None,
            };
            if pre {
                behavior.pre_clock(&mut cx, clock)
            } else {
                behavior.post_clock(&mut cx, clock)
            }
        };
        self.modules.get_mut(root).behavior = Some(behavior);
        if let Err(e) = result {
            self.exit = Some((
                SimStatus::RuntimeError,
                Some(format!("simulation error: {e}")),
            ));
        }
    }

    /// Executes one full clock: positive edge, fixed-point propagation,
    /// negative edge, hooks, and watchdog checks.
    pub fn step_clock(&mut self) -> StepResult {
        if self.exit.is_some() {
            return StepResult::Done;
        }
        if !self.started {
            self.start(true);
        }

        self.clock += 1;
        let clock = self.clock;
        debug!("clock {clock}: begin");

        // Mark all modules eval-not-called and drain latched
        // evaluate-next-clock requests.
        let ids: Vec<ModuleId> = self.modules.iter().map(|(id, _)| id).collect();
        for id in &ids {
            let node = self.modules.get_mut(*id);
            node.eval_called = false;
            if node.needs_eval {
                node.needs_eval = false;
                self.run_queue.insert(*id);
            }
        }

        self.call_root_hook(true, clock);

        // Rising edge in the VCD, with start/stop window transitions.
        if let Some(mut writer) = self.writer.take() {
            if writer.stop_clock() == Some(clock) {
                debug!("clock {clock}: VCD stop");
                writer.pos_edge_tick(clock);
                writer.emit_dumpoff();
                writer.x_clock();
                self.dump_all(&mut writer, DumpKind::AllX);
                writer.emit_dumpend();
                writer.set_emitting(false);
                self.had_stop_event = true;
            }
            if writer.start_clock() == Some(clock) {
                debug!("clock {clock}: VCD start");
                writer.set_emitting(true);
                writer.pos_edge_tick(clock);
                writer.emit_dumpon();
                writer.pos_edge_clock();
                self.dump_all(&mut writer, DumpKind::Current);
                writer.emit_dumpend();
            } else {
                writer.pos_edge_tick(clock);
                writer.pos_edge_clock();
            }
            self.writer = Some(writer);
        }

        // Positive edge: commit D into Q for every register, walking the
        // tree depth-first.
        for m in self.module_order() {
            let regs = self.modules.get(m).registers.clone();
            for rid in regs {
                if self.registers.get(rid).pos_edge_changed() {
                    let owner = self.registers.get(rid).owner();
                    self.run_queue.insert(owner);
                    self.changed_registers.insert(rid);
                    if self.registers.get(rid).tracing() {
                        let name = self.register_name(rid);
                        let slot = self.registers.get(rid);
                        self.trace.record(&name, slot.format_q(), slot.format_d());
                    }
                }
                self.registers.get_mut(rid).commit();
            }
        }

        if let Some(mut writer) = self.writer.take() {
            if writer.is_emitting() {
                for rid in &self.changed_registers {
                    let slot = self.registers.get(*rid);
                    writer.emit_change(&slot.format_q(), slot.width(), slot.vcd_id());
                }
            }
            self.writer = Some(writer);
        }
        self.changed_registers.clear();

        // Fixed-point propagation until the design quiesces.
        let mut aborted = false;
        let mut iteration_count = 0u32;
        if self.run_queue.is_empty() {
            self.idle_cycles += 1;
            if let Some(limit) = self.idle_limit {
                if self.idle_cycles >= limit {
                    let message = format!("idle cycle limit exceeded at clock cycle {clock}");
                    warn!("{message}");
                    self.exit = Some((SimStatus::IdleLimit, Some(message)));
                    aborted = true;
                }
            }
        }
        while !aborted && !self.run_queue.is_empty() {
            self.idle_cycles = 0;
            iteration_count += 1;
            if let Some(limit) = self.iteration_limit {
                if iteration_count > limit {
                    let message = format!("iteration limit exceeded at clock cycle {clock}");
                    warn!("{message}");
                    self.exit = Some((SimStatus::IterationLimit, Some(message)));
                    break;
                }
            }

            let snapshot = std::mem::take(&mut self.run_queue);
            for m in &snapshot {
                // A re-evaluation within this clock must forget the
                // speculative D writes of the earlier one.
                if self.modules.get(*m).eval_called {
                    let regs = self.modules.get(*m).registers.clone();
                    for rid in regs {
                        self.registers.get_mut(rid).restore_replica();
                    }
                }
                self.modules.get_mut(*m).eval_called = true;

                let Some(mut behavior) = self.modules.get_mut(*m).behavior.take() else {
                    continue;
                };
                let result = {
                    let mut cx = EvalContext {
                        kernel: &mut *self,
                        current: *m,
                        snapshot: Some(&snapshot),
                    };
                    behavior.evaluate(&mut cx)
                };
                self.modules.get_mut(*m).behavior = Some(behavior);
                if let Err(e) = result {
                    let message = format!("simulation error: {e}");
                    warn!("{message}");
                    self.exit = Some((SimStatus::RuntimeError, Some(message)));
                    aborted = true;
                    break;
                }
            }
        }

        // Negative edge: changed wires reach the VCD, then latch their
        // start-of-clock snapshots.
        if let Some(mut writer) = self.writer.take() {
            if writer.is_emitting() {
                for wid in &self.changed_wires {
                    let slot = self.wires.get(*wid);
                    writer.emit_change(&slot.format_current(), slot.width(), slot.vcd_id());
                }
                writer.neg_edge_tick(clock);
                writer.neg_edge_clock();
            }
            self.writer = Some(writer);
        }
        let changed: Vec<WireId> = self.changed_wires.iter().copied().collect();
        for wid in changed {
            self.wires.get_mut(wid).negedge_commit();
        }
        self.changed_wires.clear();

        // Per-clock transition table.
        let mut sink = std::mem::replace(&mut self.trace_sink, Box::new(io::sink()));
        if let Err(e) = self.trace.dump(clock, &mut *sink) {
            warn!("trace table write failed: {e}");
        }
        self.trace_sink = sink;

        self.call_root_hook(false, clock);

        if self.exit.is_none() {
            if let Some(limit) = self.cycle_limit {
                if clock >= limit {
                    self.exit = Some((
                        SimStatus::ClockLimit,
                        Some(format!("clock cycle limit = {clock}")),
                    ));
                }
            }
        }

        if self.exit.is_some() {
            StepResult::Done
        } else {
            StepResult::Continued
        }
    }

    fn finish(&mut self) -> SimReport {
        // A stop clock that fired leaves the trace parked at X; restate
        // that at the final tick.
        if self.had_stop_event {
            if let Some(mut writer) = self.writer.take() {
                writer.set_emitting(true);
                writer.pos_edge_tick(self.clock);
                writer.x_clock();
                self.dump_all(&mut writer, DumpKind::AllX);
                self.writer = Some(writer);
            }
        }
        if let Some(writer) = &mut self.writer {
            writer.flush();
        }
        self.started = false;

        let (status, message) = match self.exit.clone() {
            Some((status, message)) => (status, message),
            None => (SimStatus::Normal, None),
        };
        let clocks = self.clock - self.run_start_clock;
        self.total_clocks += clocks;
        SimReport {
            status,
            message,
            clocks,
            total_clocks: self.total_clocks,
        }
    }

    /// Runs the simulation from clock 0 until an exit condition fires.
    pub fn run(&mut self) -> SimReport {
        self.clock = 0;
        self.run_start_clock = 0;
        self.exit = None;
        self.had_stop_event = false;
        self.start(true);
        while let StepResult::Continued = self.step_clock() {}
        self.finish()
    }

    /// Continues a previous run without restarting the clock sequence or
    /// re-emitting the VCD prologue.
    pub fn resume(&mut self) -> SimReport {
        self.run_start_clock = self.clock;
        self.exit = None;
        self.had_stop_event = false;
        self.start(false);
        while let StepResult::Continued = self.step_clock() {}
        self.finish()
    }
}

/// The view of the simulation handed to user hooks.
///
/// All signal access inside `evaluate`, `pre_clock`, and `post_clock` goes
/// through this context: wire reads and writes, non-blocking register
/// writes, scheduling requests, and exit requests.
pub struct EvalContext<'a> {
    kernel: &'a mut SimKernel,
    current: ModuleId,
    /// The snapshot being drained, when called from the fixed-point loop.
    snapshot: Option<&'a BTreeSet<ModuleId>>,
}

impl EvalContext<'_> {
    /// Returns the module this hook is running for.
    pub fn current_module(&self) -> ModuleId {
        self.current
    }

    /// Returns the current clock number.
    pub fn clock(&self) -> u32 {
        self.kernel.clock()
    }

    /// Reads a wire's current value.
    pub fn get<T: SignalValue>(&self, w: Wire<T>) -> T {
        self.kernel.value(w)
    }

    /// Returns whether a wire is currently X.
    pub fn is_x<T: SignalValue>(&self, w: Wire<T>) -> bool {
        self.kernel.wire_is_x(w)
    }

    /// Returns whether a wire was X at the start of this clock.
    pub fn was_x<T: SignalValue>(&self, w: Wire<T>) -> bool {
        self.kernel.wire_was_x(w)
    }

    /// Assigns a concrete value to a wire.
    pub fn set<T: SignalValue>(&mut self, w: Wire<T>, v: T) {
        self.kernel.drive(w, v);
    }

    /// Assigns the X marker to a wire.
    pub fn set_x<T: SignalValue>(&mut self, w: Wire<T>) {
        self.kernel.drive_x(w);
    }

    /// Chained assignment from another wire, copying value and X state.
    pub fn copy_wire<T: SignalValue>(&mut self, dst: Wire<T>, src: Wire<T>) {
        if self.kernel.wire_is_x(src) {
            self.kernel.drive_x(dst);
        } else {
            let v = self.kernel.value(src);
            self.kernel.drive(dst, v);
        }
    }

    /// Read-modify-write on a wire, routed through the same change and
    /// trigger computation as a plain assignment. Returns the previous
    /// value.
    pub fn modify<T: SignalValue>(&mut self, w: Wire<T>, f: impl FnOnce(T) -> T) -> T {
        let old = self.kernel.value(w);
        self.kernel.drive(w, f(old));
        old
    }

    /// Reads a register's replica (Q), the observable state.
    pub fn q<T: SignalValue>(&self, r: Reg<T>) -> T {
        self.kernel.q(r)
    }

    /// Returns whether a register's replica (Q) is X.
    pub fn q_is_x<T: SignalValue>(&self, r: Reg<T>) -> bool {
        self.kernel.q_is_x(r)
    }

    /// Returns whether a register's source (D) is X.
    pub fn d_will_be_x<T: SignalValue>(&self, r: Reg<T>) -> bool {
        self.kernel.d_will_be_x(r)
    }

    /// Non-blocking write: D ← v. Takes effect on the next positive edge.
    pub fn nb<T: SignalValue>(&mut self, r: Reg<T>, v: T) {
        let state = self.kernel.reg_state_mut(r);
        state.source = v;
        state.source_x = false;
    }

    /// Non-blocking write of the X marker: the next positive edge makes
    /// the register X.
    pub fn nb_x<T: SignalValue>(&mut self, r: Reg<T>) {
        self.kernel.reg_state_mut(r).source_x = true;
    }

    /// Non-blocking write from another register's replica (Q).
    pub fn nb_from_q<T: SignalValue>(&mut self, dst: Reg<T>, src: Reg<T>) {
        let (v, x) = {
            let state = self.kernel.reg_state(src);
            (state.replica, state.replica_x)
        };
        let state = self.kernel.reg_state_mut(dst);
        state.source = v;
        state.source_x = x;
    }

    /// Non-blocking write from another register's source (D), preserving
    /// an in-flight write.
    pub fn nb_from_d<T: SignalValue>(&mut self, dst: Reg<T>, src: Reg<T>) {
        let (v, x) = {
            let state = self.kernel.reg_state(src);
            (state.source, state.source_x)
        };
        let state = self.kernel.reg_state_mut(dst);
        state.source = v;
        state.source_x = x;
    }

    /// Forces both stages of a register to X (see
    /// [`SimKernel::reset_register_to_x`]).
    pub fn reset_reg_to_x<T: SignalValue>(&mut self, r: Reg<T>) {
        self.kernel.reset_register_to_x(r);
    }

    /// Requests evaluation of a module within this clock. Ignored when the
    /// module is part of the snapshot currently being drained.
    pub fn force_evaluate(&mut self, m: ModuleId) {
        if self.snapshot.is_some_and(|s| s.contains(&m)) {
            return;
        }
        self.kernel.run_queue.insert(m);
    }

    /// Requests evaluation of a module at the start of the next clock.
    pub fn force_evaluate_next_clock(&mut self, m: ModuleId) {
        self.kernel.modules.get_mut(m).needs_eval = true;
    }

    /// Requests a clean exit at the end of the current clock.
    pub fn end_simulation(&mut self, status: SimStatus, message: Option<&str>) {
        self.kernel.end_simulation(status, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Test behavior wrapping a closure.
    struct Eval(Box<dyn FnMut(&mut EvalContext<'_>) -> Result<(), EvalError>>);

    fn eval(f: impl FnMut(&mut EvalContext<'_>) -> Result<(), EvalError> + 'static) -> Eval {
        Eval(Box::new(f))
    }

    impl Module for Eval {
        fn evaluate(&mut self, cx: &mut EvalContext<'_>) -> Result<(), EvalError> {
            (self.0)(cx)
        }
    }

    /// Behavior that does nothing.
    struct Inert;

    impl Module for Inert {
        fn evaluate(&mut self, _cx: &mut EvalContext<'_>) -> Result<(), EvalError> {
            Ok(())
        }
    }

    #[test]
    fn root_exists_with_name() {
        let kernel = SimKernel::new("tb");
        assert_eq!(kernel.instance_name(kernel.root()), "tb");
        assert_eq!(kernel.clock(), 0);
    }

    #[test]
    fn hierarchy_names_join_with_dots() {
        let mut kernel = SimKernel::new("tb");
        let dut = kernel.add_module(kernel.root(), "dut").unwrap();
        let sub = kernel.add_module(dut, "alu").unwrap();
        assert_eq!(kernel.instance_name(sub), "tb.dut.alu");
        assert_eq!(kernel.parent(sub), Some(dut));
        assert_eq!(kernel.parent(kernel.root()), None);
        assert_eq!(kernel.children(kernel.root()), &[dut]);
        assert_eq!(kernel.children(dut), &[sub]);
    }

    #[test]
    fn add_module_rejects_unknown_parent() {
        let mut kernel = SimKernel::new("tb");
        let bogus = ModuleId::from_raw(99);
        assert!(matches!(
            kernel.add_module(bogus, "x"),
            Err(SimError::UnknownModule(99))
        ));
    }

    #[test]
    fn output_on_root_is_rejected() {
        let mut kernel = SimKernel::new("tb");
        let root = kernel.root();
        let result = kernel.output::<bool>(root, "dout");
        assert!(matches!(result, Err(SimError::OutputOnRoot { .. })));
    }

    #[test]
    fn output_on_child_sensitizes_parent() {
        let mut kernel = SimKernel::new("tb");
        let dut = kernel.add_module(kernel.root(), "dut").unwrap();
        let out: Wire<bool> = kernel.output(dut, "dout").unwrap();
        assert_eq!(kernel.wire_kind(out.id()), WireKind::Output);
        assert_eq!(
            kernel.wires.get(out.id()).sensitized(),
            Some(kernel.root())
        );
    }

    #[test]
    fn quiet_wire_has_no_sensitized_module() {
        let mut kernel = SimKernel::new("tb");
        let w: Wire<u8> = kernel.quiet_wire(kernel.root(), "probe").unwrap();
        assert_eq!(kernel.wire_kind(w.id()), WireKind::Quiet);
        assert_eq!(kernel.wires.get(w.id()).sensitized(), None);
    }

    #[test]
    fn double_bind_is_rejected() {
        let mut kernel = SimKernel::new("tb");
        kernel.bind(kernel.root(), Inert).unwrap();
        assert!(matches!(
            kernel.bind(kernel.root(), Inert),
            Err(SimError::AlreadyBound { .. })
        ));
    }

    #[test]
    fn signal_names_are_hierarchical() {
        let mut kernel = SimKernel::new("tb");
        let dut = kernel.add_module(kernel.root(), "dut").unwrap();
        let w: Wire<u8> = kernel.wire(dut, "bus").unwrap();
        let r: Reg<u8> = kernel.register(dut, "count").unwrap();
        assert_eq!(kernel.wire_name(w.id()), "tb.dut.bus");
        assert_eq!(kernel.register_name(r.id()), "tb.dut.count");
    }

    #[test]
    fn vcd_ids_are_hex_counter() {
        let mut kernel = SimKernel::new("tb");
        let root = kernel.root();
        for i in 0..17 {
            let _: Wire<bool> = kernel.wire(root, &format!("w{i}")).unwrap();
        }
        let r: Reg<bool> = kernel.register(root, "r").unwrap();
        assert_eq!(kernel.wires.get(WireId::from_raw(0)).vcd_id(), "@0");
        assert_eq!(kernel.wires.get(WireId::from_raw(16)).vcd_id(), "@10");
        assert_eq!(kernel.registers.get(r.id()).vcd_id(), "@11");
    }

    #[test]
    fn width_defaults_and_overrides() {
        let mut kernel = SimKernel::new("tb");
        let root = kernel.root();
        let w: Wire<u32> = kernel.wire(root, "w").unwrap();
        assert_eq!(kernel.wire_width(w.id()), 32);
        kernel.set_wire_width(w, 8);
        assert_eq!(kernel.wire_width(w.id()), 8);
        let r: Reg<bool> = kernel.register(root, "r").unwrap();
        assert_eq!(kernel.reg_width(r.id()), 1);
        kernel.set_reg_width(r, 2);
        assert_eq!(kernel.reg_width(r.id()), 2);
    }

    #[test]
    fn kick_start_evaluates_every_module_once() {
        let mut kernel = SimKernel::new("tb");
        let dut = kernel.add_module(kernel.root(), "dut").unwrap();
        let root_count = Rc::new(Cell::new(0));
        let dut_count = Rc::new(Cell::new(0));
        let rc = root_count.clone();
        kernel
            .bind(kernel.root(), eval(move |_cx| {
                rc.set(rc.get() + 1);
                Ok(())
            }))
            .unwrap();
        let dc = dut_count.clone();
        kernel
            .bind(dut, eval(move |_cx| {
                dc.set(dc.get() + 1);
                Ok(())
            }))
            .unwrap();
        kernel.set_cycle_limit(Some(1));
        let report = kernel.run();
        assert_eq!(report.status, SimStatus::ClockLimit);
        assert_eq!(root_count.get(), 1);
        assert_eq!(dut_count.get(), 1);
    }

    #[test]
    fn idle_limit_fires_after_quiescence() {
        let mut kernel = SimKernel::new("tb");
        kernel.bind(kernel.root(), Inert).unwrap();
        kernel.set_idle_limit(Some(1));
        kernel.set_cycle_limit(Some(100));
        let report = kernel.run();
        assert_eq!(report.status, SimStatus::IdleLimit);
        // Clock 1 is busy from the kick-start; clock 2 is the idle one.
        assert_eq!(report.clocks, 2);
        assert!(report.message.unwrap().contains("idle cycle limit"));
    }

    #[test]
    fn iteration_limit_zero_fails_immediately() {
        let mut kernel = SimKernel::new("tb");
        kernel.bind(kernel.root(), Inert).unwrap();
        kernel.set_iteration_limit(Some(0));
        kernel.set_cycle_limit(Some(10));
        let report = kernel.run();
        assert_eq!(report.status, SimStatus::IterationLimit);
        assert_eq!(report.exit_code(), -3);
    }

    #[test]
    fn feedback_loop_hits_iteration_limit() {
        let mut kernel = SimKernel::new("tb");
        let a: Wire<u8> = kernel.wire_init(kernel.root(), "a", 0).unwrap();
        let b: Wire<u8> = kernel.wire_init(kernel.root(), "b", 0).unwrap();
        kernel
            .bind(kernel.root(), eval(move |cx| {
                // a and b chase each other and never settle.
                let bv = cx.get(b);
                cx.set(a, bv.wrapping_add(1));
                let av = cx.get(a);
                cx.set(b, av);
                Ok(())
            }))
            .unwrap();
        kernel.set_iteration_limit(Some(8));
        kernel.set_cycle_limit(Some(4));
        let report = kernel.run();
        assert_eq!(report.status, SimStatus::IterationLimit);
    }

    #[test]
    fn eval_error_terminates_with_runtime_error() {
        let mut kernel = SimKernel::new("tb");
        kernel
            .bind(kernel.root(), eval(|_cx| Err(EvalError::new("bad state"))))
            .unwrap();
        kernel.set_cycle_limit(Some(10));
        let report = kernel.run();
        assert_eq!(report.status, SimStatus::RuntimeError);
        assert_eq!(report.exit_code(), -4);
        assert!(report.message.unwrap().contains("bad state"));
        assert!(kernel.error_string().unwrap().contains("bad state"));
    }

    #[test]
    fn end_simulation_exits_cleanly() {
        let mut kernel = SimKernel::new("tb");
        kernel
            .bind(kernel.root(), eval(|cx| {
                if cx.clock() == 3 {
                    cx.end_simulation(SimStatus::Normal, None);
                }
                cx.force_evaluate_next_clock(cx.current_module());
                Ok(())
            }))
            .unwrap();
        kernel.set_cycle_limit(Some(100));
        let report = kernel.run();
        assert_eq!(report.status, SimStatus::Normal);
        assert_eq!(report.clocks, 3);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn clock_limit_reports() {
        let mut kernel = SimKernel::new("tb");
        kernel.bind(kernel.root(), Inert).unwrap();
        kernel.set_cycle_limit(Some(5));
        let report = kernel.run();
        assert_eq!(report.status, SimStatus::ClockLimit);
        assert_eq!(report.clocks, 5);
        assert_eq!(report.exit_code(), -1);
    }

    #[test]
    fn force_evaluate_next_clock_prevents_idling() {
        let mut kernel = SimKernel::new("tb");
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        kernel
            .bind(kernel.root(), eval(move |cx| {
                c.set(c.get() + 1);
                cx.force_evaluate_next_clock(cx.current_module());
                Ok(())
            }))
            .unwrap();
        kernel.set_idle_limit(Some(1));
        kernel.set_cycle_limit(Some(4));
        let report = kernel.run();
        assert_eq!(report.status, SimStatus::ClockLimit);
        assert_eq!(count.get(), 4);
    }

    #[test]
    fn wire_write_triggers_sensitized_module_next_iteration() {
        let mut kernel = SimKernel::new("tb");
        let dut = kernel.add_module(kernel.root(), "dut").unwrap();
        let din: Wire<u8> = kernel.input(dut, "din").unwrap();
        let dout: Wire<u8> = kernel.output(dut, "dout").unwrap();
        kernel
            .bind(dut, eval(move |cx| {
                if !cx.is_x(din) {
                    let v = cx.get(din);
                    cx.set(dout, v.wrapping_mul(2));
                }
                Ok(())
            }))
            .unwrap();
        kernel
            .bind(kernel.root(), eval(move |cx| {
                cx.set(din, 21);
                Ok(())
            }))
            .unwrap();
        kernel.set_cycle_limit(Some(1));
        kernel.run();
        assert_eq!(kernel.value(dout), 42);
        assert!(!kernel.wire_is_x(dout));
    }

    #[test]
    fn registers_commit_before_evaluation() {
        let mut kernel = SimKernel::new("tb");
        let r: Reg<u8> = kernel.register_init(kernel.root(), "r", 0).unwrap();
        let seen = Rc::new(Cell::new(0u8));
        let s = seen.clone();
        kernel
            .bind(kernel.root(), eval(move |cx| {
                s.set(cx.q(r));
                cx.nb(r, cx.q(r).wrapping_add(1));
                Ok(())
            }))
            .unwrap();
        kernel.set_cycle_limit(Some(3));
        kernel.run();
        // Clock 3's evaluation observed the value committed at its edge.
        assert_eq!(seen.get(), 2);
        assert_eq!(kernel.q(r), 2);
    }

    #[test]
    fn rollback_restores_d_on_reevaluation() {
        let mut kernel = SimKernel::new("tb");
        let r: Reg<u8> = kernel.register_init(kernel.root(), "r", 0).unwrap();
        let w: Wire<u8> = kernel.wire(kernel.root(), "w").unwrap();
        kernel
            .bind(kernel.root(), eval(move |cx| {
                // First evaluation writes D = w+1 speculatively from an X
                // wire; the wire write then re-triggers this module, which
                // must see D rolled back to Q before writing D = 6.
                let base = if cx.is_x(w) { 0 } else { cx.get(w) };
                cx.nb(r, base.wrapping_add(1));
                cx.set(w, 5);
                Ok(())
            }))
            .unwrap();
        kernel.set_cycle_limit(Some(2));
        kernel.run();
        assert_eq!(kernel.q(r), 6);
    }

    #[test]
    fn reset_to_instance_state_restores_everything() {
        let mut kernel = SimKernel::new("tb");
        let w: Wire<u8> = kernel.wire_init(kernel.root(), "w", 3).unwrap();
        let r: Reg<u8> = kernel.register_init(kernel.root(), "r", 7).unwrap();
        kernel
            .bind(kernel.root(), eval(move |cx| {
                cx.set(w, 100);
                cx.nb(r, 200);
                Ok(())
            }))
            .unwrap();
        kernel.set_cycle_limit(Some(2));
        kernel.run();
        assert_eq!(kernel.value(w), 100);
        assert_eq!(kernel.q(r), 200);
        kernel.reset_to_instance_state();
        assert_eq!(kernel.value(w), 3);
        assert_eq!(kernel.q(r), 7);
        assert!(!kernel.wire_is_x(w));
        assert!(!kernel.q_is_x(r));
    }

    #[test]
    fn reset_register_to_x_counts_as_change() {
        let mut kernel = SimKernel::new("tb");
        let r: Reg<u8> = kernel.register_init(kernel.root(), "r", 1).unwrap();
        kernel.reset_register_to_x(r);
        assert!(kernel.q_is_x(r));
        assert!(kernel.d_will_be_x(r));
        assert!(kernel.changed_registers.contains(&r.id()));
        assert!(kernel.run_queue.contains(&kernel.root()));
    }

    #[test]
    fn two_quiet_clocks_produce_no_changes() {
        let mut kernel = SimKernel::new("tb");
        let w: Wire<u8> = kernel.wire_init(kernel.root(), "w", 1).unwrap();
        let r: Reg<u8> = kernel.register_init(kernel.root(), "r", 1).unwrap();
        kernel
            .bind(kernel.root(), eval(move |cx| {
                // Constant drive: same wire value, same register D.
                cx.set(w, 1);
                cx.nb(r, 1);
                Ok(())
            }))
            .unwrap();
        kernel.set_cycle_limit(Some(2));
        kernel.run();
        assert!(kernel.changed_wires.is_empty());
        assert!(kernel.changed_registers.is_empty());
    }

    #[test]
    fn modify_goes_through_assignment_path() {
        let mut kernel = SimKernel::new("tb");
        let w: Wire<u8> = kernel.wire_init(kernel.root(), "w", 10).unwrap();
        let evals = Rc::new(Cell::new(0));
        let e = evals.clone();
        kernel
            .bind(kernel.root(), eval(move |cx| {
                e.set(e.get() + 1);
                if e.get() == 1 {
                    let old = cx.modify(w, |v| v + 1);
                    assert_eq!(old, 10);
                }
                Ok(())
            }))
            .unwrap();
        kernel.set_cycle_limit(Some(1));
        kernel.run();
        // The modify re-triggered the module within the clock.
        assert_eq!(evals.get(), 2);
        assert_eq!(kernel.value(w), 11);
    }

    #[test]
    fn copy_wire_propagates_x_state() {
        let mut kernel = SimKernel::new("tb");
        let a: Wire<u8> = kernel.wire(kernel.root(), "a").unwrap();
        let b: Wire<u8> = kernel.wire_init(kernel.root(), "b", 5).unwrap();
        kernel
            .bind(kernel.root(), eval(move |cx| {
                cx.copy_wire(b, a);
                Ok(())
            }))
            .unwrap();
        kernel.set_cycle_limit(Some(1));
        kernel.run();
        assert!(kernel.wire_is_x(b));
    }

    #[test]
    fn resume_continues_clock_sequence() {
        let mut kernel = SimKernel::new("tb");
        kernel.bind(kernel.root(), Inert).unwrap();
        kernel.set_cycle_limit(Some(3));
        let first = kernel.run();
        assert_eq!(first.clocks, 3);
        kernel.set_cycle_limit(Some(5));
        let second = kernel.resume();
        assert_eq!(second.status, SimStatus::ClockLimit);
        assert_eq!(second.clocks, 2);
        assert_eq!(second.total_clocks, 5);
        assert_eq!(kernel.clock(), 5);
    }

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(SimStatus::Normal.exit_code(), 0);
        assert_eq!(SimStatus::ClockLimit.exit_code(), -1);
        assert_eq!(SimStatus::IdleLimit.exit_code(), -2);
        assert_eq!(SimStatus::IterationLimit.exit_code(), -3);
        assert_eq!(SimStatus::RuntimeError.exit_code(), -4);
    }

    #[test]
    fn configure_rejects_bad_vcd_window() {
        let mut kernel = SimKernel::new("tb");
        let config = SimConfig {
            vcd_start_clock: Some(7),
            vcd_stop_clock: Some(3),
            ..SimConfig::default()
        };
        assert!(matches!(
            kernel.configure(&config),
            Err(SimError::VcdWindow { start: 7, stop: 3 })
        ));
    }

    #[test]
    fn configure_applies_limits() {
        let mut kernel = SimKernel::new("tb");
        let config = SimConfig {
            cycle_limit: Some(4),
            iteration_limit: Some(10),
            idle_limit: Some(2),
            ..SimConfig::default()
        };
        kernel.configure(&config).unwrap();
        kernel.bind(kernel.root(), Inert).unwrap();
        let report = kernel.run();
        assert_eq!(report.status, SimStatus::IdleLimit);
    }

    #[test]
    fn independent_kernels_do_not_interfere() {
        let mut a = SimKernel::new("a");
        let mut b = SimKernel::new("b");
        let wa: Wire<u8> = a.wire_init(a.root(), "w", 1).unwrap();
        let wb: Wire<u8> = b.wire_init(b.root(), "w", 2).unwrap();
        a.drive(wa, 10);
        assert_eq!(a.value(wa), 10);
        assert_eq!(b.value(wb), 2);
        assert!(b.changed_wires.is_empty());
    }
}
