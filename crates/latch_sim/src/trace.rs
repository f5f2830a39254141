//! Optional per-register transition tables.
//!
//! When tracing is enabled on a register, every positive edge that changes
//! its observable state appends to a [`TraceTable`] record. After the
//! negative edge of any clock with at least one changed record, the table
//! renders as a `>>>`-prefixed block and is cleared for the next clock.

use std::collections::BTreeMap;
use std::io::{self, Write};

/// Kind tag of a traced variable, as printed in the table's `T` column.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TraceKind {
    /// No transition recorded yet this clock.
    Unknown,
    /// A register transition.
    Register,
}

impl TraceKind {
    fn letter(self) -> char {
        match self {
            TraceKind::Unknown => 'U',
            TraceKind::Register => 'R',
        }
    }
}

/// One traced variable's activity within the current clock.
#[derive(Clone, Debug)]
pub struct ValueChangeRecord {
    /// Variable kind tag.
    pub kind: TraceKind,
    /// Formatted value at the start of the clock.
    pub start: String,
    /// Formatted value at the end of the clock.
    pub end: String,
    /// Whether the value actually changed this clock.
    pub changed: bool,
    /// Number of writes that left the value unchanged (static).
    pub static_writes: u32,
    /// Number of transitions this clock.
    pub transitions: u32,
}

impl Default for ValueChangeRecord {
    fn default() -> Self {
        Self {
            kind: TraceKind::Unknown,
            start: String::new(),
            end: String::new(),
            changed: false,
            static_writes: 0,
            transitions: 0,
        }
    }
}

/// Per-clock table of traced register transitions.
///
/// Column widths grow monotonically as registers are enrolled, so the
/// layout is stable across clocks.
#[derive(Default)]
pub struct TraceTable {
    records: BTreeMap<String, ValueChangeRecord>,
    max_name_len: usize,
    max_width: usize,
}

impl TraceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enrolls a traced instance name and bit width for column sizing.
    pub fn enroll(&mut self, instance_name: &str, width: u32) {
        self.max_name_len = self.max_name_len.max(instance_name.len());
        self.max_width = self.max_width.max(width as usize);
    }

    /// Records a register transition. `start` is the replica value before
    /// the commit; `end` is the incoming source value. The start value is
    /// latched by the first transition of the clock only.
    pub fn record(&mut self, instance_name: &str, start: String, end: String) {
        let rec = self.records.entry(instance_name.to_string()).or_default();
        if rec.kind == TraceKind::Unknown {
            rec.kind = TraceKind::Register;
            rec.start = start;
        }
        rec.end = end;
        rec.changed = true;
        rec.transitions += 1;
    }

    /// Returns `true` if no records have been added this clock.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Renders the table for the given clock and clears it.
    ///
    /// Nothing is written when no record changed.
    pub fn dump(&mut self, clock: u32, out: &mut dyn Write) -> io::Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }

        if self.records.values().any(|r| r.changed) {
            let val_col = (self.max_width + 1).max(5);
            let divider = "-".repeat(self.max_name_len + 2 * val_col + 12);

            writeln!(out, ">>> {divider}")?;
            writeln!(out, ">>> Clock {clock}")?;
            writeln!(
                out,
                ">>> T {:<name$} NTR NST {:>val$} {:>val$}",
                "Name",
                "Start",
                "End",
                name = self.max_name_len,
                val = val_col,
            )?;
            writeln!(out, ">>> {divider}")?;
            for (name, rec) in &self.records {
                if !rec.changed {
                    continue;
                }
                writeln!(
                    out,
                    ">>> {} {:<name$} {:>3} {:>3} {:>val$} {:>val$}",
                    rec.kind.letter(),
                    name,
                    rec.transitions,
                    rec.static_writes,
                    rec.start,
                    rec.end,
                    name = self.max_name_len,
                    val = val_col,
                )?;
            }
            writeln!(out, ">>> {divider}")?;
        }

        self.records.clear();
        Ok(())
    }
}
