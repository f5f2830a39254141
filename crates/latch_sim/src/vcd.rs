//! Value Change Dump (VCD) output.
//!
//! A VCD file is produced in four phases: the header, the signal hierarchy
//! (`$scope`/`$var`/`$upscope`), an initial `$dumpvars` at tick 0, and
//! per-clock change blocks. Each clock N occupies the tick range
//! `[N*T, N*T + T)` where T is the tick count per clock (minimum 2): the
//! rising edge lands at `N*T` and the falling edge at `N*T + T/2`.
//!
//! Dumping can be gated to a clock window. Before the start clock an
//! emission gate suppresses change lines while the timebase still advances;
//! the start clock opens with a `$dumpon` block restoring visible state, and
//! the stop clock closes with a `$dumpoff` block replacing every variable
//! with X.
//!
//! The writer degrades to a no-op if the underlying stream fails, so a lost
//! trace never takes the simulation down with it.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use latch_common::{Frequency, Timescale};

use crate::error::SimError;

/// Version string written into the `$version` header section.
pub const VCD_VERSION: &str = "latch vcd::Writer 1.0";

/// Default identifier of the implicit root clock variable.
const CLOCK_ID: &str = "*@";

/// Writes a Verilog-style VCD stream.
///
/// Generic over the output sink; the kernel uses the boxed default so a
/// file, a pipe, or an in-memory buffer all work.
pub struct VcdWriter<W: Write = Box<dyn Write>> {
    out: W,
    /// Cleared on the first write failure; every emission checks it.
    ok: bool,
    /// The change-emission gate driven by the start/stop clock window.
    emitting: bool,
    start_clock: Option<u32>,
    stop_clock: Option<u32>,
    ticks_per_clock: u64,
    timescale: Timescale,
    date: String,
}

impl VcdWriter {
    /// Creates a writer over a buffered file at `path`.
    ///
    /// Failure to create the file is a resource error; the simulation can
    /// proceed without tracing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let file = File::create(path)?;
        Ok(VcdWriter::new(
            Box::new(BufWriter::new(file)) as Box<dyn Write>
        ))
    }
}

impl<W: Write> VcdWriter<W> {
    /// Creates a writer over an arbitrary sink.
    pub fn new(out: W) -> Self {
        Self {
            out,
            ok: true,
            emitting: true,
            start_clock: None,
            stop_clock: None,
            ticks_per_clock: 2,
            timescale: Timescale::default(),
            date: "Simulation date".into(),
        }
    }

    /// Sets the clock at which change emission begins.
    pub fn set_start_clock(&mut self, clock: Option<u32>) {
        self.start_clock = clock;
    }

    /// Returns the configured start clock.
    pub fn start_clock(&self) -> Option<u32> {
        self.start_clock
    }

    /// Sets the clock at which change emission stops.
    pub fn set_stop_clock(&mut self, clock: Option<u32>) {
        self.stop_clock = clock;
    }

    /// Returns the configured stop clock.
    pub fn stop_clock(&self) -> Option<u32> {
        self.stop_clock
    }

    /// Sets the `$date` header text.
    pub fn set_date(&mut self, date: impl Into<String>) {
        self.date = date.into();
    }

    /// Derives the tick count per clock from a clock frequency and a
    /// timescale. The result is clamped to a minimum of 2 so every clock
    /// has distinct rising- and falling-edge ticks.
    pub fn set_operating_point(&mut self, frequency: Frequency, timescale: Timescale) {
        self.timescale = timescale;
        let ticks = 1.0 / (frequency.hz() * timescale.seconds_per_tick());
        self.ticks_per_clock = if ticks < 2.0 { 2 } else { ticks as u64 };
    }

    /// Returns the tick count per clock.
    pub fn ticks_per_clock(&self) -> u64 {
        self.ticks_per_clock
    }

    /// Returns whether change lines are currently being emitted.
    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    /// Opens or closes the change-emission gate.
    pub fn set_emitting(&mut self, enabled: bool) {
        self.emitting = enabled;
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if !self.ok {
            return;
        }
        let result = self
            .out
            .write_fmt(args)
            .and_then(|()| self.out.write_all(b"\n"));
        if result.is_err() {
            self.ok = false;
            log::warn!("VCD stream write failed; trace output disabled");
        }
    }

    /// Emits the `$date`, `$version`, and `$timescale` header sections.
    pub fn emit_header(&mut self) {
        let date = self.date.clone();
        self.line(format_args!("$date {date} $end"));
        self.line(format_args!("$version {VCD_VERSION} $end"));
        let ts = self.timescale;
        self.line(format_args!("$timescale {ts} $end"));
    }

    /// Emits a `$comment` block.
    pub fn emit_comment(&mut self, comment: &str) {
        self.line(format_args!("$comment\n{comment}\n$end"));
    }

    /// Opens a module scope.
    pub fn emit_scope(&mut self, name: &str) {
        self.line(format_args!("$scope module {name} $end"));
    }

    /// Closes the current scope.
    pub fn emit_upscope(&mut self) {
        self.line(format_args!("$upscope $end"));
    }

    /// Declares a variable. `kind` is `wire` or `reg`; `name` may carry an
    /// index suffix.
    pub fn emit_var(&mut self, kind: &str, width: u32, id: &str, name: &str) {
        self.line(format_args!("$var {kind} {width} {id} {name} $end"));
    }

    /// Declares the implicit one-bit root clock variable.
    pub fn emit_clock_var(&mut self) {
        self.line(format_args!("$var wire 1 {CLOCK_ID} clk $end"));
    }

    /// Emits `$enddefinitions`.
    pub fn emit_end_definitions(&mut self) {
        self.line(format_args!("$enddefinitions $end"));
    }

    /// Emits the `$dumpvars` keyword.
    pub fn emit_dumpvars(&mut self) {
        self.line(format_args!("$dumpvars"));
    }

    /// Emits the `$dumpon` keyword.
    pub fn emit_dumpon(&mut self) {
        self.line(format_args!("$dumpon"));
    }

    /// Emits the `$dumpoff` keyword.
    pub fn emit_dumpoff(&mut self) {
        self.line(format_args!("$dumpoff"));
    }

    /// Emits the `$end` line closing a dump block.
    pub fn emit_dumpend(&mut self) {
        self.line(format_args!("$end"));
    }

    /// Emits the rising-edge timestamp of the given clock.
    pub fn pos_edge_tick(&mut self, clock: u32) {
        if self.emitting {
            let tick = u64::from(clock) * self.ticks_per_clock;
            self.line(format_args!("#{tick}"));
        }
    }

    /// Emits the falling-edge timestamp of the given clock.
    pub fn neg_edge_tick(&mut self, clock: u32) {
        if self.emitting {
            let tick = u64::from(clock) * self.ticks_per_clock + self.ticks_per_clock / 2;
            self.line(format_args!("#{tick}"));
        }
    }

    /// Emits the clock variable going high.
    pub fn pos_edge_clock(&mut self) {
        if self.emitting {
            self.line(format_args!("1{CLOCK_ID}"));
        }
    }

    /// Emits the clock variable going low.
    pub fn neg_edge_clock(&mut self) {
        if self.emitting {
            self.line(format_args!("0{CLOCK_ID}"));
        }
    }

    /// Emits the clock variable going unknown.
    pub fn x_clock(&mut self) {
        if self.emitting {
            self.line(format_args!("x{CLOCK_ID}"));
        }
    }

    /// Emits a value change line. Multi-bit values are separated from the
    /// identifier by a space; single-bit values are glued to it.
    pub fn emit_change(&mut self, value: &str, width: u32, id: &str) {
        if self.emitting {
            let sep = if width > 1 { " " } else { "" };
            self.line(format_args!("{value}{sep}{id}"));
        }
    }

    /// Flushes the underlying sink.
    pub fn flush(&mut self) {
        if self.ok && self.out.flush().is_err() {
            self.ok = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latch_common::{TimeUnit, TimescaleValue};

    fn writer() -> VcdWriter<Vec<u8>> {
        VcdWriter::new(Vec::new())
    }

    fn output(w: VcdWriter<Vec<u8>>) -> String {
        String::from_utf8(w.out).unwrap()
    }

    #[test]
    fn header_sections() {
        let mut w = writer();
        w.emit_header();
        let out = output(w);
        assert!(out.contains("$date Simulation date $end"));
        assert!(out.contains("$version latch vcd::Writer 1.0 $end"));
        assert!(out.contains("$timescale 1 s $end"));
    }

    #[test]
    fn header_with_operating_point() {
        let mut w = writer();
        w.set_operating_point(
            Frequency::new(100e6),
            Timescale::new(TimescaleValue::T1, TimeUnit::Ns),
        );
        w.emit_header();
        assert_eq!(w.ticks_per_clock(), 10);
        assert!(output(w).contains("$timescale 1 ns $end"));
    }

    #[test]
    fn ticks_per_clock_minimum_is_two() {
        let mut w = writer();
        // 1 GHz at 1 ns per tick implies 1 tick per clock; clamped to 2.
        w.set_operating_point(
            Frequency::new(1e9),
            Timescale::new(TimescaleValue::T1, TimeUnit::Ns),
        );
        assert_eq!(w.ticks_per_clock(), 2);
    }

    #[test]
    fn custom_date() {
        let mut w = writer();
        w.set_date("Mon Jun  5 09:00:00 2023");
        w.emit_header();
        assert!(output(w).contains("$date Mon Jun  5 09:00:00 2023 $end"));
    }

    #[test]
    fn scope_and_var_lines() {
        let mut w = writer();
        w.emit_scope("tb");
        w.emit_clock_var();
        w.emit_var("wire", 8, "@0", "data [7:0]");
        w.emit_var("reg", 1, "@1", "q");
        w.emit_upscope();
        w.emit_end_definitions();
        let out = output(w);
        assert!(out.contains("$scope module tb $end"));
        assert!(out.contains("$var wire 1 *@ clk $end"));
        assert!(out.contains("$var wire 8 @0 data [7:0] $end"));
        assert!(out.contains("$var reg 1 @1 q $end"));
        assert!(out.contains("$upscope $end"));
        assert!(out.contains("$enddefinitions $end"));
    }

    #[test]
    fn tick_arithmetic() {
        let mut w = writer();
        w.pos_edge_tick(3);
        w.neg_edge_tick(3);
        let out = output(w);
        // Default T = 2: rising at 6, falling at 7.
        assert!(out.contains("#6\n"));
        assert!(out.contains("#7\n"));
    }

    #[test]
    fn clock_edge_lines() {
        let mut w = writer();
        w.pos_edge_clock();
        w.neg_edge_clock();
        w.x_clock();
        let out = output(w);
        assert!(out.contains("1*@"));
        assert!(out.contains("0*@"));
        assert!(out.contains("x*@"));
    }

    #[test]
    fn change_line_spacing() {
        let mut w = writer();
        w.emit_change("1", 1, "@2");
        w.emit_change("b1010", 4, "@3");
        let out = output(w);
        assert!(out.contains("1@2\n"));
        assert!(out.contains("b1010 @3\n"));
    }

    #[test]
    fn emission_gate_suppresses_changes_only() {
        let mut w = writer();
        w.set_emitting(false);
        w.pos_edge_tick(1);
        w.pos_edge_clock();
        w.emit_change("1", 1, "@0");
        // Structural lines still go through the gate closed.
        w.emit_dumpoff();
        let out = output(w);
        assert!(!out.contains('#'));
        assert!(!out.contains("1@0"));
        assert!(out.contains("$dumpoff"));
    }

    #[test]
    fn failed_sink_degrades_to_noop() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("broken pipe"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let mut w = VcdWriter::new(Broken);
        w.emit_header();
        assert!(!w.ok);
        // Subsequent calls are no-ops rather than repeated failures.
        w.emit_scope("tb");
        w.flush();
    }

    #[test]
    fn start_stop_clock_accessors() {
        let mut w = writer();
        w.set_start_clock(Some(3));
        w.set_stop_clock(Some(7));
        assert_eq!(w.start_clock(), Some(3));
        assert_eq!(w.stop_clock(), Some(7));
    }
}
