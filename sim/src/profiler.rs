//! Section profiler for the advance loop.
//!
//! The canvas times every phase of a tick and every work advance function.
//! Sections nest: `begin_section`/`end_section` form a stack, so a phase
//! section and the work sections inside it are recorded independently.
//! Call counts are exact, which also makes the profiler a cheap way to
//! observe the scheduler from tests.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

/// Section every tick is wrapped in; shares of the other sections are
/// relative to it.
const TICK_SECTION: &str = "advance";

#[derive(Debug, Default)]
pub struct Profiler {
    sections: BTreeMap<&'static str, SectionStats>,
    open: Vec<(&'static str, Instant)>,
    ticks: u64,
}

/// Aggregated timings of one section.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SectionStats {
    pub calls: u64,
    pub total: Duration,
    pub fastest: Duration,
    pub slowest: Duration,
}

impl SectionStats {
    pub fn average(&self) -> Duration {
        match u32::try_from(self.calls) {
            Ok(0) => Duration::ZERO,
            Ok(calls) => self.total / calls,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.calls as f64),
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.fastest = if self.calls == 0 {
            elapsed
        } else {
            self.fastest.min(elapsed)
        };
        self.slowest = self.slowest.max(elapsed);
        self.total += elapsed;
        self.calls += 1;
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a section. Must be paired with [`end_section`](Self::end_section).
    pub fn begin_section(&mut self, name: &'static str) {
        self.open.push((name, Instant::now()));
    }

    /// Close the innermost open section.
    pub fn end_section(&mut self) {
        if let Some((name, started)) = self.open.pop() {
            self.sections.entry(name).or_default().record(started.elapsed());
        }
    }

    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn section(&self, name: &str) -> Option<&SectionStats> {
        self.sections.get(name)
    }

    /// Number of recorded calls of a section (0 if never entered).
    pub fn call_count(&self, name: &str) -> u64 {
        self.sections.get(name).map_or(0, |s| s.calls)
    }

    /// Table of all sections, most expensive first.
    pub fn summary(&self) -> String {
        let tick_total = self.section(TICK_SECTION).map_or(Duration::ZERO, |s| s.total);
        let mut rows: Vec<_> = self.sections.iter().collect();
        rows.sort_by(|a, b| b.1.total.cmp(&a.1.total));

        let mut out = String::new();
        let _ = writeln!(out, "{} ticks, {:.2?} in {TICK_SECTION}", self.ticks, tick_total);
        let _ = writeln!(
            out,
            "{:<20} {:>9} {:>11} {:>11} {:>11} {:>7}",
            "section", "calls", "average", "slowest", "total", "share"
        );
        for (name, stats) in rows {
            let share = if tick_total.is_zero() {
                0.0
            } else {
                100.0 * stats.total.as_secs_f64() / tick_total.as_secs_f64()
            };
            let _ = writeln!(
                out,
                "{:<20} {:>9} {:>11.2?} {:>11.2?} {:>11.2?} {:>6.1}%",
                name,
                stats.calls,
                stats.average(),
                stats.slowest,
                stats.total,
                share
            );
        }
        out
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
