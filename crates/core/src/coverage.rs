//! Code coverage for executed firmware.
//!
//! [`Instrumented`] wraps any [`Core`] and feeds every successfully executed
//! instruction into a [`Coverage`] recorder. It satisfies the same `Core`
//! contract as the wrapped core, so the machine does not know whether
//! instrumentation is present.
//!
//! Coverage describes a session: it survives core resets and is only
//! cleared by [`Coverage::clear`].

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::cpu::{Core, Executed};
use crate::error::Fault;
use crate::memory::{ByteMemory, Multiplexer};
use crate::pins::PinMap;

/// Per-instruction execution counts keyed by byte address.
#[derive(Debug, Default, Clone)]
pub struct Coverage {
    /// start address → (size in bytes, hit count)
    hits: BTreeMap<usize, (usize, u64)>,
    pub total_instructions: u64,
    pub total_cycles: u64,
}

impl Coverage {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, executed: &Executed) {
        let size = executed.words as usize * 2;
        let entry = self.hits.entry(executed.addr).or_insert((size, 0));
        entry.0 = entry.0.max(size);
        entry.1 += 1;
        self.total_instructions += 1;
        self.total_cycles += executed.cycles as u64;
    }

    /// True if `addr` lies inside any executed instruction.
    pub fn is_covered(&self, addr: usize) -> bool {
        self.hits
            .range(..=addr)
            .next_back()
            .map_or(false, |(&start, &(size, _))| addr < start + size)
    }

    /// Times the instruction starting at `addr` was executed.
    pub fn hits(&self, addr: usize) -> u64 {
        self.hits.get(&addr).map_or(0, |&(_, n)| n)
    }

    pub fn unique_addresses(&self) -> usize {
        self.hits.len()
    }

    /// The `n` most executed instruction addresses, hottest first.
    pub fn top_hits(&self, n: usize) -> Vec<(usize, u64)> {
        let mut v: Vec<_> = self.hits.iter().map(|(&addr, &(_, cnt))| (addr, cnt)).collect();
        v.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        v.truncate(n);
        v
    }

    /// Executed code merged into contiguous `[start, end)` byte ranges.
    pub fn covered_ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for (&start, &(size, _)) in &self.hits {
            let end = start + size;
            match ranges.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => ranges.push((start, end)),
            }
        }
        ranges
    }

    /// Number of code bytes covered by at least one executed instruction.
    pub fn covered_bytes(&self) -> usize {
        self.covered_ranges().iter().map(|(s, e)| e - s).sum()
    }

    pub fn clear(&mut self) {
        self.hits.clear();
        self.total_instructions = 0;
        self.total_cycles = 0;
    }

    /// Human-readable summary.
    pub fn report(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "=== Coverage Report ===");
        let _ = writeln!(s, "Instructions: {}", self.total_instructions);
        let _ = writeln!(s, "Cycles: {}", self.total_cycles);
        let _ = writeln!(s, "Unique addresses: {}", self.unique_addresses());
        let _ = writeln!(s, "Covered bytes: {}", self.covered_bytes());

        let ranges = self.covered_ranges();
        if !ranges.is_empty() {
            let _ = writeln!(s, "\n--- Covered Ranges ---");
            for (start, end) in ranges {
                let _ = writeln!(s, "0x{:04X}–0x{:04X}  {:>6} bytes", start, end - 1, end - start);
            }
        }

        let top = self.top_hits(20);
        if !top.is_empty() {
            let _ = writeln!(s, "\n--- Top 20 Hotspots ---");
            let _ = writeln!(s, "{:>8}  {:>8}  {:>7}", "Addr", "Hits", "%");
            for (addr, cnt) in top {
                let pct = if self.total_instructions > 0 {
                    cnt as f64 / self.total_instructions as f64 * 100.0
                } else {
                    0.0
                };
                let _ = writeln!(s, "0x{:04X}  {:>8}  {:>6.2}%", addr, cnt, pct);
            }
        }
        s
    }
}

/// A [`Core`] that records every executed instruction.
pub struct Instrumented<C: Core> {
    inner: C,
    coverage: Coverage,
}

impl<C: Core> Instrumented<C> {
    pub fn new(inner: C) -> Self {
        Instrumented { inner, coverage: Coverage::new() }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    pub fn coverage_mut(&mut self) -> &mut Coverage {
        &mut self.coverage
    }
}

impl<C: Core> Core for Instrumented<C> {
    fn reset(&mut self) -> Result<(), Fault> {
        self.inner.reset()
    }

    fn step(&mut self) -> Result<Executed, Fault> {
        let executed = self.inner.step()?;
        self.coverage.record(&executed);
        Ok(executed)
    }

    fn pins(&self) -> &PinMap {
        self.inner.pins()
    }

    fn code(&self) -> &ByteMemory {
        self.inner.code()
    }

    fn code_mut(&mut self) -> &mut ByteMemory {
        self.inner.code_mut()
    }

    fn data(&self) -> &Multiplexer {
        self.inner.data()
    }

    fn data_mut(&mut self) -> &mut Multiplexer {
        self.inner.data_mut()
    }

    fn pc(&self) -> u32 {
        self.inner.pc()
    }

    fn set_pc(&mut self, pc: u32) {
        self.inner.set_pc(pc)
    }

    fn cycles(&self) -> u64 {
        self.inner.cycles()
    }

    fn set_cycles(&mut self, cycles: u64) {
        self.inner.set_cycles(cycles)
    }
}
