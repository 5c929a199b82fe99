//! Fault and error taxonomy.
//!
//! [`Fault`] covers everything the simulated hardware can get wrong: a memory
//! access that lands in no mapped region, two peripherals wired to the same
//! pin, or a query outside a peripheral's bounds. Faults are never recovered
//! in place; they propagate to whoever called `clock()` or the constructor.
//!
//! [`Error`] is the host-side error for loading firmware and save states.

use thiserror::Error;

/// Kind of memory access that caused an [`Fault::Address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    /// Instruction fetch from the code space
    Fetch,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
            Access::Fetch => f.write_str("fetch"),
        }
    }
}

/// Simulation fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// Access to an address covered by no configured region.
    #[error("address fault: {access} at 0x{addr:04X}")]
    Address { addr: usize, access: Access },
    /// Two components claim the same wire.
    #[error("pin conflict: wire {wire} claimed by both {first} and {second}")]
    PinConflict {
        wire: String,
        first: &'static str,
        second: &'static str,
    },
    /// Index or coordinate outside a component's bounds.
    #[error("bounds fault: {what} index {index} out of range (limit {limit})")]
    Bounds {
        what: &'static str,
        index: usize,
        limit: usize,
    },
    /// A sub-region overlaps one that is already mapped.
    #[error("region at 0x{base:04X} (size {size}) overlaps an existing region")]
    RegionOverlap { base: usize, size: usize },
    /// A pin alias that the pin table does not know.
    #[error("unknown pin alias {0:?}")]
    UnknownPin(String),
}

impl Fault {
    pub(crate) fn read(addr: usize) -> Self {
        Fault::Address { addr, access: Access::Read }
    }

    pub(crate) fn write(addr: usize) -> Self {
        Fault::Address { addr, access: Access::Write }
    }
}

/// Host-side error for firmware loading and save states.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fault(#[from] Fault),
    #[error("hex line {line}: {reason}")]
    Hex { line: usize, reason: String },
    #[error("save state: {0}")]
    State(String),
    #[error("save state encoding: {0}")]
    Encode(#[from] bincode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
