//! Wires: the shared electrical signal nodes between the core and peripherals.
//!
//! A [`Wire`] is a cheap-to-clone handle onto one signal node. Every clone
//! refers to the same node, so a port and a peripheral holding the same wire
//! see each other's drives without knowing about each other. Propagation is
//! combinational: a `drive` is visible to the very next `read`.
//!
//! A wire may be *tied* to a constant level to model a grounded or unused
//! pin. Driving a tied wire does nothing and reading it always returns the
//! constant.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Logic level carried by a wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
    /// Initial state of a wire nobody has driven yet
    Floating,
}

impl Level {
    pub fn from_bit(bit: bool) -> Self {
        if bit { Level::High } else { Level::Low }
    }

    #[inline]
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

struct Node {
    aliases: &'static [&'static str],
    tie: Option<Level>,
    level: Cell<Level>,
}

/// Handle to a shared signal node.
#[derive(Clone)]
pub struct Wire(Rc<Node>);

impl Wire {
    /// A drivable wire, initially floating.
    pub fn new(aliases: &'static [&'static str]) -> Self {
        Wire(Rc::new(Node { aliases, tie: None, level: Cell::new(Level::Floating) }))
    }

    /// A wire permanently held at `level`.
    pub fn tied(level: Level, aliases: &'static [&'static str]) -> Self {
        Wire(Rc::new(Node { aliases, tie: Some(level), level: Cell::new(level) }))
    }

    /// Anonymous wire tied to ground.
    pub fn low() -> Self {
        Self::tied(Level::Low, &[])
    }

    /// Anonymous wire tied to the supply rail.
    pub fn high() -> Self {
        Self::tied(Level::High, &[])
    }

    #[inline]
    pub fn read(&self) -> Level {
        self.0.level.get()
    }

    #[inline]
    pub fn is_high(&self) -> bool {
        self.read().is_high()
    }

    #[inline]
    pub fn drive(&self, level: Level) {
        if self.0.tie.is_none() {
            self.0.level.set(level);
        }
    }

    /// Return a drivable wire to the floating state.
    pub fn release(&self) {
        self.drive(Level::Floating);
    }

    pub fn is_tied(&self) -> bool {
        self.0.tie.is_some()
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        self.0.aliases
    }

    /// Primary name, or `"<anonymous>"`.
    pub fn name(&self) -> &'static str {
        self.0.aliases.first().copied().unwrap_or("<anonymous>")
    }

    /// True if both handles refer to the same node.
    pub fn same(a: &Wire, b: &Wire) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl std::fmt::Debug for Wire {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wire")
            .field("name", &self.name())
            .field("level", &self.read())
            .field("tied", &self.is_tied())
            .finish()
    }
}

/// How a peripheral uses a wire it attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Peripheral drives the wire
    Drive,
    /// Peripheral only reads the wire
    Observe,
}

/// One entry of a peripheral's declared wiring.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub wire: Wire,
    pub role: Role,
}

impl Attachment {
    pub fn drive(wire: &Wire) -> Self {
        Attachment { wire: wire.clone(), role: Role::Drive }
    }

    pub fn observe(wire: &Wire) -> Self {
        Attachment { wire: wire.clone(), role: Role::Observe }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_wire_floats() {
        let w = Wire::new(&["PB0"]);
        assert_eq!(w.read(), Level::Floating);
        assert!(!w.is_high());
    }

    #[test]
    fn test_drive_visible_through_clones() {
        let w = Wire::new(&["PB1", "SCLK"]);
        let observer = w.clone();
        w.drive(Level::High);
        assert_eq!(observer.read(), Level::High);
        observer.drive(Level::Low);
        assert_eq!(w.read(), Level::Low);
        assert!(Wire::same(&w, &observer));
    }

    #[test]
    fn test_tied_wire_ignores_drive() {
        let gnd = Wire::low();
        gnd.drive(Level::High);
        assert_eq!(gnd.read(), Level::Low);
        gnd.release();
        assert_eq!(gnd.read(), Level::Low);
        let vcc = Wire::high();
        vcc.drive(Level::Low);
        assert!(vcc.is_high());
    }

    #[test]
    fn test_distinct_wires_are_not_same() {
        assert!(!Wire::same(&Wire::low(), &Wire::low()));
    }

    #[test]
    fn test_name() {
        assert_eq!(Wire::new(&["PB2", "MOSI"]).name(), "PB2");
        assert_eq!(Wire::low().name(), "<anonymous>");
    }
}
