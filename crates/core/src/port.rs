//! GPIO port: a bank of up to eight wires behind a DDR/PORT/PIN register triplet.
//!
//! | Register    | Meaning per bit                                   |
//! |-------------|---------------------------------------------------|
//! | `Direction` | 1 = output (port drives the wire), 0 = input      |
//! | `Output`    | latched output level, driven onto output bits     |
//! | `Input`     | read: live wire level for inputs, latch for outputs |
//!
//! Writing `Input` toggles the latch bits that are set in the written value,
//! the same as writing PINx on the ATmega32u4. Tied wires need no special
//! handling here; the wire itself ignores drives.

use crate::error::Fault;
use crate::wire::{Level, Wire};

/// Register within a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRegister {
    Direction,
    Output,
    Input,
}

/// I/O-space addresses of a port's registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAddrs {
    pub pin: usize,
    pub ddr: usize,
    pub port: usize,
}

pub struct Port {
    name: &'static str,
    addrs: PortAddrs,
    wires: Vec<Wire>,
    ddr: u8,
    latch: u8,
}

impl Port {
    /// Bind `wires` (bit 0 first) to a new port. More than eight wires is a bounds fault.
    pub fn new(name: &'static str, addrs: PortAddrs, wires: Vec<Wire>) -> Result<Self, Fault> {
        if wires.len() > 8 {
            return Err(Fault::Bounds { what: "port width", index: wires.len(), limit: 8 });
        }
        Ok(Port { name, addrs, wires, ddr: 0, latch: 0 })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn addrs(&self) -> PortAddrs {
        self.addrs
    }

    pub fn width(&self) -> usize {
        self.wires.len()
    }

    pub fn wire(&self, bit: usize) -> Option<&Wire> {
        self.wires.get(bit)
    }

    /// Map an I/O address onto one of this port's registers.
    pub fn register_at(&self, addr: usize) -> Option<PortRegister> {
        if addr == self.addrs.pin {
            Some(PortRegister::Input)
        } else if addr == self.addrs.ddr {
            Some(PortRegister::Direction)
        } else if addr == self.addrs.port {
            Some(PortRegister::Output)
        } else {
            None
        }
    }

    fn mask(&self) -> u8 {
        if self.wires.len() >= 8 { 0xFF } else { (1u8 << self.wires.len()) - 1 }
    }

    pub fn read_register(&self, reg: PortRegister) -> u8 {
        match reg {
            PortRegister::Direction => self.ddr,
            PortRegister::Output => self.latch,
            PortRegister::Input => {
                let mut sampled = 0u8;
                for (bit, wire) in self.wires.iter().enumerate() {
                    if wire.is_high() {
                        sampled |= 1 << bit;
                    }
                }
                (self.latch & self.ddr) | (sampled & !self.ddr)
            }
        }
    }

    pub fn write_register(&mut self, reg: PortRegister, value: u8) {
        let value = value & self.mask();
        match reg {
            PortRegister::Direction => self.ddr = value,
            PortRegister::Output => self.latch = value,
            PortRegister::Input => self.latch ^= value,
        }
        self.drive_outputs();
    }

    fn drive_outputs(&self) {
        for (bit, wire) in self.wires.iter().enumerate() {
            if self.ddr & (1 << bit) != 0 {
                wire.drive(Level::from_bit(self.latch & (1 << bit) != 0));
            }
        }
    }

    /// Power-on state: all inputs, latch cleared. Wires are left alone.
    pub fn reset(&mut self) {
        self.ddr = 0;
        self.latch = 0;
    }

    /// `(ddr, latch)` for save states.
    pub fn latches(&self) -> (u8, u8) {
        (self.ddr, self.latch)
    }

    /// Restore latches without driving; wire levels are restored separately.
    pub fn restore_latches(&mut self, ddr: u8, latch: u8) {
        self.ddr = ddr & self.mask();
        self.latch = latch & self.mask();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRS: PortAddrs = PortAddrs { pin: 0x03, ddr: 0x04, port: 0x05 };

    fn port8() -> (Port, Vec<Wire>) {
        let wires: Vec<Wire> = (0..8).map(|_| Wire::new(&[])).collect();
        (Port::new("B", ADDRS, wires.clone()).unwrap(), wires)
    }

    #[test]
    fn test_output_drives_wires() {
        let (mut port, wires) = port8();
        port.write_register(PortRegister::Direction, 0xFF);
        port.write_register(PortRegister::Output, 0b1010_0101);
        for (bit, w) in wires.iter().enumerate() {
            assert_eq!(w.is_high(), (0b1010_0101 >> bit) & 1 == 1, "bit {}", bit);
        }
    }

    #[test]
    fn test_output_ignored_on_input_bits() {
        let (mut port, wires) = port8();
        port.write_register(PortRegister::Direction, 0x0F);
        port.write_register(PortRegister::Output, 0xFF);
        assert!(wires[0].is_high());
        assert_eq!(wires[7].read(), Level::Floating);
    }

    #[test]
    fn test_direction_write_drives_latched_value() {
        let (mut port, wires) = port8();
        port.write_register(PortRegister::Output, 0x01);
        assert_eq!(wires[0].read(), Level::Floating);
        port.write_register(PortRegister::Direction, 0x01);
        assert!(wires[0].is_high());
    }

    #[test]
    fn test_input_samples_wires_and_echoes_outputs() {
        let (mut port, wires) = port8();
        port.write_register(PortRegister::Direction, 0xF0);
        port.write_register(PortRegister::Output, 0x30);
        wires[0].drive(Level::High);
        wires[1].drive(Level::Low);
        // Input bits 0..3 from wires, output bits 4..7 echo latch
        assert_eq!(port.read_register(PortRegister::Input), 0x31);
        // An external drive on an output wire does not change the echoed value
        wires[4].drive(Level::Low);
        assert_eq!(port.read_register(PortRegister::Input), 0x31);
    }

    #[test]
    fn test_input_write_toggles_latch() {
        let (mut port, wires) = port8();
        port.write_register(PortRegister::Direction, 0x02);
        port.write_register(PortRegister::Input, 0x02);
        assert!(wires[1].is_high());
        port.write_register(PortRegister::Input, 0x02);
        assert_eq!(wires[1].read(), Level::Low);
        assert_eq!(port.read_register(PortRegister::Output), 0x00);
    }

    #[test]
    fn test_tied_bit_needs_no_special_case() {
        let wires = vec![Wire::new(&[]), Wire::low(), Wire::high()];
        let mut port = Port::new("X", ADDRS, wires).unwrap();
        port.write_register(PortRegister::Direction, 0b011);
        port.write_register(PortRegister::Output, 0b011);
        // bit1 is tied low and output: echoes latch; bit2 tied high, input: samples
        assert_eq!(port.read_register(PortRegister::Input), 0b111);
        port.write_register(PortRegister::Direction, 0b000);
        assert_eq!(port.read_register(PortRegister::Input), 0b101);
    }

    #[test]
    fn test_narrow_port_masks_unbound_bits() {
        let wires = vec![Wire::new(&[]), Wire::new(&[])];
        let mut port = Port::new("N", ADDRS, wires).unwrap();
        port.write_register(PortRegister::Direction, 0xFF);
        assert_eq!(port.read_register(PortRegister::Direction), 0x03);
    }

    #[test]
    fn test_too_wide_port_is_bounds_fault() {
        let wires: Vec<Wire> = (0..9).map(|_| Wire::new(&[])).collect();
        let err = Port::new("W", ADDRS, wires).err();
        assert_eq!(err, Some(Fault::Bounds { what: "port width", index: 9, limit: 8 }));
    }

    #[test]
    fn test_register_at() {
        let (port, _) = port8();
        assert_eq!(port.register_at(0x03), Some(PortRegister::Input));
        assert_eq!(port.register_at(0x04), Some(PortRegister::Direction));
        assert_eq!(port.register_at(0x05), Some(PortRegister::Output));
        assert_eq!(port.register_at(0x06), None);
    }
}
