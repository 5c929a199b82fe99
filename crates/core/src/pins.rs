//! ATmega32u4 pinout and the alias lookup table.
//!
//! Pins are numbered 1–44 as on the TQFP-44 package. Only port B is modelled
//! as GPIO; supply pins are tied high, ground pins and every other pin are
//! tied low.

use std::collections::HashMap;

use crate::error::Fault;
use crate::wire::{Level, Wire};

/// Number of physical pins on the package.
pub const PIN_COUNT: usize = 44;

/// What a physical pin is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKind {
    /// Bit of port B
    PortB(u8),
    /// Supply rail (tied high)
    Supply,
    /// Ground or a function this model does not implement (tied low)
    Unused,
}

/// One row of the pinout table.
#[derive(Debug, Clone, Copy)]
pub struct PinDef {
    pub number: u8,
    pub kind: PinKind,
    pub aliases: &'static [&'static str],
}

const fn pin(number: u8, kind: PinKind, aliases: &'static [&'static str]) -> PinDef {
    PinDef { number, kind, aliases }
}

use PinKind::{PortB, Supply, Unused};

/// TQFP-44 pinout from the ATmega32u4 datasheet.
pub const ATMEGA32U4_PINOUT: [PinDef; PIN_COUNT] = [
    pin(1, Unused, &["PE6", "INT6", "AIN0"]),
    pin(2, Supply, &["UVCC"]),
    pin(3, Unused, &["D-"]),
    pin(4, Unused, &["D+"]),
    pin(5, Unused, &["UGND"]),
    pin(6, Unused, &["UCAP"]),
    pin(7, Supply, &["VBUS"]),
    pin(8, PortB(0), &["PB0", "SS", "PCINT0"]),
    pin(9, PortB(1), &["PB1", "PCINT1", "SCLK"]),
    pin(10, PortB(2), &["PB2", "PDI", "PCINT2", "MOSI"]),
    pin(11, PortB(3), &["PB3", "PDO", "PCINT3", "MISO"]),
    pin(12, PortB(7), &["PB7", "PCINT7", "OC0A", "OC1C", "RTS"]),
    pin(13, Unused, &["RESET"]),
    pin(14, Supply, &["VCC"]),
    pin(15, Unused, &["GND"]),
    pin(16, Unused, &["XTAL2"]),
    pin(17, Unused, &["XTAL1"]),
    pin(18, Unused, &["PD0", "OC0B", "SCL", "INT0"]),
    pin(19, Unused, &["PD1", "SDA", "INT1"]),
    pin(20, Unused, &["PD2", "RXD1", "INT2"]),
    pin(21, Unused, &["PD3", "TXD1", "INT3"]),
    pin(22, Unused, &["PD5", "XCK1", "CTS"]),
    pin(23, Unused, &["GND"]),
    pin(24, Supply, &["AVCC"]),
    pin(25, Unused, &["PD4", "ICP1", "ADC8"]),
    pin(26, Unused, &["PD6", "T1", "ADC9"]),
    pin(27, Unused, &["PD7", "T0", "OC4D", "ADC10"]),
    pin(28, PortB(4), &["PB4", "PCINT4", "ADC11"]),
    pin(29, PortB(5), &["PB5", "PCINT5", "OC1A", "ADC12"]),
    pin(30, PortB(6), &["PB6", "PCINT6", "OC1B", "OC4B", "ADC13"]),
    pin(31, Unused, &["PC6", "OC3A"]),
    pin(32, Unused, &["PC7", "ICP3", "CLK0", "OC4A"]),
    pin(33, Unused, &["PE2", "HWB"]),
    pin(34, Supply, &["VCC"]),
    pin(35, Unused, &["GND"]),
    pin(36, Unused, &["PF7", "ADC7", "TDI"]),
    pin(37, Unused, &["PF6", "ADC6", "TDO"]),
    pin(38, Unused, &["PF5", "ADC5", "TMS"]),
    pin(39, Unused, &["PF4", "ADC4", "TCK"]),
    pin(40, Unused, &["PF1", "ADC1"]),
    pin(41, Unused, &["PF0", "ADC0"]),
    pin(42, Unused, &["AREF"]),
    pin(43, Unused, &["GND"]),
    pin(44, Supply, &["AVCC"]),
];

/// Immutable pin array plus alias index, built once during assembly.
pub struct PinMap {
    wires: Vec<Wire>,
    by_alias: HashMap<&'static str, usize>,
}

impl PinMap {
    /// Allocate one wire per row of `pinout`. Repeated aliases (GND, VCC)
    /// resolve to the lowest-numbered pin.
    pub fn new(pinout: &[PinDef]) -> Self {
        let mut wires = Vec::with_capacity(pinout.len());
        let mut by_alias = HashMap::new();
        for (index, def) in pinout.iter().enumerate() {
            let wire = match def.kind {
                PinKind::PortB(_) => Wire::new(def.aliases),
                PinKind::Supply => Wire::tied(Level::High, def.aliases),
                PinKind::Unused => Wire::tied(Level::Low, def.aliases),
            };
            for alias in def.aliases {
                by_alias.entry(*alias).or_insert(index);
            }
            wires.push(wire);
        }
        PinMap { wires, by_alias }
    }

    pub fn atmega32u4() -> Self {
        Self::new(&ATMEGA32U4_PINOUT)
    }

    /// All pins; index 0 is physical pin 1.
    pub fn pins(&self) -> &[Wire] {
        &self.wires
    }

    /// Physical pin by its 1-based package number.
    pub fn by_number(&self, number: usize) -> Option<&Wire> {
        number.checked_sub(1).and_then(|i| self.wires.get(i))
    }

    pub fn get(&self, alias: &str) -> Option<&Wire> {
        self.by_alias.get(alias).map(|&i| &self.wires[i])
    }

    /// Like [`get`](Self::get) but an unknown alias is a fault.
    pub fn require(&self, alias: &str) -> Result<&Wire, Fault> {
        self.get(alias).ok_or_else(|| Fault::UnknownPin(alias.to_string()))
    }

    /// Release every drivable wire back to floating.
    pub fn release_all(&self) {
        for wire in &self.wires {
            wire.release();
        }
    }
}
