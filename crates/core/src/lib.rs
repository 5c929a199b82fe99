//! # arduboy-sim
//!
//! Pin-level simulation of an ATmega32u4 handheld console: a dot-matrix
//! display and a four-button pad wired to the microcontroller through
//! individually simulated pins.
//!
//! ## Architecture
//!
//! - [`Arduboy`] — the assembled machine: core, display and pad, clocked together
//! - [`wire::Wire`] — shared signal node between a port and the peripherals
//! - [`port::Port`] — DDR/PORT/PIN register triplet bound to up to eight wires
//! - [`memory`] — bounds-checked regions, the [`Multiplexer`] and the I/O overlay
//! - [`pins`] — the 44-pin package and its alias table
//! - [`cpu`] — the [`Core`] contract and the reference [`Avr`] core
//! - [`coverage`] — [`Instrumented`] core wrapper and the [`Coverage`] recorder
//! - [`peripherals`] — [`Display`] and [`ControlPad`]
//! - [`hex`] — firmware images and the Intel HEX parser
//! - [`savestate`] — compressed save states
//!
//! ## Tick order
//!
//! [`Arduboy::clock`] advances the display, then the pad, then executes one
//! instruction. A port write made by the core in tick *N* is therefore seen
//! by the peripherals in tick *N + 1*.
//!
//! ## Logging
//!
//! The crate logs through the `log` facade: assembly and reset at `debug`,
//! display row commits at `trace`, faults and undecodable opcodes at `warn`.
//! The embedding program installs whatever logger it likes.

pub mod config;
pub mod coverage;
pub mod cpu;
pub mod error;
pub mod hex;
pub mod memory;
pub mod opcodes;
pub mod peripherals;
pub mod pins;
pub mod port;
pub mod savestate;
pub mod wire;

pub use config::Config;
pub use coverage::{Coverage, Instrumented};
pub use cpu::{Avr, Core, Executed};
pub use error::{Error, Fault};
pub use hex::{parse_hex, FirmwareImage};
pub use memory::{ByteMemory, Multiplexer, Region};
pub use peripherals::{Button, ControlPad, Display, Peripheral};
pub use savestate::SaveState;
pub use wire::{Level, Wire};

use std::path::Path;

use log::{debug, warn};

use crate::error::Access;
use crate::peripherals::check_claims;

/// The assembled console.
///
/// Owns the instrumented core (which owns the pins, port B and both memory
/// spaces), the display and the pad. All wiring is fixed at construction.
pub struct Arduboy<C: Core = Avr> {
    core: Instrumented<C>,
    display: Display,
    pad: ControlPad,
    config: Config,
}

impl Arduboy<Avr> {
    /// Assemble with the default wiring.
    pub fn new() -> Result<Self, Fault> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self, Fault> {
        Self::with_core(Avr::atmega32u4()?, config)
    }
}

impl<C: Core> Arduboy<C> {
    /// Bind peripherals to `core`'s pins as `config` describes.
    ///
    /// Fails on empty or oversized display geometry, an unknown pin alias,
    /// or two peripherals claiming the same drivable pin; no machine exists
    /// in any of these cases.
    pub fn with_core(core: C, config: Config) -> Result<Self, Fault> {
        config.display.cells()?;
        let pins = core.pins();
        let signal = |alias: &Option<String>| -> Result<Wire, Fault> {
            match alias {
                Some(alias) => pins.require(alias).cloned(),
                None => Ok(Wire::low()),
            }
        };
        let dp = &config.display_pins;
        let display = Display::new(
            config.display,
            pins.require(&dp.sclk)?.clone(),
            pins.require(&dp.mosi)?.clone(),
            signal(&dp.miso)?,
            signal(&dp.ss)?,
        );

        let button = |b: Button| pins.require(config.buttons.alias(b)).cloned();
        let pad = ControlPad::new([
            button(Button::Up)?,
            button(Button::Down)?,
            button(Button::Left)?,
            button(Button::Right)?,
        ]);

        check_claims(&[&display as &dyn Peripheral, &pad])?;

        debug!(
            "assembled: display {}x{} on {}/{}, pad on {}/{}/{}/{}",
            display.width(),
            display.height(),
            dp.sclk,
            dp.mosi,
            config.buttons.up,
            config.buttons.down,
            config.buttons.left,
            config.buttons.right,
        );

        Ok(Arduboy { core: Instrumented::new(core), display, pad, config })
    }

    /// One machine tick: display, pad, then one instruction.
    ///
    /// A fault aborts the instruction and leaves the program counter on it;
    /// everything else is kept for inspection.
    pub fn clock(&mut self) -> Result<Executed, Fault> {
        self.display.clock();
        self.pad.clock();
        self.core.step().map_err(|fault| {
            warn!("fault at 0x{:04X}: {}", self.core.pc() as usize * 2, fault);
            fault
        })
    }

    /// Clock `ticks` times, stopping at the first fault.
    pub fn run(&mut self, ticks: usize) -> Result<(), Fault> {
        for _ in 0..ticks {
            self.clock()?;
        }
        Ok(())
    }

    /// Return core, pins and peripherals to their power-on state. Firmware
    /// and coverage are kept.
    pub fn reset(&mut self) -> Result<(), Fault> {
        self.core.reset()?;
        self.core.pins().release_all();
        self.pad.reset();
        self.display.reset();
        debug!("machine reset");
        Ok(())
    }

    /// Write every byte of `image` into the code space. Nothing is written
    /// if any address is outside it.
    pub fn upload(&mut self, image: &FirmwareImage) -> Result<(), Fault> {
        let size = self.core.code().size();
        if let Some((addr, _)) = image.iter().find(|&(addr, _)| addr >= size) {
            return Err(Fault::Address { addr, access: Access::Write });
        }
        let code = self.core.code_mut();
        for (addr, byte) in image.iter() {
            code.write(addr, byte)?;
        }
        debug!("uploaded {} bytes of firmware", image.len());
        Ok(())
    }

    /// Parse Intel HEX, upload it and reset. Returns the number of bytes loaded.
    pub fn load_hex(&mut self, text: &str) -> Result<usize, Error> {
        let image = parse_hex(text)?;
        self.upload(&image)?;
        self.reset()?;
        Ok(image.len())
    }

    pub fn is_pixel_set(&self, x: usize, y: usize) -> Result<bool, Fault> {
        self.display.is_set(x, y)
    }

    pub fn set_button_state(&mut self, button: Button, pressed: bool) {
        self.pad.set_state(button, pressed);
    }

    pub fn button_state(&self, button: Button) -> bool {
        self.pad.state(button)
    }

    /// Read a data-space byte without side effects on the core.
    pub fn read_data(&self, addr: usize) -> Result<u8, Fault> {
        self.core.data().read(addr)
    }

    pub fn pin(&self, alias: &str) -> Option<&Wire> {
        self.core.pin(alias)
    }

    pub fn core(&self) -> &Instrumented<C> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Instrumented<C> {
        &mut self.core
    }

    pub fn coverage(&self) -> &Coverage {
        self.core.coverage()
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn pad(&self) -> &ControlPad {
        &self.pad
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn save_state(&self) -> SaveState {
        let mut data = Vec::new();
        self.core.data().save(&mut data);
        SaveState {
            pc: self.core.pc(),
            cycles: self.core.cycles(),
            data,
            wires: self.core.pins().pins().iter().map(Wire::read).collect(),
            display: self.display.state(),
            pad: self.pad.snapshot(),
        }
    }

    /// Restore a state taken from a machine with the same configuration.
    /// The state is checked before anything is changed.
    pub fn load_state(&mut self, state: &SaveState) -> Result<(), Error> {
        let pin_count = self.core.pins().pins().len();
        if state.wires.len() != pin_count {
            return Err(Error::State(format!(
                "state has {} pins, machine has {}",
                state.wires.len(),
                pin_count
            )));
        }
        let mut current = Vec::new();
        self.core.data().save(&mut current);
        if state.data.len() != current.len() {
            return Err(Error::State(format!(
                "state has {} data bytes, machine has {}",
                state.data.len(),
                current.len()
            )));
        }

        self.display.restore(state.display.clone())?;
        let mut input = state.data.as_slice();
        self.core.data_mut().restore(&mut input)?;
        for (wire, &level) in self.core.pins().pins().iter().zip(&state.wires) {
            wire.drive(level);
        }
        self.pad.restore(state.pad);
        self.core.set_pc(state.pc);
        self.core.set_cycles(state.cycles);
        debug!("state restored at pc 0x{:04X}", state.pc as usize * 2);
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), Error> {
        savestate::save_to_file(&self.save_state(), path)
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<(), Error> {
        let state = savestate::load_from_file(path)?;
        self.load_state(&state)
    }
}
