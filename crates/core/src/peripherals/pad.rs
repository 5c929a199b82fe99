//! Four-button control pad.
//!
//! Each button owns one wire and drives it `High` while pressed and `Low`
//! while released. The pad re-drives every wire on each tick, so a button
//! holds its level even if firmware briefly turns the pin into an output.

use serde::{Deserialize, Serialize};

use super::Peripheral;
use crate::wire::{Attachment, Level, Wire};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
}

impl Button {
    pub const ALL: [Button; 4] = [Button::Up, Button::Down, Button::Left, Button::Right];

    fn index(self) -> usize {
        self as usize
    }
}

/// Commanded button states, in [`Button::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PadState {
    pub pressed: [bool; 4],
}

pub struct ControlPad {
    wires: [Wire; 4],
    state: PadState,
}

impl ControlPad {
    /// `wires` in [`Button::ALL`] order. Every button starts released and
    /// its wire is driven low.
    pub fn new(wires: [Wire; 4]) -> Self {
        let pad = ControlPad { wires, state: PadState::default() };
        pad.drive_all();
        pad
    }

    pub fn wire(&self, button: Button) -> &Wire {
        &self.wires[button.index()]
    }

    /// Press or release `button`; the wire changes immediately.
    pub fn set_state(&mut self, button: Button, pressed: bool) {
        self.state.pressed[button.index()] = pressed;
        self.wires[button.index()].drive(Level::from_bit(pressed));
    }

    /// Last commanded state.
    pub fn state(&self, button: Button) -> bool {
        self.state.pressed[button.index()]
    }

    pub fn snapshot(&self) -> PadState {
        self.state
    }

    pub fn restore(&mut self, state: PadState) {
        self.state = state;
        self.drive_all();
    }

    fn drive_all(&self) {
        for (wire, &pressed) in self.wires.iter().zip(&self.state.pressed) {
            wire.drive(Level::from_bit(pressed));
        }
    }
}

impl Peripheral for ControlPad {
    fn name(&self) -> &'static str {
        "pad"
    }

    fn attachments(&self) -> Vec<Attachment> {
        self.wires.iter().map(Attachment::drive).collect()
    }

    fn clock(&mut self) {
        self.drive_all();
    }

    fn reset(&mut self) {
        self.state = PadState::default();
        self.drive_all();
    }
}
