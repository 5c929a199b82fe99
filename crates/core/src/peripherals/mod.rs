//! Pin-level peripherals.
//!
//! A peripheral touches the rest of the machine only through the wires it
//! declares in [`Peripheral::attachments`]. Once per machine tick it samples
//! and drives those wires in [`Peripheral::clock`].
//!
//! - [`Display`] — two-wire serial dot-matrix display (128×64 by default)
//! - [`ControlPad`] — four buttons, each driving one wire

mod display;
mod pad;

pub use display::{Display, DisplayConfig, DisplayState, Edge};
pub use pad::{Button, ControlPad, PadState};

use crate::error::Fault;
use crate::wire::{Attachment, Wire};

/// A component clocked in lockstep with the core on a declared set of wires.
pub trait Peripheral {
    fn name(&self) -> &'static str;
    /// Ordered wiring, fixed at construction.
    fn attachments(&self) -> Vec<Attachment>;
    /// Advance one tick.
    fn clock(&mut self);
    /// Return to the initial state.
    fn reset(&mut self);
}

/// Reject any drivable wire claimed by more than one peripheral.
///
/// Tied wires are shared freely since nothing can change their level.
pub fn check_claims(peripherals: &[&dyn Peripheral]) -> Result<(), Fault> {
    let mut claimed: Vec<(Wire, &'static str)> = Vec::new();
    for p in peripherals {
        let mut own: Vec<Wire> = Vec::new();
        for attachment in p.attachments() {
            let wire = attachment.wire;
            if wire.is_tied() || own.iter().any(|w| Wire::same(w, &wire)) {
                continue;
            }
            if let Some((_, first)) = claimed.iter().find(|(w, _)| Wire::same(w, &wire)) {
                return Err(Fault::PinConflict {
                    wire: wire.name().to_string(),
                    first: *first,
                    second: p.name(),
                });
            }
            own.push(wire);
        }
        claimed.extend(own.into_iter().map(|w| (w, p.name())));
    }
    Ok(())
}
