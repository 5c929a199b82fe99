//! Machine configuration.
//!
//! Everything assembly needs beyond the fixed ATmega32u4 pinout: display
//! geometry and clock edge, and which pins the peripherals are wired to.
//! Pins are named by any alias from the pin table (`"PB1"`, `"SCLK"`, ...).
//! The defaults describe the stock wiring:
//!
//! | Signal       | Pin               |
//! |--------------|-------------------|
//! | display SCLK | PB1 (SCLK)        |
//! | display MOSI | PB2 (MOSI)        |
//! | display MISO | tied low          |
//! | display SS   | tied low          |
//! | Up / Down    | PB0 / PB3         |
//! | Left / Right | PB4 / PB5         |

use serde::{Deserialize, Serialize};

use crate::peripherals::{Button, DisplayConfig};

/// Display signal wiring. `None` ties the signal low.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPins {
    pub sclk: String,
    pub mosi: String,
    pub miso: Option<String>,
    pub ss: Option<String>,
}

impl Default for DisplayPins {
    fn default() -> Self {
        DisplayPins { sclk: "SCLK".into(), mosi: "MOSI".into(), miso: None, ss: None }
    }
}

/// Button wiring, one pin alias per button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonPins {
    pub up: String,
    pub down: String,
    pub left: String,
    pub right: String,
}

impl ButtonPins {
    pub fn alias(&self, button: Button) -> &str {
        match button {
            Button::Up => &self.up,
            Button::Down => &self.down,
            Button::Left => &self.left,
            Button::Right => &self.right,
        }
    }
}

impl Default for ButtonPins {
    fn default() -> Self {
        ButtonPins { up: "PB0".into(), down: "PB3".into(), left: "PB4".into(), right: "PB5".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub display: DisplayConfig,
    pub display_pins: DisplayPins,
    pub buttons: ButtonPins,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::Edge;

    #[test]
    fn test_default_wiring() {
        let c = Config::default();
        assert_eq!(c.display, DisplayConfig { width: 128, height: 64, edge: Edge::Rising });
        assert_eq!(c.display_pins.sclk, "SCLK");
        assert_eq!(c.display_pins.miso, None);
        assert_eq!(c.buttons.alias(Button::Down), "PB3");
        assert_eq!(c.buttons.alias(Button::Right), "PB5");
    }

    #[test]
    fn test_config_survives_bincode() {
        let mut c = Config::default();
        c.display.edge = Edge::Falling;
        c.display_pins.ss = Some("PB6".into());
        let bytes = bincode::serialize(&c).unwrap();
        let back: Config = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, c);
    }
}
