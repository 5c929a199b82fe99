//! Two-wire serial dot-matrix display.
//!
//! The display listens on a clock wire (SCLK) and a data wire (MOSI), with an
//! active-low select (SS) and a data echo (MISO). Shift convention:
//!
//! | Signal | Role    | Behaviour                                            |
//! |--------|---------|------------------------------------------------------|
//! | SCLK   | observe | a configured edge (rising by default) shifts one bit |
//! | MOSI   | observe | sampled on the edge; `High` = pixel on               |
//! | MISO   | drive   | echoes the bit just sampled                          |
//! | SS     | observe | low = selected; high discards the partial row and    |
//! |        |         | returns the row cursor to row 0                      |
//!
//! Bits fill a row buffer left to right. When `width` bits have arrived the
//! buffer is committed to the row under the cursor (bit *k* lands in column
//! *k*) and the cursor moves down one row, wrapping after the last row.
//!
//! Edges are detected between consecutive ticks: the display compares the
//! SCLK level it sees now with the level it saw on its previous tick.

use log::trace;
use serde::{Deserialize, Serialize};

use super::Peripheral;
use crate::error::Fault;
use crate::wire::{Attachment, Level, Wire};

/// SCLK edge on which MOSI is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Edge {
    #[default]
    Rising,
    Falling,
}

/// Geometry and clocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: usize,
    pub height: usize,
    pub edge: Edge,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig { width: 128, height: 64, edge: Edge::Rising }
    }
}

impl DisplayConfig {
    /// Number of pixels. Zero-sized or overflowing geometry is a bounds fault.
    pub fn cells(&self) -> Result<usize, Fault> {
        if self.width == 0 {
            return Err(Fault::Bounds { what: "display width", index: 0, limit: 1 });
        }
        if self.height == 0 {
            return Err(Fault::Bounds { what: "display height", index: 0, limit: 1 });
        }
        self.width.checked_mul(self.height).ok_or(Fault::Bounds {
            what: "display width",
            index: self.width,
            limit: usize::MAX / self.height,
        })
    }
}

/// Snapshot of everything that changes while the display runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    pub pixels: Vec<bool>,
    pub row: Vec<bool>,
    pub shifted: usize,
    pub cursor: usize,
    pub last_sclk: Level,
}

pub struct Display {
    config: DisplayConfig,
    sclk: Wire,
    mosi: Wire,
    miso: Wire,
    ss: Wire,
    /// Row-major, `width * height`
    pixels: Vec<bool>,
    /// Bits shifted into the row in progress
    row: Vec<bool>,
    shifted: usize,
    cursor: usize,
    last_sclk: Level,
}

impl Display {
    /// Build a cleared display. Callers check the geometry with
    /// [`DisplayConfig::cells`] first.
    pub fn new(config: DisplayConfig, sclk: Wire, mosi: Wire, miso: Wire, ss: Wire) -> Self {
        Display {
            config,
            sclk,
            mosi,
            miso,
            ss,
            pixels: vec![false; config.width * config.height],
            row: vec![false; config.width],
            shifted: 0,
            cursor: 0,
            last_sclk: Level::Floating,
        }
    }

    pub fn width(&self) -> usize {
        self.config.width
    }

    pub fn height(&self) -> usize {
        self.config.height
    }

    pub fn config(&self) -> DisplayConfig {
        self.config
    }

    /// Pixel at column `x`, row `y`.
    pub fn is_set(&self, x: usize, y: usize) -> Result<bool, Fault> {
        if x >= self.config.width {
            return Err(Fault::Bounds { what: "display column", index: x, limit: self.config.width });
        }
        if y >= self.config.height {
            return Err(Fault::Bounds { what: "display row", index: y, limit: self.config.height });
        }
        Ok(self.pixels[y * self.config.width + x])
    }

    /// Row-major pixel grid.
    pub fn pixels(&self) -> &[bool] {
        &self.pixels
    }

    /// Bits received towards the next row.
    pub fn pending_bits(&self) -> usize {
        self.shifted
    }

    /// Row the next complete row will be written to.
    pub fn cursor_row(&self) -> usize {
        self.cursor
    }

    /// Render as text, `#` for on and `.` for off, one line per row.
    pub fn to_text(&self) -> String {
        let mut s = String::with_capacity((self.config.width + 1) * self.config.height);
        for line in self.pixels.chunks(self.config.width.max(1)) {
            s.extend(line.iter().map(|&on| if on { '#' } else { '.' }));
            s.push('\n');
        }
        s
    }

    pub fn state(&self) -> DisplayState {
        DisplayState {
            pixels: self.pixels.clone(),
            row: self.row.clone(),
            shifted: self.shifted,
            cursor: self.cursor,
            last_sclk: self.last_sclk,
        }
    }

    /// Restore a snapshot taken from a display of the same geometry.
    pub fn restore(&mut self, state: DisplayState) -> Result<(), Fault> {
        let cells = self.config.width * self.config.height;
        if state.pixels.len() != cells {
            return Err(Fault::Bounds { what: "display pixels", index: state.pixels.len(), limit: cells });
        }
        if state.row.len() != self.config.width || state.shifted >= self.config.width.max(1) {
            return Err(Fault::Bounds { what: "display row buffer", index: state.shifted, limit: self.config.width });
        }
        if state.cursor >= self.config.height.max(1) {
            return Err(Fault::Bounds { what: "display cursor", index: state.cursor, limit: self.config.height });
        }
        self.pixels = state.pixels;
        self.row = state.row;
        self.shifted = state.shifted;
        self.cursor = state.cursor;
        self.last_sclk = state.last_sclk;
        Ok(())
    }

    fn edge_seen(&self, now: Level) -> bool {
        match self.config.edge {
            Edge::Rising => !self.last_sclk.is_high() && now.is_high(),
            Edge::Falling => self.last_sclk.is_high() && !now.is_high(),
        }
    }

    fn commit_row(&mut self) {
        let width = self.config.width;
        let start = self.cursor * width;
        self.pixels[start..start + width].copy_from_slice(&self.row);
        trace!("display: row {} committed", self.cursor);
        self.cursor = (self.cursor + 1) % self.config.height;
        self.shifted = 0;
    }
}

impl Peripheral for Display {
    fn name(&self) -> &'static str {
        "display"
    }

    fn attachments(&self) -> Vec<Attachment> {
        vec![
            Attachment::observe(&self.sclk),
            Attachment::observe(&self.mosi),
            Attachment::drive(&self.miso),
            Attachment::observe(&self.ss),
        ]
    }

    fn clock(&mut self) {
        let sclk = self.sclk.read();
        let edge = self.edge_seen(sclk);
        self.last_sclk = sclk;

        if self.ss.is_high() {
            self.shifted = 0;
            self.cursor = 0;
            return;
        }
        if !edge || self.config.width == 0 || self.config.height == 0 {
            return;
        }

        let bit = self.mosi.is_high();
        self.row[self.shifted] = bit;
        self.miso.drive(Level::from_bit(bit));
        self.shifted += 1;
        if self.shifted == self.config.width {
            self.commit_row();
        }
    }

    fn reset(&mut self) {
        self.pixels.fill(false);
        self.row.fill(false);
        self.shifted = 0;
        self.cursor = 0;
        self.last_sclk = Level::Floating;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rig {
        display: Display,
        sclk: Wire,
        mosi: Wire,
        miso: Wire,
        ss: Wire,
    }

    fn rig(width: usize, height: usize, edge: Edge) -> Rig {
        let sclk = Wire::new(&["SCLK"]);
        let mosi = Wire::new(&["MOSI"]);
        let miso = Wire::new(&["MISO"]);
        let ss = Wire::new(&["SS"]);
        let display = Display::new(
            DisplayConfig { width, height, edge },
            sclk.clone(),
            mosi.clone(),
            miso.clone(),
            ss.clone(),
        );
        Rig { display, sclk, mosi, miso, ss }
    }

    impl Rig {
        /// One full clock pulse (low tick, high tick) carrying `bit`.
        fn shift(&mut self, bit: bool) {
            self.mosi.drive(Level::from_bit(bit));
            self.sclk.drive(Level::Low);
            self.display.clock();
            self.sclk.drive(Level::High);
            self.display.clock();
        }
    }

    #[test]
    fn test_starts_blank() {
        let r = rig(8, 4, Edge::Rising);
        for y in 0..4 {
            for x in 0..8 {
                assert_eq!(r.display.is_set(x, y), Ok(false));
            }
        }
    }

    #[test]
    fn test_full_row_commits_to_cursor() {
        let mut r = rig(4, 2, Edge::Rising);
        for bit in [true, false, true, true] {
            r.shift(bit);
        }
        assert_eq!(r.display.pending_bits(), 0);
        assert_eq!(r.display.cursor_row(), 1);
        let row0: Vec<bool> = (0..4).map(|x| r.display.is_set(x, 0).unwrap()).collect();
        assert_eq!(row0, vec![true, false, true, true]);
        assert_eq!(r.display.is_set(0, 1), Ok(false));
    }

    #[test]
    fn test_partial_row_not_visible() {
        let mut r = rig(4, 2, Edge::Rising);
        r.shift(true);
        r.shift(true);
        assert_eq!(r.display.pending_bits(), 2);
        assert_eq!(r.display.is_set(0, 0), Ok(false));
    }

    #[test]
    fn test_cursor_wraps() {
        let mut r = rig(2, 2, Edge::Rising);
        for bit in [true, true, false, false, false, true] {
            r.shift(bit);
        }
        assert_eq!(r.display.cursor_row(), 1);
        assert_eq!(r.display.is_set(0, 0), Ok(false));
        assert_eq!(r.display.is_set(1, 0), Ok(true));
        assert_eq!(r.display.to_text(), ".#\n..\n");
    }

    #[test]
    fn test_level_held_high_is_one_edge() {
        let mut r = rig(4, 1, Edge::Rising);
        r.mosi.drive(Level::High);
        r.sclk.drive(Level::High);
        for _ in 0..5 {
            r.display.clock();
        }
        assert_eq!(r.display.pending_bits(), 1);
    }

    #[test]
    fn test_falling_edge_convention() {
        let mut r = rig(4, 1, Edge::Falling);
        r.mosi.drive(Level::High);
        r.sclk.drive(Level::High);
        r.display.clock();
        assert_eq!(r.display.pending_bits(), 0);
        r.sclk.drive(Level::Low);
        r.display.clock();
        assert_eq!(r.display.pending_bits(), 1);
    }

    #[test]
    fn test_deselect_discards_partial_row() {
        let mut r = rig(2, 2, Edge::Rising);
        r.shift(true);
        r.shift(true);
        r.shift(true);
        assert_eq!(r.display.cursor_row(), 1);
        r.ss.drive(Level::High);
        r.display.clock();
        assert_eq!(r.display.pending_bits(), 0);
        assert_eq!(r.display.cursor_row(), 0);
        // Shifts while deselected are ignored
        r.shift(false);
        assert_eq!(r.display.pending_bits(), 0);
        // Committed pixels stay
        assert_eq!(r.display.is_set(1, 0), Ok(true));
    }

    #[test]
    fn test_miso_echoes_sampled_bit() {
        let mut r = rig(8, 1, Edge::Rising);
        r.shift(true);
        assert!(r.miso.is_high());
        r.shift(false);
        assert_eq!(r.miso.read(), Level::Low);
    }

    #[test]
    fn test_out_of_range_query_is_bounds_fault() {
        let r = rig(128, 64, Edge::Rising);
        assert_eq!(
            r.display.is_set(128, 0),
            Err(Fault::Bounds { what: "display column", index: 128, limit: 128 })
        );
        assert_eq!(
            r.display.is_set(0, 64),
            Err(Fault::Bounds { what: "display row", index: 64, limit: 64 })
        );
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut r = rig(2, 2, Edge::Rising);
        for _ in 0..3 {
            r.shift(true);
        }
        r.display.reset();
        assert_eq!(r.display.pixels(), &[false; 4]);
        assert_eq!(r.display.pending_bits(), 0);
        assert_eq!(r.display.cursor_row(), 0);
    }

    #[test]
    fn test_state_roundtrip_and_geometry_check() {
        let mut r = rig(2, 2, Edge::Rising);
        for _ in 0..3 {
            r.shift(true);
        }
        let state = r.display.state();
        r.display.reset();
        r.display.restore(state.clone()).unwrap();
        assert_eq!(r.display.state(), state);

        let mut other = rig(4, 4, Edge::Rising);
        assert!(matches!(other.display.restore(state), Err(Fault::Bounds { .. })));
    }

    #[test]
    fn test_config_cells_rejects_empty_and_overflowing_geometry() {
        assert_eq!(DisplayConfig::default().cells(), Ok(128 * 64));
        let empty = DisplayConfig { width: 0, height: 0, edge: Edge::Rising };
        assert!(matches!(empty.cells(), Err(Fault::Bounds { what: "display width", .. })));
        let flat = DisplayConfig { width: 8, height: 0, edge: Edge::Rising };
        assert!(matches!(flat.cells(), Err(Fault::Bounds { what: "display height", .. })));
        let huge = DisplayConfig { width: usize::MAX / 2, height: 4, edge: Edge::Rising };
        assert!(matches!(huge.cells(), Err(Fault::Bounds { .. })));
    }

    #[test]
    fn test_attachments_order_and_roles() {
        let r = rig(8, 8, Edge::Rising);
        let roles: Vec<_> = r.display.attachments().iter().map(|a| (a.wire.name(), a.role)).collect();
        use crate::wire::Role::*;
        assert_eq!(roles, vec![("SCLK", Observe), ("MOSI", Observe), ("MISO", Drive), ("SS", Observe)]);
    }
}
