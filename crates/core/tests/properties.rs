//! Property tests for the wiring and memory building blocks.

use arduboy_sim::error::Access;
use arduboy_sim::peripherals::{DisplayConfig, Edge};
use arduboy_sim::port::{Port, PortAddrs, PortRegister};
use arduboy_sim::{Button, ControlPad, Display, Fault, Level, Multiplexer, Peripheral, Region, Wire};
use arduboy_sim::memory::ByteMemory;
use proptest::prelude::*;

fn level() -> impl Strategy<Value = Level> {
    prop_oneof![Just(Level::Low), Just(Level::High), Just(Level::Floating)]
}

fn byte_wires(n: usize) -> Vec<Wire> {
    (0..n).map(|_| Wire::new(&[])).collect()
}

proptest! {
    #[test]
    fn property_wire_reads_last_drive(levels in prop::collection::vec(level(), 1..16)) {
        let w = Wire::new(&["W"]);
        let alias = w.clone();
        for &l in &levels {
            w.drive(l);
            prop_assert_eq!(alias.read(), l);
        }
    }

    #[test]
    fn property_tied_wire_ignores_drives(tie in level(), levels in prop::collection::vec(level(), 0..16)) {
        let w = Wire::tied(tie, &["T"]);
        for l in levels {
            w.drive(l);
            prop_assert_eq!(w.read(), tie);
        }
    }

    #[test]
    fn property_port_reads_back_outputs(ddr in any::<u8>(), latch in any::<u8>(), inputs in any::<u8>()) {
        let wires = byte_wires(8);
        let addrs = PortAddrs { pin: 0x03, ddr: 0x04, port: 0x05 };
        let mut port = Port::new("B", addrs, wires.clone()).unwrap();
        port.write_register(PortRegister::Direction, ddr);
        port.write_register(PortRegister::Output, latch);
        for (bit, w) in wires.iter().enumerate() {
            if ddr & (1 << bit) == 0 {
                w.drive(Level::from_bit(inputs & (1 << bit) != 0));
            } else {
                prop_assert_eq!(w.read(), Level::from_bit(latch & (1 << bit) != 0));
            }
        }
        let pin = port.read_register(PortRegister::Input);
        prop_assert_eq!(pin & ddr, latch & ddr);
        prop_assert_eq!(pin & !ddr, inputs & !ddr);
    }

    #[test]
    fn property_pin_write_toggles_latch(latch in any::<u8>(), toggle in any::<u8>()) {
        let addrs = PortAddrs { pin: 0x03, ddr: 0x04, port: 0x05 };
        let mut port = Port::new("B", addrs, byte_wires(8)).unwrap();
        port.write_register(PortRegister::Output, latch);
        port.write_register(PortRegister::Input, toggle);
        prop_assert_eq!(port.read_register(PortRegister::Output), latch ^ toggle);
    }

    #[test]
    fn property_multiplexer_routes_or_faults(addr in 0usize..0x200, value in any::<u8>()) {
        // [0x00, 0x40) and [0x100, 0x180) mapped, the rest is a gap
        let mut mux = Multiplexer::new()
            .map(0x100, ByteMemory::new(0x80))
            .unwrap()
            .map(0x00, ByteMemory::new(0x40))
            .unwrap();
        let mapped = addr < 0x40 || (0x100..0x180).contains(&addr);
        prop_assert_eq!(mux.is_mapped(addr), mapped);
        if mapped {
            mux.write(addr, value).unwrap();
            prop_assert_eq!(mux.read(addr), Ok(value));
        } else {
            prop_assert_eq!(mux.write(addr, value), Err(Fault::Address { addr, access: Access::Write }));
            prop_assert_eq!(mux.read(addr), Err(Fault::Address { addr, access: Access::Read }));
        }
    }

    #[test]
    fn property_overlapping_map_rejected(base in 0usize..0x60, size in 1usize..0x40) {
        let overlaps = base < 0x40 + 0x20 && 0x40 < base + size;
        let result = Multiplexer::new().map(0x40, ByteMemory::new(0x20)).unwrap().map(base, ByteMemory::new(size));
        match result {
            Ok(_) => prop_assert!(!overlaps),
            Err(fault) => {
                prop_assert!(overlaps);
                prop_assert_eq!(fault, Fault::RegionOverlap { base, size });
            }
        }
    }

    #[test]
    fn property_pad_state_matches_wires(presses in prop::collection::vec((0usize..4, any::<bool>()), 0..24)) {
        let wires = [Wire::new(&["U"]), Wire::new(&["D"]), Wire::new(&["L"]), Wire::new(&["R"])];
        let mut pad = ControlPad::new(wires.clone());
        let mut expected = [false; 4];
        for (i, pressed) in presses {
            pad.set_state(Button::ALL[i], pressed);
            expected[i] = pressed;
        }
        pad.clock();
        for (i, b) in Button::ALL.into_iter().enumerate() {
            prop_assert_eq!(pad.state(b), expected[i]);
            prop_assert_eq!(wires[i].read(), Level::from_bit(expected[i]));
        }
    }

    #[test]
    fn property_display_rows_match_shifted_bits(bits in prop::collection::vec(any::<bool>(), 0..40)) {
        let (width, height) = (8, 3);
        let sclk = Wire::new(&["SCLK"]);
        let mosi = Wire::new(&["MOSI"]);
        let config = DisplayConfig { width, height, edge: Edge::Rising };
        let mut display = Display::new(config, sclk.clone(), mosi.clone(), Wire::low(), Wire::low());
        for &bit in &bits {
            sclk.drive(Level::Low);
            mosi.drive(Level::from_bit(bit));
            display.clock();
            sclk.drive(Level::High);
            display.clock();
        }

        // replay into a model of the committed frame
        let mut frame = vec![false; width * height];
        let full_rows = bits.len() / width;
        for r in 0..full_rows {
            let row = r % height;
            frame[row * width..(row + 1) * width].copy_from_slice(&bits[r * width..(r + 1) * width]);
        }
        prop_assert_eq!(display.pixels(), frame.as_slice());
        prop_assert_eq!(display.pending_bits(), bits.len() % width);
        prop_assert_eq!(display.cursor_row(), full_rows % height);
    }
}
