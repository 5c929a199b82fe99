//! Addressable memory regions.
//!
//! Every byte the instruction core touches goes through a [`Region`]. The
//! ATmega32u4 data space is a [`Multiplexer`] of four regions:
//!
//! | Address Range | Region                        |
//! |---------------|-------------------------------|
//! | 0x0000–0x001F | General registers R0–R31      |
//! | 0x0020–0x005F | I/O registers ([`IoMemory`])  |
//! | 0x0060–0x00FF | Extended I/O registers        |
//! | 0x0100–0x0AFF | SRAM (2560 bytes)             |
//!
//! Anything above 0x0AFF is unmapped and faults. Flash is a separate
//! [`ByteMemory`] owned by the core.

use crate::error::Fault;
use crate::port::Port;

/// Fixed-size, bounds-checked byte storage.
pub trait Region {
    fn size(&self) -> usize;
    fn read(&self, addr: usize) -> Result<u8, Fault>;
    fn write(&mut self, addr: usize, value: u8) -> Result<(), Fault>;
    /// Return to power-on contents.
    fn reset(&mut self);
    /// Append this region's contents to a save-state image.
    fn save(&self, out: &mut Vec<u8>);
    /// Consume this region's contents from the front of `input`.
    fn restore(&mut self, input: &mut &[u8]) -> Result<(), Fault>;
}

/// Take `n` bytes off the front of a save-state image.
fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], Fault> {
    if input.len() < n {
        return Err(Fault::Bounds { what: "state image", index: n, limit: input.len() });
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

/// Plain array of byte cells, zeroed on reset.
pub struct ByteMemory {
    cells: Vec<u8>,
}

impl ByteMemory {
    pub fn new(size: usize) -> Self {
        ByteMemory { cells: vec![0u8; size] }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }

    /// Read a little-endian 16-bit word at a word address.
    pub fn read_word(&self, word_addr: usize) -> Result<u16, Fault> {
        let lo = self.read(word_addr * 2)?;
        let hi = self.read(word_addr * 2 + 1)?;
        Ok(lo as u16 | (hi as u16) << 8)
    }
}

impl Region for ByteMemory {
    fn size(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    fn read(&self, addr: usize) -> Result<u8, Fault> {
        self.cells.get(addr).copied().ok_or_else(|| Fault::read(addr))
    }

    #[inline]
    fn write(&mut self, addr: usize, value: u8) -> Result<(), Fault> {
        let cell = self.cells.get_mut(addr).ok_or_else(|| Fault::write(addr))?;
        *cell = value;
        Ok(())
    }

    fn reset(&mut self) {
        self.cells.fill(0);
    }

    fn save(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.cells);
    }

    fn restore(&mut self, input: &mut &[u8]) -> Result<(), Fault> {
        let bytes = take(input, self.cells.len())?;
        self.cells.copy_from_slice(bytes);
        Ok(())
    }
}

struct Mapped {
    base: usize,
    region: Box<dyn Region>,
}

impl Mapped {
    fn end(&self) -> usize {
        self.base + self.region.size()
    }
}

/// Composition of sub-regions at disjoint base offsets.
///
/// Addresses are translated to the owning sub-region by subtracting its
/// base. Gaps between sub-regions are allowed; touching one is an
/// address fault reported with the multiplexer-level address.
#[derive(Default)]
pub struct Multiplexer {
    regions: Vec<Mapped>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Multiplexer { regions: Vec::new() }
    }

    /// Map `region` at `base`. Fails if it would overlap an existing sub-region
    /// or run past the end of the address space.
    pub fn map(mut self, base: usize, region: impl Region + 'static) -> Result<Self, Fault> {
        let size = region.size();
        let end = base.checked_add(size).ok_or(Fault::RegionOverlap { base, size })?;
        if self.regions.iter().any(|m| base < m.end() && m.base < end) {
            return Err(Fault::RegionOverlap { base, size });
        }
        let at = self.regions.partition_point(|m| m.base < base);
        self.regions.insert(at, Mapped { base, region: Box::new(region) });
        Ok(self)
    }

    fn find(&self, addr: usize) -> Option<&Mapped> {
        self.regions.iter().find(|m| addr >= m.base && addr < m.end())
    }

    fn find_mut(&mut self, addr: usize) -> Option<&mut Mapped> {
        self.regions.iter_mut().find(|m| addr >= m.base && addr < m.end())
    }

    /// Mapped `(base, size)` pairs in ascending address order.
    pub fn layout(&self) -> Vec<(usize, usize)> {
        self.regions.iter().map(|m| (m.base, m.region.size())).collect()
    }

    pub fn is_mapped(&self, addr: usize) -> bool {
        self.find(addr).is_some()
    }
}

impl Region for Multiplexer {
    /// One past the highest mapped address.
    fn size(&self) -> usize {
        self.regions.last().map(Mapped::end).unwrap_or(0)
    }

    fn read(&self, addr: usize) -> Result<u8, Fault> {
        let m = self.find(addr).ok_or_else(|| Fault::read(addr))?;
        m.region.read(addr - m.base)
    }

    fn write(&mut self, addr: usize, value: u8) -> Result<(), Fault> {
        let m = self.find_mut(addr).ok_or_else(|| Fault::write(addr))?;
        let offset = addr - m.base;
        m.region.write(offset, value)
    }

    fn reset(&mut self) {
        for m in &mut self.regions {
            m.region.reset();
        }
    }

    fn save(&self, out: &mut Vec<u8>) {
        for m in &self.regions {
            m.region.save(out);
        }
    }

    fn restore(&mut self, input: &mut &[u8]) -> Result<(), Fault> {
        for m in &mut self.regions {
            m.region.restore(input)?;
        }
        Ok(())
    }
}

/// I/O register file with GPIO ports overlaid on their register addresses.
///
/// Addresses are I/O addresses (0x00–0x3F), i.e. data-space address minus 0x20.
pub struct IoMemory {
    cells: ByteMemory,
    ports: Vec<Port>,
}

impl IoMemory {
    pub fn new(cells: ByteMemory, ports: Vec<Port>) -> Self {
        IoMemory { cells, ports }
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }
}

impl Region for IoMemory {
    fn size(&self) -> usize {
        self.cells.size()
    }

    fn read(&self, addr: usize) -> Result<u8, Fault> {
        for port in &self.ports {
            if let Some(reg) = port.register_at(addr) {
                return Ok(port.read_register(reg));
            }
        }
        self.cells.read(addr)
    }

    fn write(&mut self, addr: usize, value: u8) -> Result<(), Fault> {
        for port in &mut self.ports {
            if let Some(reg) = port.register_at(addr) {
                port.write_register(reg, value);
                return Ok(());
            }
        }
        self.cells.write(addr, value)
    }

    fn reset(&mut self) {
        self.cells.reset();
        for port in &mut self.ports {
            port.reset();
        }
    }

    fn save(&self, out: &mut Vec<u8>) {
        self.cells.save(out);
        for port in &self.ports {
            let (ddr, latch) = port.latches();
            out.push(ddr);
            out.push(latch);
        }
    }

    fn restore(&mut self, input: &mut &[u8]) -> Result<(), Fault> {
        self.cells.restore(input)?;
        for port in &mut self.ports {
            let bytes = take(input, 2)?;
            port.restore_latches(bytes[0], bytes[1]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Access;
    use crate::port::PortAddrs;
    use crate::wire::Wire;

    #[test]
    fn test_byte_memory_bounds() {
        let mut mem = ByteMemory::new(4);
        mem.write(3, 0xAA).unwrap();
        assert_eq!(mem.read(3), Ok(0xAA));
        assert_eq!(mem.read(4), Err(Fault::Address { addr: 4, access: Access::Read }));
        assert_eq!(mem.write(4, 0), Err(Fault::Address { addr: 4, access: Access::Write }));
    }

    #[test]
    fn test_read_word_little_endian() {
        let mut mem = ByteMemory::new(4);
        mem.write(2, 0x0C).unwrap();
        mem.write(3, 0x94).unwrap();
        assert_eq!(mem.read_word(1), Ok(0x940C));
    }

    #[test]
    fn test_multiplexer_translates_and_faults_in_gaps() {
        let mut mux = Multiplexer::new()
            .map(0x00, ByteMemory::new(0x10)).unwrap()
            .map(0x20, ByteMemory::new(0x10)).unwrap();
        mux.write(0x25, 7).unwrap();
        assert_eq!(mux.read(0x25), Ok(7));
        assert_eq!(mux.read(0x05), Ok(0));
        assert_eq!(mux.read(0x18), Err(Fault::Address { addr: 0x18, access: Access::Read }));
        assert_eq!(mux.write(0x30, 1), Err(Fault::Address { addr: 0x30, access: Access::Write }));
        assert_eq!(mux.size(), 0x30);
    }

    #[test]
    fn test_multiplexer_keeps_regions_sorted() {
        let mux = Multiplexer::new()
            .map(0x100, ByteMemory::new(4)).unwrap()
            .map(0x000, ByteMemory::new(4)).unwrap();
        assert_eq!(mux.layout(), vec![(0x000, 4), (0x100, 4)]);
        assert!(mux.is_mapped(0x103));
        assert!(!mux.is_mapped(0x104));
    }

    #[test]
    fn test_overlap_rejected() {
        let err = Multiplexer::new()
            .map(0x00, ByteMemory::new(0x10)).unwrap()
            .map(0x08, ByteMemory::new(0x10))
            .err();
        assert_eq!(err, Some(Fault::RegionOverlap { base: 0x08, size: 0x10 }));
    }

    #[test]
    fn test_map_past_address_space_end_rejected() {
        let err = Multiplexer::new().map(usize::MAX, ByteMemory::new(2)).err();
        assert_eq!(err, Some(Fault::RegionOverlap { base: usize::MAX, size: 2 }));
        // an empty region ending exactly at the top is fine
        assert!(Multiplexer::new().map(usize::MAX, ByteMemory::new(0)).is_ok());
    }

    #[test]
    fn test_io_memory_routes_port_registers() {
        let wire = Wire::new(&["PB0"]);
        let port = Port::new("B", PortAddrs { pin: 0x03, ddr: 0x04, port: 0x05 }, vec![wire.clone()]).unwrap();
        let mut io = IoMemory::new(ByteMemory::new(64), vec![port]);
        io.write(0x04, 0x01).unwrap();
        io.write(0x05, 0x01).unwrap();
        assert!(wire.is_high());
        assert_eq!(io.read(0x03), Ok(0x01));
        // Plain cells still behave as memory
        io.write(0x3F, 0x80).unwrap();
        assert_eq!(io.read(0x3F), Ok(0x80));
        io.reset();
        assert_eq!(io.read(0x04), Ok(0x00));
        assert_eq!(io.read(0x3F), Ok(0x00));
    }

    #[test]
    fn test_save_restore_roundtrip() {
        let mut mux = Multiplexer::new()
            .map(0x00, ByteMemory::new(8)).unwrap()
            .map(0x10, ByteMemory::new(8)).unwrap();
        mux.write(0x03, 0x33).unwrap();
        mux.write(0x17, 0x77).unwrap();
        let mut image = Vec::new();
        mux.save(&mut image);
        assert_eq!(image.len(), 16);
        mux.reset();
        let mut input = image.as_slice();
        mux.restore(&mut input).unwrap();
        assert!(input.is_empty());
        assert_eq!(mux.read(0x03), Ok(0x33));
        assert_eq!(mux.read(0x17), Ok(0x77));
    }

    #[test]
    fn test_restore_truncated_image() {
        let mut mem = ByteMemory::new(8);
        let mut input: &[u8] = &[1, 2, 3];
        assert!(matches!(mem.restore(&mut input), Err(Fault::Bounds { .. })));
    }
}
