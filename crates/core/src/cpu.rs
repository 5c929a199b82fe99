//! Instruction core contract and the reference ATmega32u4 core.
//!
//! [`Core`] is the seam between the machine and whatever executes firmware:
//! the machine only needs to reset it, step it, and reach its pins and
//! memories. [`Avr`] is the bundled implementation. It executes a subset of
//! the AVR instruction set large enough for hand-written and small compiled
//! programs.
//!
//! Every register, SREG and SP access goes through the data-space
//! [`Multiplexer`], so a stray pointer produces the same [`Fault`] as a
//! stray `LDS`. Flag computation follows the ATmega32u4 datasheet, including
//! the SBC/SBCI/CPC carry chain where Z is only ever cleared.

use log::warn;

use crate::error::{Access, Fault};
use crate::memory::{ByteMemory, IoMemory, Multiplexer, Region};
use crate::opcodes::{decode, is_two_word, AluOp, ImmOp, Instruction, Mode, Pointer, UnaryOp};
use crate::pins::PinMap;
use crate::port::{Port, PortAddrs};
use crate::wire::Wire;

// SREG bit positions
pub const SREG_C: u8 = 0;
pub const SREG_Z: u8 = 1;
pub const SREG_N: u8 = 2;
pub const SREG_V: u8 = 3;
pub const SREG_S: u8 = 4;
pub const SREG_H: u8 = 5;
pub const SREG_T: u8 = 6;
pub const SREG_I: u8 = 7;

/// Data-space addresses of the CPU registers that live in I/O space.
pub const SPL_ADDR: usize = 0x5D;
pub const SPH_ADDR: usize = 0x5E;
pub const SREG_ADDR: usize = 0x5F;

/// Offset between I/O-space and data-space addresses.
pub const IO_OFFSET: usize = 0x20;

pub const FLASH_SIZE: usize = 32 * 1024;
pub const SRAM_BASE: usize = 0x0100;
pub const SRAM_SIZE: usize = 2560;
/// Highest SRAM address; initial stack pointer.
pub const RAMEND: u16 = 0x0AFF;

/// Port B register addresses in I/O space.
pub const PORTB_ADDRS: PortAddrs = PortAddrs { pin: 0x03, ddr: 0x04, port: 0x05 };

/// What one [`Core::step`] executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    /// Byte address of the first instruction word
    pub addr: usize,
    /// Instruction size in 16-bit words
    pub words: u8,
    pub cycles: u8,
}

/// An instruction-execution engine with pins, a code space and a data space.
pub trait Core {
    /// Return to power-on state. Wires are not touched.
    fn reset(&mut self) -> Result<(), Fault>;
    /// Execute one instruction. On a fault the program counter is left at
    /// the faulting instruction.
    fn step(&mut self) -> Result<Executed, Fault>;
    /// Pin table. [`PinMap::by_number`] takes the 1-based package pin
    /// number; the [`PinMap::pins`] slice starts at pin 1.
    fn pins(&self) -> &PinMap;
    fn pin(&self, alias: &str) -> Option<&Wire> {
        self.pins().get(alias)
    }
    fn code(&self) -> &ByteMemory;
    fn code_mut(&mut self) -> &mut ByteMemory;
    fn data(&self) -> &Multiplexer;
    fn data_mut(&mut self) -> &mut Multiplexer;
    /// Program counter as a word address.
    fn pc(&self) -> u32;
    fn set_pc(&mut self, pc: u32);
    fn cycles(&self) -> u64;
    fn set_cycles(&mut self, cycles: u64);
}

// --- Flag helpers ---
//
// Each takes the current SREG and returns the updated one; I and T are kept.

fn bit(value: u8, n: u8) -> u8 {
    (value >> n) & 1
}

fn flags_add(sreg: u8, rd: u8, rr: u8, r: u8) -> u8 {
    let (r7, rd7, rr7) = (bit(r, 7), bit(rd, 7), bit(rr, 7));
    let (r3, rd3, rr3) = (bit(r, 3), bit(rd, 3), bit(rr, 3));
    let h = (rd3 & rr3) | (rr3 & (r3 ^ 1)) | ((r3 ^ 1) & rd3);
    let v = (rd7 & rr7 & (r7 ^ 1)) | ((rd7 ^ 1) & (rr7 ^ 1) & r7);
    let c = (rd7 & rr7) | (rr7 & (r7 ^ 1)) | ((r7 ^ 1) & rd7);
    let n = r7;
    let z = (r == 0) as u8;
    (sreg & 0b1100_0000) | (h << 5) | ((n ^ v) << 4) | (v << 3) | (n << 2) | (z << 1) | c
}

/// SUB/SBC/CP/CPC flags. With `keep_z` (the carry-chain forms) a zero
/// result leaves Z as it was instead of setting it.
fn flags_sub(sreg: u8, rd: u8, rr: u8, r: u8, keep_z: bool) -> u8 {
    let (r7, rd7, rr7) = (bit(r, 7), bit(rd, 7), bit(rr, 7));
    let (r3, rd3, rr3) = (bit(r, 3), bit(rd, 3), bit(rr, 3));
    let h = ((rd3 ^ 1) & rr3) | (rr3 & r3) | (r3 & (rd3 ^ 1));
    let v = (rd7 & (rr7 ^ 1) & (r7 ^ 1)) | ((rd7 ^ 1) & rr7 & r7);
    let c = ((rd7 ^ 1) & rr7) | (rr7 & r7) | (r7 & (rd7 ^ 1));
    let n = r7;
    let z = match (r == 0, keep_z) {
        (false, _) => 0,
        (true, false) => 1,
        (true, true) => bit(sreg, SREG_Z),
    };
    (sreg & 0b1100_0000) | (h << 5) | ((n ^ v) << 4) | (v << 3) | (n << 2) | (z << 1) | c
}

/// AND/OR/EOR flags. V is cleared, C and H are kept.
fn flags_logic(sreg: u8, r: u8) -> u8 {
    let n = bit(r, 7);
    let z = (r == 0) as u8;
    (sreg & 0b1110_0001) | (n << 4) | (n << 2) | (z << 1)
}

/// Flags for the right shifts, where V = N ^ C.
fn flags_shift(sreg: u8, rd: u8, r: u8) -> u8 {
    let c = rd & 1;
    let n = bit(r, 7);
    let v = n ^ c;
    let z = (r == 0) as u8;
    (sreg & 0b1110_0000) | ((n ^ v) << 4) | (v << 3) | (n << 2) | (z << 1) | c
}

impl Pointer {
    /// Low register of the pointer pair.
    fn register(self) -> u8 {
        match self {
            Pointer::X => 26,
            Pointer::Y => 28,
            Pointer::Z => 30,
        }
    }
}

/// Reference ATmega32u4 core.
///
/// Owns the pin table, the 32 KiB flash and the data space. Port B is the
/// only GPIO port; its register triplet is overlaid on the I/O region.
pub struct Avr {
    pins: PinMap,
    code: ByteMemory,
    data: Multiplexer,
    /// I/O addresses where writing a 1 toggles the output latch
    toggle_registers: Vec<usize>,
    /// Program counter (word address)
    pc: u32,
    cycles: u64,
}

impl Avr {
    /// Allocate the 44-pin package, build port B and compose the data space.
    pub fn atmega32u4() -> Result<Self, Fault> {
        let pins = PinMap::atmega32u4();
        let port_b_wires = (0..8)
            .map(|bit| pins.require(&format!("PB{}", bit)).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let port_b = Port::new("B", PORTB_ADDRS, port_b_wires)?;
        let io = IoMemory::new(ByteMemory::new(64), vec![port_b]);

        let data = Multiplexer::new()
            .map(0x0000, ByteMemory::new(32))?
            .map(IO_OFFSET, io)?
            .map(0x0060, ByteMemory::new(160))?
            .map(SRAM_BASE, ByteMemory::new(SRAM_SIZE))?;

        let mut avr = Avr {
            pins,
            code: ByteMemory::new(FLASH_SIZE),
            data,
            toggle_registers: vec![PORTB_ADDRS.pin],
            pc: 0,
            cycles: 0,
        };
        avr.reset()?;
        Ok(avr)
    }

    #[inline]
    pub fn reg(&self, r: u8) -> Result<u8, Fault> {
        self.data.read(r as usize)
    }

    #[inline]
    pub fn set_reg(&mut self, r: u8, value: u8) -> Result<(), Fault> {
        self.data.write(r as usize, value)
    }

    /// Little-endian register pair starting at `r`.
    pub fn pair(&self, r: u8) -> Result<u16, Fault> {
        Ok(self.reg(r)? as u16 | (self.reg(r + 1)? as u16) << 8)
    }

    pub fn set_pair(&mut self, r: u8, value: u16) -> Result<(), Fault> {
        self.set_reg(r, value as u8)?;
        self.set_reg(r + 1, (value >> 8) as u8)
    }

    pub fn sreg(&self) -> Result<u8, Fault> {
        self.data.read(SREG_ADDR)
    }

    fn set_sreg(&mut self, value: u8) -> Result<(), Fault> {
        self.data.write(SREG_ADDR, value)
    }

    pub fn flag(&self, n: u8) -> Result<bool, Fault> {
        Ok(bit(self.sreg()?, n) == 1)
    }

    pub fn sp(&self) -> Result<u16, Fault> {
        Ok(self.data.read(SPL_ADDR)? as u16 | (self.data.read(SPH_ADDR)? as u16) << 8)
    }

    fn set_sp(&mut self, value: u16) -> Result<(), Fault> {
        self.data.write(SPL_ADDR, value as u8)?;
        self.data.write(SPH_ADDR, (value >> 8) as u8)
    }

    fn push(&mut self, value: u8) -> Result<(), Fault> {
        let sp = self.sp()?;
        self.data.write(sp as usize, value)?;
        self.set_sp(sp.wrapping_sub(1))
    }

    fn pop(&mut self) -> Result<u8, Fault> {
        let sp = self.sp()?.wrapping_add(1);
        self.set_sp(sp)?;
        self.data.read(sp as usize)
    }

    /// Push a return address, low byte first.
    fn push_pc(&mut self, pc: u32) -> Result<(), Fault> {
        self.push(pc as u8)?;
        self.push((pc >> 8) as u8)
    }

    fn pop_pc(&mut self) -> Result<u32, Fault> {
        let hi = self.pop()? as u32;
        let lo = self.pop()? as u32;
        Ok(hi << 8 | lo)
    }

    fn flash_words(&self) -> u32 {
        (self.code.size() / 2).max(1) as u32
    }

    /// Program counter arithmetic wraps around the end of flash.
    fn jump_relative(&mut self, k: i32) {
        let words = self.flash_words() as i64;
        self.pc = (self.pc as i64 + k as i64).rem_euclid(words) as u32;
    }

    fn jump(&mut self, target: u32) {
        self.pc = target % self.flash_words();
    }

    fn fetch(&self, word_addr: u32) -> Result<u16, Fault> {
        let word_addr = word_addr % self.flash_words();
        self.code
            .read_word(word_addr as usize)
            .map_err(|_| Fault::Address { addr: word_addr as usize * 2, access: Access::Fetch })
    }

    /// Skip the instruction at the current PC; returns the words skipped.
    fn skip_next(&mut self) -> Result<u8, Fault> {
        let words = if is_two_word(self.fetch(self.pc)?) { 2 } else { 1 };
        self.jump_relative(words);
        Ok(words as u8)
    }

    /// Resolve an LD/ST address, applying post-increment or pre-decrement.
    fn effective_address(&mut self, ptr: Pointer, mode: Mode) -> Result<usize, Fault> {
        let r = ptr.register();
        let p = self.pair(r)?;
        let addr = match mode {
            Mode::Plain => p,
            Mode::PostInc => {
                self.set_pair(r, p.wrapping_add(1))?;
                p
            }
            Mode::PreDec => {
                let a = p.wrapping_sub(1);
                self.set_pair(r, a)?;
                a
            }
            Mode::Disp(q) => p.wrapping_add(q as u16),
        };
        Ok(addr as usize)
    }

    fn alu(&mut self, op: AluOp, d: u8, r: u8) -> Result<u8, Fault> {
        let rd = self.reg(d)?;
        let rr = self.reg(r)?;
        let sreg = self.sreg()?;
        let carry = bit(sreg, SREG_C);
        let (result, sreg) = match op {
            AluOp::Add => {
                let res = rd.wrapping_add(rr);
                (Some(res), flags_add(sreg, rd, rr, res))
            }
            AluOp::Adc => {
                let res = rd.wrapping_add(rr).wrapping_add(carry);
                (Some(res), flags_add(sreg, rd, rr, res))
            }
            AluOp::Sub => {
                let res = rd.wrapping_sub(rr);
                (Some(res), flags_sub(sreg, rd, rr, res, false))
            }
            AluOp::Sbc => {
                let res = rd.wrapping_sub(rr).wrapping_sub(carry);
                (Some(res), flags_sub(sreg, rd, rr, res, true))
            }
            AluOp::And => {
                let res = rd & rr;
                (Some(res), flags_logic(sreg, res))
            }
            AluOp::Or => {
                let res = rd | rr;
                (Some(res), flags_logic(sreg, res))
            }
            AluOp::Eor => {
                let res = rd ^ rr;
                (Some(res), flags_logic(sreg, res))
            }
            AluOp::Mov => (Some(rr), sreg),
            AluOp::Cp => (None, flags_sub(sreg, rd, rr, rd.wrapping_sub(rr), false)),
            AluOp::Cpc => {
                let res = rd.wrapping_sub(rr).wrapping_sub(carry);
                (None, flags_sub(sreg, rd, rr, res, true))
            }
            AluOp::Cpse => {
                return if rd == rr { Ok(1 + self.skip_next()?) } else { Ok(1) };
            }
        };
        if let Some(res) = result {
            self.set_reg(d, res)?;
        }
        self.set_sreg(sreg)?;
        Ok(1)
    }

    fn imm(&mut self, op: ImmOp, d: u8, k: u8) -> Result<(), Fault> {
        if op == ImmOp::Ldi {
            return self.set_reg(d, k);
        }
        let rd = self.reg(d)?;
        let sreg = self.sreg()?;
        let carry = bit(sreg, SREG_C);
        let (result, sreg) = match op {
            ImmOp::Cpi => (None, flags_sub(sreg, rd, k, rd.wrapping_sub(k), false)),
            ImmOp::Subi => {
                let res = rd.wrapping_sub(k);
                (Some(res), flags_sub(sreg, rd, k, res, false))
            }
            ImmOp::Sbci => {
                let res = rd.wrapping_sub(k).wrapping_sub(carry);
                (Some(res), flags_sub(sreg, rd, k, res, true))
            }
            ImmOp::Ori => {
                let res = rd | k;
                (Some(res), flags_logic(sreg, res))
            }
            ImmOp::Andi => {
                let res = rd & k;
                (Some(res), flags_logic(sreg, res))
            }
            ImmOp::Ldi => (Some(k), sreg),
        };
        if let Some(res) = result {
            self.set_reg(d, res)?;
        }
        self.set_sreg(sreg)
    }

    fn unary(&mut self, op: UnaryOp, d: u8) -> Result<(), Fault> {
        let rd = self.reg(d)?;
        let sreg = self.sreg()?;
        let (res, sreg) = match op {
            UnaryOp::Com => {
                let res = !rd;
                let n = bit(res, 7);
                let z = (res == 0) as u8;
                (res, (sreg & 0b1110_0000) | (n << 4) | (n << 2) | (z << 1) | 1)
            }
            UnaryOp::Neg => {
                let res = 0u8.wrapping_sub(rd);
                (res, flags_sub(sreg, 0, rd, res, false))
            }
            UnaryOp::Swap => (rd.rotate_left(4), sreg),
            UnaryOp::Inc | UnaryOp::Dec => {
                let (res, v) = if op == UnaryOp::Inc {
                    (rd.wrapping_add(1), (rd == 0x7F) as u8)
                } else {
                    (rd.wrapping_sub(1), (rd == 0x80) as u8)
                };
                let n = bit(res, 7);
                let z = (res == 0) as u8;
                (res, (sreg & 0b1110_0001) | ((n ^ v) << 4) | (v << 3) | (n << 2) | (z << 1))
            }
            UnaryOp::Asr => {
                let res = ((rd as i8) >> 1) as u8;
                (res, flags_shift(sreg, rd, res))
            }
            UnaryOp::Lsr => {
                let res = rd >> 1;
                (res, flags_shift(sreg, rd, res))
            }
            UnaryOp::Ror => {
                let res = (rd >> 1) | (bit(sreg, SREG_C) << 7);
                (res, flags_shift(sreg, rd, res))
            }
        };
        self.set_reg(d, res)?;
        self.set_sreg(sreg)
    }

    fn word_op(&mut self, sub: bool, d: u8, k: u8) -> Result<(), Fault> {
        let val = self.pair(d)?;
        let res = if sub { val.wrapping_sub(k as u16) } else { val.wrapping_add(k as u16) };
        self.set_pair(d, res)?;
        let rdh7 = (val >> 15) as u8;
        let r15 = (res >> 15) as u8;
        let (v, c) = if sub {
            (rdh7 & (r15 ^ 1), r15 & (rdh7 ^ 1))
        } else {
            ((rdh7 ^ 1) & r15, (r15 ^ 1) & rdh7)
        };
        let n = r15;
        let z = (res == 0) as u8;
        let sreg = self.sreg()?;
        self.set_sreg((sreg & 0b1110_0000) | ((n ^ v) << 4) | (v << 3) | (n << 2) | (z << 1) | c)
    }

    /// SBI/CBI. On a toggle register only the addressed bit is written.
    fn io_bit(&mut self, a: u8, b: u8, set: bool) -> Result<(), Fault> {
        let addr = a as usize + IO_OFFSET;
        let value = if self.toggle_registers.contains(&(a as usize)) {
            if set { 1 << b } else { 0 }
        } else {
            let old = self.data.read(addr)?;
            if set { old | 1 << b } else { old & !(1 << b) }
        };
        self.data.write(addr, value)
    }

    /// Execute the instruction at PC; returns its cycle cost.
    fn execute(&mut self, inst: Instruction, addr: usize) -> Result<u8, Fault> {
        use Instruction::*;

        let cycles = match inst {
            Nop | Sleep | Wdr => 1,
            Alu { op, d, r } => self.alu(op, d, r)?,
            Imm { op, d, k } => {
                self.imm(op, d, k)?;
                1
            }
            Unary { op, d } => {
                self.unary(op, d)?;
                1
            }
            Word { sub, d, k } => {
                self.word_op(sub, d, k)?;
                2
            }
            Movw { d, r } => {
                let v = self.pair(r)?;
                self.set_pair(d, v)?;
                1
            }

            // -- Data transfer --
            Load { d, ptr, mode } => {
                let a = self.effective_address(ptr, mode)?;
                let v = self.data.read(a)?;
                self.set_reg(d, v)?;
                2
            }
            Store { r, ptr, mode } => {
                let v = self.reg(r)?;
                let a = self.effective_address(ptr, mode)?;
                self.data.write(a, v)?;
                2
            }
            Lds { d, k } => {
                let v = self.data.read(k as usize)?;
                self.set_reg(d, v)?;
                2
            }
            Sts { k, r } => {
                let v = self.reg(r)?;
                self.data.write(k as usize, v)?;
                2
            }
            Push { r } => {
                let v = self.reg(r)?;
                self.push(v)?;
                2
            }
            Pop { d } => {
                let v = self.pop()?;
                self.set_reg(d, v)?;
                2
            }
            Lpm { d, inc } => {
                let z = self.pair(30)?;
                let v = self.code.read(z as usize)?;
                self.set_reg(d, v)?;
                if inc {
                    self.set_pair(30, z.wrapping_add(1))?;
                }
                3
            }

            // -- I/O --
            In { d, a } => {
                let v = self.data.read(a as usize + IO_OFFSET)?;
                self.set_reg(d, v)?;
                1
            }
            Out { a, r } => {
                let v = self.reg(r)?;
                self.data.write(a as usize + IO_OFFSET, v)?;
                1
            }
            IoBit { a, b, set } => {
                self.io_bit(a, b, set)?;
                2
            }

            // -- Skips and branches --
            SkipIo { a, b, if_set } => {
                let v = self.data.read(a as usize + IO_OFFSET)?;
                if (bit(v, b) == 1) == if_set { 1 + self.skip_next()? } else { 1 }
            }
            SkipReg { r, b, if_set } => {
                let v = self.reg(r)?;
                if (bit(v, b) == 1) == if_set { 1 + self.skip_next()? } else { 1 }
            }
            Branch { s, k, if_set } => {
                if self.flag(s)? == if_set {
                    self.jump_relative(k as i32);
                    2
                } else {
                    1
                }
            }
            Rjmp { k } => {
                self.jump_relative(k as i32);
                2
            }
            Rcall { k } => {
                self.push_pc(self.pc)?;
                self.jump_relative(k as i32);
                3
            }
            Jmp { k } => {
                self.jump(k);
                3
            }
            Call { k } => {
                self.push_pc(self.pc)?;
                self.jump(k);
                4
            }
            Ijmp => {
                let z = self.pair(30)?;
                self.jump(z as u32);
                2
            }
            Icall => {
                self.push_pc(self.pc)?;
                let z = self.pair(30)?;
                self.jump(z as u32);
                3
            }
            Ret => {
                let target = self.pop_pc()?;
                self.jump(target);
                4
            }
            Reti => {
                let target = self.pop_pc()?;
                self.jump(target);
                let sreg = self.sreg()?;
                self.set_sreg(sreg | 1 << SREG_I)?;
                4
            }
            Bset { s } => {
                let sreg = self.sreg()?;
                self.set_sreg(sreg | 1 << s)?;
                1
            }
            Bclr { s } => {
                let sreg = self.sreg()?;
                self.set_sreg(sreg & !(1 << s))?;
                1
            }
            Unknown(word) => {
                warn!("undecodable opcode 0x{:04X} at 0x{:04X}, executed as NOP", word, addr);
                1
            }
        };
        Ok(cycles)
    }
}

impl Core for Avr {
    fn reset(&mut self) -> Result<(), Fault> {
        self.data.reset();
        self.pc = 0;
        self.cycles = 0;
        self.set_sp(RAMEND)
    }

    fn step(&mut self) -> Result<Executed, Fault> {
        let start = self.pc;
        let addr = start as usize * 2;
        let result = self.fetch(start).and_then(|word| {
            let next = if is_two_word(word) { self.fetch(start + 1)? } else { 0 };
            let (inst, words) = decode(word, next);
            self.jump_relative(words as i32);
            let cycles = self.execute(inst, addr)?;
            Ok(Executed { addr, words, cycles })
        });
        match result {
            Ok(executed) => {
                self.cycles += executed.cycles as u64;
                Ok(executed)
            }
            Err(fault) => {
                self.pc = start;
                Err(fault)
            }
        }
    }

    fn pins(&self) -> &PinMap {
        &self.pins
    }

    fn code(&self) -> &ByteMemory {
        &self.code
    }

    fn code_mut(&mut self) -> &mut ByteMemory {
        &mut self.code
    }

    fn data(&self) -> &Multiplexer {
        &self.data
    }

    fn data_mut(&mut self) -> &mut Multiplexer {
        &mut self.data
    }

    fn pc(&self) -> u32 {
        self.pc
    }

    fn set_pc(&mut self, pc: u32) {
        self.jump(pc);
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }

    fn set_cycles(&mut self, cycles: u64) {
        self.cycles = cycles;
    }
}
