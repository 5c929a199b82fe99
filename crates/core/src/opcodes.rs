//! AVR instruction decoder.
//!
//! Decodes 16-bit (and 32-bit) instruction words into [`Instruction`]. Only
//! the subset executed by [`crate::cpu::Avr`] is recognised; anything else
//! decodes to [`Instruction::Unknown`]. Instructions are grouped by operand
//! shape so the executor can share one arm per group.

/// Two-register ALU operations (`Rd, Rr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Or,
    Eor,
    Mov,
    Cp,
    Cpc,
    Cpse,
}

/// Register-immediate operations (`Rd, K`, d in 16..31).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmOp {
    Cpi,
    Sbci,
    Subi,
    Ori,
    Andi,
    Ldi,
}

/// Single-register operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Com,
    Neg,
    Swap,
    Inc,
    Asr,
    Lsr,
    Ror,
    Dec,
}

/// Pointer register pair used by LD/ST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    X,
    Y,
    Z,
}

/// LD/ST addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Plain,
    PostInc,
    PreDec,
    /// Y+q / Z+q displacement
    Disp(u8),
}

/// Decoded instruction. Register fields are 0–31; I/O addresses `a` are in
/// I/O space (data-space address minus 0x20).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Alu { op: AluOp, d: u8, r: u8 },
    Imm { op: ImmOp, d: u8, k: u8 },
    Unary { op: UnaryOp, d: u8 },
    /// ADIW (`sub == false`) / SBIW on the pair starting at `d`
    Word { sub: bool, d: u8, k: u8 },
    Movw { d: u8, r: u8 },
    Load { d: u8, ptr: Pointer, mode: Mode },
    Store { r: u8, ptr: Pointer, mode: Mode },
    Lds { d: u8, k: u16 },
    Sts { k: u16, r: u8 },
    Push { r: u8 },
    Pop { d: u8 },
    /// LPM Rd, Z (optionally Z+)
    Lpm { d: u8, inc: bool },
    In { d: u8, a: u8 },
    Out { a: u8, r: u8 },
    /// SBI (`set`) / CBI
    IoBit { a: u8, b: u8, set: bool },
    /// SBIS (`if_set`) / SBIC
    SkipIo { a: u8, b: u8, if_set: bool },
    /// SBRS (`if_set`) / SBRC
    SkipReg { r: u8, b: u8, if_set: bool },
    /// BRBS (`if_set`) / BRBC
    Branch { s: u8, k: i8, if_set: bool },
    Rjmp { k: i16 },
    Rcall { k: i16 },
    Jmp { k: u32 },
    Call { k: u32 },
    Ijmp,
    Icall,
    Ret,
    Reti,
    Bset { s: u8 },
    Bclr { s: u8 },
    Sleep,
    Wdr,
    Unknown(u16),
}

/// True for the four 32-bit encodings (JMP, CALL, LDS, STS).
pub fn is_two_word(word: u16) -> bool {
    matches!(word & 0xFE0E, 0x940C | 0x940E) || matches!(word & 0xFE0F, 0x9000 | 0x9200)
}

#[inline]
fn rd5(word: u16) -> u8 {
    ((word >> 4) & 0x1F) as u8
}

#[inline]
fn rr5(word: u16) -> u8 {
    (((word >> 5) & 0x10) | (word & 0x0F)) as u8
}

#[inline]
fn rd4_k8(word: u16) -> (u8, u8) {
    let d = ((word >> 4) & 0x0F) as u8 + 16;
    let k = (((word >> 4) & 0xF0) | (word & 0x0F)) as u8;
    (d, k)
}

#[inline]
fn io5_bit(word: u16) -> (u8, u8) {
    (((word >> 3) & 0x1F) as u8, (word & 7) as u8)
}

fn sign_extend(value: u16, bits: u32) -> i16 {
    let shift = 16 - bits;
    ((value << shift) as i16) >> shift
}

/// Decode `word` (with `next` for 32-bit forms). Returns the instruction and
/// its size in words.
pub fn decode(word: u16, next: u16) -> (Instruction, u8) {
    if is_two_word(word) {
        let k = (((word as u32 >> 3) & 0x3E) | (word as u32 & 1)) << 16 | next as u32;
        let inst = match word & 0xFE0F {
            0x9000 => Instruction::Lds { d: rd5(word), k: next },
            0x9200 => Instruction::Sts { k: next, r: rd5(word) },
            _ if word & 0x0002 == 0 => Instruction::Jmp { k },
            _ => Instruction::Call { k },
        };
        return (inst, 2);
    }
    (decode_one(word), 1)
}

fn decode_one(word: u16) -> Instruction {
    use Instruction::*;

    match word {
        0x0000 => return Nop,
        0x9409 => return Ijmp,
        0x9509 => return Icall,
        0x9508 => return Ret,
        0x9518 => return Reti,
        0x9588 => return Sleep,
        0x95A8 => return Wdr,
        0x95C8 => return Lpm { d: 0, inc: false },
        _ => {}
    }
    match word & 0xFF8F {
        0x9408 => return Bset { s: ((word >> 4) & 7) as u8 },
        0x9488 => return Bclr { s: ((word >> 4) & 7) as u8 },
        _ => {}
    }

    let alu = |op| Alu { op, d: rd5(word), r: rr5(word) };
    let imm = |op| {
        let (d, k) = rd4_k8(word);
        Imm { op, d, k }
    };

    match word >> 12 {
        0x0 => match word & 0xFC00 {
            0x0000 if word & 0xFF00 == 0x0100 => {
                Movw { d: ((word >> 4) & 0x0F) as u8 * 2, r: (word & 0x0F) as u8 * 2 }
            }
            0x0400 => alu(AluOp::Cpc),
            0x0800 => alu(AluOp::Sbc),
            0x0C00 => alu(AluOp::Add),
            _ => Unknown(word),
        },
        0x1 => match word & 0xFC00 {
            0x1000 => alu(AluOp::Cpse),
            0x1400 => alu(AluOp::Cp),
            0x1800 => alu(AluOp::Sub),
            _ => alu(AluOp::Adc),
        },
        0x2 => match word & 0xFC00 {
            0x2000 => alu(AluOp::And),
            0x2400 => alu(AluOp::Eor),
            0x2800 => alu(AluOp::Or),
            _ => alu(AluOp::Mov),
        },
        0x3 => imm(ImmOp::Cpi),
        0x4 => imm(ImmOp::Sbci),
        0x5 => imm(ImmOp::Subi),
        0x6 => imm(ImmOp::Ori),
        0x7 => imm(ImmOp::Andi),
        0xE => imm(ImmOp::Ldi),
        0x8 | 0xA => {
            let q = ((word >> 8) & 0x20) | ((word >> 7) & 0x18) | (word & 0x07);
            let ptr = if word & 0x0008 != 0 { Pointer::Y } else { Pointer::Z };
            let mode = if q == 0 { Mode::Plain } else { Mode::Disp(q as u8) };
            if word & 0x0200 == 0 {
                Load { d: rd5(word), ptr, mode }
            } else {
                Store { r: rd5(word), ptr, mode }
            }
        }
        0x9 => decode_1001(word),
        0xB => {
            let a = (((word >> 5) & 0x30) | (word & 0x0F)) as u8;
            if word & 0x0800 == 0 {
                In { d: rd5(word), a }
            } else {
                Out { a, r: rd5(word) }
            }
        }
        0xC => Rjmp { k: sign_extend(word & 0x0FFF, 12) },
        0xD => Rcall { k: sign_extend(word & 0x0FFF, 12) },
        _ => decode_1111(word),
    }
}

fn decode_1001(word: u16) -> Instruction {
    use Instruction::*;

    let reg = rd5(word);
    match word & 0xFE00 {
        0x9000 => {
            return match word & 0x000F {
                0x1 => Load { d: reg, ptr: Pointer::Z, mode: Mode::PostInc },
                0x2 => Load { d: reg, ptr: Pointer::Z, mode: Mode::PreDec },
                0x4 => Lpm { d: reg, inc: false },
                0x5 => Lpm { d: reg, inc: true },
                0x9 => Load { d: reg, ptr: Pointer::Y, mode: Mode::PostInc },
                0xA => Load { d: reg, ptr: Pointer::Y, mode: Mode::PreDec },
                0xC => Load { d: reg, ptr: Pointer::X, mode: Mode::Plain },
                0xD => Load { d: reg, ptr: Pointer::X, mode: Mode::PostInc },
                0xE => Load { d: reg, ptr: Pointer::X, mode: Mode::PreDec },
                0xF => Pop { d: reg },
                _ => Unknown(word),
            };
        }
        0x9200 => {
            return match word & 0x000F {
                0x1 => Store { r: reg, ptr: Pointer::Z, mode: Mode::PostInc },
                0x2 => Store { r: reg, ptr: Pointer::Z, mode: Mode::PreDec },
                0x9 => Store { r: reg, ptr: Pointer::Y, mode: Mode::PostInc },
                0xA => Store { r: reg, ptr: Pointer::Y, mode: Mode::PreDec },
                0xC => Store { r: reg, ptr: Pointer::X, mode: Mode::Plain },
                0xD => Store { r: reg, ptr: Pointer::X, mode: Mode::PostInc },
                0xE => Store { r: reg, ptr: Pointer::X, mode: Mode::PreDec },
                0xF => Push { r: reg },
                _ => Unknown(word),
            };
        }
        0x9400 => {
            let op = match word & 0x000F {
                0x0 => UnaryOp::Com,
                0x1 => UnaryOp::Neg,
                0x2 => UnaryOp::Swap,
                0x3 => UnaryOp::Inc,
                0x5 => UnaryOp::Asr,
                0x6 => UnaryOp::Lsr,
                0x7 => UnaryOp::Ror,
                0xA => UnaryOp::Dec,
                _ => return Unknown(word),
            };
            return Unary { op, d: reg };
        }
        _ => {}
    }

    match word & 0xFF00 {
        0x9600 | 0x9700 => {
            let d = ((word >> 4) & 3) as u8 * 2 + 24;
            let k = (((word >> 2) & 0x30) | (word & 0x0F)) as u8;
            Word { sub: word & 0x0100 != 0, d, k }
        }
        0x9800 | 0x9A00 => {
            let (a, b) = io5_bit(word);
            IoBit { a, b, set: word & 0x0200 != 0 }
        }
        0x9900 | 0x9B00 => {
            let (a, b) = io5_bit(word);
            SkipIo { a, b, if_set: word & 0x0200 != 0 }
        }
        _ => Unknown(word),
    }
}

fn decode_1111(word: u16) -> Instruction {
    let s = (word & 7) as u8;
    match word & 0xFC00 {
        0xF000 | 0xF400 => Instruction::Branch {
            s,
            k: sign_extend((word >> 3) & 0x7F, 7) as i8,
            if_set: word & 0x0400 == 0,
        },
        0xFC00 if word & 0x0008 == 0 => Instruction::SkipReg {
            r: rd5(word),
            b: s,
            if_set: word & 0x0200 != 0,
        },
        _ => Instruction::Unknown(word),
    }
}
