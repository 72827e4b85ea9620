//! Instruction set of the sampling coprocessor.
//!
//! Instructions are fixed 32-bit words. The opcode lives in the top six bits;
//! register fields are two bits each below it, and the low half-word carries
//! immediates, arena offsets, and branch thresholds:
//!
//! ```text
//! bit 31        26 25  24 23  22 21  20 19          16 15             0
//!     +----------+------+------+------+--------------+----------------+
//!     |  opcode  |  rd  |  rs  |  rt  |   (varies)   |     imm16      |
//!     +----------+------+------+------+--------------+----------------+
//! ```
//!
//! `RdTicks` stores its bit offset in [16, 24); `BranchGe` stores its target
//! word in [16, 26), which caps the instruction store at 1024 words.

use std::fmt;

use crate::error::{ProgramError, ProgramResult};

/// Size of the instruction store in 32-bit words.
///
/// Fixed by the branch target field width.
pub const MAX_PROGRAM_WORDS: usize = 1 << 10;

/// Number of general-purpose registers.
pub const NUM_REGS: usize = 4;

const OPCODE_SHIFT: u32 = 26;
const RD_SHIFT: u32 = 24;
const RS_SHIFT: u32 = 22;
const RT_SHIFT: u32 = 20;
const SHIFT_FIELD_SHIFT: u32 = 16;
const TARGET_SHIFT: u32 = 16;
const TARGET_MASK: u32 = (MAX_PROGRAM_WORDS as u32) - 1;
const IMM_MASK: u32 = 0xFFFF;
const REG_MASK: u32 = 0b11;

const OP_MOVI: u32 = 0x01;
const OP_MOVR: u32 = 0x02;
const OP_ADDI: u32 = 0x03;
const OP_ADDR: u32 = 0x04;
const OP_LD: u32 = 0x05;
const OP_ST: u32 = 0x06;
const OP_LATCH: u32 = 0x07;
const OP_RDTICKS: u32 = 0x08;
const OP_BGE: u32 = 0x09;
const OP_JUMP: u32 = 0x0A;
const OP_HALT: u32 = 0x0B;
const OP_WAKE: u32 = 0x0C;

/// A general-purpose register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    /// Register 0, the implicit operand of conditional branches.
    R0,
    /// Register 1.
    R1,
    /// Register 2.
    R2,
    /// Register 3.
    R3,
}

impl Reg {
    /// Register file index.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    fn bits(self) -> u32 {
        self as u32
    }

    fn from_bits(bits: u32) -> Self {
        match bits & REG_MASK {
            0 => Reg::R0,
            1 => Reg::R1,
            2 => Reg::R2,
            _ => Reg::R3,
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index())
    }
}

/// One 16-bit window of the latched 48-bit snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickField {
    /// Bits [0, 16).
    Low,
    /// Bits [16, 32).
    Mid,
    /// Bits [32, 48).
    High,
}

impl TickField {
    /// Bit offset of this window within the snapshot.
    #[must_use]
    pub fn bit_offset(self) -> u8 {
        match self {
            TickField::Low => 0,
            TickField::Mid => 16,
            TickField::High => 32,
        }
    }

    fn from_bit_offset(offset: u8) -> Option<Self> {
        match offset {
            0 => Some(TickField::Low),
            16 => Some(TickField::Mid),
            32 => Some(TickField::High),
            _ => None,
        }
    }
}

/// One coprocessor instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insn {
    /// Load a 16-bit immediate into `dst`.
    MovI {
        /// Destination register.
        dst: Reg,
        /// Immediate value.
        imm: u16,
    },
    /// Copy `src` into `dst`.
    MovR {
        /// Destination register.
        dst: Reg,
        /// Source register.
        src: Reg,
    },
    /// `dst = src + imm`, wrapping at 16 bits.
    AddI {
        /// Destination register.
        dst: Reg,
        /// Source register.
        src: Reg,
        /// Immediate addend.
        imm: u16,
    },
    /// `dst = lhs + rhs`, wrapping at 16 bits.
    AddR {
        /// Destination register.
        dst: Reg,
        /// Left operand.
        lhs: Reg,
        /// Right operand.
        rhs: Reg,
    },
    /// Load the arena word at `base + offset` into `dst`.
    Ld {
        /// Destination register.
        dst: Reg,
        /// Base address register.
        base: Reg,
        /// Word offset added to the base.
        offset: u16,
    },
    /// Store `src` into the arena word at `base + offset`.
    St {
        /// Source register.
        src: Reg,
        /// Base address register.
        base: Reg,
        /// Word offset added to the base.
        offset: u16,
    },
    /// Latch the live tick counter into the snapshot register.
    ///
    /// The three 16-bit reads that follow all see this one snapshot, so a
    /// sample is internally consistent even though it takes three stores.
    LatchTicks,
    /// Read one 16-bit window of the latched snapshot into `dst`.
    RdTicks {
        /// Destination register.
        dst: Reg,
        /// Which window of the snapshot to read.
        field: TickField,
    },
    /// Branch to `target` when R0 >= `threshold`.
    BranchGe {
        /// Unsigned threshold compared against R0.
        threshold: u16,
        /// Absolute word index of the branch target.
        target: u16,
    },
    /// Unconditional branch to `target`.
    Jump {
        /// Absolute word index of the branch target.
        target: u16,
    },
    /// Stop executing until the wake timer starts the program again.
    Halt,
    /// Raise a wake request for the main processor.
    Wake,
}

impl Insn {
    /// Encode into a 32-bit word.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::BranchOutOfRange`] when a branch target does
    /// not fit its field. Other instructions always encode.
    pub fn encode(self) -> ProgramResult<u32> {
        let word = match self {
            Insn::MovI { dst, imm } => {
                (OP_MOVI << OPCODE_SHIFT) | (dst.bits() << RD_SHIFT) | u32::from(imm)
            }
            Insn::MovR { dst, src } => {
                (OP_MOVR << OPCODE_SHIFT) | (dst.bits() << RD_SHIFT) | (src.bits() << RS_SHIFT)
            }
            Insn::AddI { dst, src, imm } => {
                (OP_ADDI << OPCODE_SHIFT)
                    | (dst.bits() << RD_SHIFT)
                    | (src.bits() << RS_SHIFT)
                    | u32::from(imm)
            }
            Insn::AddR { dst, lhs, rhs } => {
                (OP_ADDR << OPCODE_SHIFT)
                    | (dst.bits() << RD_SHIFT)
                    | (lhs.bits() << RS_SHIFT)
                    | (rhs.bits() << RT_SHIFT)
            }
            Insn::Ld { dst, base, offset } => {
                (OP_LD << OPCODE_SHIFT)
                    | (dst.bits() << RD_SHIFT)
                    | (base.bits() << RS_SHIFT)
                    | u32::from(offset)
            }
            Insn::St { src, base, offset } => {
                (OP_ST << OPCODE_SHIFT)
                    | (src.bits() << RD_SHIFT)
                    | (base.bits() << RS_SHIFT)
                    | u32::from(offset)
            }
            Insn::LatchTicks => OP_LATCH << OPCODE_SHIFT,
            Insn::RdTicks { dst, field } => {
                (OP_RDTICKS << OPCODE_SHIFT)
                    | (dst.bits() << RD_SHIFT)
                    | (u32::from(field.bit_offset()) << SHIFT_FIELD_SHIFT)
            }
            Insn::BranchGe { threshold, target } => {
                let target = Self::check_target(target)?;
                (OP_BGE << OPCODE_SHIFT) | (target << TARGET_SHIFT) | u32::from(threshold)
            }
            Insn::Jump { target } => {
                let target = Self::check_target(target)?;
                (OP_JUMP << OPCODE_SHIFT) | target
            }
            Insn::Halt => OP_HALT << OPCODE_SHIFT,
            Insn::Wake => OP_WAKE << OPCODE_SHIFT,
        };
        Ok(word)
    }

    /// Decode a 32-bit word.
    ///
    /// Decoding is strict: unknown opcodes, spare bits, out-of-range branch
    /// targets, and snapshot offsets other than 0/16/32 are all rejected, so
    /// corrupted instruction stores fault instead of running garbage.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::InvalidEncoding`] for any word `encode` could
    /// not have produced.
    pub fn decode(word: u32) -> ProgramResult<Self> {
        let opcode = word >> OPCODE_SHIFT;
        let rd = Reg::from_bits(word >> RD_SHIFT);
        let rs = Reg::from_bits(word >> RS_SHIFT);
        let rt = Reg::from_bits(word >> RT_SHIFT);
        let imm = (word & IMM_MASK) as u16;

        let insn = match opcode {
            OP_MOVI => Insn::MovI { dst: rd, imm },
            OP_MOVR => Insn::MovR { dst: rd, src: rs },
            OP_ADDI => Insn::AddI {
                dst: rd,
                src: rs,
                imm,
            },
            OP_ADDR => Insn::AddR {
                dst: rd,
                lhs: rs,
                rhs: rt,
            },
            OP_LD => Insn::Ld {
                dst: rd,
                base: rs,
                offset: imm,
            },
            OP_ST => Insn::St {
                src: rd,
                base: rs,
                offset: imm,
            },
            OP_LATCH => Insn::LatchTicks,
            OP_RDTICKS => {
                let offset = ((word >> SHIFT_FIELD_SHIFT) & 0xFF) as u8;
                let Some(field) = TickField::from_bit_offset(offset) else {
                    return Err(ProgramError::InvalidEncoding { word });
                };
                Insn::RdTicks { dst: rd, field }
            }
            OP_BGE => Insn::BranchGe {
                threshold: imm,
                target: ((word >> TARGET_SHIFT) & TARGET_MASK) as u16,
            },
            OP_JUMP => Insn::Jump {
                target: (word & TARGET_MASK) as u16,
            },
            OP_HALT => Insn::Halt,
            OP_WAKE => Insn::Wake,
            _ => return Err(ProgramError::InvalidEncoding { word }),
        };

        // Spare bits must be zero: the canonical re-encoding has to match.
        match insn.encode() {
            Ok(canonical) if canonical == word => Ok(insn),
            _ => Err(ProgramError::InvalidEncoding { word }),
        }
    }

    fn check_target(target: u16) -> ProgramResult<u32> {
        if usize::from(target) >= MAX_PROGRAM_WORDS {
            return Err(ProgramError::BranchOutOfRange {
                target: usize::from(target),
                limit: MAX_PROGRAM_WORDS,
            });
        }
        Ok(u32::from(target))
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Insn::MovI { dst, imm } => write!(f, "movi {dst}, {imm}"),
            Insn::MovR { dst, src } => write!(f, "movr {dst}, {src}"),
            Insn::AddI { dst, src, imm } => write!(f, "addi {dst}, {src}, {imm}"),
            Insn::AddR { dst, lhs, rhs } => write!(f, "addr {dst}, {lhs}, {rhs}"),
            Insn::Ld { dst, base, offset } => write!(f, "ld {dst}, [{base}+{offset}]"),
            Insn::St { src, base, offset } => write!(f, "st {src}, [{base}+{offset}]"),
            Insn::LatchTicks => f.write_str("latch"),
            Insn::RdTicks { dst, field } => write!(f, "rdticks {dst}, {}", field.bit_offset()),
            Insn::BranchGe { threshold, target } => write!(f, "bge {threshold}, @{target}"),
            Insn::Jump { target } => write!(f, "jmp @{target}"),
            Insn::Halt => f.write_str("halt"),
            Insn::Wake => f.write_str("wake"),
        }
    }
}
