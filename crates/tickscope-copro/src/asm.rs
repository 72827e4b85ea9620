//! Two-pass assembler for coprocessor programs.
//!
//! Instructions are emitted in order; branches name [`Label`]s that may be
//! bound later. [`Assembler::assemble`] resolves every label to its word
//! index and encodes the result.

use std::fmt::Write as _;

use crate::error::{ProgramError, ProgramResult};
use crate::isa::{Insn, Reg, TickField, MAX_PROGRAM_WORDS};

/// A branch target in a program under assembly.
///
/// Created with [`Assembler::label`], positioned with [`Assembler::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// An assembled, encoded program ready to load into an instruction store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    words: Vec<u32>,
}

impl Program {
    /// Wrap already-encoded words.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::ProgramTooLarge`] when the words do not fit
    /// the instruction store. The words themselves are not decoded here;
    /// corruption surfaces as a fault when the machine fetches them.
    pub fn from_words(words: Vec<u32>) -> ProgramResult<Self> {
        if words.len() > MAX_PROGRAM_WORDS {
            return Err(ProgramError::ProgramTooLarge {
                words: words.len(),
                limit: MAX_PROGRAM_WORDS,
            });
        }
        Ok(Self { words })
    }

    /// The encoded instruction words.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Number of instruction words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the program holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Decode back into instructions.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::InvalidEncoding`] on the first word that does
    /// not decode.
    pub fn disassemble(&self) -> ProgramResult<Vec<Insn>> {
        self.words.iter().map(|&w| Insn::decode(w)).collect()
    }

    /// Render a human-readable listing, one instruction per line.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::InvalidEncoding`] if any word does not decode.
    pub fn listing(&self) -> ProgramResult<String> {
        let mut out = String::new();
        for (idx, insn) in self.disassemble()?.into_iter().enumerate() {
            let _ = writeln!(out, "{idx:3}: {insn}");
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Fixed(Insn),
    BranchGe { threshold: u16, label: Label },
    Jump { label: Label },
}

/// Builds a [`Program`] instruction by instruction.
#[derive(Debug, Default)]
pub struct Assembler {
    insns: Vec<Pending>,
    labels: Vec<Option<usize>>,
}

impl Assembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next emitted instruction.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::DuplicateLabel`] when the label is already bound.
    pub fn bind(&mut self, label: Label) -> ProgramResult<()> {
        let slot = &mut self.labels[label.0];
        if slot.is_some() {
            return Err(ProgramError::DuplicateLabel { label: label.0 });
        }
        *slot = Some(self.insns.len());
        Ok(())
    }

    /// Emit `movi dst, imm`.
    pub fn movi(&mut self, dst: Reg, imm: u16) {
        self.insns.push(Pending::Fixed(Insn::MovI { dst, imm }));
    }

    /// Emit `movr dst, src`.
    pub fn movr(&mut self, dst: Reg, src: Reg) {
        self.insns.push(Pending::Fixed(Insn::MovR { dst, src }));
    }

    /// Emit `addi dst, src, imm`.
    pub fn addi(&mut self, dst: Reg, src: Reg, imm: u16) {
        self.insns.push(Pending::Fixed(Insn::AddI { dst, src, imm }));
    }

    /// Emit `addr dst, lhs, rhs`.
    pub fn addr(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.insns.push(Pending::Fixed(Insn::AddR { dst, lhs, rhs }));
    }

    /// Emit a load from the arena word at `base + offset`.
    pub fn ld(&mut self, dst: Reg, base: Reg, offset: u16) {
        self.insns.push(Pending::Fixed(Insn::Ld { dst, base, offset }));
    }

    /// Emit a store to the arena word at `base + offset`.
    pub fn st(&mut self, src: Reg, base: Reg, offset: u16) {
        self.insns.push(Pending::Fixed(Insn::St { src, base, offset }));
    }

    /// Emit a tick snapshot latch.
    pub fn latch_ticks(&mut self) {
        self.insns.push(Pending::Fixed(Insn::LatchTicks));
    }

    /// Emit a read of one snapshot window.
    pub fn rd_ticks(&mut self, dst: Reg, field: TickField) {
        self.insns.push(Pending::Fixed(Insn::RdTicks { dst, field }));
    }

    /// Emit a branch to `label` taken when R0 >= `threshold`.
    pub fn branch_ge(&mut self, label: Label, threshold: u16) {
        self.insns.push(Pending::BranchGe { threshold, label });
    }

    /// Emit an unconditional branch to `label`.
    pub fn jump(&mut self, label: Label) {
        self.insns.push(Pending::Jump { label });
    }

    /// Emit `halt`.
    pub fn halt(&mut self) {
        self.insns.push(Pending::Fixed(Insn::Halt));
    }

    /// Emit `wake`.
    pub fn wake(&mut self) {
        self.insns.push(Pending::Fixed(Insn::Wake));
    }

    /// Resolve labels and encode the program.
    ///
    /// # Errors
    ///
    /// Returns [`ProgramError::UndefinedLabel`] for a branch whose label was
    /// never bound, [`ProgramError::BranchOutOfRange`] when a target does not
    /// fit its field, and [`ProgramError::ProgramTooLarge`] when the program
    /// exceeds the instruction store.
    pub fn assemble(self) -> ProgramResult<Program> {
        if self.insns.len() > MAX_PROGRAM_WORDS {
            return Err(ProgramError::ProgramTooLarge {
                words: self.insns.len(),
                limit: MAX_PROGRAM_WORDS,
            });
        }

        let resolve = |label: Label, at: usize| -> ProgramResult<u16> {
            let target = self.labels[label.0].ok_or(ProgramError::UndefinedLabel {
                label: label.0,
                at,
            })?;
            // Bounded by the size check above, and the encoder re-checks.
            Ok(target as u16)
        };

        let mut words = Vec::with_capacity(self.insns.len());
        for (at, pending) in self.insns.iter().enumerate() {
            let insn = match *pending {
                Pending::Fixed(insn) => insn,
                Pending::BranchGe { threshold, label } => Insn::BranchGe {
                    threshold,
                    target: resolve(label, at)?,
                },
                Pending::Jump { label } => Insn::Jump {
                    target: resolve(label, at)?,
                },
            };
            words.push(insn.encode()?);
        }
        Program::from_words(words)
    }
}
