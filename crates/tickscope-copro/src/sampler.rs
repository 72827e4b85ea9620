//! The tick sampler program.
//!
//! Each time the wake timer fires, the coprocessor runs one pass: it counts
//! the run, latches the tick counter, stores the three 16-bit fragments into
//! the slot the write index points at, then advances or wraps the index and
//! halts. The host never stops it; it free-runs across deep sleep.

use crate::asm::{Assembler, Program};
use crate::error::{ProgramError, ProgramResult};
use crate::isa::{Reg, TickField};

/// Word addresses of the shared sample buffer within the retained arena.
///
/// The sampler program and the host reader derive the same layout from the
/// capacity alone; there is no descriptor in memory to disagree about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLayout {
    capacity: u16,
}

impl SampleLayout {
    /// Arena word holding the next slot to write.
    pub const WRITE_INDEX_ADDR: u16 = 0;
    /// Arena word counting sampler passes.
    pub const RUN_COUNT_ADDR: u16 = 1;

    const DATA_BASE: u16 = 2;

    /// Lay out a buffer of `capacity` slots.
    #[must_use]
    pub fn new(capacity: u16) -> Self {
        Self { capacity }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(self) -> u16 {
        self.capacity
    }

    /// Base address of the low-fragment array.
    #[must_use]
    pub fn ticks_low_base(self) -> u16 {
        Self::DATA_BASE
    }

    /// Base address of the mid-fragment array.
    #[must_use]
    pub fn ticks_mid_base(self) -> u16 {
        Self::DATA_BASE + self.capacity
    }

    /// Base address of the high-fragment array.
    #[must_use]
    pub fn ticks_high_base(self) -> u16 {
        Self::DATA_BASE + 2 * self.capacity
    }

    /// Total arena words the buffer occupies.
    #[must_use]
    pub fn words(self) -> u16 {
        Self::DATA_BASE + 3 * self.capacity
    }
}

/// Build the sampler for a buffer of `layout.capacity()` slots.
///
/// One pass performs, in order: increment the run count, load the write
/// index, latch the counter, store the low/mid/high fragments at the indexed
/// slot, then reset the index to zero if it has reached `capacity - 1` or
/// increment it otherwise, and halt.
///
/// The index therefore walks 0, 1, .., capacity-2, capacity-1, 0, ..: every
/// slot gets written, but the index resets in the same pass that fills the
/// last slot, so a reader that trusts the index as a fill count never sees
/// the final slot and sees the count collapse after a wrap.
///
/// # Errors
///
/// Returns [`ProgramError::InvalidCapacity`] for a zero capacity.
pub fn sampler_program(layout: SampleLayout) -> ProgramResult<Program> {
    if layout.capacity() == 0 {
        return Err(ProgramError::InvalidCapacity { capacity: 0 });
    }

    let mut asm = Assembler::new();
    let reset_index = asm.label();
    let increment_index = asm.label();

    // Count the pass first; the host polls this word for progress.
    asm.movi(Reg::R1, 0);
    asm.ld(Reg::R0, Reg::R1, SampleLayout::RUN_COUNT_ADDR);
    asm.addi(Reg::R0, Reg::R0, 1);
    asm.st(Reg::R0, Reg::R1, SampleLayout::RUN_COUNT_ADDR);

    // Slot index for this pass.
    asm.movi(Reg::R2, 0);
    asm.ld(Reg::R2, Reg::R2, SampleLayout::WRITE_INDEX_ADDR);

    // Latch once; the three window reads below see a single snapshot.
    asm.latch_ticks();

    asm.rd_ticks(Reg::R0, TickField::Low);
    asm.movi(Reg::R1, layout.ticks_low_base());
    asm.addr(Reg::R3, Reg::R1, Reg::R2);
    asm.st(Reg::R0, Reg::R3, 0);

    asm.rd_ticks(Reg::R0, TickField::Mid);
    asm.movi(Reg::R1, layout.ticks_mid_base());
    asm.addr(Reg::R3, Reg::R1, Reg::R2);
    asm.st(Reg::R0, Reg::R3, 0);

    asm.rd_ticks(Reg::R0, TickField::High);
    asm.movi(Reg::R1, layout.ticks_high_base());
    asm.addr(Reg::R3, Reg::R1, Reg::R2);
    asm.st(Reg::R0, Reg::R3, 0);

    // Wrap or advance the index, then stop until the next timer fire.
    asm.movr(Reg::R0, Reg::R2);
    asm.branch_ge(reset_index, layout.capacity() - 1);
    asm.jump(increment_index);

    asm.bind(reset_index)?;
    asm.movi(Reg::R2, 0);
    asm.st(Reg::R2, Reg::R2, SampleLayout::WRITE_INDEX_ADDR);
    asm.halt();

    asm.bind(increment_index)?;
    asm.movi(Reg::R2, 0);
    asm.ld(Reg::R0, Reg::R2, SampleLayout::WRITE_INDEX_ADDR);
    asm.addi(Reg::R0, Reg::R0, 1);
    asm.st(Reg::R0, Reg::R2, SampleLayout::WRITE_INDEX_ADDR);
    asm.halt();

    asm.assemble()
}
