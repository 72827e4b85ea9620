//! Coprocessor interpreter.
//!
//! Executes an assembled program one pass at a time, exactly as the wake
//! timer would: the counter starts at word zero, runs until `halt`, and the
//! registers keep their values between passes. The instruction store is
//! modeled separately from the data arena, so a program cannot overwrite
//! sample data and vice versa.

use std::sync::Arc;

use tickscope_common::RtcTimeSource;
use tickscope_copro::{Insn, Program, Reg, NUM_REGS};
use tracing::trace;

use crate::error::MachineError;
use crate::retained::RetainedMemory;

/// Steps one pass may execute before the machine declares a runaway.
pub const DEFAULT_STEP_LIMIT: u32 = 10_000;

/// What a completed pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    /// Instructions executed, the halt included.
    pub steps: u32,
    /// Whether the program raised a main-processor wake request.
    pub woke: bool,
}

/// The coprocessor machine: registers, snapshot latch, and program store.
#[derive(Debug)]
pub struct CoproMachine<C> {
    arena: Arc<RetainedMemory>,
    clock: C,
    store: Vec<u32>,
    regs: [u16; NUM_REGS],
    snapshot: u64,
    step_limit: u32,
}

impl<C: RtcTimeSource> CoproMachine<C> {
    /// Create a machine over `arena`, latching ticks from `clock`.
    pub fn new(arena: Arc<RetainedMemory>, clock: C) -> Self {
        Self {
            arena,
            clock,
            store: Vec::new(),
            regs: [0; NUM_REGS],
            snapshot: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Replace the step limit.
    #[must_use]
    pub fn with_step_limit(mut self, limit: u32) -> Self {
        self.step_limit = limit.max(1);
        self
    }

    /// Load `program` into the instruction store.
    pub fn load_program(&mut self, program: &Program) {
        self.store.clear();
        self.store.extend_from_slice(program.words());
    }

    /// Current value of a register.
    #[must_use]
    pub fn reg(&self, reg: Reg) -> u16 {
        self.regs[reg.index()]
    }

    /// Execute one pass: from word zero to the next `halt`.
    ///
    /// # Errors
    ///
    /// Faults with [`MachineError`] on an empty store, a program counter or
    /// arena access out of range, a word that does not decode, or a pass
    /// that exceeds the step limit. The machine makes no attempt to recover;
    /// the caller decides whether to reload and retry.
    pub fn run_pass(&mut self) -> Result<PassOutcome, MachineError> {
        if self.store.is_empty() {
            return Err(MachineError::NoProgramLoaded);
        }

        let mut pc: u16 = 0;
        let mut steps: u32 = 0;
        let mut woke = false;

        loop {
            let word = *self
                .store
                .get(usize::from(pc))
                .ok_or(MachineError::PcOutOfRange {
                    pc,
                    len: self.store.len(),
                })?;
            let insn = Insn::decode(word)?;
            trace!(pc, %insn, "step");

            steps += 1;
            if steps > self.step_limit {
                return Err(MachineError::StepLimitExceeded {
                    limit: self.step_limit,
                });
            }

            let mut next_pc = pc.wrapping_add(1);
            match insn {
                Insn::MovI { dst, imm } => self.regs[dst.index()] = imm,
                Insn::MovR { dst, src } => self.regs[dst.index()] = self.regs[src.index()],
                Insn::AddI { dst, src, imm } => {
                    self.regs[dst.index()] = self.regs[src.index()].wrapping_add(imm);
                }
                Insn::AddR { dst, lhs, rhs } => {
                    self.regs[dst.index()] =
                        self.regs[lhs.index()].wrapping_add(self.regs[rhs.index()]);
                }
                Insn::Ld { dst, base, offset } => {
                    self.regs[dst.index()] = self.arena_load(self.regs[base.index()], offset)?;
                }
                Insn::St { src, base, offset } => {
                    self.arena_store(self.regs[base.index()], offset, self.regs[src.index()])?;
                }
                Insn::LatchTicks => self.snapshot = self.clock.current_ticks().value(),
                Insn::RdTicks { dst, field } => {
                    self.regs[dst.index()] =
                        ((self.snapshot >> field.bit_offset()) & 0xFFFF) as u16;
                }
                Insn::BranchGe { threshold, target } => {
                    if self.regs[Reg::R0.index()] >= threshold {
                        next_pc = target;
                    }
                }
                Insn::Jump { target } => next_pc = target,
                Insn::Halt => return Ok(PassOutcome { steps, woke }),
                Insn::Wake => woke = true,
            }
            pc = next_pc;
        }
    }

    fn arena_load(&self, base: u16, offset: u16) -> Result<u16, MachineError> {
        let addr = u32::from(base) + u32::from(offset);
        u16::try_from(addr)
            .ok()
            .and_then(|a| self.arena.load(a))
            .ok_or(MachineError::AddressOutOfRange { addr })
    }

    fn arena_store(&self, base: u16, offset: u16, value: u16) -> Result<(), MachineError> {
        let addr = u32::from(base) + u32::from(offset);
        let stored = u16::try_from(addr)
            .ok()
            .is_some_and(|a| self.arena.store(a, value));
        if stored {
            Ok(())
        } else {
            Err(MachineError::AddressOutOfRange { addr })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickscope_common::{CalFactor, FixedTimeSource};
    use tickscope_copro::{sampler_program, Assembler, SampleLayout, TickField};

    fn fixed_clock(ticks: u64) -> Arc<FixedTimeSource> {
        let clock = Arc::new(FixedTimeSource::new(CalFactor::from_frequency_hz(150_000)));
        clock.set_ticks(ticks);
        clock
    }

    #[test]
    fn test_empty_store_faults() {
        let mut machine = CoproMachine::new(Arc::new(RetainedMemory::new()), fixed_clock(0));
        assert_eq!(machine.run_pass(), Err(MachineError::NoProgramLoaded));
    }

    #[test]
    fn test_sampler_pass_records_fragments() {
        let arena = Arc::new(RetainedMemory::new());
        let clock = fixed_clock(0x0001_2345_6789);
        let layout = SampleLayout::new(4);
        let program = sampler_program(layout).unwrap();

        let mut machine = CoproMachine::new(Arc::clone(&arena), clock);
        machine.load_program(&program);
        let outcome = machine.run_pass().unwrap();
        assert!(!outcome.woke);

        // One pass: run count 1, index advanced to 1, slot 0 holds the
        // latched fragments.
        assert_eq!(arena.load(SampleLayout::RUN_COUNT_ADDR), Some(1));
        assert_eq!(arena.load(SampleLayout::WRITE_INDEX_ADDR), Some(1));
        assert_eq!(arena.load(layout.ticks_low_base()), Some(0x6789));
        assert_eq!(arena.load(layout.ticks_mid_base()), Some(0x2345));
        assert_eq!(arena.load(layout.ticks_high_base()), Some(0x0001));
    }

    #[test]
    fn test_index_wraps_in_the_pass_that_fills_the_last_slot() {
        let arena = Arc::new(RetainedMemory::new());
        let clock = fixed_clock(1000);
        let layout = SampleLayout::new(4);
        let program = sampler_program(layout).unwrap();

        let mut machine = CoproMachine::new(Arc::clone(&arena), Arc::clone(&clock));
        machine.load_program(&program);

        for expected_index in [1u16, 2, 3, 0, 1] {
            clock.advance(500);
            machine.run_pass().unwrap();
            assert_eq!(
                arena.load(SampleLayout::WRITE_INDEX_ADDR),
                Some(expected_index)
            );
        }
        assert_eq!(arena.load(SampleLayout::RUN_COUNT_ADDR), Some(5));

        // The fifth pass overwrote slot 0; slot 3 still holds the fourth.
        assert_eq!(arena.load(layout.ticks_low_base()), Some(3500));
        assert_eq!(arena.load(layout.ticks_low_base() + 3), Some(3000));
    }

    #[test]
    fn test_registers_persist_across_passes() {
        let arena = Arc::new(RetainedMemory::new());
        let mut asm = Assembler::new();
        asm.addi(Reg::R3, Reg::R3, 1);
        asm.halt();
        let program = asm.assemble().unwrap();

        let mut machine = CoproMachine::new(arena, fixed_clock(0));
        machine.load_program(&program);
        machine.run_pass().unwrap();
        machine.run_pass().unwrap();
        machine.run_pass().unwrap();
        assert_eq!(machine.reg(Reg::R3), 3);
    }

    #[test]
    fn test_wake_request_reported() {
        let arena = Arc::new(RetainedMemory::new());
        let mut asm = Assembler::new();
        asm.wake();
        asm.halt();
        let program = asm.assemble().unwrap();

        let mut machine = CoproMachine::new(arena, fixed_clock(0));
        machine.load_program(&program);
        assert!(machine.run_pass().unwrap().woke);
    }

    #[test]
    fn test_runaway_loop_hits_step_limit() {
        let arena = Arc::new(RetainedMemory::new());
        let mut asm = Assembler::new();
        let top = asm.label();
        asm.bind(top).unwrap();
        asm.jump(top);
        let program = asm.assemble().unwrap();

        let mut machine = CoproMachine::new(arena, fixed_clock(0)).with_step_limit(50);
        machine.load_program(&program);
        assert_eq!(
            machine.run_pass(),
            Err(MachineError::StepLimitExceeded { limit: 50 })
        );
    }

    #[test]
    fn test_running_off_the_end_faults() {
        let arena = Arc::new(RetainedMemory::new());
        let mut asm = Assembler::new();
        asm.movi(Reg::R0, 7);
        let program = asm.assemble().unwrap();

        let mut machine = CoproMachine::new(arena, fixed_clock(0));
        machine.load_program(&program);
        assert_eq!(
            machine.run_pass(),
            Err(MachineError::PcOutOfRange { pc: 1, len: 1 })
        );
    }

    #[test]
    fn test_arena_bounds_fault() {
        let arena = Arc::new(RetainedMemory::new());
        let mut asm = Assembler::new();
        asm.movi(Reg::R1, 0xFFFF);
        asm.st(Reg::R0, Reg::R1, 0xFFFF);
        asm.halt();
        let program = asm.assemble().unwrap();

        let mut machine = CoproMachine::new(arena, fixed_clock(0));
        machine.load_program(&program);
        assert_eq!(
            machine.run_pass(),
            Err(MachineError::AddressOutOfRange { addr: 0x1FFFE })
        );
    }

    #[test]
    fn test_snapshot_is_stable_within_a_pass() {
        // Latch, then advance the clock mid-pass: all three windows must
        // come from the latched value, not the moved counter.
        let arena = Arc::new(RetainedMemory::new());
        let clock = fixed_clock(0x0002_0001_8000);

        let mut asm = Assembler::new();
        asm.latch_ticks();
        asm.rd_ticks(Reg::R1, TickField::Low);
        asm.rd_ticks(Reg::R2, TickField::Mid);
        asm.rd_ticks(Reg::R3, TickField::High);
        asm.halt();
        let program = asm.assemble().unwrap();

        let mut machine = CoproMachine::new(arena, Arc::clone(&clock));
        machine.load_program(&program);
        machine.run_pass().unwrap();

        clock.advance(0x1_0000);
        assert_eq!(machine.reg(Reg::R1), 0x8000);
        assert_eq!(machine.reg(Reg::R2), 0x0001);
        assert_eq!(machine.reg(Reg::R3), 0x0002);
    }
}
