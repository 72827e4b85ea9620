//! Coprocessor instruction set and assembler.
//!
//! This crate provides:
//! - [`isa`] - Registers, instructions, and the 32-bit word encoding
//! - [`asm`] - Assembler with label fixups, and the [`asm::Program`] container
//! - [`sampler`] - The tick sampler program and its shared buffer layout
//!
//! # Example
//!
//! ```
//! use tickscope_copro::sampler::{sampler_program, SampleLayout};
//!
//! let layout = SampleLayout::new(100);
//! let program = sampler_program(layout).expect("capacity is valid");
//! assert!(!program.is_empty());
//! println!("{}", program.listing().unwrap());
//! ```

pub mod asm;
pub mod error;
pub mod isa;
pub mod sampler;

pub use asm::{Assembler, Label, Program};
pub use error::{ProgramError, ProgramResult};
pub use isa::{Insn, Reg, TickField, MAX_PROGRAM_WORDS, NUM_REGS};
pub use sampler::{sampler_program, SampleLayout};
