use thiserror::Error;
use tickscope_copro::ProgramError;

/// Faults raised while the machine executes a program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MachineError {
    /// A pass was requested before any program was loaded.
    #[error("no program loaded")]
    NoProgramLoaded,

    /// A load or store addressed a word outside the arena.
    #[error("arena access out of range at word {addr}")]
    AddressOutOfRange {
        /// The effective word address.
        addr: u32,
    },

    /// Execution ran off the end of the program, or a branch landed there.
    #[error("program counter {pc} outside the {len}-word program")]
    PcOutOfRange {
        /// The out-of-range program counter.
        pc: u16,
        /// Length of the loaded program.
        len: usize,
    },

    /// A single pass executed more steps than allowed.
    ///
    /// Passes are straight-line with two short tails, so hitting this means
    /// the instruction store is corrupted into a loop.
    #[error("pass exceeded the step limit of {limit}")]
    StepLimitExceeded {
        /// The configured limit.
        limit: u32,
    },

    /// A fetched word did not decode to an instruction.
    #[error(transparent)]
    Program(#[from] ProgramError),
}

/// Errors from the sampler service and sleep control.
#[derive(Debug, Error)]
pub enum RtcError {
    /// The arena already has a sampler attached; there is one writer.
    #[error("a sampler is already attached to this arena")]
    SamplerAttached,

    /// The OS refused to spawn the service thread.
    #[error("failed to spawn thread: {0}")]
    Thread(String),

    /// Deep sleep was requested with nothing armed to end it.
    #[error("refusing to sleep with no wake source armed")]
    NoWakeSource,

    /// The machine faulted.
    #[error(transparent)]
    Machine(#[from] MachineError),
}

/// Convenience type alias for runtime operations.
pub type RtcResult<T> = Result<T, RtcError>;
