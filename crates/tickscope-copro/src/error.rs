use thiserror::Error;

/// Errors raised while building, encoding, or decoding coprocessor programs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProgramError {
    /// The assembled program exceeds the instruction store.
    #[error("program of {words} words exceeds the {limit}-word instruction store")]
    ProgramTooLarge {
        /// Words the program would occupy.
        words: usize,
        /// Size of the instruction store.
        limit: usize,
    },

    /// A word does not decode to any instruction.
    #[error("invalid instruction encoding: {word:#010x}")]
    InvalidEncoding {
        /// The offending word.
        word: u32,
    },

    /// A branch referenced a label that was never bound.
    #[error("label {label} referenced at word {at} was never bound")]
    UndefinedLabel {
        /// The label id.
        label: usize,
        /// Word index of the referencing branch.
        at: usize,
    },

    /// A label was bound twice.
    #[error("label {label} bound twice")]
    DuplicateLabel {
        /// The label id.
        label: usize,
    },

    /// A branch target does not fit the instruction's target field.
    #[error("branch target {target} exceeds the addressable range of {limit} words")]
    BranchOutOfRange {
        /// Resolved target word index.
        target: usize,
        /// Last addressable word plus one.
        limit: usize,
    },

    /// The sampler cannot be built for this capacity.
    #[error("sampler capacity must be at least 1, got {capacity}")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: u16,
    },
}

/// Convenience type alias for program construction.
pub type ProgramResult<T> = Result<T, ProgramError>;
