//! Retained memory arena.
//!
//! Models the slow RAM bank that stays powered through deep sleep: a fixed
//! array of 16-bit words shared between the coprocessor (the one writer) and
//! the host (a racing reader). Access is atomic per word and nothing more;
//! a value spanning several words can tear between them, and tolerating that
//! is part of the shared-buffer contract.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crossbeam_utils::CachePadded;
use static_assertions::const_assert;
use tickscope_common::MAX_CAPACITY;

/// Number of 16-bit words in the arena.
pub const RETAINED_WORDS: usize = 2048;

// The largest configurable buffer (two control words plus three fragment
// arrays) must fit the arena.
const_assert!(2 + 3 * MAX_CAPACITY <= RETAINED_WORDS);

/// The retained word arena.
///
/// Created zeroed. Survives host "reboots" by construction: the harness
/// keeps one arena alive across controller boot cycles and only replaces it
/// on a simulated power loss.
pub struct RetainedMemory {
    words: Box<[AtomicU16]>,
    /// Claimed by the sampler service; enforces the single-writer contract.
    writer_claim: CachePadded<AtomicBool>,
}

impl RetainedMemory {
    /// Allocate a zeroed arena.
    #[must_use]
    pub fn new() -> Self {
        let words = (0..RETAINED_WORDS).map(|_| AtomicU16::new(0)).collect();
        Self {
            words,
            writer_claim: CachePadded::new(AtomicBool::new(false)),
        }
    }

    /// The word at `addr`, or `None` outside the arena.
    #[must_use]
    pub fn word(&self, addr: u16) -> Option<&AtomicU16> {
        self.words.get(usize::from(addr))
    }

    /// Load the word at `addr`.
    #[must_use]
    pub fn load(&self, addr: u16) -> Option<u16> {
        self.word(addr).map(|w| w.load(Ordering::Acquire))
    }

    /// Store `value` at `addr`. Returns false outside the arena.
    pub fn store(&self, addr: u16, value: u16) -> bool {
        match self.word(addr) {
            Some(w) => {
                w.store(value, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Number of words in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false; the arena has a fixed size.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Claim the single writer slot. Returns false when already claimed.
    pub fn claim_writer(&self) -> bool {
        self.writer_claim
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the writer slot.
    pub fn release_writer(&self) {
        self.writer_claim.store(false, Ordering::Release);
    }

    /// Whether a writer is currently attached.
    #[must_use]
    pub fn has_writer(&self) -> bool {
        self.writer_claim.load(Ordering::Acquire)
    }
}

impl Default for RetainedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetainedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetainedMemory")
            .field("words", &self.words.len())
            .field("writer", &self.writer_claim.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
