//! Reader-side view of the sample buffer.
//!
//! The writer is the sampler; this side only loads. Each 16-bit word is
//! atomic, but a 48-bit sample spans three words in three separate arrays,
//! and nothing orders those loads against a concurrent pass. A sample read
//! while the writer is mid-pass can pair fragments from different passes.
//! Readers that poll between passes never observe this because a pass is
//! microseconds and the period is seconds.

use std::sync::Arc;

use tickscope_common::WideTicks;
use tickscope_copro::SampleLayout;

use crate::retained::RetainedMemory;

/// Read access to the control words and fragment arrays of one buffer.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    arena: Arc<RetainedMemory>,
    layout: SampleLayout,
}

impl SampleBuffer {
    /// View `arena` through `layout`.
    #[must_use]
    pub fn new(arena: Arc<RetainedMemory>, layout: SampleLayout) -> Self {
        Self { arena, layout }
    }

    /// The layout this view reads through.
    #[must_use]
    pub fn layout(&self) -> SampleLayout {
        self.layout
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> u16 {
        self.layout.capacity()
    }

    /// Current write index: the slot the next pass will fill.
    #[must_use]
    pub fn write_index(&self) -> u16 {
        self.load_or_zero(SampleLayout::WRITE_INDEX_ADDR)
    }

    /// Passes completed since the last reset.
    #[must_use]
    pub fn run_count(&self) -> u16 {
        self.load_or_zero(SampleLayout::RUN_COUNT_ADDR)
    }

    /// Slots the reader may report, always `[0, valid_len)`.
    ///
    /// Zero until the first pass completes. After that it equals the write
    /// index, which means two things a reader must live with: the pass that
    /// fills the last slot also resets the index, so the view collapses to
    /// empty right after a wrap, and slot `capacity - 1` is never reported
    /// at all because the index never rests past it.
    #[must_use]
    pub fn valid_len(&self) -> u16 {
        if self.run_count() == 0 {
            0
        } else {
            self.write_index()
        }
    }

    /// Reassemble the sample at `slot`, or `None` outside the buffer.
    #[must_use]
    pub fn sample(&self, slot: u16) -> Option<WideTicks> {
        if slot >= self.layout.capacity() {
            return None;
        }
        let low = self.arena.load(self.layout.ticks_low_base() + slot)?;
        let mid = self.arena.load(self.layout.ticks_mid_base() + slot)?;
        let high = self.arena.load(self.layout.ticks_high_base() + slot)?;
        Some(WideTicks::from_fragments(low, mid, high))
    }

    /// Iterate the reportable slots in write order.
    pub fn valid_samples(&self) -> impl Iterator<Item = (u16, WideTicks)> + '_ {
        (0..self.valid_len()).filter_map(|slot| self.sample(slot).map(|ticks| (slot, ticks)))
    }

    /// Serialize the buffer region as little-endian words in layout order:
    /// write index, run count, then the low, mid, and high fragment arrays.
    #[must_use]
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(usize::from(self.layout.words()) * 2);
        for addr in 0..self.layout.words() {
            bytes.extend_from_slice(&self.load_or_zero(addr).to_le_bytes());
        }
        bytes
    }

    /// Zero the control words and every fragment array.
    ///
    /// This is the cold-start initialization; it must not run on a wake
    /// from deep sleep or the retained history is lost.
    pub fn reset(&self) {
        for addr in 0..self.layout.words() {
            self.arena.store(addr, 0);
        }
    }

    fn load_or_zero(&self, addr: u16) -> u16 {
        self.arena.load(addr).unwrap_or(0)
    }
}
