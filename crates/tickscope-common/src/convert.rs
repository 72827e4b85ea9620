//! Tick-to-time reconstruction.
//!
//! The sampler stores each reading of the 48-bit slow-clock counter as three
//! 16-bit fragments, because the retained-memory arena only holds 16-bit
//! words. This module reassembles those fragments and converts tick counts to
//! microseconds through the calibration factor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::calib::{CalFactor, CAL_FRACT_BITS};

/// Mask covering the 48 significant bits of the wide tick counter.
pub const TICK_MASK: u64 = (1 << 48) - 1;

/// A reading of the free-running 48-bit tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WideTicks(u64);

impl WideTicks {
    /// The zero reading, used as the "not yet sampled" sentinel.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw value, truncating to 48 bits.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw & TICK_MASK)
    }

    /// Reassemble a counter value from its three stored fragments.
    ///
    /// `low` holds bits [0, 16), `mid` bits [16, 32), `high` bits [32, 48).
    #[must_use]
    pub fn from_fragments(low: u16, mid: u16, high: u16) -> Self {
        Self((u64::from(high) << 32) | (u64::from(mid) << 16) | u64::from(low))
    }

    /// The raw 48-bit value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Split into `(low, mid, high)` 16-bit fragments.
    #[must_use]
    pub fn fragments(self) -> (u16, u16, u16) {
        (
            (self.0 & 0xFFFF) as u16,
            ((self.0 >> 16) & 0xFFFF) as u16,
            ((self.0 >> 32) & 0xFFFF) as u16,
        )
    }

    /// Whether this is the zero sentinel.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Apply a Q13.19 calibration factor to a 48-bit tick count.
///
/// The multiply is split so every intermediate fits in `u64`: the low 32 bits
/// are scaled then shifted down by the fraction, the high 16 bits scaled then
/// shifted up by the remaining `32 - CAL_FRACT_BITS` bits.
#[must_use]
pub fn scale_ticks(ticks: WideTicks, cal: CalFactor) -> u64 {
    let cal = u64::from(cal.value());
    let low = ticks.value() & 0xFFFF_FFFF;
    let high = ticks.value() >> 32;
    ((low * cal) >> CAL_FRACT_BITS) + ((high * cal) << (32 - CAL_FRACT_BITS))
}

/// Source of slow-clock readings.
///
/// The live implementation tracks a counter that keeps running across deep
/// sleep; tests substitute a manually-advanced one. Conversion code needs
/// only these two facts about the clock.
pub trait RtcTimeSource {
    /// Current value of the free-running tick counter.
    fn current_ticks(&self) -> WideTicks;

    /// Calibration factor in effect for conversions.
    fn calibration(&self) -> CalFactor;
}

impl<T: RtcTimeSource + ?Sized> RtcTimeSource for &T {
    fn current_ticks(&self) -> WideTicks {
        (**self).current_ticks()
    }

    fn calibration(&self) -> CalFactor {
        (**self).calibration()
    }
}

impl<T: RtcTimeSource + ?Sized> RtcTimeSource for Arc<T> {
    fn current_ticks(&self) -> WideTicks {
        (**self).current_ticks()
    }

    fn calibration(&self) -> CalFactor {
        (**self).calibration()
    }
}

/// Converts stored tick counts to microseconds against a time source.
#[derive(Debug, Clone)]
pub struct TimeConverter<S> {
    source: S,
}

impl<S: RtcTimeSource> TimeConverter<S> {
    /// Create a converter reading calibration (and the live counter for the
    /// zero sentinel) from `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Convert a raw tick count to microseconds since the counter started.
    ///
    /// A zero count marks a slot the sampler has not written yet; it converts
    /// to the live counter's current time instead of to zero.
    pub fn ticks_to_us(&self, raw: WideTicks) -> u64 {
        let ticks = if raw.is_zero() {
            self.source.current_ticks()
        } else {
            raw
        };
        scale_ticks(ticks, self.source.calibration())
    }

    /// Convert three stored fragments to microseconds.
    pub fn fragments_to_us(&self, low: u16, mid: u16, high: u16) -> u64 {
        self.ticks_to_us(WideTicks::from_fragments(low, mid, high))
    }

    /// Microseconds for the live counter, right now.
    pub fn now_us(&self) -> u64 {
        scale_ticks(self.source.current_ticks(), self.source.calibration())
    }
}

/// A manually-advanced time source for tests and offline conversion.
#[derive(Debug)]
pub struct FixedTimeSource {
    ticks: AtomicU64,
    cal: CalFactor,
}

impl FixedTimeSource {
    /// Create a source at tick zero with the given calibration.
    #[must_use]
    pub fn new(cal: CalFactor) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            cal,
        }
    }

    /// Set the counter to an absolute tick value.
    pub fn set_ticks(&self, ticks: u64) {
        self.ticks.store(ticks & TICK_MASK, Ordering::Relaxed);
    }

    /// Advance the counter by `delta` ticks.
    pub fn advance(&self, delta: u64) {
        self.ticks.fetch_add(delta, Ordering::Relaxed);
    }
}

impl RtcTimeSource for FixedTimeSource {
    fn current_ticks(&self) -> WideTicks {
        WideTicks::new(self.ticks.load(Ordering::Relaxed))
    }

    fn calibration(&self) -> CalFactor {
        self.cal
    }
}
