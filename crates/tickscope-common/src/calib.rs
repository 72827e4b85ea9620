//! Slow-clock calibration factor.
//!
//! The hardware's free-running tick counter is clocked by a slow oscillator
//! whose rate is not a fixed known frequency. Conversions from raw ticks to
//! microseconds therefore go through a fixed-point scale measured against the
//! main clock: the calibration factor, microseconds-per-tick in Q13.19.

/// Number of fractional bits in a [`CalFactor`].
pub const CAL_FRACT_BITS: u32 = 19;

/// Fixed-point microseconds-per-tick scale (Q13.19).
///
/// For the typical 150 kHz internal RC slow clock the period is about
/// 6.667 µs/tick, giving a factor near 3 495 253. A 32.768 kHz crystal
/// gives exactly 16 000 000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalFactor(u32);

impl CalFactor {
    /// Build a calibration factor from a raw Q13.19 value.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Derive the factor for a slow clock running at `freq_hz`.
    ///
    /// Computes `round(1_000_000 * 2^19 / freq_hz)`. A zero frequency is
    /// clamped to 1 Hz; factors beyond the 32-bit fixed-point range saturate.
    #[must_use]
    pub fn from_frequency_hz(freq_hz: u64) -> Self {
        let freq = freq_hz.max(1);
        let scaled = (1_000_000u64 << CAL_FRACT_BITS) + freq / 2;
        Self(u32::try_from(scaled / freq).unwrap_or(u32::MAX))
    }

    /// The raw Q13.19 value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    /// Approximate tick period in microseconds, for logs only.
    #[must_use]
    pub fn approx_us_per_tick(self) -> f64 {
        f64::from(self.0) / f64::from(1u32 << CAL_FRACT_BITS)
    }
}
