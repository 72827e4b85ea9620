//! The slow clock domain.
//!
//! One object models everything the slow oscillator drives: the free-running
//! 48-bit tick counter, the wake timer that schedules sampler passes, and
//! the calibration factor the host reads for conversions.
//!
//! The harness exists to reproduce one effect: while the external wake line
//! is armed, the wake timer realizes periods shifted by a configured number
//! of parts per million, so the intervals recorded by the sampler stretch
//! even though every individual timestamp converts correctly. The tick
//! counter itself always runs at the nominal rate.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tickscope_common::{CalFactor, RtcTimeSource, SlowClockConfig, WideTicks};

/// The slow clock: tick counter, wake timer model, and calibration.
///
/// The counter starts at zero when the clock is created (power-on) and never
/// stops; deep sleep and host reboots do not touch it. Simulated power loss
/// means constructing a fresh clock.
#[derive(Debug)]
pub struct SlowClock {
    origin: Instant,
    frequency_hz: u64,
    ext0_skew_ppm: i64,
    recal_jitter_ppm: u32,
    ext0_armed: AtomicBool,
    cal: AtomicU32,
}

impl SlowClock {
    /// Create a clock at tick zero with the configured rate model.
    #[must_use]
    pub fn new(config: &SlowClockConfig) -> Self {
        let frequency_hz = config.frequency_hz.max(1);
        Self {
            origin: Instant::now(),
            frequency_hz,
            ext0_skew_ppm: config.ext0_skew_ppm,
            recal_jitter_ppm: config.recal_jitter_ppm,
            ext0_armed: AtomicBool::new(false),
            cal: AtomicU32::new(CalFactor::from_frequency_hz(frequency_hz).value()),
        }
    }

    /// Nominal oscillator frequency in hertz.
    #[must_use]
    pub fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }

    /// Mark the external wake line armed or disarmed.
    ///
    /// Arming is what perturbs the wake timer; the sleep controller calls
    /// this around every armed suspension.
    pub fn set_ext0_armed(&self, armed: bool) {
        self.ext0_armed.store(armed, Ordering::Release);
    }

    /// Whether the external wake line is currently armed.
    #[must_use]
    pub fn ext0_armed(&self) -> bool {
        self.ext0_armed.load(Ordering::Acquire)
    }

    /// Ticks the wake timer realizes for a programmed `period`, right now.
    ///
    /// The nominal conversion is `period * frequency`. While the external
    /// wake line is armed the result is stretched (or shrunk) by the
    /// configured skew. Never returns zero.
    #[must_use]
    pub fn wake_timer_ticks(&self, period: Duration) -> u64 {
        let nominal =
            (period.as_nanos() * u128::from(self.frequency_hz)) / 1_000_000_000;
        let realized = if self.ext0_armed() {
            let adjusted = nominal as i128 * (1_000_000 + i128::from(self.ext0_skew_ppm))
                / 1_000_000;
            adjusted.max(1) as u128
        } else {
            nominal
        };
        u64::try_from(realized.max(1)).unwrap_or(u64::MAX)
    }

    /// Host duration equivalent of `ticks` at the nominal rate.
    #[must_use]
    pub fn ticks_to_host(&self, ticks: u64) -> Duration {
        let nanos = (u128::from(ticks) * 1_000_000_000) / u128::from(self.frequency_hz);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Re-derive the calibration factor, as a boot does.
    ///
    /// With `recal_jitter_ppm` zero this restores the exact nominal factor.
    /// Otherwise the factor is offset by a seed-determined amount within the
    /// configured bound, modeling the spread of repeated calibrations.
    pub fn recalibrate(&self, seed: u64) {
        let nominal = CalFactor::from_frequency_hz(self.frequency_hz);
        let cal = if self.recal_jitter_ppm == 0 {
            nominal
        } else {
            let span = u64::from(self.recal_jitter_ppm) * 2 + 1;
            let offset =
                (xorshift(seed) % span) as i64 - i64::from(self.recal_jitter_ppm);
            let adjusted =
                i128::from(nominal.value()) * (1_000_000 + i128::from(offset)) / 1_000_000;
            CalFactor::from_raw(u32::try_from(adjusted).unwrap_or(u32::MAX))
        };
        self.cal.store(cal.value(), Ordering::Release);
    }
}

impl RtcTimeSource for SlowClock {
    fn current_ticks(&self) -> WideTicks {
        let nanos = self.origin.elapsed().as_nanos();
        let ticks = (nanos * u128::from(self.frequency_hz)) / 1_000_000_000;
        WideTicks::new(u64::try_from(ticks).unwrap_or(u64::MAX))
    }

    fn calibration(&self) -> CalFactor {
        CalFactor::from_raw(self.cal.load(Ordering::Acquire))
    }
}

fn xorshift(seed: u64) -> u64 {
    // Zero would be a fixed point; displace it.
    let mut s = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    s ^= s << 13;
    s ^= s >> 7;
    s ^= s << 17;
    s
}
