//! Common utilities for behavior tests.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tickscope_common::SlowClockConfig;
use tickscope_copro::{sampler_program, SampleLayout};
use tickscope_rtc::{RetainedMemory, SampleBuffer, SamplerService, SlowClock, WakeHub};

/// One retained-memory domain: arena, clock, hub, and buffer layout.
pub struct Harness {
    pub arena: Arc<RetainedMemory>,
    pub clock: Arc<SlowClock>,
    pub hub: Arc<WakeHub>,
    pub layout: SampleLayout,
}

impl Harness {
    /// Build a harness with `capacity` slots and the given armed-line skew.
    pub fn new(capacity: u16, ext0_skew_ppm: i64) -> Self {
        let clock_config = SlowClockConfig {
            frequency_hz: 150_000,
            ext0_skew_ppm,
            recal_jitter_ppm: 0,
        };
        Self {
            arena: Arc::new(RetainedMemory::new()),
            clock: Arc::new(SlowClock::new(&clock_config)),
            hub: Arc::new(WakeHub::new()),
            layout: SampleLayout::new(capacity),
        }
    }

    /// Reader view of the arena.
    pub fn buffer(&self) -> SampleBuffer {
        SampleBuffer::new(Arc::clone(&self.arena), self.layout)
    }

    /// Start the stock sampler program with the given period.
    pub fn start_sampler(&self, period: Duration) -> SamplerService {
        let program = sampler_program(self.layout).expect("sampler program must assemble");
        SamplerService::start(
            Arc::clone(&self.arena),
            Arc::clone(&self.clock),
            Arc::clone(&self.hub),
            &program,
            period,
        )
        .expect("sampler must start on a fresh arena")
    }
}

/// Block until the run counter reaches at least `target`.
///
/// Returns false on timeout; callers assert on the result so a hung
/// sampler fails fast instead of wedging the test binary.
pub fn wait_for_runs(buffer: &SampleBuffer, target: u16, timeout: Duration) -> bool {
    let start = Instant::now();
    while buffer.run_count() < target {
        if start.elapsed() > timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
    true
}

/// Block until the run counter equals `target` exactly.
///
/// Polling is far faster than the sampler period, so every increment is
/// observed and the exact value cannot be skipped over.
pub fn wait_for_runs_exactly(buffer: &SampleBuffer, target: u16, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        let runs = buffer.run_count();
        if runs == target {
            return true;
        }
        if runs > target || start.elapsed() > timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Block until the sleep controller has armed the external wake line.
///
/// The controller arms after clearing stale latches, so once this returns
/// a press is guaranteed to be seen by the sleeper rather than discarded.
pub fn wait_until_armed(clock: &SlowClock) {
    let start = Instant::now();
    while !clock.ext0_armed() && start.elapsed() < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(2));
    }
}

/// Mean of a slice of tick deltas.
pub fn mean_ticks(deltas: &[u64]) -> u64 {
    if deltas.is_empty() {
        return 0;
    }
    deltas.iter().sum::<u64>() / deltas.len() as u64
}
