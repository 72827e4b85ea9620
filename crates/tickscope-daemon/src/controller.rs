//! The boot cycle: classify the wake, poll, print, sleep, repeat.
//!
//! One iteration of the loop is one "boot" of the host. The sampler is
//! initialized exactly once, on the cold start; every later boot finds it
//! still running against the retained arena and merely reads what
//! accumulated. Each boot stays awake for a fixed window, printing the
//! buffer whenever the run counter advances, then arms the external line
//! and the timer and enters deep sleep.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tickscope_common::{
    HarnessConfig, PeriodStats, TimeConverter, WakeCause, MAX_CAPACITY,
};
use tickscope_copro::{sampler_program, SampleLayout};
use tickscope_rtc::{
    RetainedMemory, SampleBuffer, SamplerService, SleepController, SlowClock, WakeHub, WakeLine,
    WakeSources,
};
use tracing::{debug, info};

use crate::signals::SignalHandler;

/// Orchestrates boots against one retained arena and one slow clock.
pub struct CycleController {
    config: HarnessConfig,
    arena: Arc<RetainedMemory>,
    clock: Arc<SlowClock>,
    hub: Arc<WakeHub>,
    buffer: SampleBuffer,
    converter: TimeConverter<Arc<SlowClock>>,
    sleeper: SleepController,
    service: Option<SamplerService>,
    stats: Option<PeriodStats>,
    last_sample_us: Option<u64>,
    boots: u64,
}

impl CycleController {
    /// Build the controller and its retained-memory domain from `config`.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        let arena = Arc::new(RetainedMemory::new());
        let clock = Arc::new(SlowClock::new(&config.slow_clock));
        let hub = Arc::new(WakeHub::new());

        let capacity = u16::try_from(config.capacity.min(MAX_CAPACITY)).unwrap_or(u16::MAX);
        let buffer = SampleBuffer::new(Arc::clone(&arena), SampleLayout::new(capacity));
        let converter = TimeConverter::new(Arc::clone(&clock));
        let sleeper = SleepController::new(Arc::clone(&clock), Arc::clone(&hub));
        let stats = config
            .stats
            .enabled
            .then(|| PeriodStats::new(config.stats.history_size, config.sampler_period));

        Self {
            config,
            arena,
            clock,
            hub,
            buffer,
            converter,
            sleeper,
            service: None,
            stats,
            last_sample_us: None,
            boots: 0,
        }
    }

    /// A handle on the external wake line, for the signal handler.
    #[must_use]
    pub fn wake_line(&self) -> WakeLine {
        WakeLine::new(Arc::clone(&self.hub))
    }

    /// Run boot cycles until shutdown is requested or `max_boots` is
    /// reached (0 = no limit).
    ///
    /// # Errors
    ///
    /// Fails when the sampler cannot be assembled or started, or when a
    /// sampler pass faults; these are configuration-class errors the
    /// operator must fix, so the loop does not retry them.
    pub fn run(&mut self, signals: &SignalHandler, max_boots: u64) -> Result<()> {
        let mut wake = WakeCause::ColdStart;
        loop {
            self.boots += 1;
            info!(boot = self.boots, cause = %wake, "Booting");

            if !wake.is_deep_sleep_wake() {
                self.cold_start()?;
            }

            let Some(next_wake) = self.awake_window(signals)? else {
                break;
            };
            wake = next_wake;

            if max_boots > 0 && self.boots >= max_boots {
                info!(boots = self.boots, "Boot limit reached");
                signals.request_shutdown();
                break;
            }
        }

        if let Some(mut service) = self.service.take() {
            service.stop();
        }
        info!(
            boots = self.boots,
            signals = signals.state().signal_count(),
            "Daemon shutdown complete"
        );
        Ok(())
    }

    /// First-boot initialization: zero the buffer and start the sampler.
    fn cold_start(&mut self) -> Result<()> {
        info!(
            capacity = self.buffer.capacity(),
            period = %humantime::format_duration(self.config.sampler_period),
            "Cold start, initializing sampler"
        );
        self.buffer.reset();

        let program = sampler_program(self.buffer.layout())
            .context("Failed to assemble the sampler program")?;
        debug!(words = program.len(), "Sampler program assembled");

        let service = SamplerService::start(
            Arc::clone(&self.arena),
            Arc::clone(&self.clock),
            Arc::clone(&self.hub),
            &program,
            self.config.sampler_period,
        )
        .context("Failed to start the sampler")?;
        self.service = Some(service);
        Ok(())
    }

    /// One awake window: poll until the window elapses, then deep sleep.
    ///
    /// Returns the next boot's wake cause, or `None` when shutdown was
    /// requested while awake.
    fn awake_window(&mut self, signals: &SignalHandler) -> Result<Option<WakeCause>> {
        // Calibration is re-derived at each boot, the way the platform
        // measures its slow clock on startup.
        self.clock.recalibrate(self.boots);

        let mut last_seen_runs: u16 = 0;
        let sleep_at = Instant::now() + self.config.inactivity_threshold;

        loop {
            if signals.shutdown_requested() {
                info!("Shutdown requested, leaving the boot loop");
                return Ok(None);
            }
            if self
                .service
                .as_ref()
                .is_some_and(SamplerService::has_faulted)
            {
                bail!("Sampler faulted, aborting; see the pass error above");
            }

            let runs = self.buffer.run_count();
            if runs != last_seen_runs {
                info!(runs, "Have new sample data");
                self.print_samples();
                self.record_new_samples(runs.wrapping_sub(last_seen_runs));
                last_seen_runs = runs;
            }

            if Instant::now() >= sleep_at {
                return self.enter_deep_sleep().map(Some);
            }

            thread::sleep(self.config.poll_interval);
        }
    }

    /// Print every currently valid sample with absolute and delta times.
    fn print_samples(&self) {
        info!(datapoints = self.buffer.valid_len(), "Printing sample buffer");
        let mut last_ms: u64 = 0;
        for (slot, ticks) in self.buffer.valid_samples() {
            let ms = self.converter.ticks_to_us(ticks) / 1000;
            let delta = ms.saturating_sub(last_ms);
            info!(
                "Sample {:3} || Time: {:8}ms - {:5.1}s || Delta: {:8}ms - {:5.1}s",
                slot,
                ms,
                ms as f64 / 1000.0,
                delta,
                delta as f64 / 1000.0
            );
            last_ms = ms;
        }
    }

    /// Feed the periods of freshly written samples into the statistics.
    ///
    /// The newest sample sits one slot behind the write index (wrapping),
    /// so the `advanced` most recent slots are walked oldest-first. The
    /// walk is independent of `valid_len`, which collapses at the wrap.
    fn record_new_samples(&mut self, advanced: u16) {
        let Some(stats) = self.stats.as_mut() else {
            return;
        };
        let capacity = self.buffer.capacity();
        if capacity == 0 || advanced == 0 {
            return;
        }

        let write_index = self.buffer.write_index();
        let newest = if write_index == 0 {
            capacity - 1
        } else {
            write_index - 1
        };

        let count = advanced.min(capacity);
        for back in (0..count).rev() {
            let slot = (newest + capacity - back) % capacity;
            let Some(ticks) = self.buffer.sample(slot) else {
                continue;
            };
            let us = self.converter.ticks_to_us(ticks);
            if let Some(prev) = self.last_sample_us {
                stats.record_us(us.saturating_sub(prev));
            }
            self.last_sample_us = Some(us);
        }
    }

    /// Boots completed so far.
    #[must_use]
    pub fn boots(&self) -> u64 {
        self.boots
    }

    /// Log statistics, arm the configured wake sources, and suspend.
    fn enter_deep_sleep(&mut self) -> Result<WakeCause> {
        if let Some(stats) = &self.stats {
            if stats.total_periods() > 0 {
                info!(
                    periods = stats.total_periods(),
                    mean_ms = stats.mean().map_or(0, |d| d.as_millis()),
                    min_ms = stats.min().map_or(0, |d| d.as_millis()),
                    max_ms = stats.max().map_or(0, |d| d.as_millis()),
                    p95_ms = stats.percentile(95.0).map_or(0, |d| d.as_millis()),
                    drift_ppm = stats.drift_ppm().unwrap_or(0),
                    "Period statistics"
                );
            }
        }

        info!(
            duration = %humantime::format_duration(self.config.sleep_duration),
            "Entering deep sleep"
        );
        let sources = WakeSources::default()
            .with_ext0(self.config.wake_edge)
            .with_timer(self.config.sleep_duration);
        let cause = self
            .sleeper
            .enter(sources)
            .context("Failed to enter deep sleep")?;
        Ok(cause)
    }
}
