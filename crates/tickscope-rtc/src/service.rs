//! The sampler as a background service.
//!
//! A separate thread runs one machine pass per wake-timer period, exactly
//! as the coprocessor would: started once, it keeps sampling regardless of
//! what the main controller is doing, deep sleep included. The period is
//! re-derived from the slow clock at every fire, so arming the external
//! wake line mid-interval stretches the periods that follow it.
//!
//! The arena admits one writer. Starting a service claims that slot and
//! stopping releases it; a second start against the same arena is refused.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tickscope_common::RtcTimeSource;
use tickscope_copro::Program;
use tracing::{debug, error, info, trace, warn};

use crate::clock::SlowClock;
use crate::error::{RtcError, RtcResult};
use crate::machine::CoproMachine;
use crate::retained::RetainedMemory;
use crate::sleep::WakeHub;

/// Shared state between the service handle and the sampler thread.
#[derive(Debug)]
struct ServiceShared {
    /// Flag to signal the sampler thread to stop.
    stop_requested: AtomicBool,
    /// Passes completed since start.
    passes: AtomicU64,
    /// Set when a pass faults; the thread exits and stays stopped.
    faulted: AtomicBool,
}

/// Handle on a running sampler thread.
#[derive(Debug)]
pub struct SamplerService {
    shared: Arc<ServiceShared>,
    worker_handle: Option<JoinHandle<()>>,
    arena: Arc<RetainedMemory>,
    running: Arc<AtomicBool>,
}

impl SamplerService {
    /// Claim the arena's writer slot and start sampling `program` every
    /// `period`.
    ///
    /// The first pass runs immediately, the way the coprocessor runs once
    /// on load before its timer takes over.
    ///
    /// # Errors
    ///
    /// [`RtcError::SamplerAttached`] when the arena already has a writer,
    /// [`RtcError::Thread`] when the thread cannot be spawned.
    pub fn start(
        arena: Arc<RetainedMemory>,
        clock: Arc<SlowClock>,
        hub: Arc<WakeHub>,
        program: &Program,
        period: Duration,
    ) -> RtcResult<Self> {
        if !arena.claim_writer() {
            return Err(RtcError::SamplerAttached);
        }

        info!(
            period_ms = period.as_millis(),
            words = program.len(),
            "Starting sampler"
        );

        let mut machine = CoproMachine::new(Arc::clone(&arena), Arc::clone(&clock));
        machine.load_program(program);

        let shared = Arc::new(ServiceShared {
            stop_requested: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            faulted: AtomicBool::new(false),
        });
        let running = Arc::new(AtomicBool::new(true));

        // Check 4x per period, capped so stop stays prompt on long periods.
        let nap = (period / 4)
            .max(Duration::from_millis(1))
            .min(Duration::from_millis(250));

        let handle = {
            let shared = Arc::clone(&shared);
            let running = Arc::clone(&running);
            thread::Builder::new().name("tick-sampler".into()).spawn(
                move || {
                    debug!("Sampler thread started");

                    let mut next_fire = clock.current_ticks().value();
                    while !shared.stop_requested.load(Ordering::Acquire) {
                        if clock.current_ticks().value() >= next_fire {
                            match machine.run_pass() {
                                Ok(outcome) => {
                                    shared.passes.fetch_add(1, Ordering::Relaxed);
                                    trace!(steps = outcome.steps, "Sampler pass complete");
                                    if outcome.woke {
                                        hub.raise_coprocessor_wake();
                                    }
                                }
                                Err(e) => {
                                    error!(error = %e, "Sampler pass faulted");
                                    shared.faulted.store(true, Ordering::Release);
                                    break;
                                }
                            }
                            next_fire += clock.wake_timer_ticks(period);
                        }
                        thread::sleep(nap);
                    }

                    running.store(false, Ordering::Release);
                    debug!("Sampler thread stopped");
                },
            )
        };

        let handle = match handle {
            Ok(h) => h,
            Err(e) => {
                running.store(false, Ordering::Release);
                arena.release_writer();
                return Err(RtcError::Thread(format!(
                    "Failed to spawn sampler thread: {e}"
                )));
            }
        };

        Ok(Self {
            shared,
            worker_handle: Some(handle),
            arena,
            running,
        })
    }

    /// Passes completed since start.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.shared.passes.load(Ordering::Relaxed)
    }

    /// Whether a pass has faulted.
    #[must_use]
    pub fn has_faulted(&self) -> bool {
        self.shared.faulted.load(Ordering::Acquire)
    }

    /// Whether the sampler thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the sampler thread and release the arena's writer slot.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker_handle.take() else {
            return;
        };

        info!("Stopping sampler");
        self.shared.stop_requested.store(true, Ordering::Release);
        if let Err(e) = handle.join() {
            warn!("Sampler thread panicked: {e:?}");
        }
        self.arena.release_writer();
    }
}

impl Drop for SamplerService {
    fn drop(&mut self) {
        self.stop();
    }
}
