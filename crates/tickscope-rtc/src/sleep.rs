//! Deep sleep entry and wake classification.
//!
//! [`SleepController::enter`] suspends the caller until one of the armed
//! sources fires, then reports which one. The external line is level
//! triggered: arming on the level the line already sits at wakes
//! immediately, exactly as the hardware does. Short pulses during sleep are
//! latched by the [`WakeHub`] so a press-and-release between two polls of
//! the condition still wakes.
//!
//! While the external line is armed the slow-clock wake timer runs skewed,
//! so timer-driven activity during the sleep window stretches accordingly.
//! The skew is disarmed again on every exit path.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tickscope_common::{WakeCause, WakeEdge};
use tracing::{debug, info};

use crate::clock::SlowClock;
use crate::error::{RtcError, RtcResult};

/// Line and coprocessor state shared between wakers and the sleeper.
#[derive(Debug)]
struct HubState {
    /// 1 at rest (pulled up), 0 while pressed.
    line_level: u8,
    /// A low was seen since the latch was last cleared.
    latched_low: bool,
    /// The coprocessor raised a wake request.
    copro_pending: bool,
}

/// Rendezvous point between wake sources and the sleeping controller.
#[derive(Debug)]
pub struct WakeHub {
    state: Mutex<HubState>,
    cond: Condvar,
}

impl WakeHub {
    /// New hub with the line at rest.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HubState {
                line_level: 1,
                latched_low: false,
                copro_pending: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Pull the line low and latch the event.
    pub fn set_line_low(&self) {
        let mut state = self.lock();
        state.line_level = 0;
        state.latched_low = true;
        drop(state);
        self.cond.notify_all();
    }

    /// Let the line float back high.
    pub fn set_line_high(&self) {
        self.lock().line_level = 1;
        self.cond.notify_all();
    }

    /// Current line level, 0 or 1.
    #[must_use]
    pub fn line_level(&self) -> u8 {
        self.lock().line_level
    }

    /// Record a wake request from the coprocessor.
    pub fn raise_coprocessor_wake(&self) {
        self.lock().copro_pending = true;
        self.cond.notify_all();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for WakeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle on the external wake line, shaped like the button it models.
#[derive(Debug, Clone)]
pub struct WakeLine {
    hub: Arc<WakeHub>,
}

impl WakeLine {
    /// A line attached to `hub`.
    #[must_use]
    pub fn new(hub: Arc<WakeHub>) -> Self {
        Self { hub }
    }

    /// Press the button: line to ground.
    pub fn press(&self) {
        self.hub.set_line_low();
    }

    /// Release the button: line back to the pullup.
    pub fn release(&self) {
        self.hub.set_line_high();
    }
}

/// Which sources may end a sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct WakeSources {
    /// Wake when the external line sits at this trigger level.
    pub ext0: Option<WakeEdge>,
    /// Wake after this long, measured on the slow clock.
    pub timer: Option<Duration>,
    /// Wake when the coprocessor raises a wake request.
    pub coprocessor: bool,
}

impl WakeSources {
    /// Arm the external line.
    #[must_use]
    pub fn with_ext0(mut self, edge: WakeEdge) -> Self {
        self.ext0 = Some(edge);
        self
    }

    /// Arm the timer.
    #[must_use]
    pub fn with_timer(mut self, period: Duration) -> Self {
        self.timer = Some(period);
        self
    }

    /// Arm the coprocessor wake request.
    #[must_use]
    pub fn with_coprocessor(mut self) -> Self {
        self.coprocessor = true;
        self
    }

    fn any_armed(self) -> bool {
        self.ext0.is_some() || self.timer.is_some() || self.coprocessor
    }
}

/// Puts the controller to sleep and classifies what woke it.
#[derive(Debug)]
pub struct SleepController {
    clock: Arc<SlowClock>,
    hub: Arc<WakeHub>,
}

impl SleepController {
    /// Controller over `clock` and `hub`.
    #[must_use]
    pub fn new(clock: Arc<SlowClock>, hub: Arc<WakeHub>) -> Self {
        Self { clock, hub }
    }

    /// Enter deep sleep until one of `sources` fires.
    ///
    /// When several sources are already satisfied the report prefers the
    /// external line, then the coprocessor, then the timer.
    ///
    /// # Errors
    ///
    /// [`RtcError::NoWakeSource`] when nothing is armed; sleeping then
    /// would never end.
    pub fn enter(&self, sources: WakeSources) -> RtcResult<WakeCause> {
        if !sources.any_armed() {
            return Err(RtcError::NoWakeSource);
        }

        // Stale events from before this entry do not count as wakes.
        {
            let mut state = self.hub.lock();
            state.latched_low = false;
            state.copro_pending = false;
        }

        if sources.ext0.is_some() {
            self.clock.set_ext0_armed(true);
        }
        let deadline = sources.timer.map(|period| {
            let ticks = self.clock.wake_timer_ticks(period);
            let host = self.clock.ticks_to_host(ticks);
            debug!(programmed = ?period, realized = ?host, ticks, "timer wake armed");
            Instant::now() + host
        });
        info!(
            ext0 = sources.ext0.is_some(),
            timer = sources.timer.is_some(),
            coprocessor = sources.coprocessor,
            "entering deep sleep"
        );

        let cause = self.wait_for_wake(sources, deadline);
        self.clock.set_ext0_armed(false);
        info!(%cause, "woke from deep sleep");
        Ok(cause)
    }

    fn wait_for_wake(&self, sources: WakeSources, deadline: Option<Instant>) -> WakeCause {
        let mut state = self.hub.lock();
        loop {
            if let Some(edge) = sources.ext0 {
                let line_hit = state.line_level == edge.trigger_level();
                let latched = edge == WakeEdge::Low && state.latched_low;
                if line_hit || latched {
                    state.latched_low = false;
                    return WakeCause::ExternalInterrupt;
                }
            }
            if sources.coprocessor && state.copro_pending {
                state.copro_pending = false;
                return WakeCause::Coprocessor;
            }

            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WakeCause::Timer;
                    }
                    let (guard, _timed_out) = self
                        .hub
                        .cond
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard
                }
                None => self
                    .hub
                    .cond
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}
