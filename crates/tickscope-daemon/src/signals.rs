//! Signal handling for the harness daemon.
//!
//! SIGTERM and SIGINT request a clean shutdown. SIGUSR1 stands in for the
//! wake button: it pulses the external wake line low, which ends a deep
//! sleep when the line is armed and is ignored otherwise, the same as
//! pressing the real button. A shutdown signal also presses the line so a
//! sleeping daemon exits promptly instead of waiting out its timer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tickscope_rtc::WakeLine;
use tracing::{debug, info};

/// Signal types that the daemon handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGTERM - Graceful termination request.
    Terminate,
    /// SIGINT - Interrupt (Ctrl+C).
    Interrupt,
    /// SIGUSR1 - Pulse the external wake line.
    ButtonPulse,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Terminate => write!(f, "SIGTERM"),
            SignalKind::Interrupt => write!(f, "SIGINT"),
            SignalKind::ButtonPulse => write!(f, "SIGUSR1"),
        }
    }
}

/// Shared state for signal handling.
///
/// Shared between the signal poll thread and the boot loop. All fields use
/// atomic operations for thread-safe access.
#[derive(Debug)]
pub struct SignalState {
    /// Set to true when a shutdown signal is received.
    shutdown_requested: AtomicBool,
    /// Count of signals received (for diagnostics).
    signal_count: AtomicU32,
    /// The most recent signal received.
    last_signal: AtomicU32,
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalState {
    /// Create a new signal state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shutdown_requested: AtomicBool::new(false),
            signal_count: AtomicU32::new(0),
            last_signal: AtomicU32::new(0),
        }
    }

    /// Check if shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    /// Request shutdown (can be called from any thread).
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Relaxed);
    }

    /// Record a signal.
    fn record_signal(&self, kind: SignalKind) {
        self.signal_count.fetch_add(1, Ordering::Relaxed);
        self.last_signal.store(kind as u32, Ordering::Relaxed);
    }

    /// Get the total number of signals received.
    #[must_use]
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}

/// Handle for signal management.
#[derive(Clone)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    /// Create a signal handler and register the process handlers.
    ///
    /// `line` is pulsed on SIGUSR1 and pressed on shutdown signals. On
    /// non-Unix platforms only manual shutdown is supported.
    ///
    /// # Errors
    ///
    /// Propagates handler registration failures.
    pub fn new(line: WakeLine) -> std::io::Result<Self> {
        let state = Arc::new(SignalState::new());
        let handler = Self {
            state: Arc::clone(&state),
        };

        #[cfg(unix)]
        handler.register_unix_handlers(line)?;
        #[cfg(not(unix))]
        drop(line);

        Ok(handler)
    }

    /// Register Unix signal handlers.
    #[cfg(unix)]
    fn register_unix_handlers(&self, line: WakeLine) -> std::io::Result<()> {
        use std::os::raw::c_int;

        // Handlers must be async-signal-safe, so they only flip statics;
        // a poll thread translates the flags into state changes and line
        // presses.

        static SHUTDOWN_FLAG: AtomicBool = AtomicBool::new(false);
        static PULSE_FLAG: AtomicBool = AtomicBool::new(false);

        let state = Arc::clone(&self.state);

        std::thread::spawn(move || {
            loop {
                if SHUTDOWN_FLAG.swap(false, Ordering::Relaxed) {
                    info!("Shutdown signal received");
                    state.request_shutdown();
                    state.record_signal(SignalKind::Terminate);
                    // End any deep sleep in progress.
                    line.press();
                }
                if PULSE_FLAG.swap(false, Ordering::Relaxed) {
                    info!("Wake button signal received");
                    state.record_signal(SignalKind::ButtonPulse);
                    line.press();
                    line.release();
                }
                if state.shutdown_requested() {
                    // Exit the poll thread once shutdown is underway
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        });

        unsafe {
            libc::signal(libc::SIGTERM, sigterm_handler as libc::sighandler_t);
            libc::signal(libc::SIGINT, sigint_handler as libc::sighandler_t);
            libc::signal(libc::SIGUSR1, sigusr1_handler as libc::sighandler_t);
        }

        extern "C" fn sigterm_handler(_: c_int) {
            SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
        }

        extern "C" fn sigint_handler(_: c_int) {
            SHUTDOWN_FLAG.store(true, Ordering::Relaxed);
        }

        extern "C" fn sigusr1_handler(_: c_int) {
            PULSE_FLAG.store(true, Ordering::Relaxed);
        }

        debug!("Unix signal handlers registered");
        Ok(())
    }

    /// Check if shutdown has been requested.
    #[inline]
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        self.state.shutdown_requested()
    }

    /// Manually request shutdown.
    pub fn request_shutdown(&self) {
        info!("Manual shutdown requested");
        self.state.request_shutdown();
    }

    /// Get the signal state for inspection.
    #[must_use]
    pub fn state(&self) -> &SignalState {
        &self.state
    }
}
