//! Wake cause classification.

use std::fmt;

/// Why the main processor came out of reset or deep sleep.
///
/// Drives the boot path split: retained state is initialized only on a cold
/// start, every deep-sleep wake resumes with the state left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeCause {
    /// Power-on or reset, not a deep-sleep wake. Retained memory is garbage.
    ColdStart,
    /// The external interrupt line hit its armed level.
    ExternalInterrupt,
    /// The sleep timer expired.
    Timer,
    /// The coprocessor raised a wake request.
    Coprocessor,
}

impl WakeCause {
    /// Whether this wake came out of deep sleep (retained memory is valid).
    #[must_use]
    pub fn is_deep_sleep_wake(self) -> bool {
        !matches!(self, WakeCause::ColdStart)
    }
}

impl fmt::Display for WakeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WakeCause::ColdStart => "cold start",
            WakeCause::ExternalInterrupt => "external interrupt",
            WakeCause::Timer => "timer",
            WakeCause::Coprocessor => "coprocessor",
        };
        f.write_str(s)
    }
}
