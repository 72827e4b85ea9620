//! Period stretch while the external wake line is armed.
//!
//! The simulated slow clock derates its wake timer when ext0 is armed, the
//! way the target hardware does. The sampler re-derives its next fire from
//! the wake timer on every pass, so arming during deep sleep stretches the
//! gaps between recorded samples. These tests measure the gaps before and
//! during an armed sleep and check the stretch tracks the configured skew,
//! then repeat with a timer-only sleep to show arming, not sleeping, is
//! what moves the periods.

use std::sync::Arc;
use std::time::Duration;

use tickscope_common::{WakeCause, WakeEdge};
use tickscope_rtc::{SampleBuffer, SleepController, WakeSources};

use super::common::{mean_ticks, wait_for_runs, Harness};

/// 30% stretch while armed.
const SKEW_PPM: i64 = 300_000;

const PERIOD: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(10);

fn slot_tick(buffer: &SampleBuffer, slot: usize) -> u64 {
    buffer
        .sample(u16::try_from(slot).expect("test slots stay small"))
        .unwrap_or_else(|| panic!("slot {slot} out of range"))
        .value()
}

/// Gap after run `k`: run `k`'s tick lands at slot `k - 1`, run `k + 1`'s at
/// slot `k`.
fn gap_after_run(buffer: &SampleBuffer, k: usize) -> u64 {
    slot_tick(buffer, k) - slot_tick(buffer, k - 1)
}

/// Run the sampler through a pre-sleep phase and one sleep, then return
/// (mean gap before sleep, mean gap during sleep, wake cause).
///
/// Gaps are scheduled at the completion of the run that opens them, so the
/// first gaps of the sleep window were sized before arming took effect and
/// the sets here drop the boundary runs on both sides.
fn measure(harness: &Harness, sources: WakeSources) -> (u64, u64, WakeCause) {
    let buffer = harness.buffer();
    let mut service = harness.start_sampler(PERIOD);
    assert!(
        wait_for_runs(&buffer, 6, WAIT),
        "sampler never reached the pre-sleep run count"
    );

    let sleeper = SleepController::new(Arc::clone(&harness.clock), Arc::clone(&harness.hub));
    let r1 = buffer.run_count() as usize;
    let cause = sleeper.enter(sources).expect("wake sources are armed");
    let r2 = buffer.run_count() as usize;
    service.stop();

    assert!(
        r2 >= r1 + 6,
        "too few runs during sleep to measure: {r1} -> {r2}"
    );

    let before: Vec<u64> = (1..r1 - 1).map(|k| gap_after_run(&buffer, k)).collect();
    let during: Vec<u64> = (r1 + 2..r2).map(|k| gap_after_run(&buffer, k)).collect();
    (mean_ticks(&before), mean_ticks(&during), cause)
}

#[test]
fn test_armed_sleep_stretches_sample_periods() {
    let harness = Harness::new(64, SKEW_PPM);
    let sources = WakeSources::default()
        .with_ext0(WakeEdge::Low)
        .with_timer(Duration::from_millis(600));
    let (before, during, cause) = measure(&harness, sources);

    // No press arrives, so the stretched timer ends the sleep.
    assert_eq!(cause, WakeCause::Timer);
    let ratio = during as f64 / before as f64;
    assert!(
        (1.15..=1.5).contains(&ratio),
        "expected ~1.3x stretch while armed, got {ratio:.3} \
         ({before} -> {during} ticks)"
    );
}

#[test]
fn test_unarmed_sleep_leaves_periods_alone() {
    // Same skewed clock; the line is simply never armed.
    let harness = Harness::new(64, SKEW_PPM);
    let sources = WakeSources::default().with_timer(Duration::from_millis(600));
    let (before, during, cause) = measure(&harness, sources);

    assert_eq!(cause, WakeCause::Timer);
    let ratio = during as f64 / before as f64;
    assert!(
        (0.85..=1.15).contains(&ratio),
        "timer-only sleep must not stretch periods, got {ratio:.3} \
         ({before} -> {during} ticks)"
    );
}
