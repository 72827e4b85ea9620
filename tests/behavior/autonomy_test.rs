//! Sampler autonomy across deep sleep, and wake-cause classification.
//!
//! Deep sleep suspends only the host loop. The sampler worker keeps firing
//! on its own timer, so the run counter advances while the sleep controller
//! is blocked. On wake the controller names the source that ended the
//! sleep, and a held wake line outranks a pending coprocessor request.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tickscope_common::{WakeCause, WakeEdge};
use tickscope_copro::Assembler;
use tickscope_rtc::{SamplerService, SleepController, WakeLine, WakeSources};

use super::common::{wait_for_runs, wait_until_armed, Harness};

/// A program whose every pass asks the host to wake.
fn wake_every_pass() -> tickscope_copro::Program {
    let mut asm = Assembler::new();
    asm.wake();
    asm.halt();
    asm.assemble().expect("two fixed instructions always assemble")
}

#[test]
fn test_sampler_runs_through_deep_sleep() {
    let harness = Harness::new(16, 0);
    let buffer = harness.buffer();
    let service = harness.start_sampler(Duration::from_millis(30));
    assert!(wait_for_runs(&buffer, 1, Duration::from_secs(5)));

    let sleeper = SleepController::new(Arc::clone(&harness.clock), Arc::clone(&harness.hub));
    let runs_before = buffer.run_count();
    let cause = sleeper
        .enter(WakeSources::default().with_timer(Duration::from_millis(150)))
        .expect("a timer is armed");
    let runs_after = buffer.run_count();

    assert_eq!(cause, WakeCause::Timer);
    // 150 ms asleep at a 30 ms period leaves room for five runs; ask for
    // three so a slow scheduler does not fail the test.
    assert!(
        runs_after >= runs_before + 3,
        "sampler stalled during sleep: {runs_before} -> {runs_after}"
    );

    drop(service);
}

#[test]
fn test_button_press_ends_deep_sleep() {
    let harness = Harness::new(8, 0);
    let sleeper = SleepController::new(Arc::clone(&harness.clock), Arc::clone(&harness.hub));
    let line = WakeLine::new(Arc::clone(&harness.hub));

    let presser = thread::spawn({
        let clock = Arc::clone(&harness.clock);
        move || {
            wait_until_armed(&clock);
            line.press();
            line.release();
        }
    });

    let cause = sleeper
        .enter(
            WakeSources::default()
                .with_ext0(WakeEdge::Low)
                .with_timer(Duration::from_secs(30)),
        )
        .expect("wake sources are armed");
    assert_eq!(cause, WakeCause::ExternalInterrupt);
    presser.join().expect("presser thread must not panic");
}

#[test]
fn test_coprocessor_wake_ends_deep_sleep() {
    let harness = Harness::new(8, 0);
    let program = wake_every_pass();
    let service = SamplerService::start(
        Arc::clone(&harness.arena),
        Arc::clone(&harness.clock),
        Arc::clone(&harness.hub),
        &program,
        Duration::from_millis(20),
    )
    .expect("fresh arena has no writer");

    let sleeper = SleepController::new(Arc::clone(&harness.clock), Arc::clone(&harness.hub));
    let cause = sleeper
        .enter(
            WakeSources::default()
                .with_coprocessor()
                .with_timer(Duration::from_secs(30)),
        )
        .expect("wake sources are armed");

    assert_eq!(cause, WakeCause::Coprocessor);
    assert!(service.passes() > 0);
}

#[test]
fn test_held_line_outranks_coprocessor_request() {
    let harness = Harness::new(8, 0);
    let program = wake_every_pass();
    let _service = SamplerService::start(
        Arc::clone(&harness.arena),
        Arc::clone(&harness.clock),
        Arc::clone(&harness.hub),
        &program,
        Duration::from_millis(10),
    )
    .expect("fresh arena has no writer");

    // Hold the line low before entering. The level check fires on entry,
    // ahead of any coprocessor request raised by the running sampler.
    let line = WakeLine::new(Arc::clone(&harness.hub));
    line.press();

    let sleeper = SleepController::new(Arc::clone(&harness.clock), Arc::clone(&harness.hub));
    let cause = sleeper
        .enter(
            WakeSources::default()
                .with_ext0(WakeEdge::Low)
                .with_coprocessor(),
        )
        .expect("wake sources are armed");
    assert_eq!(cause, WakeCause::ExternalInterrupt);
}
