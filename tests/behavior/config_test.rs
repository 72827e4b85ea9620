//! Configuration files on disk.
//!
//! The in-crate tests cover TOML parsing and validation; these exercise the
//! file path the daemon actually takes: write a config to disk, load it
//! back, and check the failure modes name the offending file.

use std::fs;
use std::time::Duration;

use tickscope_common::{HarnessConfig, WakeEdge};

#[test]
fn test_config_file_round_trips() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("config.toml");

    let mut config = HarnessConfig::default();
    config.capacity = 24;
    config.sampler_period = Duration::from_millis(750);
    config.wake_edge = WakeEdge::High;
    config.slow_clock.ext0_skew_ppm = -2_000;
    config.stats.history_size = 16;

    fs::write(&path, config.to_toml().expect("serializable")).expect("write config");
    let loaded = HarnessConfig::from_file(&path).expect("readable config");

    assert_eq!(loaded.capacity, 24);
    assert_eq!(loaded.sampler_period, Duration::from_millis(750));
    assert_eq!(loaded.poll_interval, config.poll_interval);
    assert_eq!(loaded.inactivity_threshold, config.inactivity_threshold);
    assert_eq!(loaded.sleep_duration, config.sleep_duration);
    assert_eq!(loaded.wake_edge, WakeEdge::High);
    assert_eq!(loaded.slow_clock.frequency_hz, config.slow_clock.frequency_hz);
    assert_eq!(loaded.slow_clock.ext0_skew_ppm, -2_000);
    assert_eq!(loaded.stats.enabled, config.stats.enabled);
    assert_eq!(loaded.stats.history_size, 16);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("config.toml");
    fs::write(&path, "capacity = 8\nsampler_period = \"100ms\"\n").expect("write config");

    let loaded = HarnessConfig::from_file(&path).expect("readable config");
    let defaults = HarnessConfig::default();
    assert_eq!(loaded.capacity, 8);
    assert_eq!(loaded.sampler_period, Duration::from_millis(100));
    assert_eq!(loaded.poll_interval, defaults.poll_interval);
    assert_eq!(loaded.sleep_duration, defaults.sleep_duration);
    assert_eq!(loaded.slow_clock.ext0_skew_ppm, defaults.slow_clock.ext0_skew_ppm);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_missing_file_names_the_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("no-such-config.toml");

    let err = HarnessConfig::from_file(&path).expect_err("file does not exist");
    assert!(
        err.to_string().contains("no-such-config.toml"),
        "error must name the file: {err}"
    );
}

#[test]
fn test_malformed_file_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("config.toml");
    fs::write(&path, "capacity = \"not a number\"\n").expect("write config");

    assert!(HarnessConfig::from_file(&path).is_err());
}
