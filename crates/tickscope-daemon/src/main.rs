//! Harness daemon entry point.
//!
//! Wires the cycle controller, retained-memory domain, and signal handling
//! into a runnable process that boots, samples, prints, and sleeps like the
//! device under test.

mod controller;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tickscope_common::HarnessConfig;
use tracing::{info, warn};

use crate::controller::CycleController;
use crate::signals::SignalHandler;

/// Harness daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "tickscope-daemon",
    about = "Slow-clock tick sampling harness - records and prints coprocessor sample periods",
    version,
    long_about = None
)]
struct Args {
    /// Path to a harness configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sampler period, e.g. "10s" or "500ms" (overrides config file).
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    period: Option<Duration>,

    /// Sample buffer capacity in slots (overrides config file).
    #[arg(long, value_name = "SLOTS")]
    capacity: Option<usize>,

    /// Awake time before deep sleep (overrides config file).
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    inactivity: Option<Duration>,

    /// Deep sleep duration (overrides config file).
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    sleep_duration: Option<Duration>,

    /// Maximum boot cycles to run (0 = infinite).
    #[arg(long, default_value = "0")]
    max_boots: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tickscope daemon");

    let mut config = load_config(&args)?;

    // Override with command-line arguments
    if let Some(period) = args.period {
        config.sampler_period = period;
    }
    if let Some(capacity) = args.capacity {
        config.capacity = capacity;
    }
    if let Some(inactivity) = args.inactivity {
        config.inactivity_threshold = inactivity;
    }
    if let Some(sleep_duration) = args.sleep_duration {
        config.sleep_duration = sleep_duration;
    }

    config.validate().context("Invalid configuration")?;
    info!(
        capacity = config.capacity,
        sampler_period = %humantime::format_duration(config.sampler_period),
        skew_ppm = config.slow_clock.ext0_skew_ppm,
        "Configuration loaded"
    );

    let mut controller = CycleController::new(config);
    let signal_handler =
        SignalHandler::new(controller.wake_line()).context("Failed to set up signal handlers")?;

    controller.run(&signal_handler, args.max_boots)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "tickscope_daemon={},tickscope_rtc={},tickscope_copro={},tickscope_common={}",
        level, level, level, level
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `TICKSCOPE_CONFIG_PATH` environment variable
/// 3. `/etc/tickscope/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(args: &Args) -> Result<HarnessConfig> {
    // 1. Command-line argument (highest priority)
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return HarnessConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path));
    }

    // 2. Environment variable
    if let Ok(env_path) = std::env::var("TICKSCOPE_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from TICKSCOPE_CONFIG_PATH");
            return HarnessConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from TICKSCOPE_CONFIG_PATH={:?}", env_path)
            });
        }
        warn!(
            path = %env_path,
            "TICKSCOPE_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    // 3. System path
    let system_path = PathBuf::from("/etc/tickscope/config.toml");
    if system_path.exists() {
        info!(?system_path, "Loading config from system path");
        return HarnessConfig::from_file(&system_path)
            .with_context(|| format!("Failed to load config from {:?}", system_path));
    }

    // 4. Local development path
    let local_path = PathBuf::from("config/default.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from local path");
        return HarnessConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {:?}", local_path));
    }

    // 5. Built-in defaults
    info!("No config file found, using built-in defaults");
    Ok(HarnessConfig::default())
}
