#![doc = "Common types shared across the tickscope workspace."]

pub mod calib;
pub mod config;
pub mod convert;
pub mod power;
pub mod stats;

pub use calib::*;
pub use config::*;
pub use convert::*;
pub use power::*;
pub use stats::*;
