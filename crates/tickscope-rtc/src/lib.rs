#![doc = "The retained-memory domain: arena, slow clock, sampler, and sleep."]

pub mod buffer;
pub mod clock;
pub mod error;
pub mod machine;
pub mod retained;
pub mod service;
pub mod sleep;

pub use buffer::*;
pub use clock::*;
pub use error::*;
pub use machine::*;
pub use retained::*;
pub use service::*;
pub use sleep::*;
