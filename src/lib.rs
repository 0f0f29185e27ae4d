pub mod benchmark;
pub mod config;
pub mod core;
pub mod error;
pub mod invoke;
pub mod log;
pub mod orchestration;
pub mod util;

pub use error::{Error, Result};
