//! Shared utilities that glue the different domains together.

pub mod config;
pub mod error;
pub mod fs;
pub mod ids;
pub mod log;
pub mod time;

pub use error::{CoreError, CoreResult, ErrorCode};
