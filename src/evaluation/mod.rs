//! Scoring helpers and drift detection.

pub mod domain;
pub mod service;

pub use domain::{DriftStats, EvalSuite};
pub use service::DriftDetector;
