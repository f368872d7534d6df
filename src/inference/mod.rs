//! Inference domain: predictions over frames and CSV files.

pub mod domain;
pub mod service;

pub use domain::{PredictFileReport, PREDICTION_COLUMN};
pub use service::{predict_file, predict_frame};
