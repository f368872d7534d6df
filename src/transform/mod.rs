//! Batch-to-batch consistent preprocessing: imputation and categorical encoding.

pub mod domain;
pub mod service;

pub use domain::{CtgMethod, FeatureMatrix, FittedEncoding, NaMethod};
pub use service::DataTransformer;
