//! Incremental training harness for tabular data streams.
pub mod api;
pub mod common;
pub mod data;
pub mod evaluation;
pub mod inference;
pub mod training;
pub mod transform;

pub use api::Session;
pub use common::{CoreError, CoreResult, ErrorCode};
pub use training::ModelPipeline;
