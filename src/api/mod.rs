//! Entry points driving the pipeline: the streaming session and its one-shot actions.

pub mod session;

pub use session::{CycleReport, RunSummary, Session, StatusReport};
