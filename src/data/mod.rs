//! Data domain: record batches, CSV access, the emulated stream and quality statistics.

pub mod domain;
pub mod quality;
pub mod repo_fs;
pub mod source;

pub use domain::{ColumnKind, Cursor, Field, Frame, Schema, Value};
pub use quality::QualityStats;
pub use source::{BatchMode, BatchSource, TableSource};
