//! Training domain: history, estimators, search and the model pipeline.

pub mod domain;
pub mod history;
pub mod repo_fs;
pub mod search;
pub mod service;
pub mod snapshot;
pub mod tree;

pub use domain::{Estimator, FitReport, Predictions, SnapshotRepo};
pub use history::History;
pub use search::{GridSearch, SearchOutcome};
pub use service::ModelPipeline;
pub use tree::{DecisionTreeClassifier, TreeParams};
