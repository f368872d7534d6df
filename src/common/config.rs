//! Runtime configuration loaded from the environment, then overridden by CLI flags.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::error::{CoreError, CoreResult};
use crate::transform::domain::{CtgMethod, NaMethod};

/// Default divergence above which a batch counts as drifted.
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 0.2;

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppCfg {
    /// Directory holding the pipeline and cursor snapshots.
    pub state_dir: PathBuf,
    pub target: String,
    pub timestamp: String,
    pub batch_size: usize,
    /// Artificial delay between batches, emulating real-time arrival.
    pub delay_ms: u64,
    /// Stop after this many cycles; `None` runs until the source is drained.
    pub max_iterations: Option<usize>,
    pub na_method: NaMethod,
    pub ctg_method: CtgMethod,
    pub drift_threshold: f64,
    /// Run a grid search on every full fit instead of a plain fit.
    pub search: bool,
    pub search_folds: usize,
    pub log_filter: String,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./state"),
            target: "WITH_PAID".to_string(),
            timestamp: "INSR_BEGIN".to_string(),
            batch_size: 50,
            delay_ms: 3000,
            max_iterations: None,
            na_method: NaMethod::Drop,
            ctg_method: CtgMethod::Ohe,
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            search: false,
            search_folds: 3,
            log_filter: "info".to_string(),
        }
    }
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> CoreResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(raw: Option<String>, key: &str, default: T) -> CoreResult<T> {
            match raw {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| CoreError::invalid(format!("{key}: cannot parse {value:?}"))),
                None => Ok(default),
            }
        }

        let defaults = Self::default();
        let max_iterations = match lookup("TABSTREAM_MAX_ITERATIONS") {
            Some(raw) => Some(parsed(Some(raw), "TABSTREAM_MAX_ITERATIONS", 0usize)?),
            None => None,
        };

        let cfg = Self {
            state_dir: lookup("TABSTREAM_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            target: lookup("TABSTREAM_TARGET").unwrap_or(defaults.target),
            timestamp: lookup("TABSTREAM_TIMESTAMP").unwrap_or(defaults.timestamp),
            batch_size: parsed(
                lookup("TABSTREAM_BATCH_SIZE"),
                "TABSTREAM_BATCH_SIZE",
                defaults.batch_size,
            )?,
            delay_ms: parsed(
                lookup("TABSTREAM_DELAY_MS"),
                "TABSTREAM_DELAY_MS",
                defaults.delay_ms,
            )?,
            max_iterations,
            na_method: parsed(
                lookup("TABSTREAM_NA_METHOD"),
                "TABSTREAM_NA_METHOD",
                defaults.na_method,
            )?,
            ctg_method: parsed(
                lookup("TABSTREAM_CTG_METHOD"),
                "TABSTREAM_CTG_METHOD",
                defaults.ctg_method,
            )?,
            drift_threshold: parsed(
                lookup("TABSTREAM_DRIFT_THRESHOLD"),
                "TABSTREAM_DRIFT_THRESHOLD",
                defaults.drift_threshold,
            )?,
            search: parsed(lookup("TABSTREAM_SEARCH"), "TABSTREAM_SEARCH", defaults.search)?,
            search_folds: parsed(
                lookup("TABSTREAM_SEARCH_FOLDS"),
                "TABSTREAM_SEARCH_FOLDS",
                defaults.search_folds,
            )?,
            log_filter: lookup("TABSTREAM_LOG").unwrap_or(defaults.log_filter),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the harness cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.batch_size == 0 {
            return Err(CoreError::invalid("batch_size must be positive"));
        }
        if !(self.drift_threshold > 0.0) {
            return Err(CoreError::invalid("drift_threshold must be positive"));
        }
        if self.search && self.search_folds < 2 {
            return Err(CoreError::invalid("search_folds must be at least 2"));
        }
        if self.target == self.timestamp {
            return Err(CoreError::invalid("target and timestamp must differ"));
        }
        Ok(())
    }

    /// Location of the pipeline snapshot.
    pub fn pipeline_snapshot(&self) -> PathBuf {
        self.state_dir.join("pipeline.json")
    }

    /// Location of the companion cursor snapshot.
    pub fn cursor_snapshot(&self) -> PathBuf {
        self.state_dir.join("cursor.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = AppCfg::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.target, "WITH_PAID");
        assert_eq!(cfg.timestamp, "INSR_BEGIN");
        assert_eq!(cfg.drift_threshold, 0.2);
    }

    #[test]
    fn environment_overrides_defaults() {
        let cfg = AppCfg::from_lookup(lookup_from(&[
            ("TABSTREAM_BATCH_SIZE", "10"),
            ("TABSTREAM_NA_METHOD", "median-mode"),
            ("TABSTREAM_MAX_ITERATIONS", "4"),
            ("TABSTREAM_STATE_DIR", "/tmp/ts"),
        ]))
        .unwrap();
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.na_method, NaMethod::MedianMode);
        assert_eq!(cfg.max_iterations, Some(4));
        assert_eq!(cfg.pipeline_snapshot(), PathBuf::from("/tmp/ts/pipeline.json"));
    }

    #[test]
    fn rejects_unparsable_and_invalid_values() {
        let err = AppCfg::from_lookup(lookup_from(&[("TABSTREAM_BATCH_SIZE", "many")]));
        assert!(matches!(err, Err(CoreError::InvalidInput(_))));

        let err = AppCfg::from_lookup(lookup_from(&[("TABSTREAM_BATCH_SIZE", "0")]));
        assert!(matches!(err, Err(CoreError::InvalidInput(_))));

        let err = AppCfg::from_lookup(lookup_from(&[("TABSTREAM_CTG_METHOD", "target")]));
        assert!(matches!(err, Err(CoreError::InvalidInput(_))));
    }
}
