//! Model pipeline: history replay, transformation, training and persistence.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::error::{CoreError, CoreResult};
use crate::common::time;
use crate::data::domain::{Frame, Schema};
use crate::transform::service::DataTransformer;

use super::domain::{Estimator, FitReport, Predictions, SnapshotRepo};
use super::history::History;
use super::search::{GridSearch, SearchOutcome};
use super::snapshot;

/// Envelope kind tag of the pipeline snapshot.
pub const PIPELINE_KIND: &str = "model-pipeline";

#[derive(Serialize)]
#[serde(bound = "")]
struct SnapshotRef<'a, E: Estimator> {
    transformer: &'a DataTransformer,
    history: &'a History,
    estimator: &'a E,
    last_search: Option<&'a SearchOutcome<E::Params>>,
}

#[derive(Deserialize)]
#[serde(bound = "")]
struct PipelineSnapshot<E: Estimator> {
    transformer: DataTransformer,
    history: History,
    estimator: E,
    last_search: Option<SearchOutcome<E::Params>>,
}

/// Transformer, history and model kept in lockstep.
///
/// Every `fit` replays the whole history through `prepare_train`, so the
/// encoding always reflects every row retained so far.
pub struct ModelPipeline<E: Estimator> {
    transformer: DataTransformer,
    history: History,
    estimator: E,
    search: Option<GridSearch<E::Params>>,
    last_search: Option<SearchOutcome<E::Params>>,
    repo: Option<Box<dyn SnapshotRepo>>,
}

impl<E: Estimator> ModelPipeline<E> {
    /// Fresh, unfitted pipeline. `estimator` supplies the hyperparameters of
    /// plain fits.
    pub fn new(transformer: DataTransformer, estimator: E) -> Self {
        Self {
            transformer,
            history: History::new(),
            estimator,
            search: None,
            last_search: None,
            repo: None,
        }
    }

    /// Re-run a grid search on every full fit.
    pub fn with_search(mut self, search: GridSearch<E::Params>) -> Self {
        self.search = Some(search);
        self
    }

    /// Persist after every successful fit.
    pub fn with_repo(mut self, repo: Box<dyn SnapshotRepo>) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Restore from `repo`, or start fresh when there is nothing usable.
    ///
    /// An unreadable, corrupt or incompatible snapshot is logged and
    /// discarded; it never prevents the pipeline from starting. A restored
    /// snapshot keeps its own preprocessing methods; a mismatch with
    /// `transformer` is logged.
    pub fn open(transformer: DataTransformer, estimator: E, repo: Box<dyn SnapshotRepo>) -> Self {
        match load_snapshot::<E>(repo.as_ref()) {
            Ok(Some(snap)) => {
                warn_on_method_change(&transformer, &snap.transformer);
                info!(
                    history_rows = snap.history.n_rows(),
                    "restored pipeline from snapshot"
                );
                Self {
                    transformer: snap.transformer,
                    history: snap.history,
                    estimator: snap.estimator,
                    search: None,
                    last_search: snap.last_search,
                    repo: Some(repo),
                }
            }
            Ok(None) => {
                debug!("no snapshot found, starting unfitted");
                Self::new(transformer, estimator).with_repo(repo)
            }
            Err(err) => {
                warn!(error = %err, "discarding unusable snapshot, starting unfitted");
                Self::new(transformer, estimator).with_repo(repo)
            }
        }
    }

    /// True once a fit has succeeded; never reverts.
    pub fn is_fit(&self) -> bool {
        !self.history.is_empty()
    }

    /// Append the batch to history and retrain on everything seen so far.
    ///
    /// Nothing changes unless training succeeds. A failed snapshot write is
    /// returned as an error, but the new fit stays active in memory.
    pub fn fit(&mut self, features: &Frame, target: &Frame) -> CoreResult<FitReport<E::Params>> {
        let start = time::now_ms();
        let mut history = self.history.clone();
        history.add(features, target)?;
        let (all_x, all_y) = history.get().ok_or(CoreError::EmptyBatch)?;

        let mut transformer = self.transformer.clone();
        let (x, y) = transformer.prepare_train(all_x, all_y)?;

        let (estimator, outcome) = match &self.search {
            Some(search) => {
                let (model, outcome) = search.run::<E>(&x, &y)?;
                (model, Some(outcome))
            }
            None => {
                let mut model = E::with_params(self.estimator.params().clone());
                model.fit(&x, &y)?;
                (model, None)
            }
        };

        let report = FitReport {
            history_rows: history.n_rows(),
            train_rows: x.n_rows(),
            n_features: x.n_features(),
            train_score: estimator.score(&x, &y)?,
            params: estimator.params().clone(),
            search_score: outcome.as_ref().map(|o| o.best_score),
        };

        self.history = history;
        self.transformer = transformer;
        self.estimator = estimator;
        if outcome.is_some() {
            self.last_search = outcome;
        }
        info!(
            history_rows = report.history_rows,
            train_rows = report.train_rows,
            features = report.n_features,
            train_score = report.train_score,
            search_score = ?report.search_score,
            elapsed_ms = time::elapsed_ms(start) as u64,
            "pipeline fitted"
        );

        self.persist()?;
        Ok(report)
    }

    /// Retrain the active hyperparameters on this batch alone.
    ///
    /// The batch goes through `prepare_pred`: no history replay, no search
    /// and no vocabulary change. Returns the training accuracy.
    pub fn refit(&mut self, features: &Frame, target: &Frame) -> CoreResult<f64> {
        if !self.is_fit() {
            return Err(CoreError::NotFitted);
        }
        let (x, y) = self.transformer.prepare_pred(features, Some(target))?;
        let y = y.unwrap_or_default();
        if x.is_empty() {
            return Err(CoreError::NoUsableRows);
        }
        let mut model = E::with_params(self.estimator.params().clone());
        model.fit(&x, &y)?;
        let score = model.score(&x, &y)?;
        self.estimator = model;
        info!(rows = x.n_rows(), score, "pipeline refitted on batch");
        Ok(score)
    }

    /// Predict the rows that survive transformation.
    pub fn predict(&self, features: &Frame) -> CoreResult<Predictions> {
        if !self.is_fit() {
            return Err(CoreError::NotFitted);
        }
        let (x, _) = self.transformer.prepare_pred(features, None)?;
        let dropped = features.n_rows() - x.n_rows();
        if dropped > 0 {
            debug!(dropped, "rows dropped before prediction");
        }
        Ok(Predictions {
            index: x.index().to_vec(),
            values: self.estimator.predict(&x)?,
        })
    }

    /// Accuracy on a labelled batch.
    pub fn eval(&self, features: &Frame, target: &Frame) -> CoreResult<f64> {
        if !self.is_fit() {
            return Err(CoreError::NotFitted);
        }
        let (x, y) = self.transformer.prepare_pred(features, Some(target))?;
        if x.is_empty() {
            return Err(CoreError::NoUsableRows);
        }
        self.estimator.score(&x, &y.unwrap_or_default())
    }

    /// Accuracy of the active model over the whole history, `None` when unfitted.
    pub fn eval_history(&self) -> CoreResult<Option<f64>> {
        match self.history.get() {
            Some((x, y)) => self.eval(x, y).map(Some),
            None => Ok(None),
        }
    }

    /// Write the current state through the repository, if one is attached.
    pub fn persist(&self) -> CoreResult<()> {
        let Some(repo) = &self.repo else {
            return Ok(());
        };
        let snap = SnapshotRef {
            transformer: &self.transformer,
            history: &self.history,
            estimator: &self.estimator,
            last_search: self.last_search.as_ref(),
        };
        let bytes = snapshot::seal(PIPELINE_KIND, &snap)?;
        repo.put_snapshot(&bytes)?;
        debug!(bytes = bytes.len(), "pipeline persisted");
        Ok(())
    }

    /// Feature layout the pipeline accepts, once fitted.
    pub fn feature_schema(&self) -> Option<&Schema> {
        self.transformer.fitted().map(|f| &f.feature_schema)
    }

    /// Name of the trained target column, once fitted.
    pub fn target_name(&self) -> Option<&str> {
        self.transformer.fitted().map(|f| f.target.as_str())
    }

    /// Preprocessing fitted on the full history.
    pub fn transformer(&self) -> &DataTransformer {
        &self.transformer
    }

    /// Accumulated training rows.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The active model.
    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Outcome of the most recent grid search, if any.
    pub fn last_search(&self) -> Option<&SearchOutcome<E::Params>> {
        self.last_search.as_ref()
    }
}

/// Log when the configured preprocessing differs from the restored one.
fn warn_on_method_change(configured: &DataTransformer, restored: &DataTransformer) {
    if configured.na_method() != restored.na_method()
        || configured.ctg_method() != restored.ctg_method()
    {
        warn!(
            configured_na = ?configured.na_method(),
            configured_ctg = ?configured.ctg_method(),
            restored_na = ?restored.na_method(),
            restored_ctg = ?restored.ctg_method(),
            "preprocessing methods differ from the snapshot, keeping the snapshot's"
        );
    }
}

fn load_snapshot<E: Estimator>(repo: &dyn SnapshotRepo) -> CoreResult<Option<PipelineSnapshot<E>>> {
    let Some(bytes) = repo.get_snapshot()? else {
        return Ok(None);
    };
    let snap: PipelineSnapshot<E> = snapshot::open(PIPELINE_KIND, &bytes)?;
    if snap.history.is_empty() == snap.transformer.is_fitted() {
        return Err(CoreError::Codec(
            "snapshot history and transformer state disagree".to_string(),
        ));
    }
    Ok(Some(snap))
}
