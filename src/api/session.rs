//! Streaming harness: one explicit session owning configuration, pipeline,
//! drift detector and cursor store.

use std::path::Path;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{CoreError, CoreResult};
use crate::common::log;
use crate::data::domain::{ColumnKind, Cursor, CursorRepo, Field, Frame, Schema};
use crate::data::quality;
use crate::data::repo_fs::{self, FsCursorRepo};
use crate::data::source::BatchSource;
use crate::evaluation::domain::{DriftStats, EvalSuite};
use crate::evaluation::service::DriftDetector;
use crate::inference::domain::PredictFileReport;
use crate::inference::service as inference_service;
use crate::training::domain::Estimator;
use crate::training::repo_fs::FsSnapshotRepo;
use crate::training::search::GridSearch;
use crate::training::service::ModelPipeline;
use crate::training::tree::{DecisionTreeClassifier, TreeParams};
use crate::transform::service::DataTransformer;

/// What happened during one streaming cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub iteration: usize,
    pub received: usize,
    /// Rows used by the full fit, `None` when the fit failed.
    pub train_rows: Option<usize>,
    pub rows_with_na: f64,
    pub drift: DriftStats,
    pub scores: EvalSuite,
}

/// Totals of a finished run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cycles: usize,
    pub rows: usize,
    pub drift_events: usize,
    pub failed_fits: usize,
    pub last_scores: EvalSuite,
}

/// Persisted state as seen by the `status` action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub fitted: bool,
    pub history_rows: usize,
    pub target: Option<String>,
    pub feature_columns: Vec<String>,
    pub encoded_columns: Vec<String>,
    pub cursor: Option<Cursor>,
    pub search_score: Option<f64>,
}

/// Configuration, pipeline, drift detector and cursor store of one run.
pub struct Session<E: Estimator> {
    cfg: AppCfg,
    pipeline: ModelPipeline<E>,
    detector: DriftDetector,
    cursors: Box<dyn CursorRepo>,
    iteration: usize,
}

impl Session<DecisionTreeClassifier> {
    /// Session over the state directory in `cfg`, with a decision tree model.
    pub fn open(cfg: AppCfg) -> CoreResult<Self> {
        cfg.validate()?;
        let transformer = DataTransformer::new(cfg.na_method, cfg.ctg_method);
        let mut pipeline = ModelPipeline::open(
            transformer,
            DecisionTreeClassifier::default(),
            Box::new(FsSnapshotRepo::from_cfg(&cfg)),
        );
        if cfg.search {
            let search = GridSearch::new(TreeParams::default_grid(), cfg.search_folds)?;
            pipeline = pipeline.with_search(search);
        }
        let cursors = Box::new(FsCursorRepo::new(cfg.cursor_snapshot()));
        Ok(Self::new(cfg, pipeline, cursors))
    }
}

impl<E: Estimator> Session<E> {
    /// Session around an already opened pipeline.
    pub fn new(cfg: AppCfg, pipeline: ModelPipeline<E>, cursors: Box<dyn CursorRepo>) -> Self {
        let detector = DriftDetector::new(cfg.drift_threshold);
        Self {
            cfg,
            pipeline,
            detector,
            cursors,
            iteration: 0,
        }
    }

    /// Configuration the session was opened with.
    pub fn cfg(&self) -> &AppCfg {
        &self.cfg
    }

    /// The pipeline driven by this session.
    pub fn pipeline(&self) -> &ModelPipeline<E> {
        &self.pipeline
    }

    /// Continue where the previous run stopped. The stored cursor is only
    /// trusted when the restored pipeline has actually learned those rows.
    pub fn resume<S: BatchSource>(&self, source: &mut S) {
        if !self.pipeline.is_fit() {
            return;
        }
        match self.cursors.get_cursor() {
            Ok(Some(cursor)) => {
                info!(position = cursor.position, "resuming stream");
                source.seek(cursor);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "cursor unreadable, starting from the beginning"),
        }
    }

    /// Run one cycle. `Ok(None)` means the source is drained; only fatal
    /// errors are returned, everything else is logged and absorbed.
    pub fn step<S: BatchSource>(&mut self, source: &mut S) -> CoreResult<Option<CycleReport>> {
        let batch = source.next_batch()?;
        if batch.is_empty() {
            return Ok(None);
        }
        self.iteration += 1;
        let iteration = self.iteration;
        info!(iteration, received = batch.n_rows(), "batch received");

        batch.require_columns(&[self.cfg.target.as_str(), self.cfg.timestamp.as_str()])?;
        let stats = quality::analyze(&batch, true)?;
        log::log_quality(&stats);

        let (features, target) = split_batch(&batch, &self.cfg)?;
        let drift = self.detector.observe(&features)?;

        let mut scores = EvalSuite::default();
        if self.pipeline.is_fit() {
            scores.batch = absorb(self.pipeline.eval(&features, &target), "batch evaluation")?;
        }

        let train_rows = absorb(self.pipeline.fit(&features, &target), "fit")?
            .map(|report| report.train_rows);
        // Also meaningful after a failed snapshot write, which keeps the new fit.
        scores.history = absorb(self.pipeline.eval_history(), "history evaluation")?.flatten();

        // The cursor only moves past rows the stored snapshot has learned.
        if train_rows.is_some() {
            if let Err(err) = self.cursors.put_cursor(&source.cursor()) {
                warn!(error = %err, "cursor not saved");
            }
        } else {
            debug!(iteration, "cursor kept, batch will be replayed after a restart");
        }

        info!(
            iteration,
            kept = ?train_rows,
            batch_score = ?scores.batch,
            history_score = ?scores.history,
            drifted = drift.drifted,
            "cycle finished"
        );
        Ok(Some(CycleReport {
            iteration,
            received: batch.n_rows(),
            train_rows,
            rows_with_na: stats.rows_with_na,
            drift,
            scores,
        }))
    }

    /// Drive the loop until the source is drained or the iteration limit is hit.
    pub fn run<S: BatchSource>(&mut self, source: &mut S) -> CoreResult<RunSummary> {
        self.resume(source);
        let mut summary = RunSummary::default();
        let delay = Duration::from_millis(self.cfg.delay_ms);

        loop {
            if self
                .cfg
                .max_iterations
                .map_or(false, |max| summary.cycles >= max)
            {
                info!(cycles = summary.cycles, "iteration limit reached");
                break;
            }
            let Some(report) = self.step(source)? else {
                info!(cycles = summary.cycles, "source drained");
                break;
            };

            summary.cycles += 1;
            summary.rows += report.received;
            summary.drift_events += usize::from(report.drift.drifted);
            summary.failed_fits += usize::from(report.train_rows.is_none());
            summary.last_scores = report.scores;

            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        Ok(summary)
    }

    /// Score a labelled CSV with the active model.
    pub fn eval_file(&self, dataset: &Path) -> CoreResult<f64> {
        let mut fields = self
            .pipeline
            .feature_schema()
            .ok_or(CoreError::NotFitted)?
            .fields()
            .to_vec();
        fields.push(Field::new(self.cfg.target.clone(), ColumnKind::Numeric));
        let data = repo_fs::read_csv(dataset, Some(&Schema::new(fields)?))?;
        let (features, target) = data.split_xy(&self.cfg.target)?;
        let score = self.pipeline.eval(&features, &target)?;
        info!(dataset = %dataset.display(), rows = data.n_rows(), score, "evaluated file");
        Ok(score)
    }

    /// Predict an unlabelled CSV file, see [`inference_service::predict_file`].
    pub fn predict_file(&self, input: &Path, output: &Path) -> CoreResult<PredictFileReport> {
        inference_service::predict_file(&self.pipeline, input, output)
    }

    /// Summary of the restored pipeline and the saved cursor.
    pub fn status(&self) -> StatusReport {
        let cursor = self.cursors.get_cursor().unwrap_or_else(|err| {
            debug!(error = %err, "cursor unreadable");
            None
        });
        let fitted = self.pipeline.transformer().fitted();
        StatusReport {
            fitted: self.pipeline.is_fit(),
            history_rows: self.pipeline.history().n_rows(),
            target: self.pipeline.target_name().map(str::to_string),
            feature_columns: self
                .pipeline
                .feature_schema()
                .map(|s| s.names().map(str::to_string).collect())
                .unwrap_or_default(),
            encoded_columns: fitted.map(|f| f.output_columns.clone()).unwrap_or_default(),
            cursor,
            search_score: self.pipeline.last_search().map(|s| s.best_score),
        }
    }
}

/// Log and swallow recoverable errors; let fatal ones through.
fn absorb<T>(result: CoreResult<T>, what: &str) -> CoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(error = %err, code = err.code() as u32, "{what} failed");
            Ok(None)
        }
    }
}

/// Split a labelled batch into model features and target. The timestamp
/// only orders the stream and is never a feature.
pub fn split_batch(batch: &Frame, cfg: &AppCfg) -> CoreResult<(Frame, Frame)> {
    let (features, target) = batch.split_xy(&cfg.target)?;
    Ok((features.without_column(&cfg.timestamp), target))
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::fmt::Write as _;
    use std::io;
    use std::rc::Rc;

    use super::*;
    use crate::data::source::{BatchMode, TableSource};
    use crate::training::domain::SnapshotRepo;

    /// Shared in-memory snapshot store whose `fail_on`-th write fails.
    #[derive(Clone, Default)]
    struct FlakyRepo {
        bytes: Rc<RefCell<Option<Vec<u8>>>>,
        writes: Rc<Cell<usize>>,
        fail_on: Option<usize>,
    }

    impl SnapshotRepo for FlakyRepo {
        fn put_snapshot(&self, bytes: &[u8]) -> CoreResult<()> {
            let write = self.writes.get() + 1;
            self.writes.set(write);
            if self.fail_on == Some(write) {
                return Err(CoreError::persistence(
                    "/state/pipeline.json",
                    io::Error::new(io::ErrorKind::Other, "disk full"),
                ));
            }
            *self.bytes.borrow_mut() = Some(bytes.to_vec());
            Ok(())
        }

        fn get_snapshot(&self) -> CoreResult<Option<Vec<u8>>> {
            Ok(self.bytes.borrow().clone())
        }
    }

    #[derive(Clone, Default)]
    struct MemCursors(Rc<RefCell<Option<Cursor>>>);

    impl CursorRepo for MemCursors {
        fn put_cursor(&self, cursor: &Cursor) -> CoreResult<()> {
            *self.0.borrow_mut() = Some(*cursor);
            Ok(())
        }

        fn get_cursor(&self) -> CoreResult<Option<Cursor>> {
            Ok(*self.0.borrow())
        }
    }

    fn cfg(max_iterations: Option<usize>) -> AppCfg {
        AppCfg {
            target: "label".into(),
            timestamp: "ts".into(),
            batch_size: 20,
            delay_ms: 0,
            max_iterations,
            ..AppCfg::default()
        }
    }

    fn stream() -> TableSource {
        let mut csv = String::from("ts,x,color,label\n");
        for i in 0..60 {
            let color = if i % 3 == 0 { "red" } else { "blue" };
            let label = u8::from(color == "red" || i % 10 >= 7);
            let _ = writeln!(csv, "d{},{},{color},{label}", i / 20, i % 10);
        }
        let data = repo_fs::read_csv_from(csv.as_bytes(), None).unwrap();
        TableSource::new(data, "ts", BatchMode::Fixed(20)).unwrap()
    }

    fn session(cfg: AppCfg, repo: FlakyRepo, cursors: MemCursors) -> Session<DecisionTreeClassifier> {
        let pipeline = ModelPipeline::open(
            DataTransformer::new(cfg.na_method, cfg.ctg_method),
            DecisionTreeClassifier::default(),
            Box::new(repo),
        );
        Session::new(cfg, pipeline, Box::new(cursors))
    }

    #[test]
    fn failed_snapshot_write_keeps_the_cursor_behind() {
        let repo = FlakyRepo {
            fail_on: Some(2),
            ..FlakyRepo::default()
        };
        let cursors = MemCursors::default();

        let summary = session(cfg(Some(2)), repo.clone(), cursors.clone())
            .run(&mut stream())
            .unwrap();
        assert_eq!(summary.failed_fits, 1);
        assert_eq!(cursors.get_cursor().unwrap(), Some(Cursor { position: 20 }));

        let mut restarted = session(cfg(None), repo, cursors);
        assert_eq!(restarted.pipeline().history().n_rows(), 20);
        restarted.run(&mut stream()).unwrap();
        assert_eq!(restarted.pipeline().history().n_rows(), 60);
    }

    #[test]
    fn successful_cycles_advance_the_cursor() {
        let cursors = MemCursors::default();
        let mut s = session(cfg(None), FlakyRepo::default(), cursors.clone());
        let mut source = stream();
        let report = s.step(&mut source).unwrap().unwrap();
        assert_eq!(report.train_rows, Some(20));
        assert_eq!(cursors.get_cursor().unwrap(), Some(Cursor { position: 20 }));
    }
}
