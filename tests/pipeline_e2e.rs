use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tabstream::common::config::AppCfg;
use tabstream::data::source::{BatchMode, TableSource};
use tabstream::transform::domain::NaMethod;
use tabstream::{CoreError, Session};

/// Label is 1 for cars and for premiums above 70.
fn write_dataset(dir: &Path, rows: usize) -> PathBuf {
    let mut csv = String::from("INSR_BEGIN,PREMIUM,TYPE,WITH_PAID\n");
    for i in 0..rows {
        let kind = ["car", "truck", "bus"][i % 3];
        let premium = 40 + (i * 7) % 50;
        let paid = u8::from(kind == "car" || premium > 70);
        let _ = writeln!(csv, "2020-01-{:02},{premium},{kind},{paid}", 1 + i / 10);
    }
    let path = dir.join("train.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn cfg(state: &Path) -> AppCfg {
    AppCfg {
        state_dir: state.to_path_buf(),
        batch_size: 20,
        delay_ms: 0,
        ..AppCfg::default()
    }
}

fn source(path: &Path, cfg: &AppCfg) -> TableSource {
    TableSource::from_csv(path, &cfg.timestamp, BatchMode::Fixed(cfg.batch_size)).unwrap()
}

#[test]
fn full_run_persists_a_fitted_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 60);
    let cfg = cfg(&dir.path().join("state"));

    let mut session = Session::open(cfg.clone()).unwrap();
    assert!(!session.pipeline().is_fit());
    let summary = session.run(&mut source(&data, &cfg)).unwrap();
    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.rows, 60);
    assert_eq!(summary.failed_fits, 0);
    assert!(summary.last_scores.batch.is_some());
    assert_eq!(summary.last_scores.history, Some(1.0));

    let reopened = Session::open(cfg).unwrap();
    let status = reopened.status();
    assert!(status.fitted);
    assert_eq!(status.history_rows, 60);
    assert_eq!(status.target.as_deref(), Some("WITH_PAID"));
    assert_eq!(status.feature_columns, vec!["PREMIUM", "TYPE"]);
    assert_eq!(status.cursor.map(|c| c.position), Some(60));
    assert_eq!(reopened.eval_file(&data).unwrap(), 1.0);
}

#[test]
fn restart_resumes_from_the_saved_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 60);
    let mut cfg = cfg(&dir.path().join("state"));
    cfg.max_iterations = Some(1);

    let summary = Session::open(cfg.clone())
        .unwrap()
        .run(&mut source(&data, &cfg))
        .unwrap();
    assert_eq!(summary.cycles, 1);

    cfg.max_iterations = None;
    let mut session = Session::open(cfg.clone()).unwrap();
    assert_eq!(session.pipeline().history().n_rows(), 20);
    let summary = session.run(&mut source(&data, &cfg)).unwrap();
    assert_eq!(summary.cycles, 2);
    assert_eq!(session.pipeline().history().n_rows(), 60);
}

#[test]
fn predictions_skip_unseen_categories() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_dataset(dir.path(), 40);
    let cfg = cfg(&dir.path().join("state"));
    Session::open(cfg.clone())
        .unwrap()
        .run(&mut source(&data, &cfg))
        .unwrap();

    let input = dir.path().join("new.csv");
    let output = dir.path().join("out.csv");
    fs::write(
        &input,
        "INSR_BEGIN,PREMIUM,TYPE\n2021-03-01,45,car\n2021-03-01,50,boat\n2021-03-02,80,truck\n",
    )
    .unwrap();

    let session = Session::open(cfg).unwrap();
    let report = session.predict_file(&input, &output).unwrap();
    assert_eq!(report.written, 2);
    assert_eq!(report.dropped, 1);

    let written = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(
        lines,
        vec![
            "INSR_BEGIN,PREMIUM,TYPE,prediction",
            "2021-03-01,45,car,1",
            "2021-03-02,80,truck,1",
        ]
    );
}

#[test]
fn missing_target_column_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("bad.csv");
    fs::write(&data, "INSR_BEGIN,PREMIUM\n2020-01-01,10\n2020-01-01,20\n").unwrap();
    let cfg = cfg(&dir.path().join("state"));

    let err = Session::open(cfg.clone())
        .unwrap()
        .run(&mut source(&data, &cfg))
        .unwrap_err();
    assert!(matches!(err, CoreError::Schema(_)));
    assert!(err.is_fatal());
}

#[test]
fn median_mode_keeps_incomplete_rows() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("gaps.csv");
    fs::write(
        &data,
        "INSR_BEGIN,PREMIUM,TYPE,WITH_PAID\n\
         d1,1,car,1\n\
         d1,,car,1\n\
         d1,3,truck,0\n\
         d2,4,NA,0\n\
         d2,5,truck,\n",
    )
    .unwrap();
    let mut cfg = cfg(&dir.path().join("state"));
    cfg.na_method = NaMethod::MedianMode;

    let mut session = Session::open(cfg.clone()).unwrap();
    let mut src = TableSource::from_csv(&data, &cfg.timestamp, BatchMode::ByTimestamp).unwrap();
    let first = session.step(&mut src).unwrap().unwrap();
    assert_eq!(first.received, 3);
    assert_eq!(first.train_rows, Some(3));

    let second = session.step(&mut src).unwrap().unwrap();
    assert_eq!(second.received, 2);
    // The unlabeled row is dropped, the row with a missing category is filled.
    assert_eq!(second.train_rows, Some(4));
    assert!(session.step(&mut src).unwrap().is_none());
}
