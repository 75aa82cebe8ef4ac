use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::TempDir;
use wc_data::{ArtifactStore, DataPaths};
use wc_engine::{PoissonFitter, PoissonStrengthModel};
use wc_optimizer::{CalibrationRunner, LikelihoodScan, TrialExecutor};
use wc_types::{CalibrationParams, ScanConfig, TrainingWindow};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const RESULTS: &str = "date,home_team,away_team,home_score,away_score,tournament,neutral,shootout_winner
2016-03-01,A,B,2,0,F,false,
2016-06-01,C,D,1,1,WQ,false,
2017-03-01,A,B,1,0,F,false,
2017-03-05,C,D,2,2,F,false,
2017-06-01,B,C,1,0,WQ,false,
2017-06-05,D,A,0,3,WQ,false,
2017-09-01,A,C,2,1,C1,true,
2017-09-05,B,D,1,1,C1,true,
2018-06-14,A,B,2,0,W,true,
2018-06-14,C,D,1,1,W,true,
2018-06-19,A,C,1,0,W,true,
2018-09-01,B,D,2,1,F,false,
2018-10-01,A,D,0,0,CQ,false,
";

fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("results.csv"), RESULTS).unwrap();
    dir
}

fn config(out: &Path) -> ScanConfig {
    let train = TrainingWindow::new(day(2016, 1, 1), day(2017, 12, 31)).unwrap();
    let test = TrainingWindow::new(day(2018, 1, 1), day(2018, 12, 31)).unwrap();
    ScanConfig::new(train, test)
        .with_grid(vec![0.0, 0.1], vec![1.0])
        .with_threads(2)
        .with_output_dir(out)
}

fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().ends_with(suffix))
        .collect();
    found.sort();
    found
}

#[test]
fn two_point_grid_on_two_workers() {
    let data = data_dir();
    let out = TempDir::new().unwrap();

    let report = LikelihoodScan::new(config(out.path()))
        .run(&DataPaths::new(data.path()), PoissonFitter::default())
        .unwrap();

    // one entry per grid point plus one stop per worker
    assert_eq!(report.queue_entries, 4);
    assert_eq!(report.workers_exited, 2);
    assert!(report.missing.is_empty());
    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.rows[0].params, CalibrationParams::new(0.0, 1.0));
    assert_eq!(report.rows[1].params, CalibrationParams::new(0.1, 1.0));
    assert!(report.best().is_some());

    let models = files_with_suffix(out.path(), ".model");
    assert_eq!(models.len(), 2);
    let results_0 = files_with_suffix(out.path(), "_epsilon_0.0_worldcupweight_1.0");
    let results_1 = files_with_suffix(out.path(), "_epsilon_0.1_worldcupweight_1.0");
    assert_eq!(results_0.len(), 1);
    assert_eq!(results_1.len(), 1);

    let text = fs::read_to_string(&results_0[0]).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "epsilon,world_cup_weight,likelihood_W_to_F,likelihood_W_to_C2,likelihood_W_to_CQ,likelihood_W_to_C1"
    );
    assert!(lines[1].starts_with("0.0,1.0,"));

    let store = ArtifactStore::new(out.path()).unwrap();
    let model: PoissonStrengthModel = store.read_model(&models[0]).unwrap();
    assert_eq!(model.strengths.len(), 4);
}

#[test]
fn wider_windows_score_no_higher() {
    let data = data_dir();
    let out = TempDir::new().unwrap();
    let report = LikelihoodScan::new(config(out.path()))
        .run(&DataPaths::new(data.path()), PoissonFitter::default())
        .unwrap();

    for row in &report.rows {
        let values: Vec<f64> = row.metrics.iter().map(|(_, v)| *v).collect();
        assert_eq!(values.len(), 4);
        // every log-likelihood term is <= 0, so adding competitions can only lower it
        for pair in values.windows(2) {
            assert!(pair[0] <= pair[1] + 1e-12, "{:?}", values);
        }
        assert!(values.iter().all(|v| *v <= 0.0));
    }
}

#[test]
fn unweighted_test_scoring_ignores_trial_weights() {
    let data = data_dir();
    let paths = DataPaths::new(data.path());
    let neutral_out = TempDir::new().unwrap();
    let weighted_out = TempDir::new().unwrap();
    let neutral = CalibrationRunner::load(
        &paths,
        config(neutral_out.path()).with_test_weights(false),
        PoissonFitter::default(),
    )
    .unwrap();
    let weighted =
        CalibrationRunner::load(&paths, config(weighted_out.path()), PoissonFitter::default())
            .unwrap();

    let params = CalibrationParams::new(0.0, 3.0);
    let neutral_row = neutral.execute(&params, 0).unwrap().row;
    let weighted_row = weighted.execute(&params, 0).unwrap().row;

    // no decay, so each of the three World Cup test matches counts three times
    let c1_neutral = neutral_row.metric("likelihood_W_to_C1").unwrap();
    let c1_weighted = weighted_row.metric("likelihood_W_to_C1").unwrap();
    assert!((c1_weighted - 3.0 * c1_neutral).abs() < 1e-9);
}

#[test]
fn empty_training_window_reports_missing_points() {
    let data = data_dir();
    let out = TempDir::new().unwrap();
    let mut config = config(out.path());
    config.train = TrainingWindow::new(day(1990, 1, 1), day(1990, 12, 31)).unwrap();
    config.max_attempts = 2;

    let report = LikelihoodScan::new(config)
        .run(&DataPaths::new(data.path()), PoissonFitter::default())
        .unwrap();

    assert!(report.rows.is_empty());
    assert_eq!(report.missing.len(), 2);
    // two attempts per point, then one stop per worker
    assert_eq!(report.queue_entries, 6);
    assert_eq!(report.workers_exited, 2);
    assert!(files_with_suffix(out.path(), ".model").is_empty());
}
