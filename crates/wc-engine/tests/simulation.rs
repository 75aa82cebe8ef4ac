use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use tempfile::TempDir;
use wc_data::{DataLoader, DataPaths};
use wc_engine::{
    HandOff, LossEvaluator, PoissonFitter, ResumeReconciler, SimulationContext, SimulationRunner,
};
use wc_types::{
    MatchPredictor, MatchUp, OutcomeProbabilities, ResumePoint, SimulationConfig, Stage,
    TournamentYear, TrainingWindow,
};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

const FIXTURES: &str = "date,stage,group,team_1,team_2
2018-06-14,Group,A,A,B
2018-06-14,Group,A,C,D
2018-06-19,Group,A,A,C
2018-06-19,Group,A,B,D
2018-06-25,Group,A,A,D
2018-06-25,Group,A,B,C
2018-07-14,3rd,,3A,4A
2018-07-15,Final,,1A,2A
";

const RESULTS: &str = "date,home_team,away_team,home_score,away_score,tournament,neutral,shootout_winner
2017-03-01,A,B,1,0,F,false,
2017-03-05,C,D,2,2,F,false,
2017-06-01,B,C,1,0,WQ,false,
2017-06-05,D,A,0,3,WQ,false,
2017-09-01,A,C,2,1,C1,true,
2017-09-05,B,D,1,1,C1,true,
2018-06-14,A,B,2,0,W,true,
2018-06-14,C,D,1,1,W,true,
2018-06-19,A,C,1,0,W,true,
2018-06-19,B,D,2,1,W,true,
2018-06-25,A,D,3,0,W,true,
2018-06-25,B,C,1,0,W,true,
2018-07-15,A,B,1,1,W,true,B
";

const ACTUAL: &str = "Team,Stage\nA,RU\nB,W\nC,Group\nD,Group\n";

fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("fixtures_2018.csv"), FIXTURES).unwrap();
    fs::write(dir.path().join("results.csv"), RESULTS).unwrap();
    fs::write(dir.path().join("actual_stages_2018.csv"), ACTUAL).unwrap();
    dir
}

fn config(out: &Path) -> SimulationConfig {
    let window = TrainingWindow::new(day(2012, 6, 1), day(2018, 6, 1)).unwrap();
    SimulationConfig::new(TournamentYear::Y2018, window)
        .with_samples(200, 50)
        .with_threads(2)
        .with_seed(Some(3))
        .with_output_dir(out)
}

fn toy_context(model: Box<dyn MatchPredictor>) -> SimulationContext {
    let dir = data_dir();
    let layout = DataLoader::new()
        .load_fixtures(dir.path().join("fixtures_2018.csv"), "toy", None)
        .unwrap();
    let reconciler = ResumeReconciler::fully_simulated(&layout);
    SimulationContext {
        year: TournamentYear::Y2018,
        layout,
        model,
        reconciler,
        evaluator: None,
        resume_from: None,
    }
}

/// Team A beats everyone; other matches are a coin toss with draws.
struct AlwaysA;

impl MatchPredictor for AlwaysA {
    fn name(&self) -> &str {
        "always-a"
    }

    fn outcome_probabilities(&self, m: &MatchUp<'_>) -> OutcomeProbabilities {
        match (m.team_1, m.team_2) {
            ("A", _) => OutcomeProbabilities::new(1.0, 0.0, 0.0),
            (_, "A") => OutcomeProbabilities::new(0.0, 0.0, 1.0),
            _ => OutcomeProbabilities::new(1.0, 1.0, 1.0),
        }
    }
}

#[test]
fn dominant_team_wins_every_sample() {
    let out = TempDir::new().unwrap();
    let ctx = toy_context(Box::new(AlwaysA));
    let config = config(out.path()).with_samples(1000, 100).with_threads(4);

    let report = SimulationRunner::new(config).run(&ctx).unwrap();

    assert_eq!(report.samples, 1000);
    assert_eq!(report.failed_batches, 0);
    let a = report.table.get("A").unwrap();
    assert_eq!(a.get(Stage::Winner), 1000);
    let mut runners_up = 0;
    for team in ["B", "C", "D"] {
        let counts = report.table.get(team).unwrap();
        assert_eq!(counts.get(Stage::Group) + counts.get(Stage::RunnerUp), 1000);
        assert_eq!(counts.get(Stage::Winner), 0);
        runners_up += counts.get(Stage::RunnerUp);
    }
    assert_eq!(runners_up, 1000);
}

#[test]
fn file_and_memory_hand_off_agree() {
    let files_out = TempDir::new().unwrap();
    let memory_out = TempDir::new().unwrap();
    let ctx = toy_context(Box::new(AlwaysA));

    let files = SimulationRunner::new(config(files_out.path()))
        .with_run_tag("100")
        .run(&ctx)
        .unwrap();
    let memory = SimulationRunner::new(config(memory_out.path()))
        .with_hand_off(HandOff::InMemory)
        .with_run_tag("100")
        .run(&ctx)
        .unwrap();

    assert_eq!(files.table, memory.table);
    assert_eq!(files.samples, 200);

    // only the merged table is left behind
    let names: Vec<String> = fs::read_dir(files_out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["100_sim_results.csv".to_string()]);
    assert!(memory_out.path().join("100_sim_results.csv").exists());
}

#[test]
fn resume_after_last_fixture_reproduces_actual_result() {
    let data = data_dir();
    let out = TempDir::new().unwrap();
    let mut config = config(out.path()).with_resume(ResumePoint::Date(day(2018, 7, 20)));

    let ctx = SimulationContext::load(
        &DataPaths::new(data.path()),
        &mut config,
        &PoissonFitter::default(),
        day(2022, 12, 1),
    )
    .unwrap();
    assert_eq!(config.training_window.end, day(2018, 7, 19));
    assert_eq!(ctx.resume_from, Some(day(2018, 7, 20)));

    let report = SimulationRunner::new(config.clone())
        .with_run_tag("7")
        .run(&ctx)
        .unwrap();
    assert_eq!(report.samples, 200);
    for (team, stage) in [
        ("A", Stage::RunnerUp),
        ("B", Stage::Winner),
        ("C", Stage::Group),
        ("D", Stage::Group),
    ] {
        assert_eq!(report.table.get(team).unwrap().get(stage), 200, "{team}");
    }
    let loss = report.loss.unwrap();
    assert_eq!(loss.modal_stage_loss, 0);
    assert_eq!(loss.expected_stage_loss, 0.0);
    let text = fs::read_to_string(out.path().join("7_sim_results_loss.txt")).unwrap();
    assert!(text.starts_with("modal_stage_loss: 0\n"));

    // per-sample losses are all zero as well
    config.loss_per_sample = true;
    let report = SimulationRunner::new(config)
        .with_run_tag("8")
        .run(&ctx)
        .unwrap();
    assert!(report.loss.is_none());
    assert_eq!(report.sample_losses, vec![0; 200]);
    let lines = fs::read_to_string(out.path().join("8_sim_results_loss.txt")).unwrap();
    assert_eq!(lines.lines().count(), 200);
}

#[test]
fn resume_at_start_matches_full_simulation() {
    let data = data_dir();
    let paths = DataPaths::new(data.path());
    let out = TempDir::new().unwrap();

    let mut full = config(out.path());
    let mut early = config(out.path()).with_resume(ResumePoint::Date(day(2018, 6, 1)));
    let full_ctx = SimulationContext::load(&paths, &mut full, &PoissonFitter::default(), day(2022, 12, 1))
        .unwrap();
    let early_ctx =
        SimulationContext::load(&paths, &mut early, &PoissonFitter::default(), day(2022, 12, 1))
            .unwrap();

    let a = SimulationRunner::new(full).with_run_tag("1").run(&full_ctx).unwrap();
    let b = SimulationRunner::new(early).with_run_tag("2").run(&early_ctx).unwrap();
    assert_eq!(a.table, b.table);
}

#[test]
fn resume_on_first_fixture_date_matches_full_simulation() {
    let data = data_dir();
    let paths = DataPaths::new(data.path());
    let out = TempDir::new().unwrap();
    let window = TrainingWindow::new(day(2012, 6, 1), day(2018, 6, 13)).unwrap();

    let mut full = config(out.path());
    full.training_window = window;
    let mut resumed = config(out.path()).with_resume(ResumePoint::Date(day(2018, 6, 14)));
    resumed.training_window = window;
    let full_ctx = SimulationContext::load(&paths, &mut full, &PoissonFitter::default(), day(2022, 12, 1))
        .unwrap();
    let resumed_ctx =
        SimulationContext::load(&paths, &mut resumed, &PoissonFitter::default(), day(2022, 12, 1))
            .unwrap();

    // opening-day results are neither substituted nor trained on
    assert_eq!(resumed.training_window.end, day(2018, 6, 13));
    let fixtures = resumed_ctx.layout.group_fixtures.len();
    assert!((0..fixtures).all(|i| resumed_ctx.reconciler.group_result(i).is_none()));

    let a = SimulationRunner::new(full).with_run_tag("1").run(&full_ctx).unwrap();
    let b = SimulationRunner::new(resumed).with_run_tag("2").run(&resumed_ctx).unwrap();
    assert_eq!(a.table, b.table);
}

#[test]
fn resume_from_final_still_plays_the_final() {
    let data = data_dir();
    let out = TempDir::new().unwrap();
    let mut config = config(out.path()).with_resume(ResumePoint::parse(Some("Final")).unwrap());
    let ctx = SimulationContext::load(
        &DataPaths::new(data.path()),
        &mut config,
        &PoissonFitter::default(),
        day(2022, 12, 1),
    )
    .unwrap();
    assert_eq!(ctx.resume_from, Some(day(2018, 7, 15)));
    assert_eq!(config.training_window.end, day(2018, 7, 14));

    let report = SimulationRunner::new(config).with_run_tag("3").run(&ctx).unwrap();
    // the group stage is settled: A and B meet in every final
    for team in ["C", "D"] {
        assert_eq!(report.table.get(team).unwrap().get(Stage::Group), 200, "{team}");
    }
    let a = report.table.get("A").unwrap();
    let b = report.table.get("B").unwrap();
    assert_eq!(a.get(Stage::Winner) + a.get(Stage::RunnerUp), 200);
    assert_eq!(a.get(Stage::Winner) + b.get(Stage::Winner), 200);
    // the recorded B win is not used
    assert!(a.get(Stage::Winner) > 0);
    assert!(b.get(Stage::Winner) > 0);
}

#[test]
fn failed_batch_is_dropped_and_the_rest_merged() {
    for hand_off in [HandOff::Files, HandOff::InMemory] {
        let out = TempDir::new().unwrap();
        let ctx = toy_context(Box::new(AlwaysA));
        let runner = SimulationRunner::new(config(out.path()))
            .with_hand_off(hand_off)
            .with_run_tag("9");
        let mut plan = runner.plan(&ctx).unwrap();
        assert_eq!(plan.len(), 4);
        // a batch meant for another tournament is rejected by the worker
        plan.batches[2].tournament_year = TournamentYear::Y2022;

        let report = runner.run_plan(&ctx, &plan).unwrap();
        assert_eq!(report.failed_batches, 1, "{hand_off:?}");
        assert_eq!(report.samples, 150, "{hand_off:?}");
        assert_eq!(report.table.get("A").unwrap().get(Stage::Winner), 150);

        let names: Vec<String> = fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["9_sim_results.csv".to_string()], "{hand_off:?}");
    }
}

#[test]
fn unknown_resume_round_fails_before_running() {
    let data = data_dir();
    let out = TempDir::new().unwrap();
    let mut config = config(out.path())
        .with_resume(ResumePoint::parse(Some("QF")).unwrap());
    let result = SimulationContext::load(
        &DataPaths::new(data.path()),
        &mut config,
        &PoissonFitter::default(),
        day(2022, 12, 1),
    );
    assert!(matches!(result, Err(wc_types::WcError::Config(_))));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn loss_evaluator_reads_actual_file() {
    let data = data_dir();
    let actual = DataLoader::new()
        .load_actual_stages(DataPaths::new(data.path()).actual_stages(TournamentYear::Y2018))
        .unwrap();
    let evaluator = LossEvaluator::new(actual.clone());
    assert_eq!(evaluator.stage_loss(&actual).unwrap(), 0);
}
