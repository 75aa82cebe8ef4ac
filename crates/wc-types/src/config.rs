//! Run configuration for simulations and likelihood scans.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::{WcError, WcResult};
use crate::model::RatingsSource;
use crate::stage::MatchRound;
use crate::tournament::{TournamentYear, COMPETITIONS};
use crate::trial::CalibrationParams;

/// Inclusive date range of matches used to fit or test a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TrainingWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> WcResult<Self> {
        if start > end {
            return Err(WcError::Config(format!(
                "training window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Explicit dates win; otherwise `years` of data before the tournament.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        years: Option<u32>,
        tournament: TournamentYear,
    ) -> WcResult<Self> {
        match (start, end, years) {
            (Some(start), Some(end), _) => Self::new(start, end),
            (_, _, Some(years)) if years > 0 => {
                let start_year = tournament.year() - years as i32;
                let start = NaiveDate::from_ymd_opt(start_year, 6, 1).ok_or_else(|| {
                    WcError::Config(format!("invalid training start year {start_year}"))
                })?;
                Self::new(start, tournament.default_training_end())
            }
            _ => Err(WcError::Config(
                "need to provide either training_data_start and training_data_end, \
                 or years_training_data"
                    .to_string(),
            )),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Move the end forward to the last day before `resume` when that falls
    /// later. Matches on the resume date are simulated, so they never train
    /// the model. Returns whether the window changed.
    pub fn clamp_to_resume(&mut self, resume: Option<NaiveDate>) -> bool {
        match resume.and_then(|d| d.pred_opt()) {
            Some(last_known) if last_known > self.end => {
                self.end = last_known;
                true
            }
            _ => false,
        }
    }
}

/// Competition codes to keep: the include list minus the exclude list.
pub fn resolve_competitions(include: &str, exclude: Option<&str>) -> WcResult<Vec<String>> {
    let mut comps: Vec<String> = split_codes(include);
    if comps.is_empty() {
        return Err(WcError::Config("no competitions selected".to_string()));
    }
    for code in exclude.map(split_codes).unwrap_or_default() {
        let idx = comps.iter().position(|c| *c == code).ok_or_else(|| {
            WcError::Config(format!("cannot exclude '{code}': not in the include list"))
        })?;
        comps.remove(idx);
    }
    Ok(comps)
}

fn split_codes(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Where real results stop and simulation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumePoint {
    /// Not given: fully simulated, unless the tournament is live.
    Default,
    Date(NaiveDate),
    Round(MatchRound),
}

impl ResumePoint {
    /// Parse the `--resume_from` argument: absent or `None`, a round label,
    /// or a `YYYY-MM-DD` date.
    pub fn parse(arg: Option<&str>) -> WcResult<Self> {
        let Some(arg) = arg.map(str::trim) else {
            return Ok(ResumePoint::Default);
        };
        if arg.is_empty() || arg == "None" {
            return Ok(ResumePoint::Default);
        }
        if let Some(round) = MatchRound::parse(arg) {
            return Ok(ResumePoint::Round(round));
        }
        NaiveDate::parse_from_str(arg, "%Y-%m-%d")
            .map(ResumePoint::Date)
            .map_err(|_| {
                WcError::Config(format!(
                    "resume_from '{arg}' is neither a date (YYYY-MM-DD) nor a round name"
                ))
            })
    }
}

/// Configuration of a tournament simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub tournament_year: TournamentYear,
    /// Total samples across all batches.
    pub num_simulations: usize,
    /// Samples per batch.
    pub per_tournament: usize,
    pub num_thread: usize,
    pub training_window: TrainingWindow,
    pub resume_from: ResumePoint,
    pub competitions: Vec<String>,
    pub ratings_source: Option<RatingsSource>,
    pub params: CalibrationParams,
    pub seed: Option<u64>,
    pub output_dir: PathBuf,
    pub output_csv: String,
    pub output_loss_txt: String,
    /// Write one loss per sample instead of the aggregate summary.
    pub loss_per_sample: bool,
}

impl SimulationConfig {
    pub fn new(tournament_year: TournamentYear, training_window: TrainingWindow) -> Self {
        Self {
            tournament_year,
            num_simulations: 100,
            per_tournament: 100,
            num_thread: 1,
            training_window,
            resume_from: ResumePoint::Default,
            competitions: COMPETITIONS.iter().map(|c| c.to_string()).collect(),
            ratings_source: Some(RatingsSource::Org),
            params: CalibrationParams::neutral(),
            seed: None,
            output_dir: PathBuf::from("."),
            output_csv: "sim_results.csv".to_string(),
            output_loss_txt: "sim_results_loss.txt".to_string(),
            loss_per_sample: false,
        }
    }

    pub fn with_samples(mut self, num_simulations: usize, per_tournament: usize) -> Self {
        self.num_simulations = num_simulations;
        self.per_tournament = per_tournament;
        self
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.num_thread = n;
        self
    }

    pub fn with_resume(mut self, resume_from: ResumePoint) -> Self {
        self.resume_from = resume_from;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn validate(&self) -> WcResult<()> {
        if self.num_thread == 0 {
            return Err(WcError::Config("num_thread must be at least 1".to_string()));
        }
        if self.per_tournament == 0 {
            return Err(WcError::Config("per_tournament must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Configuration of a hyperparameter likelihood scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub train: TrainingWindow,
    pub test: TrainingWindow,
    pub competitions: Vec<String>,
    pub ratings_source: Option<RatingsSource>,
    pub epsilons: Vec<f64>,
    pub world_cup_weights: Vec<f64>,
    pub num_thread: usize,
    /// Score held-out matches with the trial's weighting instead of the
    /// neutral baseline.
    pub test_with_weights: bool,
    pub output_dir: PathBuf,
    /// Attempts per grid point before it is reported missing.
    pub max_attempts: usize,
}

impl ScanConfig {
    pub fn new(train: TrainingWindow, test: TrainingWindow) -> Self {
        Self {
            train,
            test,
            competitions: COMPETITIONS.iter().map(|c| c.to_string()).collect(),
            ratings_source: Some(RatingsSource::Org),
            epsilons: vec![0.0, 0.1, 0.2, 0.3, 0.4],
            world_cup_weights: vec![1.0, 1.5, 2.0, 2.5, 3.0],
            num_thread: 8,
            test_with_weights: true,
            output_dir: PathBuf::from("."),
            max_attempts: 1,
        }
    }

    pub fn with_grid(mut self, epsilons: Vec<f64>, world_cup_weights: Vec<f64>) -> Self {
        self.epsilons = epsilons;
        self.world_cup_weights = world_cup_weights;
        self
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.num_thread = n;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_test_weights(mut self, test_with_weights: bool) -> Self {
        self.test_with_weights = test_with_weights;
        self
    }

    pub fn validate(&self) -> WcResult<()> {
        if self.num_thread == 0 {
            return Err(WcError::Config("num_thread must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(WcError::Config("max_attempts must be at least 1".to_string()));
        }
        if self.epsilons.is_empty() || self.world_cup_weights.is_empty() {
            return Err(WcError::Config("hyperparameter grid is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn explicit_dates_take_precedence() {
        let w = TrainingWindow::resolve(
            Some(day(2010, 1, 1)),
            Some(day(2014, 1, 1)),
            Some(6),
            TournamentYear::Y2014,
        )
        .unwrap();
        assert_eq!(w.start, day(2010, 1, 1));
        assert_eq!(w.end, day(2014, 1, 1));
    }

    #[test]
    fn years_of_training_data() {
        let w = TrainingWindow::resolve(None, None, Some(6), TournamentYear::Y2018).unwrap();
        assert_eq!(w.start, day(2012, 6, 1));
        assert_eq!(w.end, day(2018, 6, 1));

        let w = TrainingWindow::resolve(None, Some(day(2020, 1, 1)), Some(4), TournamentYear::Y2022)
            .unwrap();
        assert_eq!(w.start, day(2018, 6, 1));
        assert_eq!(w.end, day(2022, 11, 20));
    }

    #[test]
    fn missing_dates_is_config_error() {
        let err = TrainingWindow::resolve(None, None, None, TournamentYear::Y2018).unwrap_err();
        assert!(matches!(err, WcError::Config(_)));
        let err = TrainingWindow::resolve(None, None, Some(0), TournamentYear::Y2018).unwrap_err();
        assert!(matches!(err, WcError::Config(_)));
        assert!(TrainingWindow::new(day(2020, 1, 1), day(2019, 1, 1)).is_err());
    }

    #[test]
    fn clamp_moves_end_forward_only() {
        let mut w = TrainingWindow::new(day(2016, 6, 1), day(2022, 11, 20)).unwrap();
        assert!(!w.clamp_to_resume(Some(day(2022, 11, 1))));
        assert!(!w.clamp_to_resume(None));
        assert!(!w.clamp_to_resume(Some(day(2022, 11, 21))));
        assert!(w.clamp_to_resume(Some(day(2022, 12, 3))));
        assert_eq!(w.end, day(2022, 12, 2));
    }

    #[test]
    fn competition_selection() {
        let comps = resolve_competitions("W,C1,WQ,CQ,C2,F", Some("F,C2")).unwrap();
        assert_eq!(comps, vec!["W", "C1", "WQ", "CQ"]);
        assert!(resolve_competitions("W,C1", Some("F")).is_err());
        assert!(resolve_competitions("", None).is_err());
    }

    #[test]
    fn resume_point_parsing() {
        assert_eq!(ResumePoint::parse(None).unwrap(), ResumePoint::Default);
        assert_eq!(ResumePoint::parse(Some("None")).unwrap(), ResumePoint::Default);
        assert_eq!(
            ResumePoint::parse(Some("R16")).unwrap(),
            ResumePoint::Round(MatchRound::R16)
        );
        assert_eq!(
            ResumePoint::parse(Some("2022-12-03")).unwrap(),
            ResumePoint::Date(day(2022, 12, 3))
        );
        assert!(ResumePoint::parse(Some("quarters")).is_err());
    }

    #[test]
    fn simulation_config_validation() {
        let w = TrainingWindow::new(day(2012, 6, 1), day(2018, 6, 1)).unwrap();
        let config = SimulationConfig::new(TournamentYear::Y2018, w).with_threads(0);
        assert!(config.validate().is_err());
        let config = config.with_threads(4).with_samples(1000, 100);
        assert!(config.validate().is_ok());
    }
}
