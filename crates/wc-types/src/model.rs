//! The match-outcome model seam.
//!
//! Trials never compute probabilities themselves: they receive a
//! [`MatchPredictor`] (already fitted) or a [`ModelFitter`] that produces one
//! from weighted historical data.

use chrono::NaiveDate;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::{WcError, WcResult};
use crate::tournament::{HistoricalMatch, MatchOutcome, Score, WORLD_CUP};
use crate::trial::CalibrationParams;

/// Two teams meeting on a date. `team_1` is the home side unless `neutral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchUp<'a> {
    pub team_1: &'a str,
    pub team_2: &'a str,
    pub date: NaiveDate,
    pub neutral: bool,
}

impl<'a> MatchUp<'a> {
    pub fn neutral(team_1: &'a str, team_2: &'a str, date: NaiveDate) -> Self {
        Self {
            team_1,
            team_2,
            date,
            neutral: true,
        }
    }

    pub fn from_historical(m: &'a HistoricalMatch) -> Self {
        Self {
            team_1: &m.home_team,
            team_2: &m.away_team,
            date: m.date,
            neutral: m.neutral,
        }
    }
}

/// Regulation-time win/draw/loss probabilities from `team_1`'s perspective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProbabilities {
    pub team_1_win: f64,
    pub draw: f64,
    pub team_2_win: f64,
}

impl OutcomeProbabilities {
    pub fn new(team_1_win: f64, draw: f64, team_2_win: f64) -> Self {
        Self {
            team_1_win,
            draw,
            team_2_win,
        }
    }

    pub fn of(&self, outcome: MatchOutcome) -> f64 {
        match outcome {
            MatchOutcome::Team1Win => self.team_1_win,
            MatchOutcome::Draw => self.draw,
            MatchOutcome::Team2Win => self.team_2_win,
        }
    }

    /// Rescale so the three probabilities sum to one.
    pub fn normalized(&self) -> Self {
        let total = self.team_1_win + self.draw + self.team_2_win;
        if total <= 0.0 {
            return Self::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
        }
        Self::new(self.team_1_win / total, self.draw / total, self.team_2_win / total)
    }
}

/// A fitted match-outcome model.
pub trait MatchPredictor: Send + Sync {
    fn name(&self) -> &str;

    fn outcome_probabilities(&self, match_up: &MatchUp<'_>) -> OutcomeProbabilities;

    /// Sample a regulation-time scoreline. The default draws the outcome
    /// class and returns the minimal score for it.
    fn sample_score(&self, match_up: &MatchUp<'_>, rng: &mut dyn RngCore) -> Score {
        let probs = self.outcome_probabilities(match_up).normalized();
        let u: f64 = rng.gen();
        if u < probs.team_1_win {
            Score::new(1, 0)
        } else if u < probs.team_1_win + probs.draw {
            Score::new(0, 0)
        } else {
            Score::new(0, 1)
        }
    }

    /// Probability that `team_1` wins a shootout after a knockout draw.
    fn shootout_probability(&self, _match_up: &MatchUp<'_>) -> f64 {
        0.5
    }
}

/// Which external rating list informs the model prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingsSource {
    Game,
    Org,
    Both,
}

impl FromStr for RatingsSource {
    type Err = WcError;

    fn from_str(s: &str) -> WcResult<Self> {
        match s.trim() {
            "game" => Ok(RatingsSource::Game),
            "org" => Ok(RatingsSource::Org),
            "both" => Ok(RatingsSource::Both),
            other => Err(WcError::Config(format!(
                "unknown ratings source '{other}', expected game, org or both"
            ))),
        }
    }
}

/// Time and competition weighting of historical matches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeighting {
    pub epsilon: f64,
    pub world_cup_weight: f64,
    /// Date time-decay is measured from.
    pub reference_date: NaiveDate,
}

impl MatchWeighting {
    pub fn new(params: CalibrationParams, reference_date: NaiveDate) -> Self {
        Self {
            epsilon: params.epsilon,
            world_cup_weight: params.world_cup_weight,
            reference_date,
        }
    }

    pub fn neutral(reference_date: NaiveDate) -> Self {
        Self::new(CalibrationParams::neutral(), reference_date)
    }

    pub fn weight(&self, m: &HistoricalMatch) -> f64 {
        let years = (self.reference_date - m.date).num_days().abs() as f64 / 365.25;
        let decay = (-self.epsilon * years).exp();
        if m.competition == WORLD_CUP {
            decay * self.world_cup_weight
        } else {
            decay
        }
    }
}

/// Everything a fitter needs besides the data itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSettings {
    pub weighting: MatchWeighting,
    /// Host nation of the tournament being predicted.
    pub host: Option<String>,
    /// `None` fits without a ratings prior.
    pub ratings_source: Option<RatingsSource>,
}

/// Fits a [`MatchPredictor`] against weighted historical matches.
pub trait ModelFitter: Send + Sync {
    type Model: MatchPredictor + Serialize;

    fn fit(&self, matches: &[HistoricalMatch], settings: &FitSettings) -> WcResult<Self::Model>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    struct Coin;

    impl MatchPredictor for Coin {
        fn name(&self) -> &str {
            "coin"
        }

        fn outcome_probabilities(&self, _m: &MatchUp<'_>) -> OutcomeProbabilities {
            OutcomeProbabilities::new(1.0, 0.0, 0.0)
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn historical(date: NaiveDate, competition: &str) -> HistoricalMatch {
        HistoricalMatch {
            date,
            home_team: "A".into(),
            away_team: "B".into(),
            home_score: 1,
            away_score: 0,
            competition: competition.into(),
            neutral: false,
            shootout_winner: None,
        }
    }

    #[test]
    fn default_sampling_follows_probabilities() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let m = MatchUp::neutral("A", "B", day(2022, 1, 1));
        for _ in 0..100 {
            assert_eq!(Coin.sample_score(&m, &mut rng).outcome(), MatchOutcome::Team1Win);
        }
        assert_eq!(Coin.shootout_probability(&m), 0.5);
    }

    #[test]
    fn weighting_decays_and_boosts_world_cup() {
        let w = MatchWeighting::new(CalibrationParams::new(0.5, 2.0), day(2020, 1, 1));
        let recent = historical(day(2020, 1, 1), "F");
        let old = historical(day(2010, 1, 1), "F");
        let world_cup = historical(day(2020, 1, 1), WORLD_CUP);

        assert!((w.weight(&recent) - 1.0).abs() < 1e-12);
        assert!(w.weight(&old) < 0.01);
        assert!((w.weight(&world_cup) - 2.0).abs() < 1e-12);

        let neutral = MatchWeighting::neutral(day(2020, 1, 1));
        assert_eq!(neutral.weight(&old), 1.0);
        assert_eq!(neutral.weight(&world_cup), 1.0);
    }

    #[test]
    fn normalization() {
        let p = OutcomeProbabilities::new(2.0, 1.0, 1.0).normalized();
        assert!((p.team_1_win - 0.5).abs() < 1e-12);
        assert_eq!(p.of(MatchOutcome::Draw), 0.25);
    }
}
