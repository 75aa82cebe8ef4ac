//! Held-out log-likelihood over nested competition windows.

use serde::{Deserialize, Serialize};
use wc_types::{HistoricalMatch, MatchPredictor, MatchUp, MatchWeighting};

/// Floor on predicted probabilities so an impossible outcome costs a large
/// finite penalty.
pub const MIN_PROBABILITY: f64 = 1e-12;

/// A named set of competitions scored together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageWindow {
    pub name: String,
    pub competitions: Vec<String>,
}

impl CoverageWindow {
    pub fn new(name: impl Into<String>, competitions: &[&str]) -> Self {
        Self {
            name: name.into(),
            competitions: competitions.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn covers(&self, m: &HistoricalMatch) -> bool {
        self.competitions.iter().any(|c| *c == m.competition)
    }

    /// Weighted sum of log-probabilities of the observed regulation-time
    /// outcomes of the covered matches.
    pub fn log_likelihood(
        &self,
        model: &dyn MatchPredictor,
        matches: &[HistoricalMatch],
        weighting: &MatchWeighting,
    ) -> f64 {
        matches
            .iter()
            .filter(|m| self.covers(m))
            .map(|m| weighting.weight(m) * match_log_likelihood(model, m))
            .sum()
    }
}

/// The four windows reported per trial, widest first: World Cup through
/// friendlies, down to World Cup plus continental finals.
pub fn default_windows() -> Vec<CoverageWindow> {
    vec![
        CoverageWindow::new("likelihood_W_to_F", &["W", "C1", "WQ", "CQ", "C2", "F"]),
        CoverageWindow::new("likelihood_W_to_C2", &["W", "C1", "WQ", "CQ", "C2"]),
        CoverageWindow::new("likelihood_W_to_CQ", &["W", "C1", "WQ", "CQ"]),
        CoverageWindow::new("likelihood_W_to_C1", &["W", "C1"]),
    ]
}

/// `ln P(observed outcome)`, floored at [`MIN_PROBABILITY`].
pub fn match_log_likelihood(model: &dyn MatchPredictor, m: &HistoricalMatch) -> f64 {
    let probs = model
        .outcome_probabilities(&MatchUp::from_historical(m))
        .normalized();
    probs.of(m.score().outcome()).max(MIN_PROBABILITY).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wc_types::{CalibrationParams, OutcomeProbabilities};

    struct Fixed(OutcomeProbabilities);

    impl MatchPredictor for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn outcome_probabilities(&self, _m: &MatchUp<'_>) -> OutcomeProbabilities {
            self.0
        }
    }

    fn played(competition: &str, home: u32, away: u32) -> HistoricalMatch {
        HistoricalMatch {
            date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            home_team: "A".into(),
            away_team: "B".into(),
            home_score: home,
            away_score: away,
            competition: competition.into(),
            neutral: true,
            shootout_winner: None,
        }
    }

    #[test]
    fn default_windows_are_nested() {
        let windows = default_windows();
        assert_eq!(windows.len(), 4);
        for pair in windows.windows(2) {
            let (outer, inner) = (&pair[0], &pair[1]);
            assert!(inner.competitions.len() < outer.competitions.len());
            assert!(inner.competitions.iter().all(|c| outer.competitions.contains(c)));
        }
    }

    #[test]
    fn scores_observed_outcome_only_in_covered_competitions() {
        let model = Fixed(OutcomeProbabilities::new(0.5, 0.25, 0.25));
        let matches = vec![played("W", 1, 0), played("F", 0, 0), played("C1", 0, 2)];
        let weighting = MatchWeighting::neutral(NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());
        let windows = default_windows();

        let wide = windows[0].log_likelihood(&model, &matches, &weighting);
        let narrow = windows[3].log_likelihood(&model, &matches, &weighting);
        assert!((wide - (0.5f64.ln() + 2.0 * 0.25f64.ln())).abs() < 1e-12);
        assert!((narrow - (0.5f64.ln() + 0.25f64.ln())).abs() < 1e-12);
        assert!(wide <= narrow);
    }

    #[test]
    fn world_cup_weight_scales_contribution() {
        let model = Fixed(OutcomeProbabilities::new(0.5, 0.25, 0.25));
        let matches = vec![played("W", 1, 0)];
        let reference = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        let weighting = MatchWeighting::new(CalibrationParams::new(0.0, 3.0), reference);
        let ll = default_windows()[3].log_likelihood(&model, &matches, &weighting);
        assert!((ll - 3.0 * 0.5f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn impossible_outcome_is_floored() {
        let model = Fixed(OutcomeProbabilities::new(1.0, 0.0, 0.0));
        let ll = match_log_likelihood(&model, &played("W", 0, 1));
        assert!((ll - MIN_PROBABILITY.ln()).abs() < 1e-9);
    }
}
