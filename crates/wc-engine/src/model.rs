// Reference match model: weighted attack/defence strengths with independent
// Poisson scorelines. Good enough to drive the simulator end to end.

use chrono::NaiveDate;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use wc_types::{
    FitSettings, HistoricalMatch, MatchPredictor, MatchUp, ModelFitter, OutcomeProbabilities,
    RatingsSource, Score, TrialError, WcResult,
};

/// Scorelines beyond this many goals per side are folded into the tail.
const MAX_GOALS: usize = 10;

/// Multiplicative strengths of one team. Both are 1.0 for an average side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamStrength {
    pub attack: f64,
    /// Goals conceded relative to average; lower is better.
    pub defence: f64,
}

impl Default for TeamStrength {
    fn default() -> Self {
        Self {
            attack: 1.0,
            defence: 1.0,
        }
    }
}

/// Fitted Poisson strength model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoissonStrengthModel {
    pub strengths: BTreeMap<String, TeamStrength>,
    /// Mean goals per team per match in the training data.
    pub base_rate: f64,
    /// Multiplier on the expected goals of a side playing at home.
    pub home_advantage: f64,
    pub host: Option<String>,
    pub ratings_source: Option<RatingsSource>,
    pub fitted_matches: usize,
    pub reference_date: NaiveDate,
}

impl PoissonStrengthModel {
    fn strength(&self, team: &str) -> TeamStrength {
        self.strengths.get(team).copied().unwrap_or_default()
    }

    /// Expected goals for each side.
    pub fn expected_goals(&self, m: &MatchUp<'_>) -> (f64, f64) {
        let s1 = self.strength(m.team_1);
        let s2 = self.strength(m.team_2);
        let (home_1, home_2) = self.home_factors(m);
        (
            self.base_rate * s1.attack * s2.defence * home_1,
            self.base_rate * s2.attack * s1.defence * home_2,
        )
    }

    fn home_factors(&self, m: &MatchUp<'_>) -> (f64, f64) {
        if !m.neutral {
            return (self.home_advantage, 1.0);
        }
        match self.host.as_deref() {
            Some(host) if host == m.team_1 => (self.home_advantage, 1.0),
            Some(host) if host == m.team_2 => (1.0, self.home_advantage),
            _ => (1.0, 1.0),
        }
    }
}

fn poisson_pmf(lambda: f64) -> [f64; MAX_GOALS + 1] {
    let mut pmf = [0.0; MAX_GOALS + 1];
    pmf[0] = (-lambda).exp();
    for k in 1..=MAX_GOALS {
        pmf[k] = pmf[k - 1] * lambda / k as f64;
    }
    pmf
}

fn sample_poisson(lambda: f64, rng: &mut dyn RngCore) -> u32 {
    let pmf = poisson_pmf(lambda);
    let u: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (k, p) in pmf.iter().enumerate() {
        cumulative += p;
        if u < cumulative {
            return k as u32;
        }
    }
    MAX_GOALS as u32
}

impl MatchPredictor for PoissonStrengthModel {
    fn name(&self) -> &str {
        "poisson-strength"
    }

    fn outcome_probabilities(&self, match_up: &MatchUp<'_>) -> OutcomeProbabilities {
        let (lambda_1, lambda_2) = self.expected_goals(match_up);
        let pmf_1 = poisson_pmf(lambda_1);
        let pmf_2 = poisson_pmf(lambda_2);

        let mut probs = OutcomeProbabilities::new(0.0, 0.0, 0.0);
        for (g1, p1) in pmf_1.iter().enumerate() {
            for (g2, p2) in pmf_2.iter().enumerate() {
                let p = p1 * p2;
                match g1.cmp(&g2) {
                    std::cmp::Ordering::Greater => probs.team_1_win += p,
                    std::cmp::Ordering::Equal => probs.draw += p,
                    std::cmp::Ordering::Less => probs.team_2_win += p,
                }
            }
        }
        probs.normalized()
    }

    fn sample_score(&self, match_up: &MatchUp<'_>, rng: &mut dyn RngCore) -> Score {
        let (lambda_1, lambda_2) = self.expected_goals(match_up);
        Score::new(sample_poisson(lambda_1, rng), sample_poisson(lambda_2, rng))
    }
}

/// Fits [`PoissonStrengthModel`] by weighted iterative proportional scaling.
#[derive(Debug, Clone)]
pub struct PoissonFitter {
    pub iterations: usize,
    /// Pseudo-matches against an average opponent, shrinking sparse teams
    /// towards 1.0.
    pub prior_weight: f64,
}

impl Default for PoissonFitter {
    fn default() -> Self {
        Self {
            iterations: 30,
            prior_weight: 1.0,
        }
    }
}

struct WeightedMatch<'a> {
    home: &'a str,
    away: &'a str,
    home_goals: f64,
    away_goals: f64,
    home_factor: bool,
    weight: f64,
}

impl ModelFitter for PoissonFitter {
    type Model = PoissonStrengthModel;

    fn fit(&self, matches: &[HistoricalMatch], settings: &FitSettings) -> WcResult<Self::Model> {
        let started = std::time::Instant::now();
        let weighted: Vec<WeightedMatch<'_>> = matches
            .iter()
            .map(|m| WeightedMatch {
                home: &m.home_team,
                away: &m.away_team,
                home_goals: m.home_score as f64,
                away_goals: m.away_score as f64,
                home_factor: !m.neutral,
                weight: settings.weighting.weight(m),
            })
            .filter(|m| m.weight > 0.0)
            .collect();

        let total_weight: f64 = weighted.iter().map(|m| m.weight).sum();
        if weighted.is_empty() || total_weight <= 0.0 {
            return Err(TrialError::InsufficientData {
                message: format!("no weighted matches among {} rows", matches.len()),
            }
            .into());
        }

        let total_goals: f64 = weighted
            .iter()
            .map(|m| m.weight * (m.home_goals + m.away_goals))
            .sum();
        let base_rate = (total_goals / (2.0 * total_weight)).max(0.1);

        let mut strengths: BTreeMap<String, TeamStrength> = BTreeMap::new();
        for m in &weighted {
            strengths.entry(m.home.to_string()).or_default();
            strengths.entry(m.away.to_string()).or_default();
        }
        let mut home_advantage = 1.0;
        let prior = self.prior_weight * base_rate;

        for iteration in 0..self.iterations {
            // attack
            let mut scored: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
            for m in &weighted {
                let h = if m.home_factor { home_advantage } else { 1.0 };
                let home_def = strengths[m.away].defence;
                let away_def = strengths[m.home].defence;
                let e = scored.entry(m.home).or_insert((0.0, 0.0));
                e.0 += m.weight * m.home_goals;
                e.1 += m.weight * base_rate * home_def * h;
                let e = scored.entry(m.away).or_insert((0.0, 0.0));
                e.0 += m.weight * m.away_goals;
                e.1 += m.weight * base_rate * away_def;
            }
            for (team, (goals, expected)) in &scored {
                if let Some(s) = strengths.get_mut(*team) {
                    s.attack = (goals + prior) / (expected + prior);
                }
            }

            // defence
            let mut conceded: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
            for m in &weighted {
                let h = if m.home_factor { home_advantage } else { 1.0 };
                let home_att = strengths[m.home].attack;
                let away_att = strengths[m.away].attack;
                let e = conceded.entry(m.away).or_insert((0.0, 0.0));
                e.0 += m.weight * m.home_goals;
                e.1 += m.weight * base_rate * home_att * h;
                let e = conceded.entry(m.home).or_insert((0.0, 0.0));
                e.0 += m.weight * m.away_goals;
                e.1 += m.weight * base_rate * away_att;
            }
            for (team, (goals, expected)) in &conceded {
                if let Some(s) = strengths.get_mut(*team) {
                    s.defence = (goals + prior) / (expected + prior);
                }
            }

            // keep mean attack at 1.0
            let mean_attack =
                strengths.values().map(|s| s.attack).sum::<f64>() / strengths.len() as f64;
            if mean_attack > 0.0 {
                for s in strengths.values_mut() {
                    s.attack /= mean_attack;
                    s.defence *= mean_attack;
                }
            }

            let (home_goals, home_expected) = weighted
                .iter()
                .filter(|m| m.home_factor)
                .fold((0.0, 0.0), |(g, e), m| {
                    (
                        g + m.weight * m.home_goals,
                        e + m.weight
                            * base_rate
                            * strengths[m.home].attack
                            * strengths[m.away].defence,
                    )
                });
            if home_expected > 0.0 {
                home_advantage = (home_goals + prior) / (home_expected + prior);
            }
            debug!("Iteration {}: home advantage {:.4}", iteration, home_advantage);
        }

        info!(
            "Fitted {} teams on {} matches in {:.2}s (base rate {:.3}, home advantage {:.3})",
            strengths.len(),
            weighted.len(),
            started.elapsed().as_secs_f64(),
            base_rate,
            home_advantage
        );

        Ok(PoissonStrengthModel {
            strengths,
            base_rate,
            home_advantage,
            host: settings.host.clone(),
            ratings_source: settings.ratings_source,
            fitted_matches: weighted.len(),
            reference_date: settings.weighting.reference_date,
        })
    }
}
