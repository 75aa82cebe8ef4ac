//! Plays out one tournament instance: group stage then knockout bracket.

use rand::{Rng, RngCore};
use std::collections::{BTreeMap, HashMap};
use wc_types::{
    DataError, GroupFixture, MatchPredictor, MatchUp, QualifierSlot, Score, Stage, TournamentLayout,
    WcResult,
};

use crate::reconcile::ResumeReconciler;

/// Furthest stage reached by every team in one sample.
pub type SampleOutcome = BTreeMap<String, Stage>;

#[derive(Debug, Clone, Default)]
struct Standing {
    points: u32,
    goals_for: u32,
    goals_against: u32,
    /// Drawn once per sample; last resort tie-break.
    lot: u64,
}

impl Standing {
    fn goal_difference(&self) -> i64 {
        self.goals_for as i64 - self.goals_against as i64
    }

    fn record(&mut self, scored: u32, conceded: u32) {
        self.goals_for += scored;
        self.goals_against += conceded;
        self.points += match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => 3,
            std::cmp::Ordering::Equal => 1,
            std::cmp::Ordering::Less => 0,
        };
    }
}

/// Final order of a group: points, goal difference, goals scored, then
/// head-to-head points among teams still level, then lots.
fn rank_group(
    members: &[String],
    results: &[(&GroupFixture, Score)],
    lots: &HashMap<&str, u64>,
) -> Vec<String> {
    let mut table: HashMap<&str, Standing> = members
        .iter()
        .map(|t| {
            let lot = lots.get(t.as_str()).copied().unwrap_or(0);
            (t.as_str(), Standing { lot, ..Standing::default() })
        })
        .collect();
    for (fixture, score) in results {
        if let Some(s) = table.get_mut(fixture.team_1.as_str()) {
            s.record(score.team_1, score.team_2);
        }
        if let Some(s) = table.get_mut(fixture.team_2.as_str()) {
            s.record(score.team_2, score.team_1);
        }
    }

    let key = |team: &str| {
        let s = &table[team];
        (s.points, s.goal_difference(), s.goals_for)
    };
    let mut order: Vec<&str> = members.iter().map(String::as_str).collect();
    order.sort_by(|a, b| key(*b).cmp(&key(*a)));

    let mut ranked = Vec::with_capacity(order.len());
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && key(order[end]) == key(order[start]) {
            end += 1;
        }
        let mut block = order[start..end].to_vec();
        if block.len() > 1 {
            let h2h = head_to_head(&block, results);
            block.sort_by(|a, b| {
                h2h[b]
                    .cmp(&h2h[a])
                    .then_with(|| table[b].lot.cmp(&table[a].lot))
            });
        }
        ranked.extend(block.into_iter().map(str::to_string));
        start = end;
    }
    ranked
}

fn head_to_head<'a>(block: &[&'a str], results: &[(&GroupFixture, Score)]) -> HashMap<&'a str, u32> {
    let mut points: HashMap<&'a str, u32> = block.iter().map(|t| (*t, 0)).collect();
    for (fixture, score) in results {
        let (Some(&t1), Some(&t2)) = (
            block.iter().find(|t| **t == fixture.team_1),
            block.iter().find(|t| **t == fixture.team_2),
        ) else {
            continue;
        };
        let (p1, p2) = match score.team_1.cmp(&score.team_2) {
            std::cmp::Ordering::Greater => (3, 0),
            std::cmp::Ordering::Equal => (1, 1),
            std::cmp::Ordering::Less => (0, 3),
        };
        *points.entry(t1).or_default() += p1;
        *points.entry(t2).or_default() += p2;
    }
    points
}

/// Simulates single tournament instances against a fitted model.
pub struct TournamentSimulator<'a> {
    layout: &'a TournamentLayout,
    model: &'a dyn MatchPredictor,
    reconciler: &'a ResumeReconciler,
}

impl<'a> TournamentSimulator<'a> {
    pub fn new(
        layout: &'a TournamentLayout,
        model: &'a dyn MatchPredictor,
        reconciler: &'a ResumeReconciler,
    ) -> Self {
        Self {
            layout,
            model,
            reconciler,
        }
    }

    /// Play one sample. Every team of the tournament appears exactly once in
    /// the outcome.
    pub fn simulate(&self, rng: &mut dyn RngCore) -> WcResult<SampleOutcome> {
        let mut outcome: SampleOutcome = self
            .layout
            .teams()
            .into_iter()
            .map(|t| (t, Stage::Group))
            .collect();

        let standings = self.play_group_stage(rng);
        let mut matches = self.seed_first_round(&standings)?;

        let rounds = &self.layout.bracket.rounds;
        for (idx, round) in rounds.iter().enumerate() {
            let loser_stage = Stage::eliminated_in(round.teams());
            let mut winners = Vec::with_capacity(matches.len());

            for (m, (team_1, team_2)) in matches.iter().enumerate() {
                let date = round.dates.get(m).copied().unwrap_or(round.dates[0]);
                let winner = match self.reconciler.knockout_result(round, team_1, team_2) {
                    Some(winner) => winner.to_string(),
                    None => self.play_knockout(team_1, team_2, date, rng),
                };
                let loser = if winner == *team_1 { team_2 } else { team_1 };
                outcome.insert(loser.clone(), loser_stage);
                winners.push(winner);
            }

            if idx + 1 == rounds.len() {
                for w in &winners {
                    outcome.insert(w.clone(), Stage::Winner);
                }
            }
            matches = winners
                .chunks(2)
                .filter(|pair| pair.len() == 2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect();
        }
        Ok(outcome)
    }

    /// Ranked members of every group.
    fn play_group_stage(&self, rng: &mut dyn RngCore) -> BTreeMap<String, Vec<String>> {
        let lots: HashMap<&str, u64> = self
            .layout
            .groups
            .values()
            .flatten()
            .map(|t| (t.as_str(), rng.gen::<u64>()))
            .collect();

        let mut by_group: BTreeMap<&str, Vec<(&GroupFixture, Score)>> = BTreeMap::new();
        for (idx, fixture) in self.layout.group_fixtures.iter().enumerate() {
            let score = self.reconciler.group_result(idx).unwrap_or_else(|| {
                let m = MatchUp::neutral(&fixture.team_1, &fixture.team_2, fixture.date);
                self.model.sample_score(&m, rng)
            });
            by_group.entry(fixture.group.as_str()).or_default().push((fixture, score));
        }

        self.layout
            .groups
            .iter()
            .map(|(name, members)| {
                let results = by_group.get(name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                (name.clone(), rank_group(members, results, &lots))
            })
            .collect()
    }

    fn seed_first_round(
        &self,
        standings: &BTreeMap<String, Vec<String>>,
    ) -> WcResult<Vec<(String, String)>> {
        let lookup = |slot: &QualifierSlot| -> WcResult<String> {
            standings
                .get(&slot.group)
                .and_then(|ranked| ranked.get(slot.position - 1))
                .cloned()
                .ok_or_else(|| {
                    DataError::IncompleteBracket {
                        message: format!("no team finished in slot {slot}"),
                    }
                    .into()
                })
        };
        self.layout
            .bracket
            .first_round
            .iter()
            .map(|(a, b)| Ok((lookup(a)?, lookup(b)?)))
            .collect()
    }

    fn play_knockout(
        &self,
        team_1: &str,
        team_2: &str,
        date: chrono::NaiveDate,
        rng: &mut dyn RngCore,
    ) -> String {
        let m = MatchUp::neutral(team_1, team_2, date);
        let score = self.model.sample_score(&m, rng);
        let team_1_wins = match score.team_1.cmp(&score.team_2) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => rng.gen::<f64>() < self.model.shootout_probability(&m),
        };
        if team_1_wins {
            team_1.to_string()
        } else {
            team_2.to_string()
        }
    }
}
