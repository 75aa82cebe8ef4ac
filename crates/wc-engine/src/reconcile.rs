//! Substitution of recorded results for fixtures played before the resume
//! point.
//!
//! The resume date is the first simulated day: a recorded result is used
//! only when its match was played strictly before it. Resuming from the
//! first fixture date therefore plays the whole tournament, and a named
//! round resumes with that round's own fixtures still open.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{info, warn};
use wc_types::{
    HistoricalMatch, KnockoutRound, ResumePoint, Score, TournamentLayout, TournamentYear, WcError,
    WcResult,
};

/// Turn a parsed resume point into a cutoff date for `layout`. A round
/// resolves to its earliest fixture date.
///
/// `None` means the tournament is fully simulated.
pub fn resolve_resume(
    point: ResumePoint,
    layout: &TournamentLayout,
    year: TournamentYear,
    today: NaiveDate,
) -> WcResult<Option<NaiveDate>> {
    match point {
        ResumePoint::Default if year.is_live() => Ok(Some(today)),
        ResumePoint::Default => Ok(None),
        ResumePoint::Date(date) => Ok(Some(date)),
        ResumePoint::Round(round) => layout.round_start(round).map(Some).ok_or_else(|| {
            WcError::Config(format!(
                "cannot resume from {round}: tournament {} has no such round",
                layout.name
            ))
        }),
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Looks up recorded results from before the cutoff.
#[derive(Debug, Clone, Default)]
pub struct ResumeReconciler {
    cutoff: Option<NaiveDate>,
    /// Actual score per group fixture, by fixture index, oriented to the fixture.
    group_results: Vec<Option<Score>>,
    played: HashMap<(String, String), Vec<HistoricalMatch>>,
}

impl ResumeReconciler {
    /// Reconciler that never substitutes anything.
    pub fn fully_simulated(layout: &TournamentLayout) -> Self {
        Self {
            cutoff: None,
            group_results: vec![None; layout.group_fixtures.len()],
            played: HashMap::new(),
        }
    }

    /// `actuals` should hold the tournament's recorded matches; anything on or
    /// after `cutoff` is ignored.
    pub fn new(layout: &TournamentLayout, cutoff: Option<NaiveDate>, actuals: &[HistoricalMatch]) -> Self {
        let Some(cutoff) = cutoff else {
            return Self::fully_simulated(layout);
        };

        let mut played: HashMap<(String, String), Vec<HistoricalMatch>> = HashMap::new();
        for m in actuals.iter().filter(|m| m.date < cutoff) {
            played
                .entry(pair_key(&m.home_team, &m.away_team))
                .or_default()
                .push(m.clone());
        }

        let mut missing = 0usize;
        let group_results = layout
            .group_fixtures
            .iter()
            .map(|f| {
                if f.date >= cutoff {
                    return None;
                }
                let found = played
                    .get(&pair_key(&f.team_1, &f.team_2))
                    .and_then(|ms| ms.iter().find(|m| m.date == f.date))
                    .map(|m| m.score_for(&f.team_1));
                if found.is_none() {
                    missing += 1;
                    warn!(
                        "No recorded result for {} v {} on {}; simulating it",
                        f.team_1, f.team_2, f.date
                    );
                }
                found
            })
            .collect::<Vec<_>>();

        let substituted = group_results.iter().filter(|r| r.is_some()).count();
        info!(
            "Resuming from {}: {} group results substituted, {} missing, {} recorded matches",
            cutoff,
            substituted,
            missing,
            played.values().map(Vec::len).sum::<usize>()
        );

        Self {
            cutoff: Some(cutoff),
            group_results,
            played,
        }
    }

    pub fn cutoff(&self) -> Option<NaiveDate> {
        self.cutoff
    }

    /// Recorded score of the group fixture at `index`, when played before the cutoff.
    pub fn group_result(&self, index: usize) -> Option<Score> {
        self.group_results.get(index).copied().flatten()
    }

    /// Recorded winner of `team_1` v `team_2` in `round`, when the match was
    /// played within the round's dates and before the cutoff.
    pub fn knockout_result(&self, round: &KnockoutRound, team_1: &str, team_2: &str) -> Option<&str> {
        self.cutoff?;
        let (first, last) = round.window()?;
        self.played
            .get(&pair_key(team_1, team_2))?
            .iter()
            .find(|m| first <= m.date && m.date <= last)?
            .winner()
    }
}
