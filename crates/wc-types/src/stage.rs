//! Tournament stages reached by teams and the rounds fixtures belong to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{WcError, WcResult};

/// Furthest stage a team reaches in one tournament instance.
///
/// The declaration order is the ordinal scale used by the loss evaluator:
/// `Group < Round16 < QuarterFinal < SemiFinal < RunnerUp < Winner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Group,
    Round16,
    QuarterFinal,
    SemiFinal,
    RunnerUp,
    Winner,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Group,
        Stage::Round16,
        Stage::QuarterFinal,
        Stage::SemiFinal,
        Stage::RunnerUp,
        Stage::Winner,
    ];

    pub const COUNT: usize = 6;

    /// Position on the ordinal scale (0 for `Group`, 5 for `Winner`).
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Column label used in stage-count CSV files.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Group => "Group",
            Stage::Round16 => "R16",
            Stage::QuarterFinal => "QF",
            Stage::SemiFinal => "SF",
            Stage::RunnerUp => "RU",
            Stage::Winner => "W",
        }
    }

    /// Stage assigned to the loser of a knockout round contested by
    /// `teams_in_round` teams.
    pub fn eliminated_in(teams_in_round: usize) -> Self {
        match teams_in_round {
            0..=2 => Stage::RunnerUp,
            3..=4 => Stage::SemiFinal,
            5..=8 => Stage::QuarterFinal,
            _ => Stage::Round16,
        }
    }

    /// Absolute ordinal distance between two stages.
    pub fn distance(self, other: Stage) -> u32 {
        self.ordinal().abs_diff(other.ordinal()) as u32
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Stage {
    type Err = WcError;

    fn from_str(s: &str) -> WcResult<Self> {
        match s.trim() {
            "Group" | "G" => Ok(Stage::Group),
            "R16" | "Round16" => Ok(Stage::Round16),
            "QF" | "QuarterFinal" => Ok(Stage::QuarterFinal),
            "SF" | "SemiFinal" => Ok(Stage::SemiFinal),
            "RU" | "RunnerUp" => Ok(Stage::RunnerUp),
            "W" | "Winner" => Ok(Stage::Winner),
            other => Err(crate::validation_error!("unknown stage label '{other}'")),
        }
    }
}

/// Round a fixture is scheduled in. Labels double as named resume points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchRound {
    Group,
    R16,
    QF,
    SF,
    Final,
}

impl MatchRound {
    pub const ALL: [MatchRound; 5] = [
        MatchRound::Group,
        MatchRound::R16,
        MatchRound::QF,
        MatchRound::SF,
        MatchRound::Final,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MatchRound::Group => "Group",
            MatchRound::R16 => "R16",
            MatchRound::QF => "QF",
            MatchRound::SF => "SF",
            MatchRound::Final => "Final",
        }
    }

    pub fn is_knockout(self) -> bool {
        self != MatchRound::Group
    }

    /// Parse a round label, returning `None` for anything that isn't one.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.label() == s.trim())
    }
}

impl fmt::Display for MatchRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
