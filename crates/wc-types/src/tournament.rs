//! Teams, matches, fixtures and bracket structure of a tournament.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{DataError, WcError, WcResult};
use crate::stage::MatchRound;

/// Competition code of World Cup finals matches.
pub const WORLD_CUP: &str = "W";

/// All competition codes known to the historical data set.
pub const COMPETITIONS: [&str; 6] = ["W", "C1", "WQ", "CQ", "C2", "F"];

/// World Cups the predictor knows how to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TournamentYear {
    Y2014,
    Y2018,
    Y2022,
}

impl TournamentYear {
    pub const ALL: [TournamentYear; 3] =
        [TournamentYear::Y2014, TournamentYear::Y2018, TournamentYear::Y2022];

    pub fn year(self) -> i32 {
        match self {
            TournamentYear::Y2014 => 2014,
            TournamentYear::Y2018 => 2018,
            TournamentYear::Y2022 => 2022,
        }
    }

    pub fn host(self) -> &'static str {
        match self {
            TournamentYear::Y2014 => "Brazil",
            TournamentYear::Y2018 => "Russia",
            TournamentYear::Y2022 => "Qatar",
        }
    }

    /// The tournament still being played; resume defaults to today for it.
    pub fn is_live(self) -> bool {
        self == TournamentYear::Y2022
    }

    /// Last day of training data when only a number of years is given.
    pub fn default_training_end(self) -> NaiveDate {
        match self {
            TournamentYear::Y2022 => NaiveDate::from_ymd_opt(2022, 11, 20),
            other => NaiveDate::from_ymd_opt(other.year(), 6, 1),
        }
        .unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for TournamentYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.year())
    }
}

impl FromStr for TournamentYear {
    type Err = WcError;

    fn from_str(s: &str) -> WcResult<Self> {
        match s.trim() {
            "2014" => Ok(TournamentYear::Y2014),
            "2018" => Ok(TournamentYear::Y2018),
            "2022" => Ok(TournamentYear::Y2022),
            other => Err(WcError::Config(format!(
                "unsupported tournament year '{other}', expected 2014, 2018 or 2022"
            ))),
        }
    }
}

/// Goals scored by the two sides of a match, in fixture order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub team_1: u32,
    pub team_2: u32,
}

impl Score {
    pub fn new(team_1: u32, team_2: u32) -> Self {
        Self { team_1, team_2 }
    }

    pub fn outcome(&self) -> MatchOutcome {
        match self.team_1.cmp(&self.team_2) {
            std::cmp::Ordering::Greater => MatchOutcome::Team1Win,
            std::cmp::Ordering::Equal => MatchOutcome::Draw,
            std::cmp::Ordering::Less => MatchOutcome::Team2Win,
        }
    }

    pub fn swapped(&self) -> Self {
        Self::new(self.team_2, self.team_1)
    }
}

/// Regulation-time result class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOutcome {
    Team1Win,
    Draw,
    Team2Win,
}

/// One row of the historical international results data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMatch {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
    /// Competition code, see [`COMPETITIONS`].
    pub competition: String,
    pub neutral: bool,
    /// Winner of a penalty shootout, when the match went to one.
    pub shootout_winner: Option<String>,
}

impl HistoricalMatch {
    pub fn score(&self) -> Score {
        Score::new(self.home_score, self.away_score)
    }

    /// Score oriented so that `team_1` comes first.
    pub fn score_for(&self, team_1: &str) -> Score {
        if self.home_team == team_1 {
            self.score()
        } else {
            self.score().swapped()
        }
    }

    /// Winner of the match, taking a shootout into account.
    pub fn winner(&self) -> Option<&str> {
        match self.score().outcome() {
            MatchOutcome::Team1Win => Some(&self.home_team),
            MatchOutcome::Team2Win => Some(&self.away_team),
            MatchOutcome::Draw => self.shootout_winner.as_deref(),
        }
    }
}

/// A group-stage fixture between two named teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFixture {
    pub date: NaiveDate,
    pub group: String,
    pub team_1: String,
    pub team_2: String,
}

/// Finishing position in a group that feeds a first-round knockout match,
/// written `1A`, `2B`, ...
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifierSlot {
    /// 1-based finishing position.
    pub position: usize,
    pub group: String,
}

impl FromStr for QualifierSlot {
    type Err = WcError;

    fn from_str(s: &str) -> WcResult<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| crate::validation_error!("invalid qualifier slot '{s}'"))?;
        let (position, group) = s.split_at(split);
        let position: usize = position
            .parse()
            .map_err(|_| crate::validation_error!("invalid qualifier slot '{s}'"))?;
        if position == 0 || group.is_empty() {
            return Err(crate::validation_error!("invalid qualifier slot '{s}'"));
        }
        Ok(Self {
            position,
            group: group.to_string(),
        })
    }
}

impl fmt::Display for QualifierSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.position, self.group)
    }
}

/// A knockout fixture as it appears in the fixture list. Team fields hold
/// qualifier slots for the first knockout round and placeholders afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnockoutFixture {
    pub date: NaiveDate,
    pub round: MatchRound,
    pub team_1: String,
    pub team_2: String,
}

/// One knockout round: match dates in bracket order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnockoutRound {
    pub round: MatchRound,
    pub dates: Vec<NaiveDate>,
}

impl KnockoutRound {
    pub fn teams(&self) -> usize {
        self.dates.len() * 2
    }

    /// First and last scheduled date of the round.
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.dates.iter().min()?;
        let last = self.dates.iter().max()?;
        Some((*first, *last))
    }
}

/// Knockout structure: slots feeding round one, then rounds that pair the
/// winners of consecutive matches of the previous round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub first_round: Vec<(QualifierSlot, QualifierSlot)>,
    pub rounds: Vec<KnockoutRound>,
}

impl Bracket {
    /// Number of teams each group sends to the knockout stage.
    pub fn qualifiers_per_group(&self) -> usize {
        self.first_round
            .iter()
            .flat_map(|(a, b)| [a.position, b.position])
            .max()
            .unwrap_or(0)
    }
}

/// Immutable description of one tournament: groups, fixtures and bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentLayout {
    pub name: String,
    pub host: Option<String>,
    pub groups: BTreeMap<String, Vec<String>>,
    pub group_fixtures: Vec<GroupFixture>,
    pub bracket: Bracket,
}

impl TournamentLayout {
    /// Build and validate a tournament from its fixture list.
    pub fn new(
        name: impl Into<String>,
        host: Option<String>,
        mut group_fixtures: Vec<GroupFixture>,
        mut knockout_fixtures: Vec<KnockoutFixture>,
    ) -> WcResult<Self> {
        group_fixtures.sort_by_key(|f| f.date);
        // stable: keeps file order within a round
        knockout_fixtures.sort_by_key(|f| f.round);

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for fixture in &group_fixtures {
            let members = groups.entry(fixture.group.clone()).or_default();
            for team in [&fixture.team_1, &fixture.team_2] {
                if !members.contains(team) {
                    members.push(team.clone());
                }
            }
        }

        let mut rounds: Vec<KnockoutRound> = Vec::new();
        for fixture in &knockout_fixtures {
            match rounds.last_mut() {
                Some(last) if last.round == fixture.round => last.dates.push(fixture.date),
                _ => rounds.push(KnockoutRound {
                    round: fixture.round,
                    dates: vec![fixture.date],
                }),
            }
        }

        let first_round = match rounds.first() {
            Some(first) => knockout_fixtures
                .iter()
                .filter(|f| f.round == first.round)
                .map(|f| Ok((f.team_1.parse()?, f.team_2.parse()?)))
                .collect::<WcResult<Vec<_>>>()?,
            None => Vec::new(),
        };

        let layout = Self {
            name: name.into(),
            host,
            groups,
            group_fixtures,
            bracket: Bracket { first_round, rounds },
        };
        layout.validate()?;
        Ok(layout)
    }

    fn validate(&self) -> WcResult<()> {
        let incomplete = |message: String| -> WcError { DataError::IncompleteBracket { message }.into() };

        if self.groups.is_empty() {
            return Err(incomplete(format!("tournament {} has no group fixtures", self.name)));
        }
        let rounds = &self.bracket.rounds;
        let Some(last) = rounds.last() else {
            return Err(incomplete(format!("tournament {} has no knockout rounds", self.name)));
        };
        if last.dates.len() != 1 {
            return Err(incomplete(format!(
                "final round {} has {} matches",
                last.round,
                last.dates.len()
            )));
        }
        for pair in rounds.windows(2) {
            if pair[0].dates.len() != pair[1].dates.len() * 2 {
                return Err(incomplete(format!(
                    "round {} has {} matches but {} has {}",
                    pair[0].round,
                    pair[0].dates.len(),
                    pair[1].round,
                    pair[1].dates.len()
                )));
            }
        }
        for (a, b) in &self.bracket.first_round {
            for slot in [a, b] {
                let size = self.groups.get(&slot.group).map(Vec::len).unwrap_or(0);
                if slot.position > size {
                    return Err(incomplete(format!("slot {slot} refers to a missing team")));
                }
            }
        }
        Ok(())
    }

    /// Every team, sorted by name.
    pub fn teams(&self) -> Vec<String> {
        let mut teams: Vec<String> = self.groups.values().flatten().cloned().collect();
        teams.sort();
        teams
    }

    pub fn first_fixture_date(&self) -> Option<NaiveDate> {
        self.all_dates().min()
    }

    pub fn last_fixture_date(&self) -> Option<NaiveDate> {
        self.all_dates().max()
    }

    /// Earliest scheduled date of the given round.
    pub fn round_start(&self, round: MatchRound) -> Option<NaiveDate> {
        if round == MatchRound::Group {
            return self.group_fixtures.iter().map(|f| f.date).min();
        }
        self.bracket
            .rounds
            .iter()
            .filter(|r| r.round == round)
            .flat_map(|r| r.dates.iter().copied())
            .min()
    }

    fn all_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.group_fixtures
            .iter()
            .map(|f| f.date)
            .chain(self.bracket.rounds.iter().flat_map(|r| r.dates.iter().copied()))
    }
}
