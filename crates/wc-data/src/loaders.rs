use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use wc_types::{
    DataError, GroupFixture, HistoricalMatch, KnockoutFixture, MatchRound, Stage,
    TournamentLayout, TrainingWindow, WcResult,
};

/// Which historical matches to keep while loading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultFilter {
    pub window: Option<TrainingWindow>,
    /// Competition codes to keep; `None` keeps everything.
    pub competitions: Option<Vec<String>>,
}

impl ResultFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(window: TrainingWindow, competitions: &[String]) -> Self {
        Self {
            window: Some(window),
            competitions: Some(competitions.to_vec()),
        }
    }

    pub fn keeps(&self, m: &HistoricalMatch) -> bool {
        let in_window = self.window.map_or(true, |w| w.contains(m.date));
        let in_comps = self
            .competitions
            .as_ref()
            .map_or(true, |comps| comps.iter().any(|c| *c == m.competition));
        in_window && in_comps
    }
}

#[derive(Debug, Deserialize)]
struct ResultRecord {
    date: String,
    home_team: String,
    away_team: String,
    home_score: u32,
    away_score: u32,
    tournament: String,
    neutral: String,
    #[serde(default)]
    shootout_winner: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FixtureRecord {
    date: String,
    stage: String,
    #[serde(default)]
    group: Option<String>,
    team_1: String,
    team_2: String,
}

#[derive(Debug, Deserialize)]
struct ActualStageRecord {
    #[serde(rename = "Team")]
    team: String,
    #[serde(rename = "Stage")]
    stage: String,
}

fn parse_date(raw: &str, line: usize) -> WcResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        DataError::ParseError {
            line,
            message: format!("invalid date '{raw}': {e}"),
        }
        .into()
    })
}

fn parse_bool(raw: &str, line: usize) -> WcResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(DataError::ParseError {
            line,
            message: format!("invalid boolean '{other}'"),
        }
        .into()),
    }
}

fn open_reader(path: &Path) -> WcResult<csv::Reader<std::fs::File>> {
    if !path.exists() {
        return Err(DataError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| {
            DataError::InvalidFormat {
                path: path.display().to_string(),
                message: e.to_string(),
            }
            .into()
        })
}

/// CSV loader for the predictor's input files.
#[derive(Debug, Default)]
pub struct DataLoader;

impl DataLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load historical results, skipping malformed rows and anything the
    /// filter rejects. Rows come back sorted by date.
    pub fn load_results<P: AsRef<Path>>(
        &self,
        path: P,
        filter: &ResultFilter,
    ) -> WcResult<Vec<HistoricalMatch>> {
        let path = path.as_ref();
        tracing::debug!("Loading results from: {}", path.display());

        let mut rdr = open_reader(path)?;
        let mut matches = Vec::new();
        let mut skipped = 0usize;

        for (idx, record) in rdr.deserialize::<ResultRecord>().enumerate() {
            let line = idx + 2;
            let parsed = record
                .map_err(|e| DataError::ParseError {
                    line,
                    message: e.to_string(),
                }.into())
                .and_then(|r| Self::to_historical(r, line));

            match parsed {
                Ok(m) if filter.keeps(&m) => matches.push(m),
                Ok(_) => {}
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Skipping invalid result at line {}: {}", line, e);
                }
            }
        }

        matches.sort_by_key(|m| m.date);
        tracing::info!(
            "Loaded {} matches from {} ({} skipped)",
            matches.len(),
            path.display(),
            skipped
        );
        Ok(matches)
    }

    fn to_historical(r: ResultRecord, line: usize) -> WcResult<HistoricalMatch> {
        Ok(HistoricalMatch {
            date: parse_date(&r.date, line)?,
            home_team: r.home_team,
            away_team: r.away_team,
            home_score: r.home_score,
            away_score: r.away_score,
            competition: r.tournament,
            neutral: parse_bool(&r.neutral, line)?,
            shootout_winner: r.shootout_winner.filter(|w| !w.trim().is_empty()),
        })
    }

    /// Load a tournament's fixture list and build its bracket.
    pub fn load_fixtures<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        host: Option<String>,
    ) -> WcResult<TournamentLayout> {
        let path = path.as_ref();
        let mut rdr = open_reader(path)?;
        let mut group_fixtures = Vec::new();
        let mut knockout_fixtures = Vec::new();

        for (idx, record) in rdr.deserialize::<FixtureRecord>().enumerate() {
            let line = idx + 2;
            let r = record.map_err(|e| DataError::ParseError {
                line,
                message: e.to_string(),
            })?;
            let date = parse_date(&r.date, line)?;

            match MatchRound::parse(&r.stage) {
                Some(MatchRound::Group) => {
                    let group = r.group.filter(|g| !g.is_empty()).ok_or_else(|| {
                        DataError::ParseError {
                            line,
                            message: "group fixture without a group".to_string(),
                        }
                    })?;
                    group_fixtures.push(GroupFixture {
                        date,
                        group,
                        team_1: r.team_1,
                        team_2: r.team_2,
                    });
                }
                Some(round) => knockout_fixtures.push(KnockoutFixture {
                    date,
                    round,
                    team_1: r.team_1,
                    team_2: r.team_2,
                }),
                None => {
                    tracing::debug!("Ignoring fixture at line {} with stage '{}'", line, r.stage);
                }
            }
        }

        let layout = TournamentLayout::new(name, host, group_fixtures, knockout_fixtures)?;
        tracing::info!(
            "Loaded tournament {}: {} groups, {} teams, {} knockout rounds",
            layout.name,
            layout.groups.len(),
            layout.teams().len(),
            layout.bracket.rounds.len()
        );
        Ok(layout)
    }

    /// Load the furthest stage each team actually reached.
    pub fn load_actual_stages<P: AsRef<Path>>(&self, path: P) -> WcResult<BTreeMap<String, Stage>> {
        let path = path.as_ref();
        let mut rdr = open_reader(path)?;
        let mut actual = BTreeMap::new();

        for (idx, record) in rdr.deserialize::<ActualStageRecord>().enumerate() {
            let line = idx + 2;
            let r = record.map_err(|e| DataError::ParseError {
                line,
                message: e.to_string(),
            })?;
            let stage: Stage = r.stage.parse().map_err(|_| DataError::ParseError {
                line,
                message: format!("unknown stage '{}'", r.stage),
            })?;
            actual.insert(r.team, stage);
        }
        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use wc_types::WcError;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn load_results_filters_and_skips_bad_rows() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "results.csv",
            "date,home_team,away_team,home_score,away_score,tournament,neutral,shootout_winner\n\
             2018-06-14,Russia,Saudi Arabia,5,0,W,false,\n\
             2018-07-01,Spain,Russia,1,1,W,false,Russia\n\
             not-a-date,Spain,Portugal,3,3,W,true,\n\
             2017-03-24,Spain,Israel,4,1,WQ,false,\n\
             2010-01-01,Brazil,Chile,2,0,F,true,\n",
        );

        let loader = DataLoader::new();
        let all = loader.load_results(&path, &ResultFilter::all()).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].date, day(2010, 1, 1));
        assert_eq!(all[3].shootout_winner.as_deref(), Some("Russia"));
        assert_eq!(all[2].shootout_winner, None);

        let window = TrainingWindow::new(day(2012, 6, 1), day(2018, 6, 30)).unwrap();
        let filter = ResultFilter::new(window, &["W".to_string()]);
        let filtered = loader.load_results(&path, &filter).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].home_team, "Russia");
        assert!(!filtered[0].neutral);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = DataLoader::new()
            .load_results("/nonexistent/results.csv", &ResultFilter::all())
            .unwrap_err();
        assert!(matches!(err, WcError::Data(DataError::FileNotFound { .. })));
    }

    #[test]
    fn load_fixtures_builds_bracket() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "fixtures_toy.csv",
            "date,stage,group,team_1,team_2\n\
             2022-11-20,Group,A,Alpha,Bravo\n\
             2022-11-20,Group,A,Charlie,Delta\n\
             2022-11-24,Group,A,Alpha,Charlie\n\
             2022-11-24,Group,A,Bravo,Delta\n\
             2022-11-28,Group,A,Alpha,Delta\n\
             2022-11-28,Group,A,Bravo,Charlie\n\
             2022-12-17,3rd,,L1,L2\n\
             2022-12-18,Final,,1A,2A\n",
        );

        let layout = DataLoader::new()
            .load_fixtures(&path, "toy", Some("Alpha".into()))
            .unwrap();
        assert_eq!(layout.teams(), vec!["Alpha", "Bravo", "Charlie", "Delta"]);
        assert_eq!(layout.bracket.rounds.len(), 1);
        assert_eq!(layout.bracket.qualifiers_per_group(), 2);
        assert_eq!(layout.round_start(MatchRound::Final), Some(day(2022, 12, 18)));
    }

    #[test]
    fn load_actual_stages_parses_labels() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "actual.csv", "Team,Stage\nFrance,W\nCroatia,RU\nGermany,Group\n");
        let actual = DataLoader::new().load_actual_stages(&path).unwrap();
        assert_eq!(actual["France"], Stage::Winner);
        assert_eq!(actual["Croatia"], Stage::RunnerUp);
        assert_eq!(actual["Germany"], Stage::Group);

        let bad = write(&dir, "bad.csv", "Team,Stage\nFrance,Champion\n");
        assert!(DataLoader::new().load_actual_stages(&bad).is_err());
    }
}
