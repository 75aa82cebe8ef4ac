use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use wc_types::{DataError, LikelihoodRow, Stage, StageCountTable, StageCounts, WcResult};

/// First column of every stage-count CSV.
pub const TEAM_COLUMN: &str = "Team";

/// `Team,Group,R16,QF,SF,RU,W`
pub fn stage_table_header() -> Vec<&'static str> {
    let mut header = vec![TEAM_COLUMN];
    header.extend(Stage::ALL.iter().map(|s| s.label()));
    header
}

/// Reads and writes run artifacts under one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    pub root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> WcResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write a stage-count table, one row per team in name order.
    pub fn write_stage_table(&self, name: &str, table: &StageCountTable) -> WcResult<PathBuf> {
        let path = self.path(name);
        let mut wtr = WriterBuilder::new().from_path(&path)?;
        wtr.write_record(stage_table_header())?;
        for (team, counts) in table.rows() {
            let mut record = vec![team.clone()];
            record.extend(counts.0.iter().map(u64::to_string));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(path)
    }

    /// Read a stage-count table. Empty and header-only files give an empty
    /// table.
    pub fn read_stage_table<P: AsRef<Path>>(&self, path: P) -> WcResult<StageCountTable> {
        read_stage_table(path.as_ref())
    }

    /// Serialize a fitted model to `{stem}.model`.
    pub fn write_model<M: Serialize>(&self, stem: &str, model: &M) -> WcResult<PathBuf> {
        let path = self.path(&format!("{stem}.model"));
        let file = fs::File::create(&path)?;
        serde_json::to_writer(file, model)?;
        Ok(path)
    }

    pub fn read_model<M: DeserializeOwned>(&self, path: &Path) -> WcResult<M> {
        let file = fs::File::open(path).map_err(|_| DataError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Header line plus one data row, under `stem` with no extension.
    pub fn write_likelihood_row(&self, stem: &str, row: &LikelihoodRow) -> WcResult<PathBuf> {
        let path = self.path(stem);
        let mut file = fs::File::create(&path)?;
        writeln!(file, "{}", row.header())?;
        writeln!(file, "{}", row.values())?;
        Ok(path)
    }

    /// One loss value per line.
    pub fn write_losses(&self, name: &str, losses: &[u32]) -> WcResult<PathBuf> {
        let path = self.path(name);
        let mut file = fs::File::create(&path)?;
        for loss in losses {
            writeln!(file, "{loss}")?;
        }
        Ok(path)
    }

    pub fn write_text(&self, name: &str, text: &str) -> WcResult<PathBuf> {
        let path = self.path(name);
        fs::write(&path, text)?;
        Ok(path)
    }
}

pub(crate) fn read_stage_table(path: &Path) -> WcResult<StageCountTable> {
    if !path.exists() {
        return Err(DataError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let invalid = |message: String| DataError::InvalidFormat {
        path: path.display().to_string(),
        message,
    };

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut table = StageCountTable::new();

    let headers = rdr.headers()?.clone();
    if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
        return Ok(table);
    }
    let expected = stage_table_header();
    if headers.iter().ne(expected.iter().copied()) {
        return Err(invalid(format!(
            "expected header {}, found {}",
            expected.join(","),
            headers.iter().collect::<Vec<_>>().join(",")
        ))
        .into());
    }

    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        let line = idx + 2;
        let team = record
            .get(0)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| invalid(format!("missing team at line {line}")))?;
        let mut counts = StageCounts::default();
        for (i, slot) in counts.0.iter_mut().enumerate() {
            let raw = record
                .get(i + 1)
                .ok_or_else(|| invalid(format!("short row at line {line}")))?;
            *slot = raw.parse().map_err(|_| DataError::ParseError {
                line,
                message: format!("invalid count '{raw}'"),
            })?;
        }
        table.insert_row(team, counts);
    }
    Ok(table)
}

/// Read one integer loss per line, ignoring blank lines.
pub fn read_losses(path: &Path) -> WcResult<Vec<u32>> {
    let file = fs::File::open(path).map_err(|_| DataError::FileNotFound {
        path: path.display().to_string(),
    })?;
    let mut losses = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        losses.push(line.parse().map_err(|_| DataError::ParseError {
            line: idx + 1,
            message: format!("invalid loss '{line}'"),
        })?);
    }
    Ok(losses)
}
