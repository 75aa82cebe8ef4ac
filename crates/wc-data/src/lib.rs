pub mod loaders;
pub mod merge;
pub mod storage;

pub use loaders::*;
pub use merge::*;
pub use storage::*;

use std::path::{Path, PathBuf};

use wc_types::TournamentYear;

/// Locations of the input data files under one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Historical international results, one row per match.
    pub fn results(&self) -> PathBuf {
        self.root.join("results.csv")
    }

    pub fn fixtures(&self, year: TournamentYear) -> PathBuf {
        self.root.join(format!("fixtures_{year}.csv"))
    }

    pub fn actual_stages(&self, year: TournamentYear) -> PathBuf {
        self.root.join(format!("actual_stages_{year}.csv"))
    }
}
