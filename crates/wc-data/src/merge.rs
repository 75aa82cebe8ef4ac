//! Fan-in of per-batch partial artifacts.

use std::fs;
use std::path::PathBuf;

use uuid::Uuid;
use wc_types::{StageCountTable, WcResult};

use crate::storage::{read_losses, read_stage_table, ArtifactStore};

/// `{batch_uuid}_{run_tag}_{name}`
pub fn partial_file_name(batch_id: Uuid, run_tag: &str, name: &str) -> String {
    format!("{batch_id}_{run_tag}_{name}")
}

/// `{run_tag}_{name}`
pub fn merged_file_name(run_tag: &str, name: &str) -> String {
    format!("{run_tag}_{name}")
}

/// Result of merging one run's stage tables.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub merged_path: PathBuf,
    pub table: StageCountTable,
    /// Partial files found and removed.
    pub partials: usize,
    pub samples: u64,
}

/// Merged per-sample losses of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct LossMerge {
    pub merged_path: PathBuf,
    pub losses: Vec<u32>,
    pub partials: usize,
}

/// Discovers, reduces and removes the partial files of one run.
#[derive(Debug, Clone)]
pub struct ResultMerger {
    store: ArtifactStore,
    run_tag: String,
}

impl ResultMerger {
    pub fn new(store: ArtifactStore, run_tag: impl Into<String>) -> Self {
        Self {
            store,
            run_tag: run_tag.into(),
        }
    }

    /// Partial files of this run for `name`, sorted by file name.
    pub fn discover(&self, name: &str) -> WcResult<Vec<PathBuf>> {
        let suffix = format!("_{}_{}", self.run_tag, name);
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.store.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.len() > suffix.len() && file_name.ends_with(&suffix) {
                found.push(entry.path());
            }
        }
        found.sort();
        tracing::debug!("Discovered {} partials matching *{}", found.len(), suffix);
        Ok(found)
    }

    /// Sum every partial stage table of the run into `{run_tag}_{name}`, then
    /// delete the partials. Merges whatever is present, including nothing.
    pub fn merge_tables(&self, name: &str) -> WcResult<MergeOutcome> {
        let partials = self.discover(name)?;
        let tables = partials
            .iter()
            .map(|p| read_stage_table(p))
            .collect::<WcResult<Vec<_>>>()?;

        let table = StageCountTable::merge_all(&tables);
        let samples = table.sample_count()?;
        let merged_path = self
            .store
            .write_stage_table(&merged_file_name(&self.run_tag, name), &table)?;

        for path in &partials {
            fs::remove_file(path)?;
        }
        tracing::info!(
            "Merged {} partial tables ({} samples) into {}",
            partials.len(),
            samples,
            merged_path.display()
        );

        Ok(MergeOutcome {
            merged_path,
            table,
            partials: partials.len(),
            samples,
        })
    }

    /// Concatenate per-sample loss files in file-name order into
    /// `{run_tag}_{name}`, then delete them.
    pub fn merge_losses(&self, name: &str) -> WcResult<LossMerge> {
        let partials = self.discover(name)?;
        let mut losses = Vec::new();
        for path in &partials {
            losses.extend(read_losses(path)?);
        }
        let merged_path = self
            .store
            .write_losses(&merged_file_name(&self.run_tag, name), &losses)?;
        for path in &partials {
            fs::remove_file(path)?;
        }
        tracing::info!(
            "Merged {} loss files ({} values) into {}",
            partials.len(),
            losses.len(),
            merged_path.display()
        );
        Ok(LossMerge {
            merged_path,
            losses,
            partials: partials.len(),
        })
    }
}
