use wc_types::{validation_error, DataError, StageCountTable, WcResult};

use crate::tournament::SampleOutcome;

/// Per-batch accumulator of sample outcomes. Owned by one batch; nothing
/// else touches it until the batch hands its table off.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    table: StageCountTable,
    samples: u64,
}

impl ResultAggregator {
    /// Zeroed table for every known team.
    pub fn new<I, S>(teams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: StageCountTable::with_teams(teams),
            samples: 0,
        }
    }

    /// Add one sample. The outcome must name every known team exactly once,
    /// so each row grows by one.
    pub fn record_sample(&mut self, outcome: &SampleOutcome) -> WcResult<()> {
        if outcome.len() != self.table.len() {
            return Err(validation_error!(
                "sample covers {} teams, table has {}",
                outcome.len(),
                self.table.len()
            ));
        }
        if let Some(team) = outcome.keys().find(|t| self.table.get(t).is_none()) {
            return Err(DataError::UnknownTeam { team: team.clone() }.into());
        }
        for (team, stage) in outcome {
            self.table.record(team, *stage);
        }
        self.samples += 1;
        Ok(())
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn table(&self) -> &StageCountTable {
        &self.table
    }

    pub fn into_table(self) -> StageCountTable {
        self.table
    }
}
