//! External harvesting
//!
//! The harvest topology does not enumerate records itself. It hands one
//! [`Harvest`] per repository to a [`Harvester`], which reports how many
//! records it dispatched and the state the task should end in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dps_common::types::{params, InputDataType, Task, TaskState};
use dps_common::DpsError;
use std::sync::Arc;

use crate::context::SubmitContext;
use crate::error::Result;

pub mod oai;

pub use oai::OaiHarvester;

/// One repository to harvest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harvest {
    pub url: String,
    pub metadata_prefix: String,
    pub set_spec: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Stop after this many records
    pub sample_size: Option<u64>,
}

impl Harvest {
    /// One harvest per repository url of the task
    pub fn from_task(task: &Task) -> Result<Vec<Harvest>> {
        let metadata_prefix = task.parameter(params::METADATA_PREFIX).ok_or_else(|| {
            DpsError::InvalidTask(format!("{} is required for harvesting", params::METADATA_PREFIX))
        })?;
        let set_spec = task.parameter(params::SET_SPEC).map(str::to_string);
        let from = task.timestamp_parameter(params::FROM)?;
        let until = task.timestamp_parameter(params::UNTIL)?;
        let sample_size = task.sample_size()?;

        let urls = task.entries(InputDataType::RepositoryUrls);
        if urls.is_empty() {
            return Err(DpsError::InvalidTask("no repository to harvest".to_string()).into());
        }

        Ok(urls
            .iter()
            .map(|url| Harvest {
                url: url.clone(),
                metadata_prefix: metadata_prefix.to_string(),
                set_spec: set_spec.clone(),
                from,
                until,
                sample_size,
            })
            .collect())
    }

    /// Incremental harvests also carry deletions
    pub fn is_incremental(&self) -> bool {
        self.from.is_some()
    }
}

/// Final tally reported by a harvester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestResult {
    pub counter: u64,
    pub state: TaskState,
}

#[async_trait]
pub trait Harvester: Send + Sync {
    async fn harvest(&self, harvests: &[Harvest], ctx: &Arc<SubmitContext>) -> Result<HarvestResult>;

    /// Resume a harvest after a failed run
    async fn harvest_for_restart(
        &self,
        harvests: &[Harvest],
        ctx: &Arc<SubmitContext>,
    ) -> Result<HarvestResult> {
        self.harvest(harvests, ctx).await
    }
}
