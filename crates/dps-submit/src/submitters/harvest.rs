use async_trait::async_trait;
use dps_common::types::TaskState;
use std::sync::Arc;
use tracing::info;

use super::TaskSubmitter;
use crate::context::SubmitContext;
use crate::error::Result;
use crate::harvest::{Harvest, Harvester};
use crate::status::TaskStatusUpdater;

/// State description of harvests that produced nothing
pub const EMPTY_HARVEST: &str = "The task was dropped because the harvest found no records";

/// Delegates enumeration to an external [`Harvester`]
pub struct HarvestSubmitter {
    harvester: Arc<dyn Harvester>,
    updater: TaskStatusUpdater,
}

impl HarvestSubmitter {
    pub fn new(harvester: Arc<dyn Harvester>, updater: TaskStatusUpdater) -> Self {
        Self { harvester, updater }
    }
}

#[async_trait]
impl TaskSubmitter for HarvestSubmitter {
    async fn submit(&self, ctx: Arc<SubmitContext>) -> Result<()> {
        let task_id = ctx.task_id();
        let harvests = Harvest::from_task(ctx.task())?;

        let result = if ctx.is_restart() {
            self.harvester.harvest_for_restart(&harvests, &ctx).await?
        } else {
            self.harvester.harvest(&harvests, &ctx).await?
        };
        info!(task_id, counter = result.counter, state = %result.state, "Harvest finished");

        ctx.set_expected_size(result.counter);
        match result.state {
            // Killed mid-harvest: the state already says so
            TaskState::Dropped => self.updater.update_expected_size(task_id, result.counter).await,
            _ if result.counter == 0 => self.updater.mark_dropped(task_id, EMPTY_HARVEST).await,
            state => {
                self.updater
                    .update_state_and_expected_size(task_id, state, result.counter)
                    .await
            },
        }
    }
}
