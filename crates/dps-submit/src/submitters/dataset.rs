use async_trait::async_trait;
use std::sync::Arc;

use super::TaskSubmitter;
use crate::context::SubmitContext;
use crate::engine::DispatchEngine;
use crate::error::Result;

/// Submits explicit file lists and datasets of the representation store
pub struct DatasetSubmitter {
    engine: Arc<DispatchEngine>,
}

impl DatasetSubmitter {
    pub fn new(engine: Arc<DispatchEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskSubmitter for DatasetSubmitter {
    async fn submit(&self, ctx: Arc<SubmitContext>) -> Result<()> {
        self.engine.dispatch(ctx).await
    }
}
