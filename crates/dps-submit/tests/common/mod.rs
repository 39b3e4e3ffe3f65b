//! Shared fixtures for submission integration tests
//!
//! Every collaborator is the in-memory implementation shipped with the
//! crate, so these tests run without a database or a store.

#![allow(dead_code)]

pub mod postgres;

use chrono::{DateTime, TimeZone, Utc};
use dps_common::types::{DataSetRef, File, Representation, Revision, RevisionSelector, Task, TaskState};
use dps_submit::config::{DispatchConfig, TopicsConfig};
use dps_submit::engine::DispatchEngine;
use dps_submit::ledger::{InMemoryLedger, RecordSubmitService};
use dps_submit::queue::InMemoryRecordQueue;
use dps_submit::reader::{InMemoryRepresentationStore, StoreReader};
use dps_submit::status::{InMemoryTaskInfoStore, TaskInfo, TaskInfoStore, TaskStatusChecker, TaskStatusUpdater};
use dps_submit::submitters::topologies;
use dps_submit::topics::RoundRobinTopicSelector;
use dps_submit::SubmitContext;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const PROVIDER: &str = "provider";
pub const DATASET: &str = "dataset";
pub const REPRESENTATION: &str = "edm";
pub const TOPIC: &str = "validation_a";

static TRACING: Once = Once::new();

/// Route logs through the test writer, once per binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dps_submit=debug")
            .with_test_writer()
            .try_init();
    });
}

pub fn dataset() -> DataSetRef {
    DataSetRef::new(PROVIDER, DATASET)
}

pub fn dataset_url() -> String {
    format!("https://store.example/mcs/data-providers/{PROVIDER}/data-sets/{DATASET}")
}

pub fn revision_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn revision_selector() -> RevisionSelector {
    RevisionSelector::new("published", "metis", revision_time())
}

pub fn tagged_revision(deleted: bool) -> Revision {
    let mut revision = Revision::new("published", "metis", revision_time());
    revision.deleted = deleted;
    revision
}

/// A representation of `cloud_id` with `files` files and the given revisions
pub fn representation(cloud_id: &str, files: usize, revisions: Vec<Revision>) -> Representation {
    Representation {
        cloud_id: cloud_id.to_string(),
        representation_name: REPRESENTATION.to_string(),
        version: format!("{cloud_id}-v1"),
        uri: format!("https://store.example/mcs/records/{cloud_id}/representations/{REPRESENTATION}/versions/v1"),
        data_provider: Some(PROVIDER.to_string()),
        files: (0..files)
            .map(|i| File {
                file_name: format!("f{i}.xml"),
                mime_type: Some("text/xml".to_string()),
                content_uri: format!("https://store.example/mcs/records/{cloud_id}/files/f{i}.xml"),
            })
            .collect(),
        revisions,
    }
}

/// Dataset task scanning the tagged revision
pub fn revision_task(task_id: i64) -> Task {
    use dps_common::types::{params, InputDataType};

    Task::new(task_id, "revision scan")
        .with_parameter(params::REPRESENTATION_NAME, REPRESENTATION)
        .with_parameter(params::REVISION_NAME, "published")
        .with_parameter(params::REVISION_PROVIDER, "metis")
        .with_parameter(params::REVISION_TIMESTAMP, "2024-03-01T12:00:00Z")
        .with_input(InputDataType::DatasetUrls, vec![dataset_url()])
}

/// Every in-memory collaborator of one submission, wired together
pub struct Harness {
    pub store: Arc<InMemoryRepresentationStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub queue: Arc<InMemoryRecordQueue>,
    pub infos: Arc<InMemoryTaskInfoStore>,
    pub shutdown: CancellationToken,
    pub checker: Arc<TaskStatusChecker>,
    pub updater: TaskStatusUpdater,
    pub submitter: Arc<RecordSubmitService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(InMemoryRepresentationStore::new())
    }

    pub fn with_store(store: InMemoryRepresentationStore) -> Self {
        init_tracing();
        let store = Arc::new(store);
        let ledger = Arc::new(InMemoryLedger::new());
        let queue = Arc::new(InMemoryRecordQueue::new());
        let infos = Arc::new(InMemoryTaskInfoStore::new());
        let shutdown = CancellationToken::new();
        let checker = Arc::new(
            TaskStatusChecker::new(infos.clone(), shutdown.clone()).with_check_interval(Duration::ZERO),
        );
        let updater = TaskStatusUpdater::new(infos.clone());
        let submitter = Arc::new(RecordSubmitService::new(ledger.clone(), queue.clone()));

        Self {
            store,
            ledger,
            queue,
            infos,
            shutdown,
            checker,
            updater,
            submitter,
        }
    }

    pub fn reader(&self) -> StoreReader {
        StoreReader::new(self.store.clone()).with_retry(3, Duration::from_millis(1))
    }

    /// Small pool and batches so paging and fan-out are exercised
    pub fn engine(&self) -> DispatchEngine {
        DispatchEngine::new(
            self.reader(),
            Arc::clone(&self.submitter),
            Arc::clone(&self.checker),
            self.updater.clone(),
        )
        .with_settings(DispatchConfig {
            worker_count: 2,
            max_batch_size: 2,
            ..DispatchConfig::default()
        })
    }

    pub fn topics(&self) -> Arc<RoundRobinTopicSelector> {
        Arc::new(RoundRobinTopicSelector::new(&TopicsConfig::defaults()))
    }

    /// Context for `task` with its submission metadata already stored
    pub async fn context(&self, task: Task, topology_name: &str, restart: bool) -> Arc<SubmitContext> {
        let ctx = SubmitContext::new(task, topology_name)
            .with_topic(TOPIC)
            .with_restart(restart);
        self.updater.update_submission_metadata(&ctx).await.unwrap();
        Arc::new(ctx)
    }

    pub async fn validation_context(&self, task: Task) -> Arc<SubmitContext> {
        self.context(task, topologies::VALIDATION, false).await
    }

    pub async fn task_info(&self, task_id: i64) -> TaskInfo {
        self.infos.find(task_id).await.unwrap().expect("task info")
    }

    pub async fn state(&self, task_id: i64) -> TaskState {
        self.task_info(task_id).await.state
    }
}
