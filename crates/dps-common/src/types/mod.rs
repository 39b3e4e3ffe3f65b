//! Common types used across DPS

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DpsError, Result};

mod store;

pub use store::{CloudTagsResponse, File, Representation, ResultSlice, Revision};

/// Names of the task parameters read by the submission engine
pub mod params {
    pub const REPRESENTATION_NAME: &str = "REPRESENTATION_NAME";
    pub const REVISION_NAME: &str = "REVISION_NAME";
    pub const REVISION_PROVIDER: &str = "REVISION_PROVIDER";
    pub const REVISION_TIMESTAMP: &str = "REVISION_TIMESTAMP";
    /// Caps the number of candidates considered by revision scans and harvests
    pub const SAMPLE_SIZE: &str = "SAMPLE_SIZE";
    pub const SCHEMA_NAME: &str = "SCHEMA_NAME";
    pub const METADATA_PREFIX: &str = "METADATA_PREFIX";
    pub const SET_SPEC: &str = "SET_SPEC";
    pub const FROM: &str = "FROM";
    pub const UNTIL: &str = "UNTIL";
    pub const METIS_DATASET_ID: &str = "METIS_DATASET_ID";
    pub const RECORD_IDS_TO_DEPUBLISH: &str = "RECORD_IDS_TO_DEPUBLISH";
}

// ============================================================================
// Tasks
// ============================================================================

/// Kind of input a task carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputDataType {
    FileUrls,
    DatasetUrls,
    RepositoryUrls,
}

impl InputDataType {
    /// Lookup order when a task carries more than one kind of input
    pub const PRECEDENCE: [InputDataType; 3] = [
        InputDataType::FileUrls,
        InputDataType::DatasetUrls,
        InputDataType::RepositoryUrls,
    ];
}

/// A job description handed to one processing topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: i64,

    #[serde(default)]
    pub task_name: String,

    #[serde(default)]
    pub parameters: HashMap<String, String>,

    #[serde(default)]
    pub input_data: HashMap<InputDataType, Vec<String>>,

    /// Revision the downstream topology tags its output with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_revision: Option<Revision>,
}

impl Task {
    pub fn new(task_id: i64, task_name: impl Into<String>) -> Self {
        Self {
            task_id,
            task_name: task_name.into(),
            parameters: HashMap::new(),
            input_data: HashMap::new(),
            output_revision: None,
        }
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn with_input(mut self, kind: InputDataType, entries: Vec<String>) -> Self {
        self.input_data.insert(kind, entries);
        self
    }

    /// Parameter value, treating blank values as absent
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// The input kind that drives resolution. File lists win over datasets,
    /// datasets over repositories.
    pub fn input_kind(&self) -> Option<InputDataType> {
        InputDataType::PRECEDENCE
            .into_iter()
            .find(|kind| self.input_data.contains_key(kind))
    }

    pub fn entries(&self, kind: InputDataType) -> &[String] {
        self.input_data.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dataset_urls(&self) -> &[String] {
        self.entries(InputDataType::DatasetUrls)
    }

    pub fn representation_name(&self) -> Option<&str> {
        self.parameter(params::REPRESENTATION_NAME)
    }

    /// Schema tag attached to every dispatched record
    pub fn schema_name(&self) -> Option<&str> {
        self.parameter(params::SCHEMA_NAME)
    }

    /// Record-count cap, `None` when unbounded
    pub fn sample_size(&self) -> Result<Option<u64>> {
        self.parameter(params::SAMPLE_SIZE)
            .map(|raw| {
                raw.parse::<u64>().map_err(|e| {
                    DpsError::invalid_parameter(params::SAMPLE_SIZE, raw, e.to_string())
                })
            })
            .transpose()
    }

    /// Parse an RFC 3339 timestamp parameter
    pub fn timestamp_parameter(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        self.parameter(name)
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|e| DpsError::invalid_parameter(name, raw, e.to_string()))
            })
            .transpose()
    }

    /// Revision selector built from the revision parameters.
    ///
    /// All three of name, provider and timestamp must be present together.
    /// None of them gives `Ok(None)`, a partial set is an error.
    pub fn revision_selector(&self) -> Result<Option<RevisionSelector>> {
        let name = self.parameter(params::REVISION_NAME);
        let provider = self.parameter(params::REVISION_PROVIDER);
        let timestamp = self.timestamp_parameter(params::REVISION_TIMESTAMP)?;

        match (name, provider, timestamp) {
            (Some(name), Some(provider), Some(timestamp)) => {
                Ok(Some(RevisionSelector::new(name, provider, timestamp)))
            },
            (None, None, None) => Ok(None),
            _ => Err(DpsError::IncompleteRevision(format!(
                "{}, {} and {} must be given together",
                params::REVISION_NAME,
                params::REVISION_PROVIDER,
                params::REVISION_TIMESTAMP
            ))),
        }
    }
}

// ============================================================================
// Task lifecycle
// ============================================================================

/// Lifecycle states owned by the submission side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Accepted, inputs are being resolved into records
    Resolving,
    /// Resolution finished, expected size is final
    Queued,
    /// Single-shot variants finished sending
    Sent,
    /// Empty, invalid, failed or killed
    Dropped,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Resolving => "RESOLVING",
            TaskState::Queued => "QUEUED",
            TaskState::Sent => "SENT",
            TaskState::Dropped => "DROPPED",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = DpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RESOLVING" => Ok(TaskState::Resolving),
            "QUEUED" => Ok(TaskState::Queued),
            "SENT" => Ok(TaskState::Sent),
            "DROPPED" => Ok(TaskState::Dropped),
            other => Err(DpsError::UnknownState(other.to_string())),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One resolved work item on the dispatch queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DpsRecord {
    pub task_id: i64,
    pub record_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_prefix: Option<String>,

    #[serde(default)]
    pub marked_as_deleted: bool,
}

impl DpsRecord {
    pub fn new(task_id: i64, record_id: impl Into<String>) -> Self {
        Self {
            task_id,
            record_id: record_id.into(),
            metadata_prefix: None,
            marked_as_deleted: false,
        }
    }

    pub fn with_metadata_prefix(mut self, prefix: Option<&str>) -> Self {
        self.metadata_prefix = prefix.map(str::to_string);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.marked_as_deleted = true;
        self
    }
}

// ============================================================================
// Revisions and datasets
// ============================================================================

/// Identifies one tagged snapshot of a dataset's representations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSelector {
    pub name: String,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

impl RevisionSelector {
    pub fn new(name: impl Into<String>, provider: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            timestamp,
        }
    }

    pub fn identifies(&self, revision: &Revision) -> bool {
        revision.revision_name == self.name
            && revision.revision_provider_id == self.provider
            && revision.creation_time_stamp == self.timestamp
    }
}

impl std::fmt::Display for RevisionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.provider,
            self.name,
            self.timestamp.to_rfc3339()
        )
    }
}

/// A dataset in the remote store, addressed by provider and dataset id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSetRef {
    pub provider_id: String,
    pub dataset_id: String,
}

impl DataSetRef {
    pub fn new(provider_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            dataset_id: dataset_id.into(),
        }
    }

    /// Parse `<base>/data-providers/{provider}/data-sets/{dataset}`
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = || DpsError::MalformedDatasetUrl(raw.to_string());
        let url = url::Url::parse(raw).map_err(|_| malformed())?;
        let segments: Vec<&str> = url
            .path_segments()
            .ok_or_else(malformed)?
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [.., "data-providers", provider, "data-sets", dataset] => {
                Ok(Self::new(*provider, *dataset))
            },
            _ => Err(malformed()),
        }
    }
}

impl std::fmt::Display for DataSetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.dataset_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_urls_take_precedence() {
        let task = Task::new(1, "t")
            .with_input(InputDataType::RepositoryUrls, vec!["r".into()])
            .with_input(InputDataType::DatasetUrls, vec!["d".into()])
            .with_input(InputDataType::FileUrls, vec!["f".into()]);
        assert_eq!(task.input_kind(), Some(InputDataType::FileUrls));

        let task = Task::new(1, "t").with_input(InputDataType::RepositoryUrls, vec![]);
        assert_eq!(task.input_kind(), Some(InputDataType::RepositoryUrls));
        assert_eq!(Task::new(1, "t").input_kind(), None);
    }

    #[test]
    fn test_task_json_shape() {
        let json = r#"{
            "taskId": 42,
            "taskName": "validate",
            "parameters": { "REPRESENTATION_NAME": "edm", "SAMPLE_SIZE": "10" },
            "inputData": { "DATASET_URLS": ["http://mcs/data-providers/p/data-sets/d"] }
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.task_id, 42);
        assert_eq!(task.representation_name(), Some("edm"));
        assert_eq!(task.sample_size().unwrap(), Some(10));
        assert_eq!(task.dataset_urls().len(), 1);
    }

    #[test]
    fn test_sample_size_rejects_garbage() {
        let task = Task::new(1, "t").with_parameter(params::SAMPLE_SIZE, "ten");
        assert!(matches!(
            task.sample_size(),
            Err(DpsError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_revision_selector_needs_all_parts() {
        let task = Task::new(1, "t")
            .with_parameter(params::REVISION_NAME, "published")
            .with_parameter(params::REVISION_PROVIDER, "metis")
            .with_parameter(params::REVISION_TIMESTAMP, "2024-03-01T10:00:00Z");
        let selector = task.revision_selector().unwrap().unwrap();
        assert_eq!(selector.name, "published");
        assert_eq!(
            selector.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );

        assert!(Task::new(1, "t").revision_selector().unwrap().is_none());

        let partial = Task::new(1, "t").with_parameter(params::REVISION_NAME, "published");
        assert!(matches!(
            partial.revision_selector(),
            Err(DpsError::IncompleteRevision(_))
        ));
    }

    #[test]
    fn test_dataset_ref_parse() {
        let ds = DataSetRef::parse("https://host/mcs/data-providers/prov/data-sets/ds1").unwrap();
        assert_eq!(ds, DataSetRef::new("prov", "ds1"));

        for bad in [
            "not a url",
            "https://host/mcs/data-providers/prov",
            "https://host/mcs/data-sets/ds1",
            "https://host/mcs/data-providers/prov/data-sets/ds1/representations",
        ] {
            assert!(
                matches!(DataSetRef::parse(bad), Err(DpsError::MalformedDatasetUrl(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_task_state_round_trip_strings() {
        for state in [
            TaskState::Resolving,
            TaskState::Queued,
            TaskState::Sent,
            TaskState::Dropped,
        ] {
            assert_eq!(state.as_str().parse::<TaskState>().unwrap(), state);
        }
        assert!("PROCESSED".parse::<TaskState>().is_err());
    }

    #[test]
    fn test_record_json_is_camel_case() {
        let record = DpsRecord::new(7, "http://files/1").deleted();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["taskId"], 7);
        assert_eq!(json["markedAsDeleted"], true);
        assert!(json.get("metadataPrefix").is_none());
    }
}
