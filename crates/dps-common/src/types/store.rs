//! Remote store model: representations, their files and revisions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named content version of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Representation {
    pub cloud_id: String,
    pub representation_name: String,
    pub version: String,

    /// Addressable URI of this representation version
    pub uri: String,

    #[serde(default)]
    pub data_provider: Option<String>,

    #[serde(default)]
    pub files: Vec<File>,

    #[serde(default)]
    pub revisions: Vec<Revision>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    pub file_name: String,

    #[serde(default)]
    pub mime_type: Option<String>,

    pub content_uri: String,
}

/// Tag placed on a representation version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub revision_name: String,
    pub revision_provider_id: String,
    pub creation_time_stamp: DateTime<Utc>,

    #[serde(default)]
    pub acceptance: bool,

    #[serde(default)]
    pub published: bool,

    /// The tagged version withdraws the representation
    #[serde(default)]
    pub deleted: bool,
}

impl Revision {
    pub fn new(name: impl Into<String>, provider: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            revision_name: name.into(),
            revision_provider_id: provider.into(),
            creation_time_stamp: created,
            acceptance: false,
            published: false,
            deleted: false,
        }
    }
}

/// Cloud id carrying a given revision tag, as listed by a revision scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudTagsResponse {
    pub cloud_id: String,

    #[serde(default)]
    pub published: bool,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default)]
    pub acceptance: bool,
}

impl CloudTagsResponse {
    pub fn new(cloud_id: impl Into<String>) -> Self {
        Self {
            cloud_id: cloud_id.into(),
            published: false,
            deleted: false,
            acceptance: false,
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSlice<T> {
    /// Continuation token, absent on the last page
    #[serde(default)]
    pub next_slice: Option<String>,

    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> ResultSlice<T> {
    pub fn new(results: Vec<T>, next_slice: Option<String>) -> Self {
        Self {
            next_slice,
            results,
        }
    }

    pub fn last(results: Vec<T>) -> Self {
        Self::new(results, None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_result_slice_from_store_json() {
        let json = r#"{
            "nextSlice": "token-2",
            "results": [
                { "cloudId": "A1", "deleted": true },
                { "cloudId": "B2", "published": true }
            ]
        }"#;
        let slice: ResultSlice<CloudTagsResponse> = serde_json::from_str(json).unwrap();
        assert_eq!(slice.next_slice.as_deref(), Some("token-2"));
        assert!(slice.results[0].deleted);
        assert!(!slice.results[1].deleted);

        let last: ResultSlice<CloudTagsResponse> = serde_json::from_str("{}").unwrap();
        assert!(last.next_slice.is_none());
        assert!(last.results.is_empty());
    }

    #[test]
    fn test_representation_from_store_json() {
        let created = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let json = serde_json::json!({
            "cloudId": "C",
            "representationName": "edm",
            "version": "v1",
            "uri": "http://mcs/records/C/representations/edm/versions/v1",
            "files": [{ "fileName": "f1", "contentUri": "http://mcs/f1" }],
            "revisions": [{
                "revisionName": "published",
                "revisionProviderId": "metis",
                "creationTimeStamp": "2024-01-01T00:00:00Z",
                "deleted": true
            }]
        });
        let representation: Representation = serde_json::from_value(json).unwrap();
        let revision = &representation.revisions[0];
        assert!(revision.deleted);
        assert_eq!(revision.creation_time_stamp, created);
        assert_eq!(representation.files[0].mime_type, None);
    }
}
