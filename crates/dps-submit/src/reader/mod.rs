//! Remote store reader
//!
//! [`RepresentationStore`] is the raw, single-attempt boundary to the remote
//! representation store. [`StoreReader`] wraps it with the retry policy and
//! exposes the listing primitives the dispatch engine works with.

use async_trait::async_trait;
use dps_common::types::{CloudTagsResponse, DataSetRef, Representation, ResultSlice, RevisionSelector};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{DEFAULT_STORE_MAX_ATTEMPTS, DEFAULT_STORE_RETRY_DELAY_MS};
use crate::error::{Result, SubmitError};

pub mod http;
pub mod memory;

pub use http::HttpRepresentationStore;
pub use memory::InMemoryRepresentationStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Store responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(e) => !e.is_decode() && !e.is_builder(),
            StoreError::Status { status, .. } => *status >= 500 || *status == 429,
            StoreError::Unavailable(_) => true,
            StoreError::Decode(_) => false,
        }
    }
}

/// Single-attempt access to the remote representation store
#[async_trait]
pub trait RepresentationStore: Send + Sync {
    /// One page of cloud ids whose `representation_name` carries `revision`
    async fn revision_tagged_page(
        &self,
        dataset: &DataSetRef,
        representation_name: &str,
        revision: &RevisionSelector,
        start_from: Option<&str>,
    ) -> std::result::Result<ResultSlice<CloudTagsResponse>, StoreError>;

    /// Representations of `cloud_id` tagged with `revision`
    async fn representations_for_revision(
        &self,
        cloud_id: &str,
        representation_name: &str,
        revision: &RevisionSelector,
    ) -> std::result::Result<Vec<Representation>, StoreError>;

    /// One page of every representation in a dataset
    async fn dataset_representations_page(
        &self,
        dataset: &DataSetRef,
        start_from: Option<&str>,
    ) -> std::result::Result<ResultSlice<Representation>, StoreError>;
}

/// Retrying, read-only reader over a [`RepresentationStore`]
#[derive(Clone)]
pub struct StoreReader {
    store: Arc<dyn RepresentationStore>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl StoreReader {
    pub fn new(store: Arc<dyn RepresentationStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_STORE_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_STORE_RETRY_DELAY_MS),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Returns the continuation token for the next page and this page's cloud ids
    pub async fn scan_revision_tagged(
        &self,
        dataset: &DataSetRef,
        representation_name: &str,
        revision: &RevisionSelector,
        page_token: Option<&str>,
    ) -> Result<(Option<String>, Vec<CloudTagsResponse>)> {
        let slice = self
            .with_retries("list revision tagged cloud ids", || {
                self.store
                    .revision_tagged_page(dataset, representation_name, revision, page_token)
            })
            .await?;
        Ok((slice.next_slice, slice.results))
    }

    pub async fn representations_for_revision(
        &self,
        representation_name: &str,
        revision: &RevisionSelector,
        cloud_id: &str,
    ) -> Result<Vec<Representation>> {
        self.with_retries("fetch representations for revision", || {
            self.store
                .representations_for_revision(cloud_id, representation_name, revision)
        })
        .await
    }

    /// Lazy walk over every representation of a dataset. Single pass only.
    pub fn entire_dataset_iterator(&self, dataset: &DataSetRef) -> RepresentationIterator {
        RepresentationIterator {
            reader: self.clone(),
            dataset: dataset.clone(),
            buffer: VecDeque::new(),
            next_slice: None,
            exhausted: false,
        }
    }

    pub fn close(self) {
        debug!("Closing store reader");
    }

    async fn with_retries<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => {
                    return Err(SubmitError::StoreRead {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                },
                Err(e) => {
                    if attempt < self.max_attempts {
                        warn!(
                            operation,
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %e,
                            "Store read failed, retrying"
                        );
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                    last_error = Some(e);
                },
            }
        }

        Err(SubmitError::StoreRead {
            operation: operation.to_string(),
            attempts: self.max_attempts,
            source: last_error
                .unwrap_or_else(|| StoreError::Unavailable("no attempt was made".to_string())),
        })
    }
}

/// Forward-only sequence of a dataset's representations.
///
/// Pages are fetched on demand. Once exhausted it stays exhausted; start a
/// new pass with [`StoreReader::entire_dataset_iterator`].
pub struct RepresentationIterator {
    reader: StoreReader,
    dataset: DataSetRef,
    buffer: VecDeque<Representation>,
    next_slice: Option<String>,
    exhausted: bool,
}

impl RepresentationIterator {
    pub async fn try_next(&mut self) -> Result<Option<Representation>> {
        loop {
            if let Some(representation) = self.buffer.pop_front() {
                return Ok(Some(representation));
            }
            if self.exhausted {
                return Ok(None);
            }

            let slice = self
                .reader
                .with_retries("list dataset representations", || {
                    self.reader
                        .store
                        .dataset_representations_page(&self.dataset, self.next_slice.as_deref())
                })
                .await?;

            self.next_slice = slice.next_slice;
            self.exhausted = self.next_slice.is_none();
            self.buffer.extend(slice.results);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dps_common::types::{File, Revision};

    fn representation(cloud_id: &str, files: usize, revision: Option<&RevisionSelector>) -> Representation {
        Representation {
            cloud_id: cloud_id.to_string(),
            representation_name: "edm".to_string(),
            version: "v1".to_string(),
            uri: format!("http://mcs/records/{cloud_id}/representations/edm/versions/v1"),
            data_provider: Some("prov".to_string()),
            files: (0..files)
                .map(|i| File {
                    file_name: format!("f{i}"),
                    mime_type: None,
                    content_uri: format!("http://mcs/records/{cloud_id}/files/f{i}"),
                })
                .collect(),
            revisions: revision
                .map(|r| vec![Revision::new(&r.name, &r.provider, r.timestamp)])
                .unwrap_or_default(),
        }
    }

    fn reader(store: InMemoryRepresentationStore) -> StoreReader {
        StoreReader::new(Arc::new(store)).with_retry(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dataset = DataSetRef::new("prov", "ds");
        let store = InMemoryRepresentationStore::new()
            .with_representation(&dataset, representation("A", 1, None));
        store.fail_next(2);
        let reader = reader(store);

        let mut iter = reader.entire_dataset_iterator(&dataset);
        let first = iter.try_next().await.unwrap().unwrap();
        assert_eq!(first.cloud_id, "A");
        assert!(iter.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_fails_after_max_attempts() {
        let dataset = DataSetRef::new("prov", "ds");
        let store = InMemoryRepresentationStore::new();
        store.fail_next(3);
        let reader = reader(store);

        let err = reader
            .entire_dataset_iterator(&dataset)
            .try_next()
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::StoreRead { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_retries_three_times() {
        let dataset = DataSetRef::new("prov", "ds");
        let store = Arc::new(
            InMemoryRepresentationStore::new().with_representation(&dataset, representation("A", 1, None)),
        );
        let reader = StoreReader::new(store.clone());

        store.fail_next(3);
        let mut iter = reader.entire_dataset_iterator(&dataset);
        assert_eq!(iter.try_next().await.unwrap().unwrap().cloud_id, "A");
        assert_eq!(store.calls(), 4);

        store.fail_next(4);
        let err = reader
            .entire_dataset_iterator(&dataset)
            .try_next()
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::StoreRead { attempts: 4, .. }));
        assert_eq!(store.calls(), 8);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let reader = reader(InMemoryRepresentationStore::new());

        let err = reader
            .with_retries("probe", || {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async {
                    Err::<(), _>(StoreError::Status {
                        status: 404,
                        body: "no such dataset".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::StoreRead { attempts: 1, .. }));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_iterator_walks_every_page_once() {
        let dataset = DataSetRef::new("prov", "ds");
        let mut store = InMemoryRepresentationStore::new().with_page_size(2);
        for id in ["A", "B", "C", "D", "E"] {
            store = store.with_representation(&dataset, representation(id, 1, None));
        }
        let reader = reader(store);

        let mut iter = reader.entire_dataset_iterator(&dataset);
        let mut seen = Vec::new();
        while let Some(representation) = iter.try_next().await.unwrap() {
            seen.push(representation.cloud_id);
        }
        assert_eq!(seen, vec!["A", "B", "C", "D", "E"]);
        assert!(iter.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revision_scan_pages_with_token() {
        let dataset = DataSetRef::new("prov", "ds");
        let revision = RevisionSelector::new(
            "published",
            "metis",
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        );
        let store = InMemoryRepresentationStore::new()
            .with_page_size(2)
            .with_representation(&dataset, representation("A", 1, Some(&revision)))
            .with_representation(&dataset, representation("B", 1, None))
            .with_representation(&dataset, representation("C", 1, Some(&revision)))
            .with_representation(&dataset, representation("D", 1, Some(&revision)));
        let reader = reader(store);

        let (token, first) = reader
            .scan_revision_tagged(&dataset, "edm", &revision, None)
            .await
            .unwrap();
        assert_eq!(first.iter().map(|t| t.cloud_id.as_str()).collect::<Vec<_>>(), vec!["A", "C"]);

        let (token, second) = reader
            .scan_revision_tagged(&dataset, "edm", &revision, token.as_deref())
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert!(token.is_none());
    }
}
