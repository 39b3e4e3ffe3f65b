//! In-memory representation store for tests and local runs

use async_trait::async_trait;
use dps_common::types::{CloudTagsResponse, DataSetRef, Representation, ResultSlice, RevisionSelector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::{RepresentationStore, StoreError};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Serves fixed datasets with offset-based continuation tokens.
///
/// `fail_next(n)` makes the next `n` calls fail with a transient error.
pub struct InMemoryRepresentationStore {
    datasets: HashMap<DataSetRef, Vec<Representation>>,
    page_size: usize,
    pending_failures: AtomicU32,
    calls: AtomicU64,
}

impl InMemoryRepresentationStore {
    pub fn new() -> Self {
        Self {
            datasets: HashMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
            pending_failures: AtomicU32::new(0),
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_representation(mut self, dataset: &DataSetRef, representation: Representation) -> Self {
        self.datasets
            .entry(dataset.clone())
            .or_default()
            .push(representation);
        self
    }

    pub fn fail_next(&self, failures: u32) {
        self.pending_failures.store(failures, Ordering::SeqCst);
    }

    /// Calls served so far, failed ones included
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn page<T: Clone>(&self, items: &[T], start_from: Option<&str>) -> Result<ResultSlice<T>, StoreError> {
        let offset = match start_from {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StoreError::Decode(format!("bad continuation token {token}")))?,
            None => 0,
        };
        let end = (offset + self.page_size).min(items.len());
        let results = items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
        let next_slice = (end < items.len()).then(|| end.to_string());
        Ok(ResultSlice::new(results, next_slice))
    }

    fn tagged<'a>(
        &'a self,
        dataset: &DataSetRef,
        representation_name: &'a str,
        revision: &'a RevisionSelector,
    ) -> impl Iterator<Item = &'a Representation> + 'a {
        self.datasets
            .get(dataset)
            .into_iter()
            .flatten()
            .filter(move |r| {
                r.representation_name == representation_name
                    && r.revisions.iter().any(|rev| revision.identifies(rev))
            })
    }
}

impl Default for InMemoryRepresentationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepresentationStore for InMemoryRepresentationStore {
    async fn revision_tagged_page(
        &self,
        dataset: &DataSetRef,
        representation_name: &str,
        revision: &RevisionSelector,
        start_from: Option<&str>,
    ) -> Result<ResultSlice<CloudTagsResponse>, StoreError> {
        self.enter()?;
        let mut tags: Vec<CloudTagsResponse> = Vec::new();
        for representation in self.tagged(dataset, representation_name, revision) {
            if tags.iter().any(|t| t.cloud_id == representation.cloud_id) {
                continue;
            }
            let mut tag = CloudTagsResponse::new(&representation.cloud_id);
            tag.deleted = representation
                .revisions
                .iter()
                .any(|rev| revision.identifies(rev) && rev.deleted);
            tags.push(tag);
        }
        self.page(&tags, start_from)
    }

    async fn representations_for_revision(
        &self,
        cloud_id: &str,
        representation_name: &str,
        revision: &RevisionSelector,
    ) -> Result<Vec<Representation>, StoreError> {
        self.enter()?;
        Ok(self
            .datasets
            .values()
            .flatten()
            .filter(|r| {
                r.cloud_id == cloud_id
                    && r.representation_name == representation_name
                    && r.revisions.iter().any(|rev| revision.identifies(rev))
            })
            .cloned()
            .collect())
    }

    async fn dataset_representations_page(
        &self,
        dataset: &DataSetRef,
        start_from: Option<&str>,
    ) -> Result<ResultSlice<Representation>, StoreError> {
        self.enter()?;
        let representations = self.datasets.get(dataset).map(Vec::as_slice).unwrap_or(&[]);
        self.page(representations, start_from)
    }
}
