//! Per-topology submission strategies
//!
//! Each topology maps to exactly one [`SubmitterKind`] through a static
//! table. Unknown topology names are rejected up front.

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::SubmitContext;
use crate::error::{Result, SubmitError};

pub(crate) mod archive;
mod dataset;
mod depublication;
mod harvest;
mod repository;

pub use dataset::DatasetSubmitter;
pub use depublication::{DepublicationSubmitter, RecordIndex};
pub use harvest::{HarvestSubmitter, EMPTY_HARVEST};
pub use repository::{RepositoryArchiveSubmitter, RESTART_UNSUPPORTED};

/// Names of the processing topologies tasks can be submitted to
pub mod topologies {
    pub const OAI: &str = "oai_topology";
    pub const HTTP: &str = "http_topology";
    pub const DEPUBLICATION: &str = "depublication_topology";
    pub const VALIDATION: &str = "validation_topology";
    pub const XSLT: &str = "xslt_topology";
    pub const NORMALIZATION: &str = "normalization_topology";
    pub const ENRICHMENT: &str = "enrichment_topology";
    pub const MEDIA: &str = "media_topology";
    pub const INDEXING: &str = "indexing_topology";
    pub const LINKCHECK: &str = "linkcheck_topology";

    pub const ALL: &[&str] = &[
        OAI,
        HTTP,
        DEPUBLICATION,
        VALIDATION,
        XSLT,
        NORMALIZATION,
        ENRICHMENT,
        MEDIA,
        INDEXING,
        LINKCHECK,
    ];
}

#[async_trait]
pub trait TaskSubmitter: Send + Sync {
    /// Enumerate and dispatch the task's records, recording the final state
    async fn submit(&self, ctx: Arc<SubmitContext>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitterKind {
    /// Records come from an external OAI-PMH harvest
    Harvest,
    /// Files of a downloaded repository archive
    RepositoryArchive,
    Depublication,
    /// Explicit files or datasets of the representation store
    Dataset,
}

const SUBMITTERS: &[(&str, SubmitterKind)] = &[
    (topologies::OAI, SubmitterKind::Harvest),
    (topologies::HTTP, SubmitterKind::RepositoryArchive),
    (topologies::DEPUBLICATION, SubmitterKind::Depublication),
    (topologies::VALIDATION, SubmitterKind::Dataset),
    (topologies::XSLT, SubmitterKind::Dataset),
    (topologies::NORMALIZATION, SubmitterKind::Dataset),
    (topologies::ENRICHMENT, SubmitterKind::Dataset),
    (topologies::MEDIA, SubmitterKind::Dataset),
    (topologies::INDEXING, SubmitterKind::Dataset),
    (topologies::LINKCHECK, SubmitterKind::Dataset),
];

impl SubmitterKind {
    pub fn for_topology(topology_name: &str) -> Result<Self> {
        SUBMITTERS
            .iter()
            .find(|(name, _)| *name == topology_name)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| SubmitError::UnknownTopology(topology_name.to_string()))
    }
}

/// Holds one submitter per kind
pub struct TaskSubmitterSelector {
    harvest: Arc<dyn TaskSubmitter>,
    repository_archive: Arc<dyn TaskSubmitter>,
    depublication: Arc<dyn TaskSubmitter>,
    dataset: Arc<dyn TaskSubmitter>,
}

impl TaskSubmitterSelector {
    pub fn new(
        harvest: Arc<dyn TaskSubmitter>,
        repository_archive: Arc<dyn TaskSubmitter>,
        depublication: Arc<dyn TaskSubmitter>,
        dataset: Arc<dyn TaskSubmitter>,
    ) -> Self {
        Self {
            harvest,
            repository_archive,
            depublication,
            dataset,
        }
    }

    pub fn select(&self, topology_name: &str) -> Result<Arc<dyn TaskSubmitter>> {
        let submitter = match SubmitterKind::for_topology(topology_name)? {
            SubmitterKind::Harvest => &self.harvest,
            SubmitterKind::RepositoryArchive => &self.repository_archive,
            SubmitterKind::Depublication => &self.depublication,
            SubmitterKind::Dataset => &self.dataset,
        };
        Ok(Arc::clone(submitter))
    }
}
