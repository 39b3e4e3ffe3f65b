//! HTTP client for the remote representation store

use anyhow::Context;
use async_trait::async_trait;
use chrono::SecondsFormat;
use dps_common::types::{CloudTagsResponse, DataSetRef, Representation, ResultSlice, RevisionSelector};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{RepresentationStore, StoreError};
use crate::config::StoreConfig;

pub struct HttpRepresentationStore {
    client: Client,
    base_url: Url,
    credentials: Option<(String, String)>,
}

impl HttpRepresentationStore {
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("dps-submit/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build store HTTP client")?;

        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid store URL: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Store URL cannot be used as a base: {}", config.base_url);
        }

        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, StoreError> {
        debug!(%url, "GET");
        let mut request = self.client.get(url).query(query);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

fn timestamp(revision: &RevisionSelector) -> String {
    revision
        .timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl RepresentationStore for HttpRepresentationStore {
    async fn revision_tagged_page(
        &self,
        dataset: &DataSetRef,
        representation_name: &str,
        revision: &RevisionSelector,
        start_from: Option<&str>,
    ) -> Result<ResultSlice<CloudTagsResponse>, StoreError> {
        let url = self.endpoint(&[
            "data-providers",
            &dataset.provider_id,
            "data-sets",
            &dataset.dataset_id,
            "representations",
            representation_name,
            "revisions",
            &revision.name,
            "revisionProvider",
            &revision.provider,
        ]);
        let mut query = vec![("revisionTimestamp", timestamp(revision))];
        if let Some(token) = start_from {
            query.push(("startFrom", token.to_string()));
        }
        self.get_json(url, &query).await
    }

    async fn representations_for_revision(
        &self,
        cloud_id: &str,
        representation_name: &str,
        revision: &RevisionSelector,
    ) -> Result<Vec<Representation>, StoreError> {
        let url = self.endpoint(&[
            "records",
            cloud_id,
            "representations",
            representation_name,
            "revisions",
            &revision.name,
        ]);
        let query = [
            ("revisionProviderId", revision.provider.clone()),
            ("revisionTimestamp", timestamp(revision)),
        ];
        self.get_json(url, &query).await
    }

    async fn dataset_representations_page(
        &self,
        dataset: &DataSetRef,
        start_from: Option<&str>,
    ) -> Result<ResultSlice<Representation>, StoreError> {
        let url = self.endpoint(&[
            "data-providers",
            &dataset.provider_id,
            "data-sets",
            &dataset.dataset_id,
        ]);
        let query: Vec<(&str, String)> = start_from
            .map(|token| ("startFrom", token.to_string()))
            .into_iter()
            .collect();
        self.get_json(url, &query).await
    }
}
