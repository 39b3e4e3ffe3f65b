//! OAI-PMH identifier harvester
//!
//! Pages through `ListIdentifiers` following resumption tokens and submits
//! one record per header through the ledger.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dps_common::types::{DpsRecord, TaskState};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Harvest, HarvestResult, Harvester};
use crate::config::{StoreConfig, DEFAULT_STORE_MAX_ATTEMPTS, DEFAULT_STORE_RETRY_DELAY_MS};
use crate::context::SubmitContext;
use crate::error::{Result, SubmitError};
use crate::ledger::RecordSubmitService;
use crate::reader::StoreError;
use crate::status::TaskStatusChecker;

/// Error code of an empty, but valid, result set
const NO_RECORDS_MATCH: &str = "noRecordsMatch";

#[derive(Debug, Deserialize)]
struct OaiPmh {
    #[serde(rename = "ListIdentifiers", default)]
    list_identifiers: Option<ListIdentifiers>,
    #[serde(rename = "error", default)]
    errors: Vec<OaiError>,
}

#[derive(Debug, Deserialize)]
struct ListIdentifiers {
    #[serde(rename = "header", default)]
    headers: Vec<Header>,
    #[serde(rename = "resumptionToken", default)]
    resumption_token: Option<ResumptionToken>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(rename = "@status", default)]
    status: Option<String>,
    identifier: String,
}

impl Header {
    fn is_deleted(&self) -> bool {
        self.status.as_deref() == Some("deleted")
    }
}

#[derive(Debug, Deserialize)]
struct ResumptionToken {
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaiError {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "$text", default)]
    message: Option<String>,
}

/// One parsed `ListIdentifiers` response
#[derive(Debug, Default)]
struct IdentifierPage {
    headers: Vec<Header>,
    resumption_token: Option<String>,
}

impl IdentifierPage {
    fn parse(body: &str) -> Result<Self> {
        let response: OaiPmh = quick_xml::de::from_str(body)
            .map_err(|e| SubmitError::Harvest(format!("malformed OAI-PMH response: {e}")))?;

        if let Some(error) = response.errors.first() {
            if error.code == NO_RECORDS_MATCH {
                return Ok(Self::default());
            }
            return Err(SubmitError::Harvest(format!(
                "{}: {}",
                error.code,
                error.message.as_deref().unwrap_or_default().trim()
            )));
        }

        let Some(list) = response.list_identifiers else {
            return Ok(Self::default());
        };
        Ok(Self {
            headers: list.headers,
            resumption_token: list
                .resumption_token
                .and_then(|token| token.value)
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
        })
    }
}

pub struct OaiHarvester {
    client: Client,
    submitter: Arc<RecordSubmitService>,
    checker: Arc<TaskStatusChecker>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl OaiHarvester {
    pub fn new(
        client: Client,
        submitter: Arc<RecordSubmitService>,
        checker: Arc<TaskStatusChecker>,
    ) -> Self {
        Self {
            client,
            submitter,
            checker,
            max_attempts: DEFAULT_STORE_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_STORE_RETRY_DELAY_MS),
        }
    }

    /// Reuse the store's retry policy for repository requests
    pub fn with_retry_policy(mut self, store: &StoreConfig) -> Self {
        self.max_attempts = store.max_attempts.max(1);
        self.retry_delay = store.retry_delay();
        self
    }

    async fn harvest_repository(
        &self,
        harvest: &Harvest,
        ctx: &Arc<SubmitContext>,
        counter: &mut u64,
    ) -> Result<()> {
        let task_id = ctx.task_id();
        let mut token: Option<String> = None;

        loop {
            self.checker.ensure_running(task_id).await?;
            let page = self.list_identifiers(harvest, token.as_deref()).await?;
            debug!(task_id, headers = page.headers.len(), "Fetched identifier page");

            for header in page.headers {
                if harvest.sample_size.is_some_and(|cap| *counter >= cap) {
                    return Ok(());
                }
                self.checker.ensure_running(task_id).await?;

                let record = if header.is_deleted() {
                    if !harvest.is_incremental() {
                        continue;
                    }
                    DpsRecord::new(task_id, header.identifier).deleted()
                } else {
                    DpsRecord::new(task_id, header.identifier)
                };
                let record = record.with_metadata_prefix(Some(&harvest.metadata_prefix));

                if self.submitter.submit(&record, ctx).await? {
                    *counter += 1;
                }
            }

            match page.resumption_token {
                Some(next) => token = Some(next),
                None => return Ok(()),
            }
        }
    }

    async fn list_identifiers(&self, harvest: &Harvest, token: Option<&str>) -> Result<IdentifierPage> {
        let query = list_identifiers_query(harvest, token);
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.fetch(&harvest.url, &query).await {
                Ok(body) => return IdentifierPage::parse(&body),
                Err(e) if !e.is_transient() => {
                    return Err(SubmitError::Harvest(format!(
                        "{} refused ListIdentifiers: {e}",
                        harvest.url
                    )));
                },
                Err(e) => {
                    warn!(
                        url = %harvest.url,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "ListIdentifiers request failed"
                    );
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                },
            }
        }

        Err(SubmitError::Harvest(match last_error {
            Some(e) => format!("{} is unreachable: {e}", harvest.url),
            None => format!("{} was never requested", harvest.url),
        }))
    }

    /// Same failure classification as the representation store reads
    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> std::result::Result<String, StoreError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.text().await?)
    }
}

fn list_identifiers_query(harvest: &Harvest, token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("verb", "ListIdentifiers".to_string())];
    if let Some(token) = token {
        query.push(("resumptionToken", token.to_string()));
        return query;
    }

    query.push(("metadataPrefix", harvest.metadata_prefix.clone()));
    if let Some(set) = &harvest.set_spec {
        query.push(("set", set.clone()));
    }
    if let Some(from) = harvest.from {
        query.push(("from", oai_datestamp(from)));
    }
    if let Some(until) = harvest.until {
        query.push(("until", oai_datestamp(until)));
    }
    query
}

fn oai_datestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl Harvester for OaiHarvester {
    async fn harvest(&self, harvests: &[Harvest], ctx: &Arc<SubmitContext>) -> Result<HarvestResult> {
        let mut counter = 0;

        for harvest in harvests {
            info!(task_id = ctx.task_id(), url = %harvest.url, "Harvesting repository");
            match self.harvest_repository(harvest, ctx, &mut counter).await {
                Ok(()) => {},
                Err(SubmitError::Killed { .. }) => {
                    info!(task_id = ctx.task_id(), counter, "Harvest stopped by kill signal");
                    return Ok(HarvestResult {
                        counter,
                        state: TaskState::Dropped,
                    });
                },
                Err(e) => return Err(e),
            }
        }

        Ok(HarvestResult {
            counter,
            state: TaskState::Queued,
        })
    }
}
