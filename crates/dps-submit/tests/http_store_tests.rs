//! Representation store client against a wiremock server

use dps_common::types::{DataSetRef, RevisionSelector};
use dps_submit::config::StoreConfig;
use dps_submit::reader::{HttpRepresentationStore, StoreError, StoreReader};
use dps_submit::SubmitError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::*;

fn store_config(server: &MockServer) -> StoreConfig {
    StoreConfig {
        base_url: format!("{}/mcs", server.uri()),
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
        max_attempts: 3,
        retry_delay_ms: 1,
        timeout_secs: 5,
    }
}

fn reader(server: &MockServer) -> StoreReader {
    let store = HttpRepresentationStore::new(&store_config(server)).unwrap();
    StoreReader::new(Arc::new(store)).with_retry(3, Duration::from_millis(1))
}

fn representation_json(cloud_id: &str) -> serde_json::Value {
    json!({
        "cloudId": cloud_id,
        "representationName": REPRESENTATION,
        "version": "v1",
        "uri": format!("https://store.example/mcs/records/{cloud_id}/representations/edm/versions/v1"),
        "files": [
            { "fileName": "f.xml", "mimeType": "text/xml", "contentUri": format!("https://store.example/{cloud_id}/f.xml") }
        ],
        "revisions": [
            {
                "revisionName": "published",
                "revisionProviderId": "metis",
                "creationTimeStamp": "2024-03-01T12:00:00.000Z",
                "deleted": false
            }
        ]
    })
}

#[tokio::test]
async fn test_revision_page_request() {
    let server = MockServer::start().await;
    // "admin:secret"
    Mock::given(method("GET"))
        .and(path(
            "/mcs/data-providers/provider/data-sets/dataset/representations/edm/revisions/published/revisionProvider/metis",
        ))
        .and(query_param("revisionTimestamp", "2024-03-01T12:00:00.000Z"))
        .and(query_param("startFrom", "token-1"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextSlice": "token-2",
            "results": [
                { "cloudId": "c1", "deleted": false },
                { "cloudId": "c2", "deleted": true }
            ]
        })))
        .mount(&server)
        .await;

    let (next, tags) = reader(&server)
        .scan_revision_tagged(&dataset(), REPRESENTATION, &revision_selector(), Some("token-1"))
        .await
        .unwrap();

    assert_eq!(next.as_deref(), Some("token-2"));
    assert_eq!(tags.len(), 2);
    assert!(tags[1].deleted);
}

#[tokio::test]
async fn test_representations_for_revision_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mcs/records/c1/representations/edm/revisions/published"))
        .and(query_param("revisionProviderId", "metis"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([representation_json("c1")])))
        .mount(&server)
        .await;

    let representations = reader(&server)
        .representations_for_revision(REPRESENTATION, &revision_selector(), "c1")
        .await
        .unwrap();

    assert_eq!(representations.len(), 1);
    assert_eq!(representations[0].files.len(), 1);
    assert!(revision_selector().identifies(&representations[0].revisions[0]));
}

#[tokio::test]
async fn test_dataset_iterator_follows_slices() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mcs/data-providers/provider/data-sets/dataset"))
        .and(query_param_is_missing("startFrom"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nextSlice": "2",
            "results": [representation_json("c1"), representation_json("c2")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mcs/data-providers/provider/data-sets/dataset"))
        .and(query_param("startFrom", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [representation_json("c3")]
        })))
        .mount(&server)
        .await;

    let mut iterator = reader(&server).entire_dataset_iterator(&DataSetRef::new("provider", "dataset"));
    let mut cloud_ids = Vec::new();
    while let Some(representation) = iterator.try_next().await.unwrap() {
        cloud_ids.push(representation.cloud_id);
    }

    assert_eq!(cloud_ids, vec!["c1", "c2", "c3"]);
    assert!(iterator.try_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mcs/records/c1/representations/edm/revisions/published"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mcs/records/c1/representations/edm/revisions/published"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([representation_json("c1")])))
        .mount(&server)
        .await;

    let representations = reader(&server)
        .representations_for_revision(REPRESENTATION, &revision_selector(), "c1")
        .await
        .unwrap();

    assert_eq!(representations.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_client_errors_fail_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such dataset"))
        .mount(&server)
        .await;

    let selector = RevisionSelector::new("published", "metis", revision_time());
    let err = reader(&server)
        .scan_revision_tagged(&dataset(), REPRESENTATION, &selector, None)
        .await
        .unwrap_err();

    match err {
        SubmitError::StoreRead {
            attempts,
            source: StoreError::Status { status, body },
            ..
        } => {
            assert_eq!(attempts, 1);
            assert_eq!(status, 404);
            assert_eq!(body, "no such dataset");
        },
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
