//! End-to-end tests for the presigned-upload handler.

mod support;

use support::{body_json, dataset, envelope, harness, harness_with};
use uploader_core::{AccessRights, MetadataApi, SourceType};
use uploader_handlers::generate_signed_post;

#[tokio::test]
async fn issues_a_signed_post_for_a_known_edition() {
    let harness = harness();
    harness
        .metadata
        .put_dataset(dataset("ds1", AccessRights::Public, SourceType::File))
        .await;
    let edition_id = harness
        .metadata
        .create_edition(None, "ds1", "1")
        .await
        .unwrap();

    let body = format!(r#"{{"editionId": "{edition_id}", "filename": "datastuff.txt"}}"#);
    let response = generate_signed_post(&harness.registry, &envelope(&body)).await;
    assert_eq!(response.status_code, 200);

    let payload = body_json(&response);
    let edition_part = edition_id.split('/').nth(2).unwrap();
    assert_eq!(
        payload["fields"]["key"],
        format!("raw/green/ds1/version=1/edition={edition_part}/datastuff.txt")
    );
    assert_eq!(payload["fields"]["acl"], "private");
    assert!(payload["url"].as_str().unwrap().contains("testbucket"));

    // A status trace was recorded for the upload.
    let traces = harness.status.traces().await;
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0].operation, "upload");
    assert_eq!(traces[0].domain_id, "ds1/1");
    assert_eq!(traces[0].user.as_deref(), Some("test-user"));
    assert!(traces[0]
        .s3_path
        .as_deref()
        .unwrap()
        .starts_with("s3://testbucket/raw/green/ds1/"));
    assert_eq!(payload["trace_id"], traces[0].trace_id.as_str());
}

#[tokio::test]
async fn missing_edition_is_auto_created_when_the_version_validates() {
    let harness = harness();
    harness
        .metadata
        .put_dataset(dataset("ds1", AccessRights::Restricted, SourceType::File))
        .await;

    let response = generate_signed_post(
        &harness.registry,
        &envelope(r#"{"editionId": "ds1/1", "filename": "f.csv"}"#),
    )
    .await;
    assert_eq!(response.status_code, 200);
    let key = body_json(&response)["fields"]["key"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(key.starts_with("raw/yellow/ds1/version=1/edition="));
    assert!(key.ends_with("/f.csv"));
}

#[tokio::test]
async fn unknown_version_is_an_incorrect_edition() {
    let harness = harness();
    harness
        .metadata
        .put_dataset(dataset("ds1", AccessRights::Public, SourceType::File))
        .await;

    let response = generate_signed_post(
        &harness.registry,
        &envelope(r#"{"editionId": "ds1/9", "filename": "f.csv"}"#),
    )
    .await;
    assert_eq!(response.status_code, 400);
    assert_eq!(body_json(&response)["message"], "Incorrect dataset edition");
}

#[tokio::test]
async fn unknown_edition_is_an_incorrect_edition() {
    let harness = harness();
    harness
        .metadata
        .put_dataset(dataset("ds1", AccessRights::Public, SourceType::File))
        .await;

    let response = generate_signed_post(
        &harness.registry,
        &envelope(r#"{"editionId": "ds1/1/20990101T000000", "filename": "f.csv"}"#),
    )
    .await;
    assert_eq!(response.status_code, 400);
    assert_eq!(body_json(&response)["message"], "Incorrect dataset edition");
}

#[tokio::test]
async fn malformed_edition_ids_are_a_422() {
    let harness = harness();
    for edition_id in ["ds1", "ds1/1/e1/extra", "/1/e1"] {
        let body = format!(r#"{{"editionId": "{edition_id}", "filename": "f.csv"}}"#);
        let response = generate_signed_post(&harness.registry, &envelope(&body)).await;
        assert_eq!(response.status_code, 422, "{edition_id}");
        assert_eq!(
            body_json(&response)["message"],
            "Invalid dataset edition format",
            "{edition_id}"
        );
    }
}

#[tokio::test]
async fn event_typed_datasets_are_rejected() {
    let harness = harness();
    harness
        .metadata
        .put_dataset(dataset("ds1", AccessRights::Public, SourceType::Event))
        .await;
    let edition_id = harness
        .metadata
        .create_edition(None, "ds1", "1")
        .await
        .unwrap();

    let body = format!(r#"{{"editionId": "{edition_id}", "filename": "f.csv"}}"#);
    let response = generate_signed_post(&harness.registry, &envelope(&body)).await;
    assert_eq!(response.status_code, 400);
    assert!(body_json(&response)["message"]
        .as_str()
        .unwrap()
        .contains("Must be source.type='file'"));
}

#[tokio::test]
async fn denied_access_is_forbidden() {
    let harness = harness_with(true, false);
    harness
        .metadata
        .put_dataset(dataset("ds1", AccessRights::Public, SourceType::File))
        .await;

    let response = generate_signed_post(
        &harness.registry,
        &envelope(r#"{"editionId": "ds1/1/e1", "filename": "f.csv"}"#),
    )
    .await;
    assert_eq!(response.status_code, 403);
}

#[tokio::test]
async fn edition_conflict_is_a_409() {
    let harness = harness();
    harness
        .metadata
        .put_dataset(dataset("ds1", AccessRights::Public, SourceType::File))
        .await;
    harness.metadata.set_edition_conflict(true);

    let response = generate_signed_post(
        &harness.registry,
        &envelope(r#"{"editionId": "ds1/1", "filename": "f.csv"}"#),
    )
    .await;
    assert_eq!(response.status_code, 409);
    assert_eq!(
        body_json(&response)["message"],
        "Could not create data as resource already exists"
    );
}
