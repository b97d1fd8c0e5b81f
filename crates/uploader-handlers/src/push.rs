//! The event ingestion dispatcher.
//!
//! Validates the envelope, enforces authorization, resolves the dataset,
//! and routes to the synchronous (locked) path or the asynchronous (queued)
//! one depending on the requested API version.

use chrono::Utc;
use tracing::{info, warn};

use uploader_core::{
    dataset_prefix, dataset_resource, parse_push_request, storage_url, EditionId,
    RequestEnvelope, Response, SourceType, Stage, StatusTrace, UploadError, MAX_EVENT_BODY_BYTES,
    WRITE_SCOPE,
};

use crate::events::handle_events;
use crate::registry::Registry;

/// Check the caller's token against the dataset resource. Returns the token
/// for downstream calls; `None` when auth is disabled and no header came in.
pub(crate) async fn authorize(
    registry: &Registry,
    request: &RequestEnvelope,
    dataset_id: &str,
) -> Result<Option<String>, UploadError> {
    if !registry.config.enable_auth {
        return Ok(request.bearer_token().map(String::from));
    }
    let token = request.bearer_token().ok_or(UploadError::Unauthorized)?;
    let has_access = registry
        .authorizer
        .has_access(token, WRITE_SCOPE, &dataset_resource(dataset_id))
        .await?;
    info!(has_access, "authorization checked");
    if !has_access {
        return Err(UploadError::Unauthorized);
    }
    Ok(Some(token.to_string()))
}

/// Handle a push-events request end to end, mapping every failure onto the
/// response taxonomy.
pub async fn push_dataset_events(registry: &Registry, request: &RequestEnvelope) -> Response {
    match push_inner(registry, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, status = e.status(), "push_dataset_events failed");
            Response::from(e)
        }
    }
}

async fn push_inner(
    registry: &Registry,
    request: &RequestEnvelope,
) -> Result<Response, UploadError> {
    let body = parse_push_request(&request.body)?;
    info!(
        dataset_id = %body.dataset_id,
        dataset_version = %body.version,
        event_count = body.events.len(),
        "received dataset events"
    );

    let token = authorize(registry, request, &body.dataset_id).await?;

    let dataset = registry.metadata.dataset(&body.dataset_id).await?;
    dataset.validate_source_type(SourceType::Event)?;

    let latest = EditionId::latest(&body.dataset_id, &body.version);
    let source_prefix = dataset_prefix(&dataset, &latest, Stage::Processed);
    info!(source_s3_path = %storage_url(registry.store.bucket(), &source_prefix), "resolved source path");

    if body.api_version == Some(2) {
        if request.body.len() >= MAX_EVENT_BODY_BYTES {
            return Err(UploadError::PayloadTooLarge);
        }
        let mut trace = StatusTrace::new(&body.dataset_id, &body.version, "push");
        trace.user = request.principal_id.clone();
        trace.start_time = Some(Utc::now().to_rfc3339());
        let trace_id = registry.status.create_trace(&trace).await?;

        // The queue group serializes writes per dataset; handling continues
        // in the queue consumer.
        registry
            .queue
            .send(
                &format!("data-uploader-{}", body.dataset_id),
                &request.body,
                &trace_id,
            )
            .await?;
        info!(trace_id = %trace_id, "events enqueued");
        return Ok(Response::json(
            200,
            &serde_json::json!({ "trace_id": trace_id }),
        ));
    }

    let edition_id = registry
        .lock
        .with_lock(&body.dataset_id, || {
            handle_events(
                registry,
                &dataset,
                &body.version,
                &body.merge_on,
                &body.events,
                token.as_deref(),
            )
        })
        .await?;

    Ok(Response::json(
        201,
        &serde_json::json!({ "editionId": edition_id }),
    ))
}
