//! The event queue consumer.
//!
//! Triggered one message at a time. Authorization was verified at enqueue
//! time; the consumer re-validates the dataset and runs the same pipeline as
//! the synchronous path. Errors surface to the queue's redelivery mechanism;
//! there is no user-visible error channel on this path.

use chrono::Utc;
use tracing::info;

use uploader_core::{
    parse_push_request, QueueMessage, SourceType, StatusTrace, TraceStatus, UploadError,
};

use crate::events::handle_events;
use crate::registry::Registry;

/// Handle one message from the dataset event queue; returns the new edition
/// id.
pub async fn handle_queue_message(
    registry: &Registry,
    message: &QueueMessage,
) -> Result<String, UploadError> {
    let trace_id = message.trace_id.clone();
    info!(trace_id = ?trace_id, group_id = %message.group_id, "handling queued events");

    let body = parse_push_request(&message.body)?;
    info!(
        dataset_id = %body.dataset_id,
        dataset_version = %body.version,
        event_count = body.events.len(),
        "received queued dataset events"
    );

    let dataset = registry.metadata.dataset(&body.dataset_id).await?;
    dataset.validate_source_type(SourceType::Event)?;

    let edition_id = handle_events(
        registry,
        &dataset,
        &body.version,
        &body.merge_on,
        &body.events,
        None,
    )
    .await?;

    if let Some(trace_id) = trace_id {
        let mut trace = StatusTrace::new(&body.dataset_id, &body.version, "push");
        trace.trace_id = trace_id;
        trace.trace_status = Some(TraceStatus::Finished);
        trace.end_time = Some(Utc::now().to_rfc3339());
        registry.status.update_trace(&trace).await?;
    }

    Ok(edition_id)
}
