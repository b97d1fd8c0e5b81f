//! The event ingestion pipeline: merge, publish, notify.

use anyhow::anyhow;
use serde_json::{Map, Value};
use tracing::{error, info};

use uploader_core::{
    dataset_prefix, storage_url, Dataset, DistributionInput, EditionId, Stage, UploadError,
};
use uploader_frame::{merge_frames, MergeOutcome};
use uploader_io::TableStore;

use crate::registry::Registry;

/// Read the table at `prefix` (if any) and merge the new rows into it.
pub async fn add_to_dataset(
    store: &TableStore,
    prefix: &str,
    rows: &[Map<String, Value>],
    merge_on: &[String],
) -> Result<MergeOutcome, UploadError> {
    let existing = store.read_table(prefix).await?;
    merge_frames(existing, rows, merge_on).await
}

/// Publish a batch of events as a new edition of `dataset`.
///
/// Merges against the current `latest` table, archives the raw input, mints
/// a new edition, rewrites `latest`, registers a distribution, and notifies
/// subscribers of any new columns. Returns the new edition id.
///
/// Callers serialize invocations per dataset (the write lock on the
/// synchronous path, the queue group on the asynchronous one).
pub async fn handle_events(
    registry: &Registry,
    dataset: &Dataset,
    version: &str,
    merge_on: &[String],
    events: &[Map<String, Value>],
    token: Option<&str>,
) -> Result<String, UploadError> {
    let latest = EditionId::latest(&dataset.id, version);
    let source_prefix = dataset_prefix(dataset, &latest, Stage::Processed);

    let outcome = add_to_dataset(&registry.store, &source_prefix, events, merge_on).await?;

    let edition_id = registry
        .metadata
        .create_edition(token, &dataset.id, version)
        .await?;
    let edition = EditionId::parse(&edition_id).map_err(|_| {
        UploadError::internal(anyhow!(
            "metadata service returned a malformed edition id: {edition_id}"
        ))
    })?;

    let processed_prefix = dataset_prefix(dataset, &edition, Stage::Processed);
    let raw_prefix = dataset_prefix(dataset, &edition, Stage::Raw);
    info!(
        target_s3_path_processed = %storage_url(registry.store.bucket(), &processed_prefix),
        target_s3_path_raw = %storage_url(registry.store.bucket(), &raw_prefix),
        "publishing edition"
    );

    // The raw input is archived before anything destructive happens, so the
    // payload stays recoverable.
    let raw = serde_json::to_vec(events).map_err(UploadError::internal)?;
    registry
        .store
        .put_json(&format!("{raw_prefix}/data.json"), raw)
        .await?;

    // Clean out any existing data in `latest`. A crash between this point
    // and the rewrite below leaves `latest` empty; the edition written next
    // is authoritative and a re-run converges.
    registry.store.delete_prefix(&source_prefix).await?;

    // Write the merged data to both the new edition and to `latest`.
    for prefix in [&processed_prefix, &source_prefix] {
        info!("writing the merged data to {}", prefix);
        registry.store.write_table(prefix, &outcome.frame).await?;
    }

    let filenames = registry.store.list_filenames(&processed_prefix).await?;
    let distribution_id = registry
        .metadata
        .create_distribution(token, &edition, &DistributionInput::parquet(filenames))
        .await?;
    info!(
        distribution_id = %distribution_id,
        edition_id = %edition_id,
        "distribution created"
    );

    // The notifier runs last and cannot gate success.
    if let Err(e) = registry
        .notifier
        .notify_new_columns(&dataset.id, &outcome.new_columns)
        .await
    {
        error!(error = %e, "schema drift notification failed");
    }

    Ok(edition_id)
}
