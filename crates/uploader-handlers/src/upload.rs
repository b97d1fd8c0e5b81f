//! Presigned uploads for file-typed datasets.

use chrono::Utc;
use tracing::{info, warn};

use uploader_core::{
    dataset_key, parse_upload_request, storage_url, EditionId, EditionRef, RequestEnvelope,
    Response, SourceType, Stage, StatusTrace, UploadError,
};

use crate::push::authorize;
use crate::registry::Registry;

/// Handle a presigned-upload request: resolve (or mint) the edition, build
/// the signed POST for the raw storage key, and record a status trace.
pub async fn generate_signed_post(registry: &Registry, request: &RequestEnvelope) -> Response {
    match signed_post_inner(registry, request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, status = e.status(), "generate_signed_post failed");
            Response::from(e)
        }
    }
}

async fn signed_post_inner(
    registry: &Registry,
    request: &RequestEnvelope,
) -> Result<Response, UploadError> {
    let body = parse_upload_request(&request.body)?;
    let edition_ref = EditionRef::parse(&body.edition_id)?;
    let dataset_id = edition_ref.dataset_id().to_string();

    let token = authorize(registry, request, &dataset_id).await?;

    let dataset = registry.metadata.dataset(&dataset_id).await?;
    dataset.validate_source_type(SourceType::File)?;

    let edition = match &edition_ref {
        EditionRef::Version {
            dataset_id,
            version,
        } => {
            // No edition given: mint one, provided the version checks out.
            if !registry.metadata.validate_version(dataset_id, version).await? {
                return Err(UploadError::InvalidDatasetEdition);
            }
            let minted = registry
                .metadata
                .create_edition(token.as_deref(), dataset_id, version)
                .await?;
            EditionId::parse(&minted).map_err(|_| {
                UploadError::internal(anyhow::anyhow!(
                    "metadata service returned a malformed edition id: {minted}"
                ))
            })?
        }
        EditionRef::Edition(edition) => {
            if !registry.metadata.validate_edition(edition).await? {
                return Err(UploadError::InvalidDatasetEdition);
            }
            edition.clone()
        }
    };

    let key = dataset_key(&dataset, &edition, Stage::Raw, &body.filename);
    info!(s3_key = %key, "issuing signed post");
    let post = registry.signed_post.generate(&key)?;

    let now = Utc::now().to_rfc3339();
    let mut trace = StatusTrace::new(&edition.dataset_id, &edition.version, "upload");
    trace.user = request.principal_id.clone();
    trace.start_time = Some(now.clone());
    trace.end_time = Some(now);
    trace.s3_path = Some(storage_url(registry.store.bucket(), &key));
    let trace_id = registry.status.create_trace(&trace).await?;

    Ok(Response::json(
        200,
        &serde_json::json!({
            "trace_id": trace_id,
            "url": post.url,
            "fields": post.fields,
        }),
    ))
}
