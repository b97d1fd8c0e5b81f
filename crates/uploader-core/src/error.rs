//! Error taxonomy for the ingestion pipeline.
//!
//! Every failure the pipeline can produce is one of these kinds. Each kind
//! knows the HTTP-style status code and the message that may be surfaced to
//! the caller; internal details stay in the `Display` output for logs.

/// Convenience alias used throughout the workspace.
pub type Result<T, E = UploadError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The request body could not be parsed as JSON at all.
    #[error("Body is not a valid JSON document")]
    InvalidJson,

    /// The body parsed but does not match the request schema.
    #[error("JSON document does not conform to the given schema: {0}")]
    SchemaViolation(String),

    /// The dataset exists but has the wrong `source.type` for this pipeline.
    #[error("{0}")]
    InvalidSourceType(String),

    /// One or more columns ended up with unresolvable mixed types.
    #[error("Invalid or mixed types detected in column(s): {}", .columns.join(", "))]
    InvalidType { columns: Vec<String> },

    /// A `mergeOn` column is absent or null on one side of the merge.
    #[error("{0}")]
    MissingMergeColumns(String),

    /// A three-part edition id that the metadata service does not know.
    #[error("Incorrect dataset edition")]
    InvalidDatasetEdition,

    /// An edition id that is not `datasetId/version/edition`.
    #[error("Invalid dataset edition format")]
    InvalidEditionFormat,

    #[error("Forbidden")]
    Unauthorized,

    #[error("Dataset {0} does not exist")]
    DatasetNotFound(String),

    /// The metadata service refused to mint an edition that already exists.
    /// The payload carries the detail for logging; callers see a fixed body.
    #[error("{0}")]
    DataExists(String),

    /// The lock acquisition retry budget was exhausted.
    #[error(
        "The dataset remains write-locked after several retries. \
         This should not happen, please contact Dataspeilet."
    )]
    Locked,

    #[error("Body is too large; must be below 256 KiB")]
    PayloadTooLarge,

    #[error("The event queue is currently unavailable, please try again later: {0}")]
    QueueUnavailable(String),

    /// Schema-drift notification failure. Logged, never surfaced; the
    /// pipeline still succeeds.
    #[error("failed to send schema drift alert: {0}")]
    AlertEmail(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UploadError {
    /// Wrap any error as an internal (500) failure.
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        UploadError::Internal(err.into())
    }

    /// HTTP-style status code for this error kind.
    pub fn status(&self) -> u16 {
        match self {
            UploadError::InvalidJson
            | UploadError::SchemaViolation(_)
            | UploadError::InvalidSourceType(_)
            | UploadError::InvalidType { .. }
            | UploadError::InvalidDatasetEdition
            | UploadError::PayloadTooLarge => 400,
            UploadError::Unauthorized => 403,
            UploadError::DatasetNotFound(_) => 404,
            UploadError::DataExists(_) | UploadError::Locked => 409,
            UploadError::MissingMergeColumns(_) | UploadError::InvalidEditionFormat => 422,
            UploadError::QueueUnavailable(_) => 503,
            UploadError::AlertEmail(_) | UploadError::Internal(_) => 500,
        }
    }

    /// The message surfaced to the caller. Internal detail never leaks.
    pub fn public_message(&self) -> String {
        match self {
            UploadError::DataExists(_) => {
                "Could not create data as resource already exists".to_string()
            }
            UploadError::QueueUnavailable(_) => {
                "The event queue is currently unavailable, please try again later".to_string()
            }
            UploadError::AlertEmail(_) | UploadError::Internal(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}
