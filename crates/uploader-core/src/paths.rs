//! Storage-path derivation.
//!
//! Every object belonging to a dataset lives under a deterministic prefix:
//!
//! ```text
//! <stage>/<confidentiality>/[<parent_id>/]<datasetId>/version=<v>/(edition=<e>|latest)[/<filename>]
//! ```
//!
//! `raw` holds the original JSON batches, `processed` the materialized
//! columnar table. The `latest` edition segment stays literal, without the
//! `edition=` prefix.

use std::fmt;

use crate::dataset::{Dataset, EditionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Raw,
    Processed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Raw => write!(f, "raw"),
            Stage::Processed => write!(f, "processed"),
        }
    }
}

/// Bucket-relative prefix for one edition of a dataset.
pub fn dataset_prefix(dataset: &Dataset, edition: &EditionId, stage: Stage) -> String {
    let confidentiality = dataset.confidentiality();
    let mut prefix = format!("{stage}/{confidentiality}");
    if let Some(parent_id) = &dataset.parent_id {
        prefix = format!("{prefix}/{parent_id}");
    }
    let edition_segment = if edition.is_latest() {
        "latest".to_string()
    } else {
        format!("edition={}", edition.edition)
    };
    format!(
        "{prefix}/{}/version={}/{edition_segment}",
        edition.dataset_id, edition.version
    )
}

/// Bucket-relative key for a single file within an edition.
pub fn dataset_key(dataset: &Dataset, edition: &EditionId, stage: Stage, filename: &str) -> String {
    format!("{}/{filename}", dataset_prefix(dataset, edition, stage))
}

/// Absolute `s3://` URL for a bucket-relative key or prefix, for logging and
/// status traces.
pub fn storage_url(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}
