//! Dataset records and edition identifiers as served by the metadata API.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::UploadError;

/// A dataset record, owned by the metadata service. Unknown fields in the
/// API response are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(rename = "Id")]
    pub id: String,

    #[serde(rename = "accessRights")]
    pub access_rights: AccessRights,

    pub source: DatasetSource,

    /// When set, storage paths are nested under the parent dataset.
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    File,
    Event,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::File => write!(f, "file"),
            SourceType::Event => write!(f, "event"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessRights {
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "restricted")]
    Restricted,
    #[serde(rename = "non-public")]
    NonPublic,
}

/// Color label derived from access rights, used in storage paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidentiality {
    Green,
    Yellow,
    Red,
}

impl From<AccessRights> for Confidentiality {
    fn from(rights: AccessRights) -> Self {
        match rights {
            AccessRights::Public => Confidentiality::Green,
            AccessRights::Restricted => Confidentiality::Yellow,
            AccessRights::NonPublic => Confidentiality::Red,
        }
    }
}

impl fmt::Display for Confidentiality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidentiality::Green => write!(f, "green"),
            Confidentiality::Yellow => write!(f, "yellow"),
            Confidentiality::Red => write!(f, "red"),
        }
    }
}

impl Dataset {
    pub fn confidentiality(&self) -> Confidentiality {
        self.access_rights.into()
    }

    /// The event pipeline only accepts event-typed datasets, the upload
    /// pipeline only file-typed ones.
    pub fn validate_source_type(&self, expected: SourceType) -> Result<(), UploadError> {
        if self.source.source_type == expected {
            Ok(())
        } else {
            Err(UploadError::InvalidSourceType(format!(
                "Invalid source.type '{}' for dataset: {}. Must be source.type='{}'",
                self.source.source_type, self.id, expected
            )))
        }
    }
}

/// A fully qualified edition identifier: `datasetId/version/edition`.
///
/// The literal edition `latest` denotes the mutable pointer to the most
/// recent edition of a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditionId {
    pub dataset_id: String,
    pub version: String,
    pub edition: String,
}

impl EditionId {
    /// Parse a `datasetId/version/edition` string. All three parts must be
    /// non-empty.
    pub fn parse(s: &str) -> Result<Self, UploadError> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [dataset_id, version, edition]
                if !dataset_id.is_empty() && !version.is_empty() && !edition.is_empty() =>
            {
                Ok(EditionId {
                    dataset_id: dataset_id.to_string(),
                    version: version.to_string(),
                    edition: edition.to_string(),
                })
            }
            _ => Err(UploadError::InvalidEditionFormat),
        }
    }

    /// The mutable `latest` pointer for a dataset version.
    pub fn latest(dataset_id: &str, version: &str) -> Self {
        EditionId {
            dataset_id: dataset_id.to_string(),
            version: version.to_string(),
            edition: "latest".to_string(),
        }
    }

    pub fn is_latest(&self) -> bool {
        self.edition == "latest"
    }
}

impl fmt::Display for EditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.dataset_id, self.version, self.edition)
    }
}

/// An edition reference as supplied by upload callers: either a full edition
/// id, or just `datasetId/version` (optionally with a trailing slash) asking
/// for an edition to be auto-created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditionRef {
    Version { dataset_id: String, version: String },
    Edition(EditionId),
}

impl EditionRef {
    pub fn parse(s: &str) -> Result<Self, UploadError> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [dataset_id, version] | [dataset_id, version, ""]
                if !dataset_id.is_empty() && !version.is_empty() =>
            {
                Ok(EditionRef::Version {
                    dataset_id: dataset_id.to_string(),
                    version: version.to_string(),
                })
            }
            [_, _, _] => Ok(EditionRef::Edition(EditionId::parse(s)?)),
            _ => Err(UploadError::InvalidEditionFormat),
        }
    }

    pub fn dataset_id(&self) -> &str {
        match self {
            EditionRef::Version { dataset_id, .. } => dataset_id,
            EditionRef::Edition(edition) => &edition.dataset_id,
        }
    }

    pub fn version(&self) -> &str {
        match self {
            EditionRef::Version { version, .. } => version,
            EditionRef::Edition(edition) => &edition.version,
        }
    }
}
