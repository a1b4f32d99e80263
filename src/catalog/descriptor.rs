// Catalog data types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Size/graph class of a recognition model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    Small,
    Large,
    Dynamic,
}

impl ModelVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Small => "small",
            ModelVariant::Large => "large",
            ModelVariant::Dynamic => "dynamic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "small" => Some(ModelVariant::Small),
            "large" => Some(ModelVariant::Large),
            "dynamic" => Some(ModelVariant::Dynamic),
            _ => None,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog record describing one downloadable recognition model.
///
/// Invariant: `downloaded == true` implies `local_path` is set and points at
/// a non-empty directory. The fetcher is the only writer of the downloaded
/// flag; deletion resets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub language_code: String,
    pub language_name: String,
    pub variant: ModelVariant,
    pub source_url: String,
    /// Declared archive size in bytes, used for progress and sanity checks.
    pub expected_size: u64,
    pub downloaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_estimate: Option<f64>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for registering a new catalog entry. Flags and timestamps are
/// stamped by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDescriptor {
    pub id: String,
    pub language_code: String,
    pub language_name: String,
    pub variant: ModelVariant,
    pub source_url: String,
    pub expected_size: u64,
    pub accuracy_estimate: Option<f64>,
}

/// Which descriptors a `list` call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFilter {
    All,
    /// Active entries only
    Active,
    /// Active entries that are downloaded and installed
    Downloaded,
}

/// Error types for catalog operations
#[derive(Debug, Clone)]
pub enum CatalogError {
    /// No descriptor with the given id
    NotFound(String),
    /// register() was called with an id that already exists
    DuplicateId(String),
    /// Underlying SQLite failure
    Storage(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::NotFound(id) => write!(f, "Model not found: {}", id),
            CatalogError::DuplicateId(id) => write!(f, "Model id already registered: {}", id),
            CatalogError::Storage(msg) => write!(f, "Catalog storage error: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Storage(err.to_string())
    }
}
