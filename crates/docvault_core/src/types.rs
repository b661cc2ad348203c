//! Core type definitions for DocVault.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the private directory DocVault keeps under the store root.
pub const META_DIR: &str = ".docvault";

/// Unique identifier for a transaction.
///
/// Ids are unique within a process; see [`crate::IdGenerator`]. They also
/// name staging and backup files, so they never contain path separators.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Creates a transaction id from a raw string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated logical document path.
///
/// Document paths are relative, `/`-separated and normalized: empty
/// segments are dropped, and `.`/`..` segments, backslashes and the
/// store's own metadata directory are rejected. They are the unit of
/// locking and backup tracking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(String);

impl DocPath {
    /// Parses and normalizes a document path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the path is empty, absolute, escapes the
    /// store root or points into the metadata directory.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        if raw.starts_with('/') {
            return Err(StoreError::invalid_path(raw, "absolute paths are not allowed"));
        }
        if raw.contains('\\') || raw.contains('\0') {
            return Err(StoreError::invalid_path(raw, "use '/' as the only separator"));
        }

        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" => continue,
                "." | ".." => {
                    return Err(StoreError::invalid_path(raw, "relative segments are not allowed"))
                }
                s => segments.push(s),
            }
        }

        match segments.first() {
            None => Err(StoreError::invalid_path(raw, "path is empty")),
            Some(&META_DIR) => Err(StoreError::invalid_path(raw, "path is reserved")),
            Some(_) => Ok(Self(segments.join("/"))),
        }
    }

    /// Returns the normalized path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last path segment.
    #[must_use]
    pub fn basename(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Resolves this path under a store root.
    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, s| acc.join(s))
    }
}

impl TryFrom<String> for DocPath {
    type Error = StoreError;

    fn try_from(raw: String) -> StoreResult<Self> {
        Self::parse(&raw)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single metadata value attached to a save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<u8>> for MetaValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Structured metadata supplied with a save.
pub type Metadata = BTreeMap<String, MetaValue>;
