//! Object storage abstraction used by shard stores and catalogs.

use std::collections::HashMap;
use thiserror::Error;

/// Error returned by [`ObjectIO`] implementations.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct CloudIOError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    InvalidInput,
    Network,
    Timeout,
    ServiceUnavailable,
    Other,
}

impl CloudIOError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub type CloudResult<T> = Result<T, CloudIOError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub custom_metadata: HashMap<String, String>,
}

/// Blocking object storage operations, keyed by bucket and object key.
pub trait ObjectIO: Send + Sync {
    /// Create or replace an object.
    ///
    /// # Errors
    /// Fails when the upload is rejected.
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()>;

    /// # Errors
    /// `NotFound` when the object does not exist.
    fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>>;

    /// # Errors
    /// Fails when the delete is rejected. Missing objects are not an error.
    fn delete_object(&self, bucket: &str, key: &str) -> CloudResult<()>;

    /// Objects whose key starts with `prefix`, sorted by key.
    ///
    /// # Errors
    /// Fails when the listing is rejected.
    fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> CloudResult<Vec<ObjectMetadata>>;

    /// # Errors
    /// Fails when the check is rejected.
    fn object_exists(&self, bucket: &str, key: &str) -> CloudResult<bool>;
}
