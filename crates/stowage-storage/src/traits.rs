//! Storage driver capability trait
//!
//! This module defines the `StorageDriver` trait that every backend implements.
//! The metadata overlay, registry and file view are written against this trait
//! and its `supports_metadata` flag only, never against a concrete backend.

use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use stowage_core::DriverKind;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Container already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Corrupt metadata for {name}: {reason}")]
    CorruptMetadata { name: String, reason: String },

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<stowage_core::ConfigError> for StorageError {
    fn from(err: stowage_core::ConfigError) -> Self {
        StorageError::ConfigError(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Free-form JSON key/value map used for object metadata and extra attributes.
pub type Metadata = Map<String, Value>;

/// Forward-only sequence of byte chunks.
///
/// The stream is consumed by value; once exhausted it does not replay. A second
/// pass over an object needs a fresh stream from its driver.
pub type ByteStream = Box<dyn Iterator<Item = StorageResult<Bytes>> + Send>;

/// Backend-native description of one stored object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectInfo {
    /// Object name, unique within its container
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Backend attributes (content type, timestamps, standard headers)
    pub extra: Metadata,
    /// Structured metadata; filled natively or from the sidecar object
    pub meta_data: Metadata,
}

/// Per-upload options handed to a driver
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Extra attributes. May carry the reserved `meta_data` and `content_type` keys.
    pub extra: Metadata,
    /// Request headers to persist where the backend supports them
    pub headers: HashMap<String, String>,
}

/// Storage driver capability
///
/// All operations are blocking. Each driver instance must be safe to share
/// between threads; the registry hands the same instance to concurrent callers
/// without additional locking.
pub trait StorageDriver: Send + Sync {
    /// Driver variant
    fn kind(&self) -> DriverKind;

    /// Whether per-object metadata is persisted natively.
    ///
    /// When `false`, the metadata overlay keeps a JSON sidecar object next to
    /// every primary object uploaded with metadata.
    fn supports_metadata(&self) -> bool;

    /// Create a container. Fails with `AlreadyExists` if it is already there.
    fn create_container(&self, container: &str) -> StorageResult<()>;

    /// Check a container exists. Fails with `NotFound` otherwise.
    fn get_container(&self, container: &str) -> StorageResult<()>;

    /// Upload a file from the local filesystem.
    fn upload_object(
        &self,
        container: &str,
        name: &str,
        file_path: &Path,
        options: &UploadOptions,
    ) -> StorageResult<ObjectInfo> {
        let mut file = std::fs::File::open(file_path)?;
        self.upload_object_via_stream(container, name, &mut file, options)
    }

    /// Upload from a reader, consuming it until EOF. Overwrites an existing object.
    fn upload_object_via_stream(
        &self,
        container: &str,
        name: &str,
        reader: &mut dyn Read,
        options: &UploadOptions,
    ) -> StorageResult<ObjectInfo>;

    /// Look up an object. Fails with `NotFound` if absent.
    fn get_object(&self, container: &str, name: &str) -> StorageResult<ObjectInfo>;

    /// Delete an object. Fails with `NotFound` if absent.
    fn delete_object(&self, container: &str, name: &str) -> StorageResult<bool>;

    /// Stream the bytes in `[start, end)`; `end = None` runs to end-of-object.
    ///
    /// `chunk_size` caps the size of each yielded chunk; when `None` the backend
    /// picks it.
    fn range_as_stream(
        &self,
        container: &str,
        name: &str,
        start: u64,
        end: Option<u64>,
        chunk_size: Option<usize>,
    ) -> StorageResult<ByteStream>;

    /// Stream the whole object.
    fn as_stream(
        &self,
        container: &str,
        name: &str,
        chunk_size: Option<usize>,
    ) -> StorageResult<ByteStream> {
        self.range_as_stream(container, name, 0, None, chunk_size)
    }

    /// Directly fetchable location of the object, when the backend has one.
    fn cdn_url(&self, _container: &str, _name: &str) -> Option<String> {
        None
    }
}
