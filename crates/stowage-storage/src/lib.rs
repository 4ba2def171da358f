//! Stowage Storage Library
//!
//! Backend-agnostic object storage: a registry of named containers, each bound
//! to a driver (local filesystem, S3 or in-memory), with a metadata overlay that
//! gives every backend structured per-object metadata.
//!
//! # Addressing
//!
//! Objects are addressed as `<storage>/<object_id>`, or `<object_id>` for the
//! default storage.
//!
//! # Metadata
//!
//! Drivers that cannot store metadata natively (the local driver) get a JSON
//! sidecar object `<object_id>.metadata.json` in the same container. Sidecars are
//! written before and removed before their primary object.

pub mod container;
pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod metadata;
pub mod path;
pub mod registry;
pub mod remote;
pub mod service;
pub mod stored_file;
pub mod traits;

// Re-export commonly used types
pub use container::Container;
pub use factory::create_driver;
#[cfg(feature = "storage-local")]
pub use local::LocalDriver;
pub use path::{resolve, ObjectPath};
pub use registry::StorageRegistry;
pub use remote::ObjectStoreDriver;
pub use service::{SaveContent, StorageService, UploadFile};
pub use stored_file::{StoredFile, StoredFileReader};
pub use stowage_core::DriverKind;
pub use traits::{
    ByteStream, Metadata, ObjectInfo, StorageDriver, StorageError, StorageResult, UploadOptions,
};
