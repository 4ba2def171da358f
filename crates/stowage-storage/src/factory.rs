#[cfg(feature = "storage-local")]
use crate::LocalDriver;
use crate::ObjectStoreDriver;
use crate::{StorageDriver, StorageError, StorageResult};
use stowage_core::{DriverKind, DriverOptions};
use std::sync::Arc;

/// Create a storage driver from its configured variant and options
pub fn create_driver(
    kind: DriverKind,
    options: &DriverOptions,
) -> StorageResult<Arc<dyn StorageDriver>> {
    let key = options.key().ok_or_else(|| {
        StorageError::ConfigError(format!(
            "{} driver options must have a `key` option",
            kind.display_name()
        ))
    })?;

    match kind {
        #[cfg(feature = "storage-local")]
        DriverKind::Local => {
            let driver = LocalDriver::new(key)?;
            Ok(Arc::new(driver))
        }

        #[cfg(not(feature = "storage-local"))]
        DriverKind::Local => Err(StorageError::ConfigError(
            "Local storage driver not available (storage-local feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-s3")]
        DriverKind::S3 => {
            let driver = ObjectStoreDriver::s3(options)?;
            Ok(Arc::new(driver))
        }

        #[cfg(not(feature = "storage-s3"))]
        DriverKind::S3 => Err(StorageError::ConfigError(
            "S3 storage driver not available (storage-s3 feature not enabled)".to_string(),
        )),

        DriverKind::Memory => {
            tracing::debug!(label = %key, "Creating in-memory storage driver");
            let driver = ObjectStoreDriver::memory()?;
            Ok(Arc::new(driver))
        }
    }
}
