use crate::traits::{ByteStream, ObjectInfo, StorageDriver, StorageResult, UploadOptions};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use stowage_core::DriverKind;

/// A named container bound to the driver that owns it.
///
/// Cloning is cheap; clones share the driver.
#[derive(Clone)]
pub struct Container {
    name: String,
    driver: Arc<dyn StorageDriver>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("driver", &self.driver.kind())
            .finish()
    }
}

/// Same name and same driver instance
impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && std::ptr::addr_eq(Arc::as_ptr(&self.driver), Arc::as_ptr(&other.driver))
    }
}

impl Container {
    pub fn new(name: impl Into<String>, driver: Arc<dyn StorageDriver>) -> Self {
        Container {
            name: name.into(),
            driver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &Arc<dyn StorageDriver> {
        &self.driver
    }

    pub fn driver_kind(&self) -> DriverKind {
        self.driver.kind()
    }

    pub fn supports_metadata(&self) -> bool {
        self.driver.supports_metadata()
    }

    pub fn upload_object(
        &self,
        name: &str,
        file_path: &Path,
        options: &UploadOptions,
    ) -> StorageResult<ObjectInfo> {
        self.driver.upload_object(&self.name, name, file_path, options)
    }

    pub fn upload_object_via_stream(
        &self,
        name: &str,
        reader: &mut dyn Read,
        options: &UploadOptions,
    ) -> StorageResult<ObjectInfo> {
        self.driver
            .upload_object_via_stream(&self.name, name, reader, options)
    }

    pub fn get_object(&self, name: &str) -> StorageResult<ObjectInfo> {
        self.driver.get_object(&self.name, name)
    }

    pub fn delete_object(&self, name: &str) -> StorageResult<bool> {
        self.driver.delete_object(&self.name, name)
    }

    pub fn range_as_stream(
        &self,
        name: &str,
        start: u64,
        end: Option<u64>,
        chunk_size: Option<usize>,
    ) -> StorageResult<ByteStream> {
        self.driver
            .range_as_stream(&self.name, name, start, end, chunk_size)
    }

    pub fn as_stream(&self, name: &str, chunk_size: Option<usize>) -> StorageResult<ByteStream> {
        self.driver.as_stream(&self.name, name, chunk_size)
    }

    pub fn cdn_url(&self, name: &str) -> Option<String> {
        self.driver.cdn_url(&self.name, name)
    }
}
