//! Storage service
//!
//! Entry point for callers: saves, fetches and deletes objects addressed by
//! `<storage>/<object_id>` paths against the configured registry.
//!
//! Every operation has a blocking form and an `_async` form. The async forms run
//! the blocking one on tokio's blocking pool; call them from async code.

use crate::container::Container;
use crate::metadata::{self, ContentSource, META_DATA_KEY};
use crate::path::resolve;
use crate::registry::StorageRegistry;
use crate::stored_file::StoredFile;
use crate::traits::{Metadata, StorageError, StorageResult};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use stowage_core::validation::{CONTENT_TYPE_KEY, FILENAME_KEY};
use stowage_core::StorageSetup;
use tokio::task::JoinError;
use uuid::Uuid;

/// A file received from a client upload
pub struct UploadFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub content: Box<dyn Read + Send>,
}

impl UploadFile {
    pub fn new(content: impl Read + Send + 'static) -> Self {
        UploadFile {
            filename: None,
            content_type: None,
            headers: HashMap::new(),
            content: Box::new(content),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Parameters of `StorageService::save_content`
///
/// Exactly one of `content` and `content_path` must be set.
pub struct SaveContent {
    name: String,
    content: Option<Box<dyn Read + Send>>,
    content_path: Option<PathBuf>,
    upload_storage: Option<String>,
    metadata: Option<Metadata>,
    extra: Option<Metadata>,
    headers: Option<HashMap<String, String>>,
}

impl SaveContent {
    pub fn new(name: impl Into<String>) -> Self {
        SaveContent {
            name: name.into(),
            content: None,
            content_path: None,
            upload_storage: None,
            metadata: None,
            extra: None,
            headers: None,
        }
    }

    pub fn content(mut self, content: impl Read + Send + 'static) -> Self {
        self.content = Some(Box::new(content));
        self
    }

    pub fn content_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.content_path = Some(path.into());
        self
    }

    pub fn upload_storage(mut self, storage: impl Into<String>) -> Self {
        self.upload_storage = Some(storage.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn extra(mut self, extra: Metadata) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }
}

pub(crate) fn join_error(err: JoinError) -> StorageError {
    StorageError::BackendError(format!("spawn_blocking join error: {}", err))
}

#[derive(Clone)]
pub struct StorageService {
    registry: Arc<StorageRegistry>,
}

impl StorageService {
    pub fn new(registry: StorageRegistry) -> Self {
        StorageService {
            registry: Arc::new(registry),
        }
    }

    /// Configure a registry from `setup` and wrap it.
    pub fn from_setup(setup: &StorageSetup) -> StorageResult<Self> {
        StorageRegistry::configure(setup).map(Self::new)
    }

    pub fn registry(&self) -> &StorageRegistry {
        &self.registry
    }

    /// Container for `name`, or the default one.
    pub fn get_container(&self, name: Option<&str>) -> StorageResult<Container> {
        self.registry.get(name).cloned()
    }

    /// Save a client upload under its filename, or a random id when it has none.
    pub fn save(
        &self,
        file: UploadFile,
        upload_storage: Option<&str>,
    ) -> StorageResult<StoredFile> {
        let name = file
            .filename
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut metadata = Metadata::new();
        metadata.insert(
            CONTENT_TYPE_KEY.to_string(),
            file.content_type.clone().map_or(Value::Null, Value::String),
        );
        metadata.insert(
            FILENAME_KEY.to_string(),
            file.filename.clone().map_or(Value::Null, Value::String),
        );

        let mut request = SaveContent::new(name)
            .metadata(metadata)
            .headers(file.headers);
        request.content = Some(file.content);
        if let Some(storage) = upload_storage {
            request = request.upload_storage(storage);
        }

        self.save_content(request)
    }

    pub fn save_content(&self, request: SaveContent) -> StorageResult<StoredFile> {
        let SaveContent {
            name,
            content,
            content_path,
            upload_storage,
            metadata: meta_data,
            extra,
            headers,
        } = request;

        let container = self.registry.get(upload_storage.as_deref())?;
        let options =
            metadata::upload_options(meta_data.as_ref(), extra.as_ref(), headers.as_ref())?;

        let mut info = match (content, content_path) {
            (Some(mut reader), None) => {
                metadata::upload(container, &name, ContentSource::Reader(&mut reader), &options)?
            }
            (None, Some(path)) => {
                metadata::upload(container, &name, ContentSource::Path(&path), &options)?
            }
            (None, None) => {
                return Err(StorageError::InvalidArgument(
                    "Either content or content_path must be specified".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(StorageError::InvalidArgument(
                    "Only one of content and content_path may be specified".to_string(),
                ))
            }
        };

        // The sidecar just written is what a fetch would merge back in.
        if !container.supports_metadata() {
            if let Some(Value::Object(meta_data)) = options.extra.get(META_DATA_KEY) {
                info.meta_data.extend(meta_data.clone());
            }
        }

        Ok(StoredFile::new(info, container.clone()))
    }

    /// Fetch `<storage>/<object_id>`, or `<object_id>` in the default storage.
    pub fn get(&self, path: &str) -> StorageResult<StoredFile> {
        let resolved = resolve(path, self.registry.default_name())?;
        let container = self.registry.get(Some(&resolved.storage))?;

        tracing::debug!(
            path = %path,
            container = %resolved.storage,
            key = %resolved.object_id,
            "Fetching stored file"
        );

        let info = metadata::fetch(container, &resolved.object_id)?;
        Ok(StoredFile::new(info, container.clone()))
    }

    /// Delete `<storage>/<object_id>` along with its metadata sidecar.
    pub fn delete(&self, path: &str) -> StorageResult<bool> {
        let resolved = resolve(path, self.registry.default_name())?;
        let container = self.registry.get(Some(&resolved.storage))?;
        metadata::delete(container, &resolved.object_id)
    }

    pub async fn save_async(
        &self,
        file: UploadFile,
        upload_storage: Option<&str>,
    ) -> StorageResult<StoredFile> {
        let service = self.clone();
        let upload_storage = upload_storage.map(String::from);
        tokio::task::spawn_blocking(move || service.save(file, upload_storage.as_deref()))
            .await
            .map_err(join_error)?
    }

    pub async fn save_content_async(&self, request: SaveContent) -> StorageResult<StoredFile> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.save_content(request))
            .await
            .map_err(join_error)?
    }

    pub async fn get_async(&self, path: &str) -> StorageResult<StoredFile> {
        let service = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || service.get(&path))
            .await
            .map_err(join_error)?
    }

    pub async fn delete_async(&self, path: &str) -> StorageResult<bool> {
        let service = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || service.delete(&path))
            .await
            .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::{DriverKind, DriverOptions};

    fn memory_service() -> StorageService {
        let setup = StorageSetup::new()
            .with_storage("cloud", DriverKind::Memory, DriverOptions::new("cloud"));
        StorageService::from_setup(&setup).unwrap()
    }

    #[test]
    fn test_save_content_requires_exactly_one_source() {
        let service = memory_service();

        let err = service.save_content(SaveContent::new("a.txt")).err().unwrap();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        assert!(err.to_string().contains("Either content or content_path"));

        let both = SaveContent::new("a.txt")
            .content(&b"abc"[..])
            .content_path("/tmp/a.txt");
        assert!(matches!(
            service.save_content(both),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_save_without_filename_uses_random_name() {
        let service = memory_service();
        let file = UploadFile::new(&b"anonymous"[..]).with_content_type("text/plain");

        let stored = service.save(file, None).unwrap();
        assert!(Uuid::parse_str(&stored.name).is_ok());
        assert_eq!(stored.filename, "unnamed");
        assert_eq!(stored.content_type, "text/plain");
    }

    #[test]
    fn test_get_container_defaults() {
        let service = memory_service();
        assert_eq!(service.get_container(None).unwrap().name(), "cloud");
        assert!(service.get_container(Some("images")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_invalid_path() {
        let service = memory_service();
        assert!(matches!(
            service.get("cloud/a/b"),
            Err(StorageError::InvalidPath(_))
        ));
    }
}
