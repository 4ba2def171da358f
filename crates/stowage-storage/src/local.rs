use crate::traits::{
    ByteStream, ObjectInfo, StorageDriver, StorageError, StorageResult, UploadOptions,
};
use bytes::Bytes;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};
use stowage_core::DriverKind;
use uuid::Uuid;

/// Chunk size used when the caller does not ask for one
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Local filesystem driver
///
/// Containers are directories directly under `base_path`; objects are files
/// inside them. The filesystem has no per-file metadata store, so
/// `supports_metadata` is `false`.
#[derive(Clone, Debug)]
pub struct LocalDriver {
    base_path: PathBuf,
}

impl LocalDriver {
    /// Create a new LocalDriver rooted at `base_path`, creating it if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalDriver { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn container_path(&self, container: &str) -> StorageResult<PathBuf> {
        if container.is_empty()
            || container.contains("..")
            || container.contains('/')
            || container.contains('\\')
        {
            return Err(StorageError::InvalidKey(format!(
                "Invalid container name: {}",
                container
            )));
        }
        Ok(self.base_path.join(container))
    }

    /// Convert an object key to a filesystem path with traversal checks
    ///
    /// Rejects keys that could escape the container directory, including through
    /// symlinks that already exist on disk.
    fn key_to_path(&self, container: &str, key: &str) -> StorageResult<PathBuf> {
        let escapes = Path::new(key).components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if key.is_empty() || escapes {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let container_path = self.container_path(container)?;
        let path = container_path.join(key);

        if let (Ok(canonical), Ok(container_canonical)) =
            (path.canonicalize(), container_path.canonicalize())
        {
            if canonical.strip_prefix(&container_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn object_info(path: &Path, name: &str) -> StorageResult<ObjectInfo> {
        let meta = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(StorageError::NotFound(name.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        };

        let mut extra = crate::traits::Metadata::new();
        if let Some(secs) = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
        {
            extra.insert("modify_time".to_string(), Value::from(secs));
        }

        Ok(ObjectInfo {
            name: name.to_string(),
            size: meta.len(),
            extra,
            meta_data: Default::default(),
        })
    }
}

impl StorageDriver for LocalDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Local
    }

    fn supports_metadata(&self) -> bool {
        false
    }

    fn create_container(&self, container: &str) -> StorageResult<()> {
        let path = self.container_path(container)?;

        match fs::create_dir(&path) {
            Ok(()) => {
                tracing::info!(
                    path = %path.display(),
                    container = %container,
                    "Local container created"
                );
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(container.to_string()))
            }
            Err(e) => Err(StorageError::ConfigError(format!(
                "Failed to create container directory {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn get_container(&self, container: &str) -> StorageResult<()> {
        let path = self.container_path(container)?;
        if path.is_dir() {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("container {}", container)))
        }
    }

    fn upload_object_via_stream(
        &self,
        container: &str,
        name: &str,
        reader: &mut dyn Read,
        _options: &UploadOptions,
    ) -> StorageResult<ObjectInfo> {
        self.get_container(container)?;
        let path = self.key_to_path(container, name)?;
        let start = Instant::now();

        self.ensure_parent_dir(&path)?;

        // Write next to the target and rename, so readers never see a partial file.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path =
            path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let written = (|| -> io::Result<u64> {
            let mut file = File::create(&tmp_path)?;
            let written = io::copy(reader, &mut file)?;
            file.flush()?;
            file.sync_all()?;
            fs::rename(&tmp_path, &path)?;
            Ok(written)
        })()
        .map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            container = %container,
            key = %name,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Self::object_info(&path, name)
    }

    fn get_object(&self, container: &str, name: &str) -> StorageResult<ObjectInfo> {
        let path = self.key_to_path(container, name)?;
        Self::object_info(&path, name)
    }

    fn delete_object(&self, container: &str, name: &str) -> StorageResult<bool> {
        let path = self.key_to_path(container, name)?;
        let start = Instant::now();

        fs::remove_file(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            )),
        })?;

        tracing::info!(
            path = %path.display(),
            container = %container,
            key = %name,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(true)
    }

    fn range_as_stream(
        &self,
        container: &str,
        name: &str,
        start: u64,
        end: Option<u64>,
        chunk_size: Option<usize>,
    ) -> StorageResult<ByteStream> {
        let path = self.key_to_path(container, name)?;

        let mut file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::DownloadFailed(format!(
                "Failed to open file {}: {}",
                path.display(),
                e
            )),
        })?;

        if start > 0 {
            file.seek(SeekFrom::Start(start)).map_err(|e| {
                StorageError::DownloadFailed(format!("Failed to seek {}: {}", path.display(), e))
            })?;
        }

        tracing::debug!(
            path = %path.display(),
            key = %name,
            start,
            end = ?end,
            "Local storage stream opened"
        );

        Ok(Box::new(FileChunks {
            file: Some(file),
            remaining: end.map(|end| end.saturating_sub(start)),
            chunk_size: chunk_size.filter(|&size| size > 0).unwrap_or(DEFAULT_CHUNK_SIZE),
        }))
    }

    fn cdn_url(&self, container: &str, name: &str) -> Option<String> {
        let path = self.key_to_path(container, name).ok()?;
        let path = std::path::absolute(&path).unwrap_or(path);
        Some(path.display().to_string())
    }
}

/// Chunked reader over an open file; closes the file once exhausted.
struct FileChunks {
    file: Option<File>,
    remaining: Option<u64>,
    chunk_size: usize,
}

impl Iterator for FileChunks {
    type Item = StorageResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.file.as_mut()?;

        let want = match self.remaining {
            Some(remaining) => remaining.min(self.chunk_size as u64) as usize,
            None => self.chunk_size,
        };
        if want == 0 {
            self.file = None;
            return None;
        }

        let mut buf = vec![0u8; want];
        let read = loop {
            match file.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.file = None;
                    return Some(Err(StorageError::DownloadFailed(format!(
                        "Failed to read chunk: {}",
                        e
                    ))));
                }
            }
        };

        if read == 0 {
            self.file = None;
            return None;
        }

        buf.truncate(read);
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= read as u64;
        }
        Some(Ok(Bytes::from(buf)))
    }
}
