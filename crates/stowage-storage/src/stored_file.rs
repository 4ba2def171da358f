//! Retrieved-file view
//!
//! A `StoredFile` is built on every fetch from the object description and its
//! metadata. It is read-only; reads always go back to the driver.

use crate::container::Container;
use crate::metadata::{self, DEFAULT_CONTENT_TYPE};
use crate::traits::{ByteStream, ObjectInfo, StorageError, StorageResult};
use bytes::Bytes;
use serde_json::Value;
use std::io::{self, Read};
use stowage_core::validation::{CONTENT_TYPE_KEY, FILENAME_KEY};

/// Display filename used when the object has none in its metadata
pub const UNNAMED: &str = "unnamed";

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub filename: String,
    pub content_type: String,
    pub object: ObjectInfo,
    container: Container,
}

impl StoredFile {
    pub(crate) fn new(object: ObjectInfo, container: Container) -> Self {
        let filename = object
            .meta_data
            .get(FILENAME_KEY)
            .and_then(Value::as_str)
            .unwrap_or(UNNAMED)
            .to_string();

        let content_type = object
            .extra
            .get(CONTENT_TYPE_KEY)
            .and_then(Value::as_str)
            .or_else(|| object.meta_data.get(CONTENT_TYPE_KEY).and_then(Value::as_str))
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        StoredFile {
            name: object.name.clone(),
            size: object.size,
            filename,
            content_type,
            object,
            container,
        }
    }

    /// Storage this file lives in
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Read the first `n` bytes, or the whole object for `None` / `Some(0)`.
    pub fn read(&self, n: Option<u64>) -> StorageResult<Bytes> {
        let end = n.filter(|&n| n > 0);

        let mut content = Vec::with_capacity(end.unwrap_or(self.size).min(self.size) as usize);
        for chunk in self.range_as_stream(0, end, None)? {
            content.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(content))
    }

    pub fn as_stream(&self, chunk_size: Option<usize>) -> StorageResult<ByteStream> {
        self.container.as_stream(&self.name, chunk_size)
    }

    pub fn range_as_stream(
        &self,
        start: u64,
        end: Option<u64>,
        chunk_size: Option<usize>,
    ) -> StorageResult<ByteStream> {
        self.container
            .range_as_stream(&self.name, start, end, chunk_size)
    }

    /// Directly fetchable location, when the backend has one.
    pub fn cdn_url(&self) -> Option<String> {
        self.container.cdn_url(&self.name)
    }

    /// Delete the object and its metadata sidecar, if any.
    pub fn delete(&self) -> StorageResult<bool> {
        metadata::delete(&self.container, &self.name)
    }

    /// `std::io::Read` over the whole object.
    pub fn open(&self) -> StorageResult<StoredFileReader> {
        Ok(StoredFileReader {
            stream: self.as_stream(None)?,
            current: Bytes::new(),
        })
    }

    pub fn readable(&self) -> bool {
        true
    }

    pub fn seekable(&self) -> bool {
        false
    }

    pub fn writable(&self) -> bool {
        false
    }

    pub async fn read_async(&self, n: Option<u64>) -> StorageResult<Bytes> {
        let file = self.clone();
        tokio::task::spawn_blocking(move || file.read(n))
            .await
            .map_err(crate::service::join_error)?
    }

    pub async fn delete_async(&self) -> StorageResult<bool> {
        let file = self.clone();
        tokio::task::spawn_blocking(move || file.delete())
            .await
            .map_err(crate::service::join_error)?
    }
}

/// Blocking reader over a stored file's byte stream
pub struct StoredFileReader {
    stream: ByteStream,
    current: Bytes,
}

impl Read for StoredFileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current.is_empty() {
            match self.stream.next() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(StorageError::IoError(e))) => return Err(e),
                Some(Err(e)) => return Err(io::Error::other(e)),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current.split_to(n));
        Ok(n)
    }
}
