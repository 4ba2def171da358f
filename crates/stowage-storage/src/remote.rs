//! Object store driver
//!
//! Wraps the async `object_store` client (S3 or in-memory) behind the blocking
//! `StorageDriver` trait. Both backends keep per-object attributes, so metadata is
//! stored natively as user metadata and no sidecar is needed. S3 sends user
//! metadata as `x-amz-meta-*` headers and lower-cases their names, so metadata
//! keys should be lower-case to read back unchanged.
//!
//! Blocking calls are driven by the tokio runtime that was current when the
//! driver was built, or by a process-wide fallback runtime when there was none.
//! They must not be issued from an async worker thread; use the `*_async`
//! service methods, which run them on the blocking pool.

use crate::metadata;
use crate::traits::{
    ByteStream, Metadata, ObjectInfo, StorageDriver, StorageError, StorageResult, UploadOptions,
};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    Attribute, AttributeValue, Attributes, GetOptions, GetRange, ObjectStore, ObjectStoreExt,
    PutOptions, PutPayload,
};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::io::Read;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Instant;
use stowage_core::DriverKind;
use tokio::runtime::{Builder, Handle, Runtime};

#[cfg(feature = "storage-s3")]
use object_store::aws::AmazonS3Builder;
#[cfg(feature = "storage-s3")]
use stowage_core::DriverOptions;

type Connect = Box<dyn Fn(&str) -> StorageResult<Arc<dyn ObjectStore>> + Send + Sync>;

/// Process-wide runtime for drivers built outside tokio. Never dropped.
static FALLBACK_RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn fallback_handle() -> StorageResult<Handle> {
    if let Some(runtime) = FALLBACK_RUNTIME.get() {
        return Ok(runtime.handle().clone());
    }

    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("stowage-object-store")
        .enable_all()
        .build()
        .map_err(|e| StorageError::ConfigError(format!("Failed to start runtime: {}", e)))?;

    // A runtime that loses the race is dropped here, outside any async context.
    Ok(FALLBACK_RUNTIME.get_or_init(|| runtime).handle().clone())
}

/// Runs object store futures to completion for the blocking API.
struct Executor {
    handle: Handle,
}

impl Executor {
    fn new() -> StorageResult<Self> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => fallback_handle()?,
        };
        Ok(Executor { handle })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

/// How public object URLs are formed
#[derive(Debug, Clone, PartialEq, Eq)]
enum PublicUrl {
    /// `{base}/{bucket}/{key}`, for S3-compatible providers or a CDN in front
    PathStyle(String),
    /// `https://{bucket}.s3.{region}.amazonaws.com/{key}`
    VirtualHosted { region: String },
}

impl PublicUrl {
    fn url(&self, bucket: &str, key: &str) -> String {
        match self {
            PublicUrl::PathStyle(base) => {
                format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key)
            }
            PublicUrl::VirtualHosted { region } => {
                format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
            }
        }
    }
}

/// Driver backed by `object_store`; one store per container.
pub struct ObjectStoreDriver {
    kind: DriverKind,
    executor: Arc<Executor>,
    connect: Connect,
    containers: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
    public_url: Option<PublicUrl>,
}

impl ObjectStoreDriver {
    /// In-process store. Every container gets its own empty `InMemory` store.
    pub fn memory() -> StorageResult<Self> {
        Ok(ObjectStoreDriver {
            kind: DriverKind::Memory,
            executor: Arc::new(Executor::new()?),
            connect: Box::new(|_| Ok(Arc::new(InMemory::new()) as Arc<dyn ObjectStore>)),
            containers: RwLock::new(HashMap::new()),
            public_url: None,
        })
    }

    /// S3 (or S3-compatible) store; containers are buckets.
    ///
    /// Options: `key` (access key id), `secret`, `region` (default `us-east-1`),
    /// `endpoint` for S3-compatible providers, `public_url` to override the URL
    /// returned by `cdn_url`.
    #[cfg(feature = "storage-s3")]
    pub fn s3(options: &DriverOptions) -> StorageResult<Self> {
        let access_key = options
            .key()
            .map(String::from)
            .ok_or_else(|| {
                StorageError::ConfigError("S3 driver requires a `key` option".to_string())
            })?;
        let secret = options.get_str("secret").map(String::from);
        let region = options.get_str("region").unwrap_or("us-east-1").to_string();
        let endpoint = options.get_str("endpoint").map(String::from);

        let public_url = match options.get_str("public_url").or(endpoint.as_deref()) {
            Some(base) => PublicUrl::PathStyle(base.to_string()),
            None => PublicUrl::VirtualHosted {
                region: region.clone(),
            },
        };

        let connect: Connect = Box::new(move |bucket: &str| {
            let mut builder = AmazonS3Builder::new()
                .with_bucket_name(bucket)
                .with_region(region.clone())
                .with_access_key_id(access_key.clone());

            if let Some(ref secret) = secret {
                builder = builder.with_secret_access_key(secret.clone());
            }

            if let Some(ref endpoint) = endpoint {
                let allow_http = endpoint.starts_with("http://");
                builder = builder
                    .with_endpoint(endpoint.clone())
                    .with_allow_http(allow_http);
            }

            let store = builder
                .build()
                .map_err(|e| StorageError::ConfigError(e.to_string()))?;
            Ok(Arc::new(store) as Arc<dyn ObjectStore>)
        });

        Ok(ObjectStoreDriver {
            kind: DriverKind::S3,
            executor: Arc::new(Executor::new()?),
            connect,
            containers: RwLock::new(HashMap::new()),
            public_url: Some(public_url),
        })
    }

    fn store(&self, container: &str) -> StorageResult<Arc<dyn ObjectStore>> {
        self.containers
            .read()
            .map_err(|_| StorageError::BackendError("container map poisoned".to_string()))?
            .get(container)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("container {}", container)))
    }

    fn head(&self, store: &dyn ObjectStore, name: &str) -> StorageResult<ObjectInfo> {
        let location = Path::from(name);
        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        let result = self
            .executor
            .block_on(store.get_opts(&location, options))
            .map_err(|e| map_error(e, name))?;

        Ok(describe(name, result.meta.size, &result.attributes))
    }
}

fn map_error(err: object_store::Error, name: &str) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound(name.to_string()),
        object_store::Error::AlreadyExists { .. } => StorageError::AlreadyExists(name.to_string()),
        other => StorageError::BackendError(other.to_string()),
    }
}

/// Translate upload options into object attributes.
///
/// Metadata values are stored JSON-encoded so non-string values survive, with
/// non-ASCII text escaped so they stay valid `x-amz-meta-*` header values.
fn to_attributes(options: &UploadOptions) -> StorageResult<Attributes> {
    let mut attributes = Attributes::new();

    for (header, value) in &options.headers {
        let attribute = match header.to_ascii_lowercase().as_str() {
            "content-type" => Attribute::ContentType,
            "content-disposition" => Attribute::ContentDisposition,
            "content-encoding" => Attribute::ContentEncoding,
            "content-language" => Attribute::ContentLanguage,
            "cache-control" => Attribute::CacheControl,
            _ => continue,
        };
        attributes.insert(attribute, AttributeValue::from(value.clone()));
    }

    if let Some(content_type) = options.extra.get("content_type").and_then(Value::as_str) {
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
    }

    if let Some(meta_data) = options.extra.get("meta_data").and_then(Value::as_object) {
        for (key, value) in meta_data {
            attributes.insert(
                Attribute::Metadata(Cow::Owned(key.clone())),
                AttributeValue::from(metadata::encode_value(value)?),
            );
        }
    }

    Ok(attributes)
}

fn describe(name: &str, size: u64, attributes: &Attributes) -> ObjectInfo {
    let mut extra = Metadata::new();
    let mut meta_data = Metadata::new();

    for (attribute, value) in attributes.iter() {
        let value: &str = value.as_ref();
        let key = match attribute {
            Attribute::ContentType => "content_type",
            Attribute::ContentDisposition => "content_disposition",
            Attribute::ContentEncoding => "content_encoding",
            Attribute::ContentLanguage => "content_language",
            Attribute::CacheControl => "cache_control",
            Attribute::Metadata(key) => {
                let decoded = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                meta_data.insert(key.to_string(), decoded);
                continue;
            }
            _ => continue,
        };
        extra.insert(key.to_string(), Value::String(value.to_string()));
    }

    ObjectInfo {
        name: name.to_string(),
        size,
        extra,
        meta_data,
    }
}

impl StorageDriver for ObjectStoreDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn supports_metadata(&self) -> bool {
        true
    }

    fn create_container(&self, container: &str) -> StorageResult<()> {
        let mut containers = self
            .containers
            .write()
            .map_err(|_| StorageError::BackendError("container map poisoned".to_string()))?;

        if containers.contains_key(container) {
            return Err(StorageError::AlreadyExists(container.to_string()));
        }

        let store = (self.connect)(container)?;
        containers.insert(container.to_string(), store);

        tracing::info!(driver = %self.kind, container = %container, "Object store container bound");
        Ok(())
    }

    fn get_container(&self, container: &str) -> StorageResult<()> {
        self.store(container).map(|_| ())
    }

    fn upload_object_via_stream(
        &self,
        container: &str,
        name: &str,
        reader: &mut dyn Read,
        options: &UploadOptions,
    ) -> StorageResult<ObjectInfo> {
        let store = self.store(container)?;
        let start = Instant::now();

        // object_store takes a complete payload; the reader is buffered in memory.
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
        })?;

        let size = buffer.len() as u64;
        let attributes = to_attributes(options)?;
        let location = Path::from(name);
        let put_options = PutOptions {
            attributes: attributes.clone(),
            ..Default::default()
        };

        self.executor
            .block_on(store.put_opts(&location, PutPayload::from(Bytes::from(buffer)), put_options))
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    driver = %self.kind,
                    container = %container,
                    key = %name,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object store upload failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            driver = %self.kind,
            container = %container,
            key = %name,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store upload successful"
        );

        Ok(describe(name, size, &attributes))
    }

    fn get_object(&self, container: &str, name: &str) -> StorageResult<ObjectInfo> {
        let store = self.store(container)?;
        self.head(store.as_ref(), name)
    }

    fn delete_object(&self, container: &str, name: &str) -> StorageResult<bool> {
        let store = self.store(container)?;
        let start = Instant::now();

        // Most stores treat deleting a missing key as success; check first.
        self.head(store.as_ref(), name)?;

        let location = Path::from(name);
        self.executor
            .block_on(store.delete(&location))
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => StorageError::NotFound(name.to_string()),
                other => {
                    tracing::error!(
                        error = %other,
                        container = %container,
                        key = %name,
                        "Object store delete failed"
                    );
                    StorageError::DeleteFailed(other.to_string())
                }
            })?;

        tracing::info!(
            driver = %self.kind,
            container = %container,
            key = %name,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store delete successful"
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
        let store = self.store(container)?;
        let size = self.head(store.as_ref(), name)?.size;

        let end = end.map_or(size, |end| end.min(size));
        if start >= end {
            return Ok(Box::new(std::iter::empty()));
        }

        let range = if start == 0 && end == size {
            None
        } else {
            Some(GetRange::Bounded(start..end))
        };
        let options = GetOptions {
            range,
            ..Default::default()
        };

        let location = Path::from(name);
        let result = self
            .executor
            .block_on(store.get_opts(&location, options))
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => StorageError::NotFound(name.to_string()),
                other => StorageError::DownloadFailed(other.to_string()),
            })?;

        Ok(Box::new(RemoteChunks {
            executor: self.executor.clone(),
            stream: Some(result.into_stream()),
            chunk_size: chunk_size.filter(|&size| size > 0),
            pending: Bytes::new(),
            key: name.to_string(),
        }))
    }

    fn cdn_url(&self, container: &str, name: &str) -> Option<String> {
        self.public_url.as_ref().map(|url| url.url(container, name))
    }
}

/// Blocking iterator over an object store byte stream.
struct RemoteChunks {
    executor: Arc<Executor>,
    stream: Option<BoxStream<'static, object_store::Result<Bytes>>>,
    chunk_size: Option<usize>,
    pending: Bytes,
    key: String,
}

impl RemoteChunks {
    fn split_pending(&mut self) -> Bytes {
        match self.chunk_size {
            Some(size) if self.pending.len() > size => self.pending.split_to(size),
            _ => std::mem::take(&mut self.pending),
        }
    }
}

impl Iterator for RemoteChunks {
    type Item = StorageResult<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.pending.is_empty() {
                return Some(Ok(self.split_pending()));
            }

            let stream = self.stream.as_mut()?;
            match self.executor.block_on(stream.next()) {
                Some(Ok(bytes)) => self.pending = bytes,
                Some(Err(e)) => {
                    self.stream = None;
                    tracing::error!(
                        key = %self.key,
                        error = %e,
                        "Object store stream download error"
                    );
                    return Some(Err(StorageError::DownloadFailed(e.to_string())));
                }
                None => {
                    self.stream = None;
                    return None;
                }
            }
        }
    }
}
