//! Metadata overlay
//!
//! Gives every container structured per-object metadata. Drivers that persist it
//! natively receive it through `UploadOptions::extra["meta_data"]`; for the rest
//! the map is written as a JSON sidecar object named `<name>.metadata.json` in
//! the same container.
//!
//! The sidecar is uploaded before the primary object and removed before it. The
//! two writes are not atomic: a failed primary upload leaves the sidecar behind.

use crate::container::Container;
use crate::traits::{Metadata, ObjectInfo, StorageError, StorageResult, UploadOptions};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;
use stowage_core::validation::{validate_metadata, CONTENT_TYPE_KEY};

/// Suffix appended to an object name to form its sidecar name
pub const SIDECAR_SUFFIX: &str = ".metadata.json";

/// Reserved `extra` key carrying the metadata map
pub const META_DATA_KEY: &str = "meta_data";

/// Content type used when neither the caller nor the backend supplies one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Where the primary object's bytes come from
pub enum ContentSource<'a> {
    Path(&'a Path),
    Reader(&'a mut dyn Read),
}

pub fn sidecar_name(name: &str) -> String {
    format!("{}{}", name, SIDECAR_SUFFIX)
}

/// Build driver upload options from caller metadata, extra attributes and headers.
///
/// With metadata present, `meta_data` and `content_type` are set in `extra`,
/// overriding caller values under those keys.
pub fn upload_options(
    metadata: Option<&Metadata>,
    extra: Option<&Metadata>,
    headers: Option<&HashMap<String, String>>,
) -> StorageResult<UploadOptions> {
    let mut merged = extra.cloned().unwrap_or_default();

    if let Some(metadata) = metadata {
        validate_metadata(metadata).map_err(|e| StorageError::InvalidArgument(e.to_string()))?;

        let content_type = metadata
            .get(CONTENT_TYPE_KEY)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        merged.insert(META_DATA_KEY.to_string(), Value::Object(metadata.clone()));
        merged.insert(CONTENT_TYPE_KEY.to_string(), Value::String(content_type));
    }

    Ok(UploadOptions {
        extra: merged,
        headers: headers.cloned().unwrap_or_default(),
    })
}

/// Upload an object, writing its sidecar first when the driver needs one.
pub fn upload(
    container: &Container,
    name: &str,
    source: ContentSource<'_>,
    options: &UploadOptions,
) -> StorageResult<ObjectInfo> {
    let metadata = options
        .extra
        .get(META_DATA_KEY)
        .and_then(Value::as_object)
        .filter(|metadata| !metadata.is_empty());

    if let Some(metadata) = metadata.filter(|_| !container.supports_metadata()) {
        let bytes = encode_sidecar(metadata)?;
        let sidecar = sidecar_name(name);

        container.upload_object_via_stream(
            &sidecar,
            &mut bytes.as_slice(),
            &UploadOptions::default(),
        )?;

        tracing::debug!(
            container = %container.name(),
            key = %sidecar,
            size_bytes = bytes.len(),
            "Metadata sidecar written"
        );
    }

    match source {
        ContentSource::Path(path) => container.upload_object(name, path, options),
        ContentSource::Reader(reader) => {
            container.upload_object_via_stream(name, reader, options)
        }
    }
}

/// Look up an object and merge in its sidecar metadata when the driver needs one.
pub fn fetch(container: &Container, name: &str) -> StorageResult<ObjectInfo> {
    let mut info = container.get_object(name)?;

    if !container.supports_metadata() {
        if let Some(metadata) = read_sidecar(container, name)? {
            info.meta_data.extend(metadata);
        }
    }

    Ok(info)
}

/// Delete an object and, when the driver needs one, its sidecar.
pub fn delete(container: &Container, name: &str) -> StorageResult<bool> {
    container.get_object(name)?;

    if !container.supports_metadata() {
        let sidecar = sidecar_name(name);
        match container.delete_object(&sidecar) {
            Ok(_) => {
                tracing::debug!(
                    container = %container.name(),
                    key = %sidecar,
                    "Metadata sidecar removed"
                );
            }
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    container.delete_object(name)
}

fn read_sidecar(container: &Container, name: &str) -> StorageResult<Option<Metadata>> {
    let sidecar = sidecar_name(name);

    let stream = match container.as_stream(&sidecar, None) {
        Ok(stream) => stream,
        Err(StorageError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut raw = Vec::new();
    for chunk in stream {
        raw.extend_from_slice(&chunk?);
    }

    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(metadata)) => Ok(Some(metadata)),
        Ok(other) => Err(StorageError::CorruptMetadata {
            name: sidecar,
            reason: format!("expected a JSON object, found {}", json_type(&other)),
        }),
        Err(e) => Err(StorageError::CorruptMetadata {
            name: sidecar,
            reason: e.to_string(),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Serialize a metadata map to sidecar bytes.
///
/// Layout: `", "` between items, `": "` after keys, keys in insertion order,
/// everything outside printable ASCII escaped as `\uXXXX`.
pub fn encode_sidecar(metadata: &Metadata) -> StorageResult<Vec<u8>> {
    encode(metadata)
}

/// Encode a single metadata value as ASCII-only JSON.
///
/// Used where values travel as HTTP header text, e.g. S3 user metadata.
pub fn encode_value(value: &Value) -> StorageResult<String> {
    let bytes = encode(value)?;
    String::from_utf8(bytes)
        .map_err(|e| StorageError::UploadFailed(format!("Failed to encode metadata: {}", e)))
}

fn encode<T: Serialize + ?Sized>(value: &T) -> StorageResult<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SidecarFormatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| StorageError::UploadFailed(format!("Failed to encode metadata: {}", e)))?;
    Ok(out)
}

struct SidecarFormatter;

impl Formatter for SidecarFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut plain_from = 0;
        for (index, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[plain_from..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            plain_from = index + ch.len_utf8();
        }
        writer.write_all(fragment[plain_from..].as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_sidecar_name() {
        assert_eq!(sidecar_name("get.txt"), "get.txt.metadata.json");
    }

    #[test]
    fn test_encode_sidecar_layout() {
        let metadata = map(json!({"content_type": "text/plain", "filename": "get.txt"}));
        assert_eq!(
            encode_sidecar(&metadata).unwrap(),
            br#"{"content_type": "text/plain", "filename": "get.txt"}"#.to_vec()
        );
    }

    #[test]
    fn test_encode_sidecar_keeps_insertion_order_and_nesting() {
        let metadata = map(json!({"z": [1, 2], "a": {"b": null, "c": true}}));
        assert_eq!(
            String::from_utf8(encode_sidecar(&metadata).unwrap()).unwrap(),
            r#"{"z": [1, 2], "a": {"b": null, "c": true}}"#
        );
    }

    #[test]
    fn test_encode_sidecar_escapes_non_ascii() {
        let metadata = map(json!({"filename": "café 😀.txt", "note": "a\"b\n"}));
        assert_eq!(
            String::from_utf8(encode_sidecar(&metadata).unwrap()).unwrap(),
            r#"{"filename": "caf\u00e9 \ud83d\ude00.txt", "note": "a\"b\n"}"#
        );
    }

    #[test]
    fn test_upload_options_sets_reserved_keys() {
        let metadata = map(json!({"filename": "get.txt"}));
        let extra = map(json!({"content_type": "image/png", "acl": "private"}));

        let options = upload_options(Some(&metadata), Some(&extra), None).unwrap();
        assert_eq!(options.extra["meta_data"], json!({"filename": "get.txt"}));
        assert_eq!(options.extra["content_type"], json!(DEFAULT_CONTENT_TYPE));
        assert_eq!(options.extra["acl"], json!("private"));
        assert!(options.headers.is_empty());
    }

    #[test]
    fn test_upload_options_without_metadata_keeps_extra() {
        let extra = map(json!({"content_type": "image/png"}));
        let options = upload_options(None, Some(&extra), None).unwrap();
        assert_eq!(options.extra, extra);
    }

    #[test]
    fn test_upload_options_rejects_malformed_metadata() {
        let metadata = map(json!({"filename": 12}));
        assert!(matches!(
            upload_options(Some(&metadata), None, None),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[cfg(feature = "storage-local")]
    mod local {
        use super::*;
        use crate::LocalDriver;
        use std::sync::Arc;

        fn put(files: &Container, name: &str, body: &[u8], options: &UploadOptions) {
            upload(files, name, ContentSource::Reader(&mut &body[..]), options).unwrap();
        }

        fn container(root: &Path) -> Container {
            let driver = LocalDriver::new(root).unwrap();
            crate::StorageDriver::create_container(&driver, "files").unwrap();
            Container::new("files", Arc::new(driver))
        }

        #[test]
        fn test_sidecar_round_trip() {
            let temp = tempfile::tempdir().unwrap();
            let files = container(temp.path());
            let metadata = map(json!({"filename": "get.txt", "content_type": "text/plain"}));
            let options = upload_options(Some(&metadata), None, None).unwrap();

            put(&files, "get.txt", b"File saving worked", &options);

            let raw = std::fs::read(temp.path().join("files/get.txt.metadata.json")).unwrap();
            assert_eq!(raw, br#"{"filename": "get.txt", "content_type": "text/plain"}"#.to_vec());

            let info = fetch(&files, "get.txt").unwrap();
            assert_eq!(info.size, 18);
            assert_eq!(info.meta_data, metadata);
        }

        #[test]
        fn test_no_sidecar_without_metadata() {
            let temp = tempfile::tempdir().unwrap();
            let files = container(temp.path());

            for metadata in [None, Some(Metadata::new())] {
                let options = upload_options(metadata.as_ref(), None, None).unwrap();
                put(&files, "plain.txt", b"x", &options);
            }

            assert!(!temp.path().join("files/plain.txt.metadata.json").exists());
            assert!(fetch(&files, "plain.txt").unwrap().meta_data.is_empty());
        }

        #[test]
        fn test_delete_removes_sidecar_and_tolerates_missing_one() {
            let temp = tempfile::tempdir().unwrap();
            let files = container(temp.path());
            let metadata = map(json!({"filename": "a.txt"}));
            let options = upload_options(Some(&metadata), None, None).unwrap();

            put(&files, "a.txt", b"a", &options);
            put(&files, "b.txt", b"b", &UploadOptions::default());

            assert!(delete(&files, "a.txt").unwrap());
            assert!(delete(&files, "b.txt").unwrap());
            assert_eq!(std::fs::read_dir(temp.path().join("files")).unwrap().count(), 0);

            assert!(matches!(delete(&files, "a.txt"), Err(StorageError::NotFound(_))));
        }

        #[test]
        fn test_corrupt_sidecar() {
            let temp = tempfile::tempdir().unwrap();
            let files = container(temp.path());
            put(&files, "c.txt", b"c", &UploadOptions::default());
            std::fs::write(temp.path().join("files/c.txt.metadata.json"), b"[1, 2]").unwrap();

            assert!(matches!(
                fetch(&files, "c.txt"),
                Err(StorageError::CorruptMetadata { .. })
            ));
        }

        #[test]
        fn test_orphan_sidecar_kept_when_primary_upload_fails() {
            let temp = tempfile::tempdir().unwrap();
            let files = container(temp.path());
            let metadata = map(json!({"filename": "missing.txt"}));
            let options = upload_options(Some(&metadata), None, None).unwrap();

            let missing = temp.path().join("does-not-exist.bin");
            let result = upload(&files, "missing.txt", ContentSource::Path(&missing), &options);
            assert!(result.is_err());
            assert!(temp.path().join("files/missing.txt.metadata.json").exists());
        }
    }

    #[test]
    fn test_native_metadata_writes_no_sidecar() {
        let driver = crate::ObjectStoreDriver::memory().unwrap();
        crate::StorageDriver::create_container(&driver, "cloud").unwrap();
        let cloud = Container::new("cloud", std::sync::Arc::new(driver));

        let metadata = map(json!({"filename": "n.txt", "content_type": "text/plain"}));
        let options = upload_options(Some(&metadata), None, None).unwrap();
        upload(&cloud, "n.txt", ContentSource::Reader(&mut &b"native"[..]), &options).unwrap();

        assert!(cloud.get_object("n.txt.metadata.json").unwrap_err().is_not_found());
        let info = fetch(&cloud, "n.txt").unwrap();
        assert_eq!(info.meta_data, metadata);
        assert_eq!(info.extra["content_type"], json!("text/plain"));
    }
}
