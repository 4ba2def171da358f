//! Object addressing
//!
//! Objects are addressed as `<storage>/<object_id>` or, against the default
//! storage, as a bare `<object_id>`.

use crate::traits::{StorageError, StorageResult};

/// Separator between the storage name and the object id
pub const PATH_SEPARATOR: char = '/';

/// A path resolved against the registry's default storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    pub storage: String,
    pub object_id: String,
}

/// Split `path` into storage name and object id.
///
/// Anything other than one or two non-empty segments is an `InvalidPath`.
pub fn resolve(path: &str, default_storage: &str) -> StorageResult<ObjectPath> {
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();

    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(StorageError::InvalidPath(format!(
            "'{}' contains an empty segment",
            path
        )));
    }

    match segments.as_slice() {
        [object_id] => Ok(ObjectPath {
            storage: default_storage.to_string(),
            object_id: object_id.to_string(),
        }),
        [storage, object_id] => Ok(ObjectPath {
            storage: storage.to_string(),
            object_id: object_id.to_string(),
        }),
        _ => Err(StorageError::InvalidPath(format!(
            "'{}' must be <object_id> or <storage>/<object_id>",
            path
        ))),
    }
}
