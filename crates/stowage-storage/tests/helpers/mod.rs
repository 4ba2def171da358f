//! Test helpers: temp-dir backed storage setups.

use std::path::{Path, PathBuf};
use stowage_core::{DriverKind, DriverOptions, StorageSetup};
use stowage_storage::StorageService;
use tempfile::TempDir;

/// Two local storages, `files` (default) and `images`, sharing one root.
pub struct TestStorage {
    pub temp_dir: TempDir,
    pub base_path: PathBuf,
    pub service: StorageService,
}

impl TestStorage {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let base_path = temp_dir.path().join("fixtures");
        let key = base_path.to_string_lossy().to_string();

        let setup = StorageSetup::new()
            .with_storage("files", DriverKind::Local, DriverOptions::new(key.clone()))
            .with_storage("images", DriverKind::Local, DriverOptions::new(key));
        let service = StorageService::from_setup(&setup).expect("Failed to configure storages");

        Self {
            temp_dir,
            base_path,
            service,
        }
    }

    pub fn container_dir(&self, storage: &str) -> PathBuf {
        self.base_path.join(storage)
    }
}

impl Default for TestStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorted file names directly inside `dir`.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Service over a single in-memory storage named `cloud`.
pub fn memory_service() -> StorageService {
    let setup = StorageSetup::new()
        .with_storage("cloud", DriverKind::Memory, DriverOptions::new("cloud"));
    StorageService::from_setup(&setup).expect("Failed to configure memory storage")
}
