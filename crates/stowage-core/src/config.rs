//! Configuration module
//!
//! This module provides the storage setup schema (named storages bound to a
//! driver and its options) and the process-level configuration read from the
//! environment.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::storage_types::DriverKind;

const SERVER_PORT: u16 = 4000;

/// Storage configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("At least one storage setup is required in storages")]
    NoStorages,

    #[error("storages must have a '{0}' as key")]
    UnknownDefault(String),

    #[error("Driver options for '{0}' storage must have a `key` option")]
    MissingDriverKey(String),

    #[error("Storage '{0}' is configured more than once")]
    DuplicateStorage(String),

    #[error("Invalid storage configuration: {0}")]
    Invalid(String),
}

/// Free-form driver options. Every driver requires a `key` entry; its meaning is
/// driver specific (root directory for local storage, access key for S3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverOptions(Map<String, Value>);

impl DriverOptions {
    pub fn new(key: impl Into<String>) -> Self {
        let mut options = Map::new();
        options.insert("key".to_string(), Value::String(key.into()));
        DriverOptions(options)
    }

    /// Add or replace an option.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.get_str("key")
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for DriverOptions {
    fn from(map: Map<String, Value>) -> Self {
        DriverOptions(map)
    }
}

/// One named storage: driver variant plus its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    #[serde(skip)]
    pub name: String,
    pub driver: DriverKind,
    #[serde(default)]
    pub options: DriverOptions,
}

/// Storage setup: the ordered set of named storages and the default one.
///
/// Insertion order matters: without an explicit `default`, the first configured
/// storage is the default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StorageSetup {
    #[serde(default)]
    pub default: Option<String>,
    #[serde(deserialize_with = "deserialize_storages")]
    pub storages: Vec<StorageEntry>,
}

impl StorageSetup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a storage; order of calls is the configuration order.
    pub fn with_storage(
        mut self,
        name: impl Into<String>,
        driver: DriverKind,
        options: DriverOptions,
    ) -> Self {
        self.storages.push(StorageEntry {
            name: name.into(),
            driver,
            options,
        });
        self
    }

    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default = Some(name.into());
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Validate the setup and return the resolved default storage name.
    pub fn validate(&self) -> Result<&str, ConfigError> {
        let first = self.storages.first().ok_or(ConfigError::NoStorages)?;

        for (index, entry) in self.storages.iter().enumerate() {
            if self.storages[..index].iter().any(|e| e.name == entry.name) {
                return Err(ConfigError::DuplicateStorage(entry.name.clone()));
            }
            if entry.options.key().is_none() {
                return Err(ConfigError::MissingDriverKey(entry.name.clone()));
            }
        }

        match self.default.as_deref().filter(|name| !name.is_empty()) {
            Some(default) => self
                .storages
                .iter()
                .find(|e| e.name == default)
                .map(|e| e.name.as_str())
                .ok_or_else(|| ConfigError::UnknownDefault(default.to_string())),
            None => Ok(first.name.as_str()),
        }
    }
}

/// Deserialize the `storages` JSON object into a vector, keeping document order.
fn deserialize_storages<'de, D>(deserializer: D) -> Result<Vec<StorageEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StoragesVisitor;

    impl<'de> Visitor<'de> for StoragesVisitor {
        type Value = Vec<StorageEntry>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map of storage name to driver setup")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut storages = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, mut entry)) = access.next_entry::<String, StorageEntry>()? {
                entry.name = name;
                storages.push(entry);
            }
            Ok(storages)
        }
    }

    deserializer.deserialize_map(StoragesVisitor)
}

/// Process configuration for the HTTP service
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub environment: String,
    pub storage_config_path: PathBuf,
    /// Overrides the `default` of the storage config file when set.
    pub storage_default: Option<String>,
    pub download_route_enabled: bool,
    /// Emit JSON log lines instead of the compact console format.
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let server_port = env::var("PORT")
            .unwrap_or_else(|_| SERVER_PORT.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?;

        let storage_config_path = env::var("STORAGE_CONFIG_PATH")
            .map(PathBuf::from)
            .map_err(|_| anyhow::anyhow!("STORAGE_CONFIG_PATH must be set"))?;

        let storage_default = env::var("STORAGE_DEFAULT")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let download_route_disabled = env::var("STORAGE_DISABLE_DOWNLOAD_ROUTE")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            .parse()
            .unwrap_or(false);

        let log_json = env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(AppConfig {
            server_port,
            environment,
            storage_config_path,
            storage_default,
            download_route_enabled: !download_route_disabled,
            log_json,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Read the storage setup file and apply the environment default override.
    pub fn load_storage_setup(&self) -> Result<StorageSetup, ConfigError> {
        let mut setup = StorageSetup::from_path(&self.storage_config_path)?;
        if let Some(default) = &self.storage_default {
            setup.default = Some(default.clone());
        }
        setup.validate()?;
        Ok(setup)
    }
}
