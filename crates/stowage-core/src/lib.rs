//! Stowage Core Library
//!
//! This crate provides the configuration schema, error types, and validation
//! shared by the storage layer and the HTTP surface.

pub mod config;
pub mod error;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError, DriverOptions, StorageEntry, StorageSetup};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::DriverKind;
