//! Stowage API Library
//!
//! HTTP surface of the storage service: the download route, error rendering,
//! and application setup.

pub mod error;
pub mod handlers;
pub mod setup;
pub mod state;
mod telemetry;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
