use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for the bootstrap sequence.
///
/// Only `WindowCreation` aborts the application. Everything else degrades:
/// the shell still comes up and connectivity problems surface inside the
/// UI's own request handling.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("no usable executable for {service}, falling back to {fallback}")]
    Resolution { service: String, fallback: String },

    #[error("failed to spawn {service}: {source}")]
    Spawn {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{service} did not confirm readiness within {timeout_ms}ms")]
    ReadinessTimeout { service: String, timeout_ms: u64 },

    #[error("asset not found: {0}")]
    AssetNotFound(PathBuf),

    #[error("failed to read asset {path}: {source}")]
    AssetRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid window url: {0}")]
    InvalidWindowUrl(String),

    #[error("failed to create main window: {0}")]
    WindowCreation(#[from] tauri::Error),
}
