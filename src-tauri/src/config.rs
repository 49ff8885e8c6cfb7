use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Env var carrying the resolved backend base URL into the UI process.
/// Set before any window content loads.
pub const BACKEND_URL_ENV: &str = "PYYOMI_BACKEND_URL";

/// Quiets the backend's own console logging; its stdio is captured by the
/// supervisor instead.
pub const DISABLE_CONSOLE_LOG_ENV: &str = "PYYOMI_DISABLE_CONSOLE_LOG";

/// Suppresses the dev server's auto-browser-launch behavior.
pub const NO_BROWSER_ENV: &str = "BROWSER";

/// Bootstrap configuration for the desktop shell.
///
/// Everything the startup sequence needs to know about ports, readiness
/// budgets, and shutdown behavior. Built once at launch from defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub backend: BackendConfig,
    pub frontend: FrontendConfig,

    /// Grace period granted to children on shutdown before they are
    /// abandoned to OS cleanup.
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Inclusive port range probed for the backend bind.
    pub port_range: (u16, u16),

    /// Path polled for readiness, relative to the backend base URL.
    pub health_path: String,

    pub ready_timeout_ms: u64,
    pub health_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    pub port: u16,

    /// Substring expected in the dev server's stdout once it is serving.
    pub ready_marker: String,

    pub ready_timeout_ms: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                port_range: (8000, 8100),
                health_path: "/health".to_string(),
                ready_timeout_ms: 20_000,
                health_poll_interval_ms: 500,
            },
            frontend: FrontendConfig {
                port: 3000,
                ready_marker: "Local:".to_string(),
                ready_timeout_ms: 30_000,
            },
            shutdown_grace_ms: 3_000,
        }
    }
}

impl BootstrapConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl BackendConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms)
    }
}

impl FrontendConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Writable data directory handed to the backend via `--data-dir`.
pub fn data_dir() -> PathBuf {
    base_dir().join("data")
}

/// Directory for the startup log file.
pub fn logs_dir() -> PathBuf {
    base_dir().join("logs")
}

fn base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(crate::app::APP_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budgets_match_launch_contract() {
        let config = BootstrapConfig::default();
        assert_eq!(config.backend.port_range, (8000, 8100));
        assert_eq!(config.backend.health_path, "/health");
        assert_eq!(config.backend.ready_timeout(), Duration::from_secs(20));
        assert_eq!(config.frontend.port, 3000);
        assert_eq!(config.frontend.ready_timeout(), Duration::from_secs(30));
        assert!(config.shutdown_grace() > Duration::ZERO);
    }

    #[test]
    fn data_and_log_dirs_share_a_base() {
        assert_eq!(data_dir().parent(), logs_dir().parent());
    }
}
