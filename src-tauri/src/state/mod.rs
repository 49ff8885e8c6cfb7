/// Application state shared with the Tauri command handlers.
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::shutdown::ShutdownCoordinator;
use crate::static_server::StaticAssetServer;

pub struct AppState {
    /// Resolved backend base URL. Write-once: set by the bootstrap after
    /// the backend supervisor finishes, read-only from then on.
    backend_url: OnceCell<String>,
    coordinator: Arc<ShutdownCoordinator>,
    /// Keeps the static asset fallback alive for the process lifetime.
    static_server: Mutex<Option<StaticAssetServer>>,
}

impl AppState {
    pub fn new(coordinator: Arc<ShutdownCoordinator>) -> Self {
        Self {
            backend_url: OnceCell::new(),
            coordinator,
            static_server: Mutex::new(None),
        }
    }

    /// First write wins; later writes are ignored.
    pub fn set_backend_url(&self, url: String) {
        if self.backend_url.set(url).is_err() {
            tracing::warn!("backend url already set; ignoring second write");
        }
    }

    pub fn backend_url(&self) -> Option<String> {
        self.backend_url.get().cloned()
    }

    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.coordinator.clone()
    }

    pub fn keep_static_server(&self, server: StaticAssetServer) {
        *self.static_server.lock() = Some(server);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn backend_url_is_write_once() {
        let state = AppState::new(ShutdownCoordinator::new(Duration::from_secs(1)));
        assert_eq!(state.backend_url(), None);

        state.set_backend_url("http://127.0.0.1:8000".to_string());
        state.set_backend_url("http://127.0.0.1:9999".to_string());
        assert_eq!(
            state.backend_url().as_deref(),
            Some("http://127.0.0.1:8000")
        );
    }
}
