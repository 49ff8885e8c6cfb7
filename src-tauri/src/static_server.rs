/// Minimal HTTP file server for the pre-built frontend bundle. Stands in
/// when no live dev server is available.
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::BootstrapError;

pub struct StaticAssetServer {
    addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl StaticAssetServer {
    /// Binds to `127.0.0.1:port` (0 picks an ephemeral port) and serves
    /// files under `root` until shut down or dropped.
    pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let addr = listener.local_addr()?;

        let app = Router::new()
            .fallback(serve_asset)
            .with_state(Arc::new(root));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!("static asset server exited: {}", e);
            }
        });

        info!("static asset server listening on http://{}", addr);
        Ok(Self {
            addr,
            shutdown: Some(tx),
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stops accepting connections. In-flight requests run to completion.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for StaticAssetServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve_asset(
    State(root): State<Arc<PathBuf>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Some(path) = resolve_asset_path(&root, uri.path()) else {
        debug!(
            "{}",
            BootstrapError::AssetNotFound(root.join(uri.path().trim_start_matches('/')))
        );
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = content_type_for(&path);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "Not Found").into_response()
        }
        Err(e) => {
            warn!("{}", BootstrapError::AssetRead { path, source: e });
            (StatusCode::INTERNAL_SERVER_ERROR, "Server Error").into_response()
        }
    }
}

/// Maps a request path to a file under `root`, refusing anything that
/// resolves outside it. `/` maps to the index document. Directories are
/// never listed.
fn resolve_asset_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    let relative = if trimmed.is_empty() { "index.html" } else { trimmed };

    let root = root.canonicalize().ok()?;
    let resolved = root.join(relative).canonicalize().ok()?;
    if !resolved.starts_with(&root) || resolved.is_dir() {
        return None;
    }
    Some(resolved)
}

/// Fixed extension table; unknown extensions get a generic binary type.
fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html",
        Some("js") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}
