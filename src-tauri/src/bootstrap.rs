/// Startup orchestration: backend first, then frontend, then the window.
///
/// Readiness failures degrade rather than abort. A backend that never
/// answers its health check still gets a window pointed at it so the UI
/// can render its own error state. Only window creation itself is fatal.
use std::sync::Arc;

use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_shell::ShellExt;
use tracing::{error, info, warn};

use crate::bridge;
use crate::config::{BootstrapConfig, BACKEND_URL_ENV, DISABLE_CONSOLE_LOG_ENV, NO_BROWSER_ENV};
use crate::error::BootstrapError;
use crate::logging;
use crate::port_manager;
use crate::resolver;
use crate::state::AppState;
use crate::static_server::StaticAssetServer;
use crate::supervisor::{ReadinessProbe, ReadyResult, ServiceSpec, ServiceSupervisor};

pub async fn run(app: AppHandle, config: BootstrapConfig) {
    logging::append_startup_log("bootstrap starting");

    let backend_url = start_backend(&app, &config).await;
    if let Some(url) = &backend_url {
        // Mirrored into the environment so the frontend dev server and any
        // child tooling see the same URL the webview does.
        std::env::set_var(BACKEND_URL_ENV, url);
        let state = app.state::<AppState>();
        state.set_backend_url(url.clone());
    }

    let frontend_url = start_frontend(&app, &config).await;

    if let Err(err) = create_main_window(&app, backend_url.as_deref(), &frontend_url) {
        error!("fatal: {err}");
        logging::append_startup_log(&format!("fatal: {err}"));
        std::process::exit(1);
    }
}

/// Spawns the backend and waits for its health endpoint. Returns the base
/// URL when a backend process was launched at all, even if readiness later
/// timed out.
async fn start_backend(app: &AppHandle, config: &BootstrapConfig) -> Option<String> {
    let port = match port_manager::find_available_port(config.backend.port_range) {
        Some(port) => port,
        None => {
            warn!(
                "no free backend port in {}..={}, continuing without a backend",
                config.backend.port_range.0, config.backend.port_range.1
            );
            return None;
        }
    };
    let base_url = format!("http://127.0.0.1:{port}");
    let health_url = format!("{base_url}{}", config.backend.health_path);

    let resource_dir = app.path().resource_dir().ok();
    let spec = backend_spec(config, port, &health_url, resource_dir.as_deref(), &exe_dir());

    let supervisor = Arc::new(ServiceSupervisor::new("backend"));
    let state = app.state::<AppState>();
    state.coordinator().register(supervisor.clone());

    if let Err(err) = supervisor.start(&spec) {
        warn!("backend refused to start: {err}");
        return Some(base_url);
    }

    match supervisor.await_ready(&spec).await {
        ReadyResult::Ready => info!("backend ready at {base_url}"),
        ReadyResult::TimedOut => {
            warn!("backend not healthy within budget, continuing anyway");
            logging::append_startup_log("backend readiness timed out");
        }
        ReadyResult::Failed => {
            warn!("backend exited or failed to spawn, continuing anyway");
            logging::append_startup_log("backend failed to start");
        }
    }
    Some(base_url)
}

/// Prefers a bundled single-binary backend, falls back to running the
/// source tree under a resolved Python interpreter. Resolution never
/// fails outright; a bad guess surfaces as a soft spawn failure instead.
fn backend_spec(
    config: &BootstrapConfig,
    port: u16,
    health_url: &str,
    resource_dir: Option<&std::path::Path>,
    exe_dir: &std::path::Path,
) -> ServiceSpec {
    let probe = ReadinessProbe::Http {
        url: health_url.to_string(),
        interval: config.backend.health_poll_interval(),
    };
    let timeout = config.backend.ready_timeout();
    let env = vec![(DISABLE_CONSOLE_LOG_ENV.to_string(), "1".to_string())];

    if let Some(binary) = resolver::resolve_bundled_backend(resource_dir, exe_dir) {
        let data_dir = crate::config::data_dir();
        return ServiceSpec {
            name: "backend".to_string(),
            command: binary,
            args: vec![
                "--port".to_string(),
                port.to_string(),
                "--data-dir".to_string(),
                data_dir.to_string_lossy().to_string(),
            ],
            cwd: None,
            env,
            probe,
            timeout,
        };
    }

    let backend_dir = resolver::resolve_backend_dir(resource_dir, exe_dir);
    let python = resolver::resolve_backend_python(&backend_dir);
    ServiceSpec {
        name: "backend".to_string(),
        command: python,
        args: vec![
            "-m".to_string(),
            "uvicorn".to_string(),
            "app.main:app".to_string(),
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            port.to_string(),
        ],
        cwd: Some(backend_dir),
        env,
        probe,
        timeout,
    }
}

fn exe_dir() -> std::path::PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}

/// Serves a built frontend bundle when one exists, otherwise runs the dev
/// server. Either way the window loads the same local URL.
async fn start_frontend(app: &AppHandle, config: &BootstrapConfig) -> String {
    let url = format!("http://127.0.0.1:{}", config.frontend.port);
    let resource_dir = app.path().resource_dir().ok();

    if let Some(dist) = resolver::resolve_frontend_dist(resource_dir.as_deref(), &exe_dir()) {
        match StaticAssetServer::serve(dist, config.frontend.port).await {
            Ok(server) => {
                info!("serving frontend bundle at {}", server.url());
                let state = app.state::<AppState>();
                state.keep_static_server(server);
                return url;
            }
            Err(err) => warn!("static server failed to bind: {err}"),
        }
    }

    if let Some(dev_dir) = resolver::resolve_frontend_dev_dir(&exe_dir()) {
        let spec = ServiceSpec {
            name: "frontend".to_string(),
            command: std::path::PathBuf::from(resolver::npm_command()),
            args: vec![
                "run".to_string(),
                "dev".to_string(),
                "--".to_string(),
                "--host".to_string(),
                "127.0.0.1".to_string(),
                "--port".to_string(),
                config.frontend.port.to_string(),
            ],
            cwd: Some(dev_dir),
            env: vec![(NO_BROWSER_ENV.to_string(), "none".to_string())],
            probe: ReadinessProbe::StdoutMarker {
                marker: config.frontend.ready_marker.clone(),
            },
            timeout: config.frontend.ready_timeout(),
        };

        let supervisor = Arc::new(ServiceSupervisor::new("frontend"));
        let state = app.state::<AppState>();
        state.coordinator().register(supervisor.clone());

        if let Err(err) = supervisor.start(&spec) {
            warn!("frontend dev server refused to start: {err}");
            return url;
        }
        match supervisor.await_ready(&spec).await {
            ReadyResult::Ready => info!("frontend dev server ready at {url}"),
            ReadyResult::TimedOut => {
                warn!("frontend dev server not ready within budget, continuing anyway")
            }
            ReadyResult::Failed => warn!("frontend dev server failed, continuing anyway"),
        }
        return url;
    }

    warn!("no frontend bundle or dev source found, window will load {url} blind");
    url
}

/// Builds the main window hidden. It is revealed by the page-load handler
/// once the first paint is done, so users never see a white flash.
fn create_main_window(
    app: &AppHandle,
    backend_url: Option<&str>,
    frontend_url: &str,
) -> Result<(), BootstrapError> {
    let url: tauri::Url = frontend_url
        .parse()
        .map_err(|_| BootstrapError::InvalidWindowUrl(frontend_url.to_string()))?;

    let script = bridge::init_script(
        backend_url,
        std::env::consts::OS,
        app.package_info().version.to_string().as_str(),
    );

    let shell_app = app.clone();
    WebviewWindowBuilder::new(app, "main", WebviewUrl::External(url))
        .title("PyYomi")
        .inner_size(1200.0, 800.0)
        .min_inner_size(800.0, 600.0)
        .visible(false)
        .initialization_script(&script)
        .on_navigation(move |url| {
            if is_external(url) {
                info!("redirecting external navigation to the system browser: {url}");
                let _ = shell_app.shell().open(url.as_str(), None);
                return false;
            }
            true
        })
        .build()?;

    info!("main window created, loading {frontend_url}");
    Ok(())
}

/// External means any http(s) destination that is not our own loopback
/// frontend. Non-http schemes stay inside the webview.
fn is_external(url: &tauri::Url) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }
    !matches!(url.host_str(), Some("127.0.0.1") | Some("localhost"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_navigation_stays_in_the_window() {
        let url: tauri::Url = "http://127.0.0.1:3000/reader/42".parse().unwrap();
        assert!(!is_external(&url));
        let url: tauri::Url = "http://localhost:3000/".parse().unwrap();
        assert!(!is_external(&url));
    }

    #[test]
    fn remote_http_links_open_externally() {
        let url: tauri::Url = "https://example.com/manga".parse().unwrap();
        assert!(is_external(&url));
    }

    #[test]
    fn non_http_schemes_are_not_redirected() {
        let url: tauri::Url = "tauri://localhost/index.html".parse().unwrap();
        assert!(!is_external(&url));
    }
}
