mod app;
mod bootstrap;
mod bridge;
mod config;
mod error;
mod logging;
mod port_manager;
mod readiness;
mod resolver;
mod shutdown;
mod state;
mod static_server;
mod supervisor;

use tracing::{info, warn};

use crate::config::BootstrapConfig;
use crate::shutdown::ShutdownCoordinator;
use crate::state::AppState;

/// Panic path: signal whatever children are registered before the process
/// dies, so no orphaned backend keeps its port.
pub fn cleanup_on_panic() {
    if let Some(coordinator) = ShutdownCoordinator::installed() {
        coordinator.stop_all();
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("starting {} v{}", app::APP_NAME, app::APP_VERSION);

    let config = BootstrapConfig::default();
    let coordinator = ShutdownCoordinator::new(config.shutdown_grace());
    ShutdownCoordinator::install(coordinator.clone());

    let exit_coordinator = coordinator.clone();

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_shell::init())
        .manage(AppState::new(coordinator))
        .invoke_handler(tauri::generate_handler![
            bridge::get_app_path,
            bridge::restart_app,
            bridge::backend_url,
            bridge::platform,
            bridge::get_version,
            bridge::select_download_path,
        ])
        .on_page_load(|webview, payload| {
            if matches!(payload.event(), tauri::webview::PageLoadEvent::Finished) {
                // The window is built hidden and revealed only after the
                // first full load, so the user never sees a blank frame.
                let window = webview.window();
                if !window.is_visible().unwrap_or(true) {
                    if let Err(err) = window.show() {
                        warn!("failed to show window: {err}");
                    }
                    let _ = window.set_focus();
                }
            }
        })
        .setup(move |app| {
            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                bootstrap::run(handle, config).await;
            });
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("failed to build the application shell")
        .run(move |_app, event| match event {
            tauri::RunEvent::ExitRequested { .. } => {
                info!("exit requested, stopping managed services");
                exit_coordinator.stop_all();
            }
            tauri::RunEvent::Exit => {
                exit_coordinator.stop_all();
            }
            _ => {}
        });
}
