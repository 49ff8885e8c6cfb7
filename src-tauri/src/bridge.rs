/// The capability surface exposed to the UI sandbox.
///
/// A fixed allow-list, not a general RPC mechanism: each command is a
/// pre-approved, parameter-validated operation. Nothing here can spawn
/// processes or touch arbitrary files on the sandbox's behalf.
use tauri::{AppHandle, Manager, State};
use tauri_plugin_dialog::DialogExt;
use tracing::info;

use crate::state::AppState;

/// Reported when the real version cannot be determined.
const FALLBACK_VERSION: &str = "1.0.0";

/// Every command reachable from the webview. Anything not listed here is
/// not part of the bridge contract.
pub const BRIDGE_COMMANDS: &[&str] = &[
    "get_app_path",
    "restart_app",
    "backend_url",
    "platform",
    "get_version",
    "select_download_path",
];

/// The application's installation path.
#[tauri::command]
pub fn get_app_path(app: AppHandle) -> Result<String, String> {
    if let Ok(dir) = app.path().resource_dir() {
        return Ok(dir.to_string_lossy().to_string());
    }
    let exe = std::env::current_exe().map_err(|e| e.to_string())?;
    let dir = exe.parent().map(|p| p.to_path_buf()).unwrap_or(exe);
    Ok(dir.to_string_lossy().to_string())
}

/// Fire-and-forget relaunch of the whole application.
#[tauri::command]
pub fn restart_app(app: AppHandle) {
    info!("restart requested from the UI");
    app.request_restart();
}

/// The resolved backend base URL, or None when the backend never came up.
#[tauri::command]
pub fn backend_url(state: State<'_, AppState>) -> Option<String> {
    state.backend_url()
}

#[tauri::command]
pub fn platform() -> String {
    std::env::consts::OS.to_string()
}

#[tauri::command]
pub fn get_version(app: AppHandle) -> String {
    let version = app.package_info().version.to_string();
    if version.is_empty() {
        FALLBACK_VERSION.to_string()
    } else {
        version
    }
}

/// Directory picker for the download location setting. Returns None when
/// the user cancels.
#[tauri::command]
pub async fn select_download_path(app: AppHandle) -> Result<Option<String>, String> {
    let folder = app.dialog().file().blocking_pick_folder();
    Ok(folder.map(|path| path.to_string()))
}

/// Script injected at window creation. Exposes the same surface the UI
/// already consumes: a read-only backend URL plus the allow-listed calls
/// above.
pub fn init_script(backend_url: Option<&str>, platform: &str, version: &str) -> String {
    let backend = serde_json::to_string(&backend_url).unwrap_or_else(|_| "null".to_string());
    let platform = serde_json::to_string(platform).unwrap_or_else(|_| "\"\"".to_string());
    let version = serde_json::to_string(version)
        .unwrap_or_else(|_| format!("\"{}\"", FALLBACK_VERSION));

    format!(
        r#"
window.__BACKEND_URL__ = {backend};
window.electronAPI = {{
  backendUrl: {backend},
  platform: {platform},
  getAppPath: () => window.__TAURI__.core.invoke('get_app_path'),
  restartApp: () => {{ window.__TAURI__.core.invoke('restart_app'); }},
  selectDownloadPath: () => window.__TAURI__.core.invoke('select_download_path'),
  getVersion: () => {version},
}};
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_surface_is_a_fixed_allow_list() {
        assert_eq!(BRIDGE_COMMANDS.len(), 6);
        // No operation on the surface grants process or filesystem
        // access to the sandbox.
        for forbidden in ["spawn", "exec", "shell", "kill", "read_file", "write_file"] {
            assert!(
                BRIDGE_COMMANDS.iter().all(|c| !c.contains(forbidden)),
                "bridge must not expose {forbidden}"
            );
        }
    }

    #[test]
    fn init_script_exposes_the_backend_url() {
        let script = init_script(Some("http://127.0.0.1:8000"), "linux", "0.2.0");
        assert!(script.contains(r#"window.__BACKEND_URL__ = "http://127.0.0.1:8000""#));
        assert!(script.contains("get_app_path"));
        assert!(script.contains(r#""linux""#));
    }

    #[test]
    fn init_script_handles_an_absent_backend() {
        let script = init_script(None, "linux", "0.2.0");
        assert!(script.contains("window.__BACKEND_URL__ = null"));
    }
}
