/// Executable and directory discovery for the managed services.
///
/// Resolution is deliberately non-fatal: every lookup degrades to a
/// sensible fallback instead of blocking startup, so a missing venv or an
/// unpacked checkout only changes which binary is ultimately invoked.
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::BootstrapError;

/// Returns the first candidate accepted by the predicate.
pub fn first_existing<F>(candidates: &[PathBuf], exists: F) -> Option<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    candidates.iter().find(|candidate| exists(candidate)).cloned()
}

/// Interpreter for the backend service: isolated venv first, then the
/// system interpreter found on the search path.
pub fn resolve_backend_python(backend_dir: &Path) -> PathBuf {
    let candidates = [
        backend_dir.join("venv").join("Scripts").join("python.exe"),
        backend_dir.join(".venv").join("Scripts").join("python.exe"),
        backend_dir.join("venv").join("bin").join("python"),
        backend_dir.join(".venv").join("bin").join("python"),
    ];
    if let Some(found) = first_existing(&candidates, |path| path.exists()) {
        return found;
    }

    let fallback = system_python();
    warn!(
        "{}",
        BootstrapError::Resolution {
            service: "backend".to_string(),
            fallback: fallback.display().to_string(),
        }
    );
    fallback
}

fn system_python() -> PathBuf {
    for name in ["python3", "python"] {
        if let Ok(path) = which::which(name) {
            return path;
        }
    }
    // Nothing on the search path either; hand back a bare name and let
    // the spawn report the real error.
    PathBuf::from("python")
}

/// Backend working directory: packaged resources first, then the
/// development checkout layout next to the executable.
pub fn resolve_backend_dir(resource_dir: Option<&Path>, exe_dir: &Path) -> PathBuf {
    let mut candidates = Vec::new();
    if let Some(resources) = resource_dir {
        candidates.push(resources.join("backend"));
    }
    candidates.push(exe_dir.join("..").join("backend"));
    candidates.push(exe_dir.join("..").join("..").join("backend"));

    first_existing(&candidates, |path| path.exists())
        .unwrap_or_else(|| exe_dir.join("..").join("backend"))
}

/// Packaged single-file backend, if this build ships one.
pub fn resolve_bundled_backend(resource_dir: Option<&Path>, exe_dir: &Path) -> Option<PathBuf> {
    let exe_name = if cfg!(windows) {
        "pyyomi-backend.exe"
    } else {
        "pyyomi-backend"
    };
    let mut candidates = Vec::new();
    if let Some(resources) = resource_dir {
        candidates.push(resources.join("backend").join(exe_name));
    }
    candidates.push(exe_dir.join("..").join("backend").join("dist").join(exe_name));
    candidates.push(
        exe_dir
            .join("..")
            .join("..")
            .join("backend")
            .join("dist")
            .join(exe_name),
    );

    first_existing(&candidates, |path| path.exists())
}

/// Pre-built frontend bundle, when present instead of a live dev server.
pub fn resolve_frontend_dist(resource_dir: Option<&Path>, exe_dir: &Path) -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(resources) = resource_dir {
        candidates.push(resources.join("dist"));
    }
    candidates.push(exe_dir.join("dist"));
    candidates.push(exe_dir.join("..").join("frontend").join("dist"));

    first_existing(&candidates, |path| path.join("index.html").exists())
}

/// Development checkout of the frontend, identified by its package.json.
pub fn resolve_frontend_dev_dir(exe_dir: &Path) -> Option<PathBuf> {
    let candidates = [
        exe_dir.join("..").join("frontend"),
        exe_dir.join("..").join("..").join("frontend"),
    ];
    first_existing(&candidates, |path| path.join("package.json").exists())
}

pub fn npm_command() -> &'static str {
    if cfg!(windows) {
        "npm.cmd"
    } else {
        "npm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn first_existing_respects_candidate_order() {
        let candidates = vec![
            PathBuf::from("/a/one"),
            PathBuf::from("/a/two"),
            PathBuf::from("/a/three"),
        ];
        let found = first_existing(&candidates, |path| {
            path.ends_with("two") || path.ends_with("three")
        });
        assert_eq!(found, Some(PathBuf::from("/a/two")));
    }

    #[test]
    fn first_existing_returns_none_when_nothing_matches() {
        let candidates = vec![PathBuf::from("/a/one")];
        assert_eq!(first_existing(&candidates, |_| false), None);
    }

    #[test]
    fn venv_interpreter_wins_over_system_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let venv_bin = dir.path().join("venv").join("bin");
        fs::create_dir_all(&venv_bin).unwrap();
        let python = venv_bin.join("python");
        fs::write(&python, "").unwrap();

        #[cfg(unix)]
        assert_eq!(resolve_backend_python(dir.path()), python);
    }

    #[test]
    fn missing_venv_degrades_to_a_bare_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_backend_python(dir.path());
        // Either a search-path hit or the bare fallback name; never a
        // path inside the (empty) backend dir.
        assert!(!resolved.starts_with(dir.path()));
    }

    #[test]
    fn backend_dir_falls_back_to_sibling_checkout() {
        let exe_dir = PathBuf::from("/nonexistent/bin");
        let resolved = resolve_backend_dir(None, &exe_dir);
        assert_eq!(resolved, exe_dir.join("..").join("backend"));
    }

    #[test]
    fn frontend_dist_requires_an_index_document() {
        let dir = tempfile::tempdir().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(&dist).unwrap();
        // Empty dist does not count as a usable bundle.
        assert_eq!(resolve_frontend_dist(Some(dir.path()), dir.path()), None);

        fs::write(dist.join("index.html"), "<html></html>").unwrap();
        assert_eq!(
            resolve_frontend_dist(Some(dir.path()), dir.path()),
            Some(dist)
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn npm_command_is_plain_on_unix() {
        assert_eq!(npm_command(), "npm");
    }
}
