use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

static BROKEN_PIPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(BrokenPipeError|broken pipe|EPIPE)").unwrap());

/// True for stderr noise produced when a pipe closes mid-write. The
/// backend emits these during shutdown; they are not real failures.
pub fn is_broken_pipe(text: &str) -> bool {
    BROKEN_PIPE.is_match(text)
}

/// Appends a timestamped line to the startup log file.
///
/// Best-effort: logging must never take the bootstrap down.
pub fn append_startup_log(line: &str) {
    let dir = crate::config::logs_dir();
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(startup_log_path())
    {
        let _ = writeln!(file, "[{}] {}", Utc::now().to_rfc3339(), line);
    }
}

pub fn startup_log_path() -> PathBuf {
    crate::config::logs_dir().join("desktop-main.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_pipe_variants_are_recognized() {
        assert!(is_broken_pipe(
            "BrokenPipeError: [Errno 32] Broken pipe"
        ));
        assert!(is_broken_pipe("write EPIPE"));
        assert!(is_broken_pipe("warning: BROKEN PIPE on stdout"));
    }

    #[test]
    fn ordinary_stderr_is_not_filtered() {
        assert!(!is_broken_pipe("Traceback (most recent call last):"));
        assert!(!is_broken_pipe(""));
    }
}
