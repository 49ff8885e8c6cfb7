/// Child process lifecycle: spawn -> monitor -> terminate.
///
/// One `ServiceSupervisor` per logical service. The supervisor is the
/// only writer of its `ServiceHandle`; everything else sees snapshots.
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::error::BootstrapError;
use crate::logging;
use crate::readiness::{self, MarkerDetector, Verdict};

/// Cap on the diagnostic output buffer kept per service.
const RECENT_OUTPUT_CAP: usize = 16 * 1024;

/// Immutable description of one managed service, built once at bootstrap.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub probe: ReadinessProbe,
    pub timeout: Duration,
}

/// How readiness is detected for a service.
#[derive(Debug, Clone)]
pub enum ReadinessProbe {
    /// Poll an HTTP endpoint until it answers.
    Http { url: String, interval: Duration },
    /// Watch stdout for a marker substring. Kept for services without a
    /// liveness endpoint.
    StdoutMarker { marker: String },
}

/// Lifecycle of a managed child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    Starting,
    Ready,
    TimedOut,
    Failed,
    Stopped,
}

impl ServiceState {
    /// Terminal states permit a new spawn for the same logical service.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ServiceState::TimedOut | ServiceState::Failed | ServiceState::Stopped
        )
    }
}

/// Outcome of `await_ready`. None of these abort the bootstrap; the
/// window is created regardless and the UI surfaces connection errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyResult {
    /// The service confirmed readiness within budget.
    Ready,
    /// The budget elapsed; the caller proceeds anyway.
    TimedOut,
    /// The process never started.
    Failed,
}

/// Mutable record for one spawned process. Mutated only through the
/// owning supervisor.
pub struct ServiceHandle {
    pub name: String,
    pub pid: Option<u32>,
    state: Mutex<ServiceState>,
    child: Mutex<Option<Child>>,
    recent_output: Mutex<String>,
    signalled: AtomicBool,
}

impl ServiceHandle {
    fn new(name: String, pid: Option<u32>) -> Self {
        Self {
            name,
            pid,
            state: Mutex::new(ServiceState::Starting),
            child: Mutex::new(None),
            recent_output: Mutex::new(String::new()),
            signalled: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    fn set_state(&self, next: ServiceState) {
        *self.state.lock() = next;
    }

    /// Recent stdout/stderr, capped, for diagnostics only.
    pub fn recent_output(&self) -> String {
        self.recent_output.lock().clone()
    }

    fn push_output(&self, line: &str) {
        let mut buffer = self.recent_output.lock();
        buffer.push_str(line);
        buffer.push('\n');
        if buffer.len() > RECENT_OUTPUT_CAP {
            let mut excess = buffer.len() - RECENT_OUTPUT_CAP;
            while !buffer.is_char_boundary(excess) {
                excess += 1;
            }
            buffer.drain(..excess);
        }
    }

    fn attach_child(&self, child: Child) {
        *self.child.lock() = Some(child);
    }

    /// Whether the graceful termination signal has been sent.
    pub fn signalled(&self) -> bool {
        self.signalled.load(Ordering::Acquire)
    }

    /// Sends one graceful termination signal; repeated calls are no-ops.
    /// Does not wait for the process to exit.
    pub fn terminate(&self) {
        if self.signalled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pid) = self.pid {
            info!("stopping {} (pid {})", self.name, pid);

            #[cfg(windows)]
            {
                // Kill the whole tree; npm leaves orphaned children
                // otherwise.
                let _ = std::process::Command::new("taskkill")
                    .args(["/PID", &pid.to_string(), "/T", "/F"])
                    .output();
            }

            #[cfg(unix)]
            {
                let _ = std::process::Command::new("kill")
                    .args(["-TERM", &pid.to_string()])
                    .output();
            }
        }
        self.set_state(ServiceState::Stopped);
    }

    /// Non-blocking: true when the child has exited (and was reaped) or
    /// was never attached.
    pub fn try_reap(&self) -> bool {
        let mut guard = self.child.lock();
        match guard.as_mut() {
            None => true,
            Some(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    info!("{} exited with {}", self.name, status);
                    *guard = None;
                    true
                }
                Ok(None) => false,
                Err(_) => true,
            },
        }
    }
}

/// Owns the spawn -> monitor -> terminate lifecycle for one service.
pub struct ServiceSupervisor {
    name: String,
    handle: Mutex<Option<Arc<ServiceHandle>>>,
    marker_watch: Mutex<Option<(Arc<MarkerDetector>, oneshot::Receiver<Verdict>)>>,
}

impl ServiceSupervisor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: Mutex::new(None),
            marker_watch: Mutex::new(None),
        }
    }

    /// Spawns the service and returns immediately with a handle in
    /// `Starting`. A spawn error yields a handle already in `Failed`
    /// rather than an `Err`, so the caller's startup sequence continues;
    /// only violating the one-live-handle invariant is an error.
    pub fn start(&self, spec: &ServiceSpec) -> anyhow::Result<Arc<ServiceHandle>> {
        {
            let guard = self.handle.lock();
            if let Some(existing) = guard.as_ref() {
                if !existing.state().is_terminal() {
                    anyhow::bail!(
                        "service {} already has a live handle (state {:?})",
                        self.name,
                        existing.state()
                    );
                }
            }
        }

        let detector = match &spec.probe {
            ReadinessProbe::StdoutMarker { marker } => {
                let (detector, rx) = MarkerDetector::new(marker.clone());
                let detector = Arc::new(detector);
                *self.marker_watch.lock() = Some((detector.clone(), rx));
                Some(detector)
            }
            ReadinessProbe::Http { .. } => None,
        };

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        // Hide the child's console window.
        #[cfg(windows)]
        cmd.creation_flags(0x0800_0000);

        match cmd.spawn() {
            Ok(mut child) => {
                let pid = child.id();
                info!("{} spawned (pid {:?})", spec.name, pid);
                logging::append_startup_log(&format!(
                    "[{}] spawned: {} {}",
                    spec.name,
                    spec.command.display(),
                    spec.args.join(" ")
                ));

                let handle = Arc::new(ServiceHandle::new(spec.name.clone(), pid));

                if let Some(stdout) = child.stdout.take() {
                    let handle = handle.clone();
                    let detector = detector.clone();
                    let name = spec.name.clone();
                    tokio::spawn(async move {
                        let mut lines = BufReader::new(stdout).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            info!("[{}] {}", name, line);
                            handle.push_output(&line);
                            if let Some(detector) = &detector {
                                detector.observe(&line);
                            }
                        }
                    });
                }

                if let Some(stderr) = child.stderr.take() {
                    let handle = handle.clone();
                    let name = spec.name.clone();
                    tokio::spawn(async move {
                        let mut lines = BufReader::new(stderr).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            if logging::is_broken_pipe(&line) {
                                warn!("[{}] stream warning ignored: {}", name, line);
                                continue;
                            }
                            error!("[{}] {}", name, line);
                            handle.push_output(&line);
                        }
                    });
                }

                handle.attach_child(child);
                *self.handle.lock() = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                let err = BootstrapError::Spawn {
                    service: spec.name.clone(),
                    source: e,
                };
                error!("{}", err);
                logging::append_startup_log(&format!("[{}] {}", spec.name, err));

                let handle = Arc::new(ServiceHandle::new(spec.name.clone(), None));
                handle.set_state(ServiceState::Failed);
                // Resolve any pending marker watch so await_ready returns
                // promptly.
                if let Some(detector) = detector {
                    detector.expire();
                }
                *self.handle.lock() = Some(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Suspends until readiness is confirmed or `spec.timeout` elapses.
    /// Resolves exactly once per start. Timeout is not failure: the
    /// caller proceeds either way.
    pub async fn await_ready(&self, spec: &ServiceSpec) -> ReadyResult {
        let handle = self.handle.lock().clone();
        let Some(handle) = handle else {
            return ReadyResult::Failed;
        };
        if handle.state() == ServiceState::Failed {
            return ReadyResult::Failed;
        }

        let result = match &spec.probe {
            ReadinessProbe::Http { url, interval } => {
                if readiness::poll_health(url, spec.timeout, *interval).await {
                    ReadyResult::Ready
                } else {
                    ReadyResult::TimedOut
                }
            }
            ReadinessProbe::StdoutMarker { .. } => {
                let watch = self.marker_watch.lock().take();
                let Some((detector, rx)) = watch else {
                    return ReadyResult::Failed;
                };
                match tokio::time::timeout(spec.timeout, rx).await {
                    Ok(Ok(Verdict::Matched)) => ReadyResult::Ready,
                    Ok(Ok(Verdict::Expired)) | Ok(Err(_)) => ReadyResult::TimedOut,
                    Err(_elapsed) => {
                        detector.expire();
                        ReadyResult::TimedOut
                    }
                }
            }
        };

        match result {
            ReadyResult::Ready => {
                handle.set_state(ServiceState::Ready);
                info!("{} is ready", handle.name);
            }
            ReadyResult::TimedOut => {
                handle.set_state(ServiceState::TimedOut);
                let err = BootstrapError::ReadinessTimeout {
                    service: handle.name.clone(),
                    timeout_ms: spec.timeout.as_millis() as u64,
                };
                warn!("{}; proceeding anyway", err);
                logging::append_startup_log(&format!("[{}] {}", handle.name, err));
            }
            ReadyResult::Failed => {}
        }
        result
    }

    /// Sends one graceful termination signal; does not wait for exit.
    pub fn stop(&self) {
        let handle = self.handle.lock().clone();
        if let Some(handle) = handle {
            handle.terminate();
        }
    }

    pub fn handle(&self) -> Option<Arc<ServiceHandle>> {
        self.handle.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[cfg(unix)]
    fn sh_spec(name: &str, script: &str, probe: ReadinessProbe, timeout: Duration) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            command: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: None,
            env: Vec::new(),
            probe,
            timeout,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn marker_in_output_resolves_before_the_timeout() {
        let supervisor = ServiceSupervisor::new("backend");
        let spec = sh_spec(
            "backend",
            "echo 'INFO: Started server process'; sleep 5",
            ReadinessProbe::StdoutMarker {
                marker: "Started server process".to_string(),
            },
            Duration::from_secs(10),
        );

        let started = Instant::now();
        let handle = supervisor.start(&spec).unwrap();
        assert_eq!(handle.state(), ServiceState::Starting);

        let result = supervisor.await_ready(&spec).await;
        assert_eq!(result, ReadyResult::Ready);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(handle.state(), ServiceState::Ready);

        supervisor.stop();
        assert_eq!(handle.state(), ServiceState::Stopped);
        assert!(handle.signalled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_process_degrades_at_the_timeout() {
        let supervisor = ServiceSupervisor::new("frontend");
        let spec = sh_spec(
            "frontend",
            "sleep 5",
            ReadinessProbe::StdoutMarker {
                marker: "Local:".to_string(),
            },
            Duration::from_millis(400),
        );

        let started = Instant::now();
        let handle = supervisor.start(&spec).unwrap();
        let result = supervisor.await_ready(&spec).await;

        assert_eq!(result, ReadyResult::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(400));
        // Bounded overhead past the budget.
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(handle.state(), ServiceState::TimedOut);

        supervisor.stop();
    }

    #[tokio::test]
    async fn missing_executable_fails_softly() {
        let supervisor = ServiceSupervisor::new("backend");
        let spec = ServiceSpec {
            name: "backend".to_string(),
            command: PathBuf::from("pyyomi-definitely-not-a-real-binary"),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            probe: ReadinessProbe::StdoutMarker {
                marker: "never".to_string(),
            },
            timeout: Duration::from_secs(5),
        };

        let started = Instant::now();
        let handle = supervisor.start(&spec).unwrap();
        assert_eq!(handle.state(), ServiceState::Failed);

        let result = supervisor.await_ready(&spec).await;
        assert_eq!(result, ReadyResult::Failed);
        // Resolves negatively right away, not at the timeout boundary.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_start_is_refused_while_handle_is_live() {
        let supervisor = ServiceSupervisor::new("backend");
        let spec = sh_spec(
            "backend",
            "sleep 5",
            ReadinessProbe::StdoutMarker {
                marker: "never".to_string(),
            },
            Duration::from_secs(5),
        );

        let _handle = supervisor.start(&spec).unwrap();
        assert!(supervisor.start(&spec).is_err());

        supervisor.stop();
        // Stopped is terminal; a new spawn is permitted again.
        assert!(supervisor.start(&spec).is_ok());
        supervisor.stop();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recent_output_is_captured_for_diagnostics() {
        let supervisor = ServiceSupervisor::new("backend");
        let spec = sh_spec(
            "backend",
            "echo 'line one'; echo 'Started server process'; sleep 5",
            ReadinessProbe::StdoutMarker {
                marker: "Started server process".to_string(),
            },
            Duration::from_secs(10),
        );

        let handle = supervisor.start(&spec).unwrap();
        supervisor.await_ready(&spec).await;

        // The reader task has consumed at least up to the marker line.
        let output = handle.recent_output();
        assert!(output.contains("Started server process"));

        supervisor.stop();
    }
}
