/// Teardown of every supervised child on exit.
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::supervisor::ServiceSupervisor;

static COORDINATOR: OnceCell<Arc<ShutdownCoordinator>> = OnceCell::new();

/// Terminates every live supervised child when the application exits.
///
/// Registered process-wide once so the panic hook can reach it; all
/// handle mutation still goes through the owning supervisors.
pub struct ShutdownCoordinator {
    supervisors: Mutex<Vec<Arc<ServiceSupervisor>>>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Arc<Self> {
        Arc::new(Self {
            supervisors: Mutex::new(Vec::new()),
            grace,
        })
    }

    /// Installs the process-wide instance used by the panic hook. Later
    /// installs are ignored.
    pub fn install(coordinator: Arc<Self>) {
        let _ = COORDINATOR.set(coordinator);
    }

    pub fn installed() -> Option<Arc<Self>> {
        COORDINATOR.get().cloned()
    }

    /// Registration order is start order; `stop_all` walks it in reverse
    /// so the frontend goes down before the backend.
    pub fn register(&self, supervisor: Arc<ServiceSupervisor>) {
        self.supervisors.lock().push(supervisor);
    }

    /// One termination signal per live handle, then a bounded wait for
    /// exits. Children still alive after the grace period are abandoned
    /// to OS cleanup; no shutdown blocks on another's non-termination.
    pub fn stop_all(&self) {
        let supervisors: Vec<_> = self.supervisors.lock().iter().rev().cloned().collect();
        if supervisors.is_empty() {
            return;
        }
        info!("stopping {} supervised service(s)", supervisors.len());

        for supervisor in &supervisors {
            supervisor.stop();
        }

        let deadline = Instant::now() + self.grace;
        loop {
            let all_exited = supervisors
                .iter()
                .all(|s| s.handle().map(|h| h.try_reap()).unwrap_or(true));
            if all_exited {
                info!("all supervised services exited");
                return;
            }
            if Instant::now() >= deadline {
                warn!("grace period elapsed; abandoning remaining children to OS cleanup");
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}
