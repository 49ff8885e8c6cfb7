/// Readiness detection for supervised services.
///
/// Two strategies with the same timeout/degrade semantics: an HTTP health
/// poll for services with a liveness endpoint (the backend), and a stdout
/// marker watch for services without one (the frontend dev server).
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Final verdict from a marker watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The marker was observed in the service's output.
    Matched,
    /// The watch was expired without a match.
    Expired,
}

/// Watches a child's output stream for a readiness marker.
///
/// State machine: `Watching -> Matched | Expired`. The channel resolves
/// exactly once; the atomic flag is swapped before any send, so a second
/// resolution is structurally impossible.
pub struct MarkerDetector {
    marker: String,
    resolved: AtomicBool,
    tx: Mutex<Option<oneshot::Sender<Verdict>>>,
}

impl MarkerDetector {
    pub fn new(marker: impl Into<String>) -> (Self, oneshot::Receiver<Verdict>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                marker: marker.into(),
                resolved: AtomicBool::new(false),
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Feed one chunk of output. Only the first matching chunk resolves;
    /// later output is still logged by the caller but ignored here.
    pub fn observe(&self, chunk: &str) {
        if self.resolved.load(Ordering::Acquire) || !chunk.contains(&self.marker) {
            return;
        }
        self.resolve(Verdict::Matched);
    }

    /// Expire the watch. A no-op if the marker already matched.
    pub fn expire(&self) {
        self.resolve(Verdict::Expired);
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    fn resolve(&self, verdict: Verdict) {
        if self.resolved.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = self.tx.lock().take() {
            // The receiver may already be gone during shutdown.
            let _ = tx.send(verdict);
        }
    }
}

/// Polls an HTTP endpoint until it answers or the budget runs out.
///
/// Any response below 500 counts as up: a backend answering 404 is still
/// accepting connections, which is all readiness means here.
pub async fn poll_health(url: &str, timeout: Duration, interval: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    let client = match reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_millis(1_500))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("failed to build health-check client: {}", e);
            return false;
        }
    };

    loop {
        match client.get(url).send().await {
            Ok(response) if response.status().as_u16() < 500 => {
                debug!("health check passed: {} -> {}", url, response.status());
                return true;
            }
            Ok(response) => {
                debug!("health check {} answered {}", url, response.status());
            }
            Err(e) => {
                debug!("health check {} unreachable: {}", url, e);
            }
        }

        if tokio::time::Instant::now() + interval >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn marker_resolves_once_on_first_match() {
        let (detector, mut rx) = MarkerDetector::new("Started server process");

        detector.observe("booting...");
        assert!(!detector.is_resolved());

        detector.observe("INFO: Started server process [1234]");
        assert!(detector.is_resolved());
        assert_eq!(rx.try_recv().unwrap(), Verdict::Matched);

        // Further matches and expiry are ignored after resolution.
        detector.observe("Started server process again");
        detector.expire();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn expire_resolves_when_marker_never_appears() {
        let (detector, mut rx) = MarkerDetector::new("Local:");
        detector.observe("compiling...");
        detector.expire();
        assert_eq!(rx.try_recv().unwrap(), Verdict::Expired);
    }

    #[test]
    fn expire_after_match_is_a_no_op() {
        let (detector, mut rx) = MarkerDetector::new("ready");
        detector.observe("ready");
        detector.expire();
        assert_eq!(rx.try_recv().unwrap(), Verdict::Matched);
    }

    #[tokio::test]
    async fn health_poll_accepts_any_answering_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n")
                    .await;
            }
        });

        let url = format!("http://{}/health", addr);
        assert!(poll_health(&url, Duration::from_secs(5), Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn health_poll_degrades_at_the_deadline() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}/health", port);

        let started = Instant::now();
        let up = poll_health(&url, Duration::from_millis(400), Duration::from_millis(100)).await;
        assert!(!up);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
