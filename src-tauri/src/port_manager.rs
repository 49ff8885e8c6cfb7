use rand::Rng;
use std::net::{SocketAddr, TcpListener};
use tracing::{info, warn};

/// Find an available port in the inclusive range, trying random picks
/// first and a sequential sweep after.
pub fn find_available_port(range: (u16, u16)) -> Option<u16> {
    let (start, end) = range;
    if start > end {
        return None;
    }
    let span = (end - start) as u32 + 1;
    let mut rng = rand::rng();

    for _ in 0..span.min(64) {
        let port = rng.random_range(start..=end);
        if is_port_available(port) {
            info!("selected port {}", port);
            return Some(port);
        }
    }

    // Random picks kept colliding; walk the range once.
    for port in start..=end {
        if is_port_available(port) {
            info!("selected port {} (sequential sweep)", port);
            return Some(port);
        }
    }

    warn!("no available port in range {}-{}", start, end);
    None
}

/// Check if a specific port is available on the loopback interface.
fn is_port_available(port: u16) -> bool {
    // The listener is dropped immediately, freeing the port again.
    TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_port_in_backend_range() {
        let port = find_available_port((8000, 8100));
        assert!(port.is_some());
        let port = port.unwrap();
        assert!((8000..=8100).contains(&port));
    }

    #[test]
    fn occupied_single_port_range_yields_none() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!is_port_available(port));
        assert_eq!(find_available_port((port, port)), None);
    }

    #[test]
    fn inverted_range_yields_none() {
        assert_eq!(find_available_port((8100, 8000)), None);
    }
}
