use std::net::{SocketAddr, TcpStream};

use tokio::time::{sleep, Duration, Instant};

/// Polls the host's TCP port until it accepts a connection or the
/// deadline passes. The deadline is advisory: configuration management
/// is the authoritative failure point, so a host that never answers
/// here only costs a warning.
pub async fn wait_for_tcp(host: &str, port: u32, timeout: Duration, interval: Duration) {
    let addr: SocketAddr = match format!("{host}:{port}").parse() {
        Ok(addr) => addr,
        Err(e) => {
            log::warn!("skipping readiness poll, invalid address {host}:{port} ({e})");
            return;
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        if Instant::now() >= deadline {
            log::warn!("{host}:{port} still unreachable, proceeding anyway");
            return;
        }
        match TcpStream::connect_timeout(&addr, Duration::from_secs(5)) {
            Ok(_) => {
                log::info!("{host}:{port} is reachable");
                return;
            }
            Err(e) => {
                log::info!("{host}:{port} not reachable yet ({e}), retrying");
            }
        }
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    /// RUST_LOG=debug cargo test --package nodeup-aws --bin nodeup-aws -- create::ready::tests --show-output
    #[tokio::test]
    async fn test_wait_for_tcp_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        wait_for_tcp(
            "127.0.0.1",
            port as u32,
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .await;
    }

    #[tokio::test]
    async fn test_wait_for_tcp_deadline() {
        // zero deadline returns immediately without touching the network
        wait_for_tcp("10.255.255.1", 22, Duration::ZERO, Duration::from_secs(1)).await;
    }
}
