//! TCP reachability probe for management interfaces.

use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// Checks whether a TCP port accepts connections
#[async_trait::async_trait]
pub trait TransportProbe: Send + Sync {
    async fn probe(&self, address: &str, port: u16, timeout: Duration) -> io::Result<()>;
}

/// Probe that opens (and immediately drops) a real TCP connection
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait::async_trait]
impl TransportProbe for TcpProbe {
    async fn probe(&self, address: &str, port: u16, timeout: Duration) -> io::Result<()> {
        match tokio::time::timeout(timeout, TcpStream::connect((address, port))).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {}:{} timed out after {:?}", address, port, timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        TcpProbe
            .probe("127.0.0.1", port, Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = TcpProbe
            .probe("127.0.0.1", port, Duration::from_secs(1))
            .await;
        assert!(result.is_err());
    }
}
