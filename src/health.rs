use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Advisory liveness check of the local AI backend (Ollama).
pub struct HealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HealthProbe {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()
            .context("Failed to build health probe client")?;
        Ok(Self {
            client,
            url: format!("{}/api/tags", base_url.trim_end_matches('/')),
        })
    }

    /// True only on a 200 from the tags endpoint. Never blocks past the timeout.
    pub async fn check_online(&self) -> bool {
        debug!("Probing {}", self.url);
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                info!("AI backend is online ({})", self.url);
                true
            }
            Ok(response) => {
                warn!(
                    "AI backend answered {} at {}; AI features will fail",
                    response.status(),
                    self.url
                );
                false
            }
            Err(e) => {
                warn!(
                    "AI backend is not reachable at {}; AI features will fail: {}",
                    self.url, e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_online_on_200() {
        let url = serve_once("HTTP/1.1 200 OK").await;
        let probe = HealthProbe::new(&url, Duration::from_secs(2)).unwrap();
        assert!(probe.check_online().await);
    }

    #[tokio::test]
    async fn test_offline_on_error_status() {
        let url = serve_once("HTTP/1.1 500 Internal Server Error").await;
        let probe = HealthProbe::new(&url, Duration::from_secs(2)).unwrap();
        assert!(!probe.check_online().await);
    }

    #[tokio::test]
    async fn test_unreachable_is_offline_within_timeout() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let timeout = Duration::from_millis(500);
        let probe = HealthProbe::new(&format!("http://{}/", addr), timeout).unwrap();

        let started = Instant::now();
        assert!(!probe.check_online().await);
        assert!(started.elapsed() < timeout + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_silent_server_hits_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let accepted = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(accepted);
        });

        let timeout = Duration::from_millis(300);
        let probe = HealthProbe::new(&format!("http://{}", addr), timeout).unwrap();
        let started = Instant::now();
        assert!(!probe.check_online().await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
