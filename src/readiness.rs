//! Readiness polling
//!
//! Waits for a server to answer 200 on both `/healthz` and `/readyz`. Each
//! endpoint is polled on its own, concurrently, within its own window; the
//! last problem seen for an endpoint that never became ready is reported
//! as a test failure.

use std::time::Duration;

use futures_util::future::join_all;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::common::Result;
use crate::testing::Reporter;

/// Endpoints that must both answer 200
pub const HEALTH_ENDPOINTS: [&str; 2] = ["/healthz", "/readyz"];

/// Delay between two probes of the same endpoint
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long each endpoint gets to become ready
pub const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

/// IPv6 loopback
pub const DEFAULT_HOST: &str = "::1";

/// Timing and addressing for a [`Probe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub poll_interval: Duration,
    pub endpoint_timeout: Duration,
    pub host: String,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            endpoint_timeout: ENDPOINT_TIMEOUT,
            host: DEFAULT_HOST.to_string(),
        }
    }
}

/// Block until the server on `port` is healthy and ready
///
/// Returns `true` only if both endpoints answered 200 in time. Failures are
/// recorded on `reporter`.
pub async fn ready(cancel: &CancellationToken, reporter: &dyn Reporter, port: u16) -> bool {
    match Probe::new(ReadinessSettings::default()) {
        Ok(probe) => probe.ready(cancel, reporter, port).await,
        Err(e) => {
            reporter.error(&e.to_string());
            false
        }
    }
}

/// Polls the health endpoints of one server
pub struct Probe {
    settings: ReadinessSettings,
    client: reqwest::Client,
}

impl Probe {
    pub fn new(settings: ReadinessSettings) -> Result<Self> {
        let client = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ReadinessSettings {
        &self.settings
    }

    /// URL of `endpoint` on `port`
    pub fn url(&self, port: u16, endpoint: &str) -> String {
        let host = &self.settings.host;
        if host.contains(':') {
            format!("http://[{}]:{}{}", host, port, endpoint)
        } else {
            format!("http://{}:{}{}", host, port, endpoint)
        }
    }

    /// Poll every health endpoint concurrently until each is ready or times out
    pub async fn ready(&self, cancel: &CancellationToken, reporter: &dyn Reporter, port: u16) -> bool {
        let checks = HEALTH_ENDPOINTS
            .iter()
            .map(|endpoint| self.wait_for_endpoint(cancel, reporter, self.url(port, endpoint)));

        join_all(checks).await.into_iter().all(|ok| ok)
    }

    async fn wait_for_endpoint(
        &self,
        cancel: &CancellationToken,
        reporter: &dyn Reporter,
        url: String,
    ) -> bool {
        let mut last_msg = None;
        let succeeded = tokio::select! {
            () = cancel.cancelled() => false,
            polled = tokio::time::timeout(self.settings.endpoint_timeout, self.poll(&url, &mut last_msg)) => {
                polled.is_ok()
            }
        };

        if succeeded {
            reporter.log(&format!("success contacting {}", url));
        } else {
            let msg = last_msg.unwrap_or_else(|| format!("timed out waiting for {}", url));
            reporter.error(&msg);
        }
        succeeded
    }

    /// Probe now and then every poll interval until a probe succeeds
    async fn poll(&self, url: &str, last_msg: &mut Option<String>) {
        loop {
            match self.probe(url).await {
                Ok(()) => return,
                Err(msg) => {
                    tracing::debug!(%url, %msg, "endpoint not ready");
                    *last_msg = Some(msg);
                }
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// One GET; the error is the message to report if this stays the last attempt
    async fn probe(&self, url: &str) -> std::result::Result<(), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("error contacting {}: {}", url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("error reading response from {}: {}", url, e))?;

        if status != StatusCode::OK {
            return Err(format!("unready response from {}: {}", url, body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;

    fn probe(host: &str) -> Probe {
        Probe::new(ReadinessSettings {
            poll_interval: Duration::from_millis(20),
            endpoint_timeout: Duration::from_millis(300),
            host: host.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_default_settings() {
        let settings = ReadinessSettings::default();
        assert_eq!(settings.poll_interval, Duration::from_millis(100));
        assert_eq!(settings.endpoint_timeout, Duration::from_secs(30));
        assert_eq!(settings.host, "::1");
    }

    #[test]
    fn test_url_brackets_ipv6_hosts() {
        assert_eq!(probe("::1").url(8443, "/healthz"), "http://[::1]:8443/healthz");
        assert_eq!(
            probe("127.0.0.1").url(8443, "/readyz"),
            "http://127.0.0.1:8443/readyz"
        );
    }

    #[tokio::test]
    async fn test_refused_connection_reports_last_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let recorder = Recorder::new("refused");

        let ok = probe("127.0.0.1")
            .ready(&CancellationToken::new(), &recorder, port)
            .await;

        assert!(!ok);
        assert!(recorder.failed());
        let errors = recorder.errors();
        assert_eq!(errors.len(), 2);
        for endpoint in HEALTH_ENDPOINTS {
            let url = format!("http://127.0.0.1:{}{}", port, endpoint);
            assert!(
                errors
                    .iter()
                    .any(|e| e.starts_with(&format!("error contacting {}", url))),
                "no error for {url}: {errors:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_cancelled_caller_stops_polling() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let recorder = Recorder::new("cancelled");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let slow = Probe::new(ReadinessSettings {
            poll_interval: Duration::from_millis(20),
            endpoint_timeout: Duration::from_secs(3600),
            host: "127.0.0.1".to_string(),
        })
        .unwrap();

        let ok = tokio::time::timeout(Duration::from_secs(5), slow.ready(&cancel, &recorder, port))
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(recorder.errors().len(), 2);
    }
}
