//! Rate-limited HTTP client for the trademark registry.

use std::time::Duration;

use markbatch_core::serial::is_valid_serial;

use crate::error::RegistryError;
use crate::pacer::Pacer;
use crate::record::TrademarkRecord;

/// Serial used by [`RegistryClient::health_check`]. It does not need to
/// exist: a clean `not_found` proves connectivity and auth just as well.
const PROBE_SERIAL: &str = "75000001";

/// Registry connection settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// HTTP base URL, e.g. `https://registry.example.com/api`.
    pub base_url: String,
    /// Optional API key sent as a bearer token.
    pub api_key: Option<String>,
    /// Hard ceiling on lookups per minute, shared system-wide.
    pub requests_per_minute: u32,
    /// Per-call timeout.
    pub timeout: Duration,
}

/// Classified outcome of a single lookup that reached a conclusion.
///
/// Failures that should be recorded on the result (rate limit, timeout,
/// transport) are reported as [`RegistryError`] instead.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    /// The registry returned a record for the serial.
    Found(TrademarkRecord),
    /// No record exists for the serial, or the serial is malformed
    /// (malformed serials are classified without a network call).
    NotFound,
}

/// Sequential adapter to the external registry.
///
/// Owns the single [`Pacer`] for the process; every `fetch` call starts
/// at least the configured minimum delay after the previous one.
pub struct RegistryClient {
    http: reqwest::Client,
    config: RegistryConfig,
    pacer: Pacer,
}

impl RegistryClient {
    /// Build a client. Fails only if the underlying HTTP client cannot
    /// be constructed (TLS backend initialization).
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            pacer: Pacer::from_rate(config.requests_per_minute),
            config,
        })
    }

    /// Look up one serial number.
    ///
    /// Classification:
    /// - malformed serial → `NotFound`, no network call, no pacing cost
    /// - HTTP 404 → `NotFound`
    /// - HTTP 429 → `Err(RateLimited)` (the batch continues)
    /// - timeout → `Err(Timeout)`
    /// - other non-2xx → `Err(Http)`
    /// - 2xx → parsed [`TrademarkRecord`]
    pub async fn fetch(&self, serial: &str) -> Result<LookupOutcome, RegistryError> {
        if !is_valid_serial(serial) {
            tracing::debug!(serial, "Malformed serial, classified not_found without lookup");
            return Ok(LookupOutcome::NotFound);
        }

        self.pacer.wait_turn().await;

        let url = format!("{}/trademarks/{serial}", self.config.base_url);
        let mut request = self.http.get(&url);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::Timeout
            } else {
                RegistryError::Transport(e.to_string())
            }
        })?;

        match response.status() {
            status if status.is_success() => {
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| RegistryError::Malformed(e.to_string()))?;
                Ok(LookupOutcome::Found(TrademarkRecord::from_json(serial, &body)))
            }
            reqwest::StatusCode::NOT_FOUND => Ok(LookupOutcome::NotFound),
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(RegistryError::RateLimited),
            status => Err(RegistryError::Http(status.as_u16())),
        }
    }

    /// Issue one lightweight probe call.
    ///
    /// A `not_found` response counts as healthy -- it proves we can reach
    /// and authenticate against the registry.
    pub async fn health_check(&self) -> Result<(), RegistryError> {
        match self.fetch(PROBE_SERIAL).await {
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// The configured requests-per-minute ceiling.
    pub fn requests_per_minute(&self) -> u32 {
        self.config.requests_per_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::time::Instant;

    fn client() -> RegistryClient {
        RegistryClient::new(RegistryConfig {
            base_url: "http://127.0.0.1:1".into(),
            api_key: None,
            requests_per_minute: 60,
            timeout: Duration::from_secs(1),
        })
        .expect("client")
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_serial_is_not_found_without_a_call() {
        let client = client();
        let start = Instant::now();

        // Non-digits and a short serial: classified locally. With paused
        // time any sleep or network wait would show up as elapsed time.
        assert_matches!(
            client.fetch("not-a-serial").await,
            Ok(LookupOutcome::NotFound)
        );
        assert_matches!(client.fetch("1234567").await, Ok(LookupOutcome::NotFound));
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_serial_consumes_no_pacer_slot() {
        let client = client();

        let _ = client.fetch("bad").await;
        let _ = client.fetch("also-bad").await;

        // The pacer was never engaged, so the next valid call would be
        // the first paced one: no reserved slot exists yet.
        let before = Instant::now();
        client.pacer.wait_turn().await;
        assert_eq!(Instant::now(), before);
    }
}
