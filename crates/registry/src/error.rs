/// Errors from a single registry lookup.
///
/// These are per-identifier failures: the dispatch engine records them
/// on the affected result and continues the batch, it never aborts.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry signalled its rate ceiling (HTTP 429).
    #[error("Registry rate limit exceeded")]
    RateLimited,

    /// The call did not complete within the configured timeout.
    #[error("Registry request timed out")]
    Timeout,

    /// An unexpected HTTP status.
    #[error("Registry returned HTTP {0}")]
    Http(u16),

    /// The response body could not be parsed.
    #[error("Malformed registry response: {0}")]
    Malformed(String),

    /// Connection-level failure (DNS, TLS, refused, reset).
    #[error("Registry transport error: {0}")]
    Transport(String),
}
