//! HTTPS fetch interface (C3).
//!
//! Resource-constrained GET returning bytes. Kept as a trait object so the
//! cache layer never cares whether bytes came from the network or a test
//! double.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt as _;

use crate::error::{JwtVerifyError, Result};

/// Default response-size ceiling: 500 KB.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 500 * 1024;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opaque fetch interface. Network failures must be surfaced as
/// [`JwtVerifyError::Fetch`], a distinct kind from JWKS/JWK validation
/// failures, so the cache does not poison its state on a transient
/// failure.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// Default [`Fetcher`] backed by `reqwest`. Enforces a response-size
/// ceiling by streaming the body and aborting once the limit is exceeded,
/// rather than buffering an unbounded response first, and rejects non-2xx
/// responses before the body is read.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl HttpFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_TIMEOUT)
    }

    #[must_use]
    pub fn with_limits(max_response_bytes: usize, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            max_response_bytes,
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| JwtVerifyError::Fetch(format!("GET {uri}: {e}")))?;

        if !response.status().is_success() {
            return Err(JwtVerifyError::Fetch(format!(
                "GET {uri}: unexpected status {}",
                response.status()
            )));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| JwtVerifyError::Fetch(format!("GET {uri}: {e}")))?;
            body.extend_from_slice(&chunk);
            if body.len() > self.max_response_bytes {
                return Err(JwtVerifyError::Fetch(format!(
                    "GET {uri}: response exceeded {} byte limit",
                    self.max_response_bytes
                )));
            }
        }

        Ok(body)
    }
}
