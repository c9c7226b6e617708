//! AWS Application Load Balancer OIDC specialization (C9).

use serde_json::{Map, Value};

use crate::config::{AlbJwtVerifierBuilder, IssuerConfig, VerifyOverrides};
use crate::error::Result;
use crate::verifier::JwtVerifier;

/// Verifies JWTs issued by an ALB's OIDC authentication action. `signer`
/// and `client` header claims are checked against the configured ARN and
/// client id after signature verification succeeds.
pub struct AlbJwtVerifier {
    inner: JwtVerifier,
}

impl AlbJwtVerifier {
    #[must_use]
    pub fn builder() -> AlbJwtVerifierBuilder {
        AlbJwtVerifierBuilder::new()
    }

    #[must_use]
    pub fn from_config(config: IssuerConfig) -> Self {
        Self {
            inner: JwtVerifier::new(config),
        }
    }

    pub async fn verify(
        &self,
        token: &str,
        overrides: Option<VerifyOverrides>,
    ) -> Result<Map<String, Value>> {
        self.inner.verify(token, overrides).await
    }

    pub async fn verify_sync(
        &self,
        token: &str,
        overrides: Option<VerifyOverrides>,
    ) -> Result<Map<String, Value>> {
        self.inner.verify_sync(token, overrides).await
    }

    #[must_use]
    pub fn cache(&self) -> &crate::cache::JwksCache {
        self.inner.cache()
    }
}
