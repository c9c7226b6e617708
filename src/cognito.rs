//! Cognito user-pool specialization (C9).

use serde_json::{Map, Value};

use crate::config::{CognitoJwtVerifierBuilder, IssuerConfig, VerifyOverrides};
use crate::error::Result;
use crate::verifier::JwtVerifier;

/// Verifies JWTs issued by one AWS Cognito user pool.
pub struct CognitoJwtVerifier {
    inner: JwtVerifier,
}

impl CognitoJwtVerifier {
    #[must_use]
    pub fn builder() -> CognitoJwtVerifierBuilder {
        CognitoJwtVerifierBuilder::new()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::TokenUse;

    #[test]
    fn builder_defaults_token_use_to_access() {
        let config = CognitoJwtVerifierBuilder::new()
            .region("eu-west-1")
            .user_pool_id("pool1")
            .client_id(None)
            .build()
            .unwrap();
        assert_eq!(config.token_use, Some(TokenUse::Access));
    }
}
