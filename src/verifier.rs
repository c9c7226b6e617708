//! Verifier orchestration (C8): decompose → resolve issuer → fetch/verify
//! key → verify signature → validate claims.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::algorithm::verify_signature;
use crate::cache::JwksCache;
use crate::claims::ClaimValidator;
use crate::config::{IssuerConfig, VerifyOverrides};
use crate::error::{JwtVerifyError, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::jwt::DecomposedJwt;
use crate::penalty_box::{DefaultPenaltyBox, PenaltyBox};

/// Shared orchestration for [`crate::cognito::CognitoJwtVerifier`] and
/// [`crate::alb::AlbJwtVerifier`], and usable directly for a generic OIDC
/// issuer set.
pub struct JwtVerifier {
    issuers: Vec<IssuerConfig>,
    cache: JwksCache,
}

impl JwtVerifier {
    /// Build a verifier over one issuer config using the default HTTPS
    /// fetcher and penalty box.
    #[must_use]
    pub fn new(issuer: IssuerConfig) -> Self {
        Self::with_issuers(vec![issuer])
    }

    /// Build a verifier over multiple issuer configs. `(issuer,
    /// audience/client_id/alb_arn)` should be unique across the set;
    /// ambiguity is resolved at resolution time by attempting each
    /// candidate's claim checks in order.
    #[must_use]
    pub fn with_issuers(issuers: Vec<IssuerConfig>) -> Self {
        Self::with_backends(issuers, Arc::new(HttpFetcher::new()), Arc::new(DefaultPenaltyBox::new()))
    }

    /// Build a verifier with injected fetcher/penalty-box implementations,
    /// primarily for tests.
    #[must_use]
    pub fn with_backends(
        issuers: Vec<IssuerConfig>,
        fetcher: Arc<dyn Fetcher>,
        penalty_box: Arc<dyn PenaltyBox>,
    ) -> Self {
        Self {
            issuers,
            cache: JwksCache::new(fetcher, penalty_box),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &JwksCache {
        &self.cache
    }

    /// Verify a JWT, fetching its JWKS if necessary. Returns the decoded
    /// payload on success.
    pub async fn verify(
        &self,
        token: &str,
        overrides: Option<VerifyOverrides>,
    ) -> Result<Map<String, Value>> {
        let decomposed = DecomposedJwt::parse(token)?;
        let config = self.resolve_issuer(&decomposed, overrides.as_ref())?;
        check_mandatory_fields(&config)?;
        let jwk = self.cache.get_jwk(&config.jwks_uri, &decomposed).await?;
        self.finish_verify(&decomposed, &config, jwk)
    }

    /// Verify a JWT using only what is already cached — never fetches.
    /// Intended for hot paths where an async IO boundary is undesirable.
    pub async fn verify_sync(
        &self,
        token: &str,
        overrides: Option<VerifyOverrides>,
    ) -> Result<Map<String, Value>> {
        let decomposed = DecomposedJwt::parse(token)?;
        let config = self.resolve_issuer(&decomposed, overrides.as_ref())?;
        check_mandatory_fields(&config)?;
        let jwk = self
            .cache
            .get_cached_jwk(&config.jwks_uri, &decomposed)
            .await?;
        self.finish_verify(&decomposed, &config, jwk)
    }

    fn resolve_issuer(
        &self,
        decomposed: &DecomposedJwt,
        overrides: Option<&VerifyOverrides>,
    ) -> Result<IssuerConfig> {
        let iss = decomposed.payload.get("iss").and_then(Value::as_str);

        let candidates: Vec<&IssuerConfig> = match iss {
            Some(iss) => self.issuers.iter().filter(|c| c.issuer == iss).collect(),
            None if self.issuers.len() == 1 => self.issuers.iter().collect(),
            None => Vec::new(),
        };

        if candidates.is_empty() {
            return Err(
                JwtVerifyError::InvalidIssuer { raw_jwt: None }.with_raw_jwt(decomposed.clone())
            );
        }

        let merged: Vec<IssuerConfig> = candidates
            .into_iter()
            .map(|c| match overrides {
                Some(o) => c.merged(o),
                None => c.clone(),
            })
            .collect();

        if merged.len() == 1 {
            return Ok(merged.into_iter().next().unwrap());
        }

        // Multiple configs share this issuer: disambiguate by
        // audience/client_id/alb_arn claim match.
        let audience_claim = match decomposed.payload.get("aud") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        let client_id_claim = decomposed.payload.get("client_id").and_then(Value::as_str);
        let signer_claim = decomposed.header.get("signer").and_then(Value::as_str);

        merged
            .into_iter()
            .find(|c| {
                let aud_matches = c
                    .audience
                    .as_ref()
                    .is_none_or(|expected| expected.iter().any(|e| audience_claim.contains(e)));
                let client_matches = c.client_id.as_ref().is_none_or(|expected| {
                    client_id_claim.is_some_and(|actual| expected.iter().any(|e| e == actual))
                });
                let alb_matches = c.alb_arn.as_ref().is_none_or(|expected| {
                    signer_claim.is_some_and(|actual| expected.iter().any(|e| e == actual))
                });
                aud_matches && client_matches && alb_matches
            })
            .ok_or_else(|| {
                JwtVerifyError::InvalidIssuer { raw_jwt: None }.with_raw_jwt(decomposed.clone())
            })
    }

    fn finish_verify(
        &self,
        decomposed: &DecomposedJwt,
        config: &IssuerConfig,
        jwk: crate::jwk::Jwk,
    ) -> Result<Map<String, Value>> {
        verify_signature(decomposed, &jwk, &config.allowed_algorithms)?;
        tracing::debug!(issuer = %config.issuer, "JWT signature verified");

        // ALB's `signer` check allows a list of ARNs; ClaimValidator's
        // `alb_signer` field models a single expected value, so the ARN
        // list is checked here directly instead.
        let validator = ClaimValidator {
            issuer: Some(vec![config.issuer.clone()]),
            audience: config.audience.clone(),
            client_id: config.client_id.clone(),
            alb_signer: None,
            alb_client: config.alb_client_id.clone(),
            token_use: config.token_use,
            scope: config.scopes.clone(),
            graceful_seconds: config.grace_seconds,
            custom_jwt_check: None,
        };

        if let Some(expected_arns) = &config.alb_arn {
            let actual = decomposed.header.get("signer").and_then(Value::as_str);
            match actual {
                Some(actual) if expected_arns.iter().any(|e| e == actual) => {}
                _ => {
                    return Err(JwtVerifyError::InvalidClaim {
                        message: "ALB signer mismatch".into(),
                        raw_jwt: None,
                    }
                    .with_raw_jwt(decomposed.clone()));
                }
            }
        }

        let result = validator.validate(decomposed);
        let result = match result {
            Err(e) if e.is_claim_error() => {
                tracing::warn!(issuer = %config.issuer, error = %e, "JWT rejected on claim check");
                if config.include_raw_jwt_in_errors {
                    Err(e.with_raw_jwt(decomposed.clone()))
                } else {
                    Err(strip_raw_jwt(e))
                }
            }
            other => other,
        };
        result?;

        if let Some(check) = &config.custom_jwt_check {
            check(decomposed).map_err(|e| {
                if config.include_raw_jwt_in_errors && e.is_claim_error() {
                    e.with_raw_jwt(decomposed.clone())
                } else {
                    e
                }
            })?;
        }

        Ok(decomposed.payload.clone())
    }
}

/// A verifier's issuer config must name an identity check — `audience` or
/// `client_id` for a generic/Cognito issuer, or the ALB-specific
/// `alb_arn`/`alb_client_id` pair — either at verifier creation or via
/// per-call overrides. Without one, any token from the right issuer would
/// verify regardless of who it was issued to.
fn check_mandatory_fields(config: &IssuerConfig) -> Result<()> {
    if config.uses_alb_identity {
        return Ok(());
    }
    if config.audience.is_none() && config.client_id.is_none() {
        return Err(JwtVerifyError::ParameterValidation(
            "audience or client_id must be configured, either on the issuer or via per-call overrides"
                .into(),
        ));
    }
    Ok(())
}

fn strip_raw_jwt(err: JwtVerifyError) -> JwtVerifyError {
    match err {
        JwtVerifyError::Expired { .. } => JwtVerifyError::Expired { raw_jwt: None },
        JwtVerifyError::NotBefore { .. } => JwtVerifyError::NotBefore { raw_jwt: None },
        JwtVerifyError::InvalidIssuer { .. } => JwtVerifyError::InvalidIssuer { raw_jwt: None },
        JwtVerifyError::InvalidAudience { .. } => JwtVerifyError::InvalidAudience { raw_jwt: None },
        JwtVerifyError::InvalidClaim { message, .. } => {
            JwtVerifyError::InvalidClaim { message, raw_jwt: None }
        }
        other => other,
    }
}
