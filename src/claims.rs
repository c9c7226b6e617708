//! Claim validation (C7): issuer, audience/client, ALB signer, time-bound
//! claims, `token_use`, `scope`, and a custom hook.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::error::{JwtVerifyError, Result};
use crate::jwt::DecomposedJwt;

/// Accepted `token_use` values for Cognito-style verifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUse {
    Id,
    Access,
}

impl TokenUse {
    fn as_str(self) -> &'static str {
        match self {
            TokenUse::Id => "id",
            TokenUse::Access => "access",
        }
    }
}

/// A single, possibly multi-valued, expectation. `None` means "don't
/// check"; `Some(&[])` is a configuration error, rejected at build time by
/// the callers that construct this type, not here.
#[derive(Default)]
pub struct ClaimValidator {
    pub issuer: Option<Vec<String>>,
    pub audience: Option<Vec<String>>,
    pub client_id: Option<Vec<String>>,
    pub alb_signer: Option<String>,
    pub alb_client: Option<Vec<String>>,
    pub token_use: Option<TokenUse>,
    pub scope: Option<Vec<String>>,
    pub graceful_seconds: i64,
    pub custom_jwt_check: Option<Box<dyn Fn(&DecomposedJwt) -> Result<()> + Send + Sync>>,
}

impl ClaimValidator {
    /// Validate against the current wall-clock time.
    pub fn validate(&self, decomposed: &DecomposedJwt) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.validate_at(decomposed, now)
    }

    /// Validate against an injected `now` (Unix seconds), so time-bound
    /// checks are deterministic in tests.
    pub fn validate_at(&self, decomposed: &DecomposedJwt, now: i64) -> Result<()> {
        self.check_issuer(decomposed)?;
        self.check_audience_and_client(decomposed)?;
        self.check_alb_signer_and_client(decomposed)?;
        self.check_exp(decomposed, now)?;
        self.check_nbf(decomposed, now)?;
        self.check_token_use(decomposed)?;
        self.check_scope(decomposed)?;
        if let Some(hook) = &self.custom_jwt_check {
            hook(decomposed).map_err(|e| attach_claim_message(e, decomposed))?;
        }
        Ok(())
    }

    fn check_issuer(&self, decomposed: &DecomposedJwt) -> Result<()> {
        let Some(expected) = &self.issuer else {
            return Ok(());
        };
        let actual = decomposed.payload.get("iss").and_then(Value::as_str);
        match actual {
            Some(actual) if expected.iter().any(|e| e == actual) => Ok(()),
            _ => Err(JwtVerifyError::InvalidIssuer { raw_jwt: None }.with_raw_jwt(decomposed.clone())),
        }
    }

    fn check_audience_and_client(&self, decomposed: &DecomposedJwt) -> Result<()> {
        if let Some(expected) = &self.audience {
            let matches = claim_as_strings(decomposed, "aud")
                .iter()
                .any(|v| expected.contains(v));
            if !matches {
                return Err(
                    JwtVerifyError::InvalidAudience { raw_jwt: None }.with_raw_jwt(decomposed.clone())
                );
            }
        }
        if let Some(expected) = &self.client_id {
            let actual = decomposed.payload.get("client_id").and_then(Value::as_str);
            match actual {
                Some(actual) if expected.iter().any(|e| e == actual) => {}
                _ => {
                    return Err(JwtVerifyError::InvalidClaim {
                        message: "client_id mismatch".into(),
                        raw_jwt: None,
                    }
                    .with_raw_jwt(decomposed.clone()));
                }
            }
        }
        Ok(())
    }

    /// ALB-issued tokens carry `signer` (the ALB's ARN) and `client` (the
    /// OIDC client ID) claims. Either check is skipped when its expected
    /// value is `None` (the caller disabled it), not when the claim is
    /// merely absent from the token.
    fn check_alb_signer_and_client(&self, decomposed: &DecomposedJwt) -> Result<()> {
        if let Some(expected_signer) = &self.alb_signer {
            let actual = decomposed.header.get("signer").and_then(Value::as_str);
            if actual != Some(expected_signer.as_str()) {
                return Err(JwtVerifyError::InvalidClaim {
                    message: "ALB signer mismatch".into(),
                    raw_jwt: None,
                }
                .with_raw_jwt(decomposed.clone()));
            }
        }
        if let Some(expected_clients) = &self.alb_client {
            let actual = decomposed.header.get("client").and_then(Value::as_str);
            match actual {
                Some(actual) if expected_clients.iter().any(|e| e == actual) => {}
                _ => {
                    return Err(JwtVerifyError::InvalidClaim {
                        message: "ALB client mismatch".into(),
                        raw_jwt: None,
                    }
                    .with_raw_jwt(decomposed.clone()));
                }
            }
        }
        Ok(())
    }

    fn check_exp(&self, decomposed: &DecomposedJwt, now: i64) -> Result<()> {
        let Some(exp) = decomposed.payload.get("exp").and_then(Value::as_i64) else {
            return Ok(());
        };
        if now > exp + self.graceful_seconds {
            return Err(JwtVerifyError::Expired { raw_jwt: None }.with_raw_jwt(decomposed.clone()));
        }
        Ok(())
    }

    fn check_nbf(&self, decomposed: &DecomposedJwt, now: i64) -> Result<()> {
        let Some(nbf) = decomposed.payload.get("nbf").and_then(Value::as_i64) else {
            return Ok(());
        };
        if now < nbf - self.graceful_seconds {
            return Err(JwtVerifyError::NotBefore { raw_jwt: None }.with_raw_jwt(decomposed.clone()));
        }
        Ok(())
    }

    fn check_token_use(&self, decomposed: &DecomposedJwt) -> Result<()> {
        let Some(expected) = self.token_use else {
            return Ok(());
        };
        let actual = decomposed.payload.get("token_use").and_then(Value::as_str);
        if actual == Some(expected.as_str()) {
            Ok(())
        } else {
            Err(JwtVerifyError::InvalidClaim {
                message: format!("expected token_use '{}'", expected.as_str()),
                raw_jwt: None,
            }
            .with_raw_jwt(decomposed.clone()))
        }
    }

    /// `scope` is a single space-delimited string claim (RFC 8693); at
    /// least one of the expected scopes must be present.
    fn check_scope(&self, decomposed: &DecomposedJwt) -> Result<()> {
        let Some(expected) = &self.scope else {
            return Ok(());
        };
        let actual_scopes: Vec<&str> = decomposed
            .payload
            .get("scope")
            .and_then(Value::as_str)
            .map(|s| s.split(' ').collect())
            .unwrap_or_default();
        if expected.iter().any(|e| actual_scopes.contains(&e.as_str())) {
            Ok(())
        } else {
            Err(JwtVerifyError::InvalidClaim {
                message: "none of the required scopes are present".into(),
                raw_jwt: None,
            }
            .with_raw_jwt(decomposed.clone()))
        }
    }
}

/// `aud` is legal either as a single string or an array of strings.
fn claim_as_strings(decomposed: &DecomposedJwt, key: &str) -> Vec<String> {
    match decomposed.payload.get(key) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn attach_claim_message(err: JwtVerifyError, decomposed: &DecomposedJwt) -> JwtVerifyError {
    match err {
        JwtVerifyError::InvalidClaim { message, .. } => JwtVerifyError::InvalidClaim {
            message,
            raw_jwt: None,
        }
        .with_raw_jwt(decomposed.clone()),
        other if other.is_claim_error() => other.with_raw_jwt(decomposed.clone()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn token_with_payload(payload: Value) -> DecomposedJwt {
        let header = serde_json::json!({"alg": "RS256"});
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        let sig_b64 = URL_SAFE_NO_PAD.encode(b"sig");
        let token = format!("{header_b64}.{payload_b64}.{sig_b64}");
        DecomposedJwt::parse(&token).unwrap()
    }

    #[test]
    fn accepts_matching_issuer_and_audience() {
        let validator = ClaimValidator {
            issuer: Some(vec!["https://issuer.example.com".into()]),
            audience: Some(vec!["client-1".into()]),
            ..Default::default()
        };
        let token = token_with_payload(serde_json::json!({
            "iss": "https://issuer.example.com",
            "aud": "client-1",
        }));
        validator.validate_at(&token, 0).unwrap();
    }

    #[test]
    fn rejects_wrong_issuer() {
        let validator = ClaimValidator {
            issuer: Some(vec!["https://issuer.example.com".into()]),
            ..Default::default()
        };
        let token = token_with_payload(serde_json::json!({"iss": "https://evil.example.com"}));
        let err = validator.validate_at(&token, 0).unwrap_err();
        assert!(matches!(err, JwtVerifyError::InvalidIssuer { .. }));
    }

    #[test]
    fn audience_matches_against_array_claim() {
        let validator = ClaimValidator {
            audience: Some(vec!["client-2".into()]),
            ..Default::default()
        };
        let token = token_with_payload(serde_json::json!({"aud": ["client-1", "client-2"]}));
        validator.validate_at(&token, 0).unwrap();
    }

    #[test]
    fn exp_is_rejected_past_grace_period() {
        let validator = ClaimValidator {
            graceful_seconds: 5,
            ..Default::default()
        };
        let token = token_with_payload(serde_json::json!({"exp": 100}));
        validator.validate_at(&token, 104).unwrap();
        let err = validator.validate_at(&token, 106).unwrap_err();
        assert!(matches!(err, JwtVerifyError::Expired { .. }));
    }

    #[test]
    fn nbf_is_rejected_before_grace_period() {
        let validator = ClaimValidator {
            graceful_seconds: 5,
            ..Default::default()
        };
        let token = token_with_payload(serde_json::json!({"nbf": 100}));
        validator.validate_at(&token, 96).unwrap();
        let err = validator.validate_at(&token, 90).unwrap_err();
        assert!(matches!(err, JwtVerifyError::NotBefore { .. }));
    }

    #[test]
    fn token_use_mismatch_attaches_raw_jwt() {
        let validator = ClaimValidator {
            token_use: Some(TokenUse::Access),
            ..Default::default()
        };
        let token = token_with_payload(serde_json::json!({"token_use": "id"}));
        let err = validator.validate_at(&token, 0).unwrap_err();
        match err {
            JwtVerifyError::InvalidClaim { raw_jwt, .. } => assert!(raw_jwt.is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn scope_requires_at_least_one_match() {
        let validator = ClaimValidator {
            scope: Some(vec!["admin".into(), "write".into()]),
            ..Default::default()
        };
        let token = token_with_payload(serde_json::json!({"scope": "read write"}));
        validator.validate_at(&token, 0).unwrap();

        let token = token_with_payload(serde_json::json!({"scope": "read"}));
        let err = validator.validate_at(&token, 0).unwrap_err();
        assert!(matches!(err, JwtVerifyError::InvalidClaim { .. }));
    }

    #[test]
    fn alb_signer_and_client_must_match_when_configured() {
        let validator = ClaimValidator {
            alb_signer: Some("arn:aws:elasticloadbalancing:...".into()),
            alb_client: Some(vec!["client-1".into()]),
            ..Default::default()
        };
        let token = token_with_payload(serde_json::json!({
            "signer": "arn:aws:elasticloadbalancing:...",
            "client": "client-1",
        }));
        validator.validate_at(&token, 0).unwrap();

        let token = token_with_payload(serde_json::json!({
            "signer": "arn:aws:elasticloadbalancing:other",
            "client": "client-1",
        }));
        let err = validator.validate_at(&token, 0).unwrap_err();
        assert!(matches!(err, JwtVerifyError::InvalidClaim { .. }));
    }

    #[test]
    fn custom_hook_runs_last_and_can_fail() {
        let validator = ClaimValidator {
            custom_jwt_check: Some(Box::new(|_decomposed| {
                Err(JwtVerifyError::InvalidClaim {
                    message: "custom check failed".into(),
                    raw_jwt: None,
                })
            })),
            ..Default::default()
        };
        let token = token_with_payload(serde_json::json!({}));
        let err = validator.validate_at(&token, 0).unwrap_err();
        assert!(matches!(err, JwtVerifyError::InvalidClaim { .. }));
    }
}
