//! Error types for JWT/JWKS verification.

use crate::jwt::DecomposedJwt;
use thiserror::Error;

/// Main error type for verification operations.
///
/// Clone is derived so a fetch failure can be broadcast to every caller
/// sharing a single-flight [`crate::cache::JwksCache`] fetch.
#[derive(Error, Debug, Clone)]
pub enum JwtVerifyError {
    // -- Parameter / config errors -----------------------------------
    /// A required configuration field was neither set on the verifier nor
    /// supplied via per-call overrides.
    #[error("parameter validation error: {0}")]
    ParameterValidation(String),

    // -- Structural parse errors --------------------------------------
    /// The compact serialization could not be decomposed into a valid JWT.
    #[error("JWT parse error: {0}")]
    JwtParse(String),

    /// The fetched JWKS document is not a valid key set.
    #[error("JWKS validation error: {0}")]
    JwksValidation(String),

    /// A single JWK is structurally invalid.
    #[error("JWK validation error: {0}")]
    JwkValidation(String),

    // -- Key discovery errors ------------------------------------------
    /// The JWT header has no usable `kid`.
    #[error("JWT has no valid kid")]
    JwtWithoutValidKid,

    /// The `kid` was not present in the (possibly freshly fetched) JWKS.
    #[error("kid '{kid}' not found in JWKS at {uri}")]
    KidNotFoundInJwks { uri: String, kid: String },

    /// `get_cached_jwk` was called for a URI that has never been
    /// populated.
    #[error("JWKS not available in cache for {0}")]
    JwksNotAvailableInCache(String),

    /// The URI is currently in its penalty-box back-off window.
    #[error("wait period not yet ended for {0}")]
    WaitPeriodNotYetEnded(String),

    // -- Signature errors ------------------------------------------------
    /// Signature verification failed, or the algorithm/key family
    /// combination is unsupported or mismatched. Never carries details
    /// from the underlying crypto primitive.
    #[error("invalid JWT signature")]
    InvalidSignature,

    // -- Claim errors ------------------------------------------------
    /// `exp` has passed (including grace seconds).
    #[error("JWT expired")]
    Expired { raw_jwt: Option<Box<DecomposedJwt>> },

    /// `nbf` is still in the future (including grace seconds).
    #[error("JWT not yet valid (nbf)")]
    NotBefore { raw_jwt: Option<Box<DecomposedJwt>> },

    /// `iss` did not match any configured issuer.
    #[error("invalid JWT issuer")]
    InvalidIssuer { raw_jwt: Option<Box<DecomposedJwt>> },

    /// `aud`/`client_id` did not match the configured audience/client.
    #[error("invalid JWT audience")]
    InvalidAudience { raw_jwt: Option<Box<DecomposedJwt>> },

    /// Catch-all claim failure: ALB signer/client mismatch, `token_use`,
    /// `scope`, or a failed `custom_jwt_check`.
    #[error("invalid JWT claim: {message}")]
    InvalidClaim {
        message: String,
        raw_jwt: Option<Box<DecomposedJwt>>,
    },

    // -- Network / fetch errors ------------------------------------------
    /// The fetcher could not retrieve the JWKS document.
    #[error("JWKS fetch error: {0}")]
    Fetch(String),
}

impl JwtVerifyError {
    /// True for the claim-error variants, the only ones allowed to carry
    /// `raw_jwt` — a signature failure never attaches raw JWT content.
    #[must_use]
    pub fn is_claim_error(&self) -> bool {
        matches!(
            self,
            JwtVerifyError::Expired { .. }
                | JwtVerifyError::NotBefore { .. }
                | JwtVerifyError::InvalidIssuer { .. }
                | JwtVerifyError::InvalidAudience { .. }
                | JwtVerifyError::InvalidClaim { .. }
        )
    }

    /// Attach the decomposed JWT to a claim-error variant. No-op on any
    /// other variant (in particular, never on `InvalidSignature`).
    #[must_use]
    pub fn with_raw_jwt(mut self, jwt: DecomposedJwt) -> Self {
        let slot = match &mut self {
            JwtVerifyError::Expired { raw_jwt }
            | JwtVerifyError::NotBefore { raw_jwt }
            | JwtVerifyError::InvalidIssuer { raw_jwt }
            | JwtVerifyError::InvalidAudience { raw_jwt }
            | JwtVerifyError::InvalidClaim { raw_jwt, .. } => raw_jwt,
            _ => return self,
        };
        *slot = Some(Box::new(jwt));
        self
    }
}

/// Result type alias for verification operations.
pub type Result<T> = std::result::Result<T, JwtVerifyError>;
