//! Verifier configuration: issuer descriptors, per-call overrides, and
//! typed builders (C10).

use std::sync::Arc;

use crate::algorithm::{Algorithm, default_allowed_algorithms};
use crate::claims::TokenUse;
use crate::error::{JwtVerifyError, Result};
use crate::jwt::DecomposedJwt;

pub type CustomJwtCheck = Arc<dyn Fn(&DecomposedJwt) -> Result<()> + Send + Sync>;

/// One issuer's verification rules: where its JWKS lives, and what a
/// token from it must satisfy. Constructed via a builder
/// ([`JwtVerifierBuilder`], [`CognitoJwtVerifierBuilder`],
/// [`AlbJwtVerifierBuilder`]), never directly.
#[derive(Clone)]
pub struct IssuerConfig {
    pub issuer: String,
    pub jwks_uri: String,
    pub audience: Option<Vec<String>>,
    pub client_id: Option<Vec<String>>,
    pub alb_arn: Option<Vec<String>>,
    pub alb_client_id: Option<Vec<String>>,
    pub token_use: Option<TokenUse>,
    pub scopes: Option<Vec<String>>,
    pub grace_seconds: i64,
    pub allowed_algorithms: Vec<Algorithm>,
    pub include_raw_jwt_in_errors: bool,
    pub custom_jwt_check: Option<CustomJwtCheck>,
    /// Set only by [`AlbJwtVerifierBuilder`]: this issuer's identity check
    /// is `alb_arn`/`alb_client_id`, not `audience`/`client_id`, so the
    /// mandatory-audience check in [`crate::verifier::JwtVerifier`] is
    /// skipped for it.
    pub uses_alb_identity: bool,
}

impl std::fmt::Debug for IssuerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerConfig")
            .field("issuer", &self.issuer)
            .field("jwks_uri", &self.jwks_uri)
            .field("audience", &self.audience)
            .field("client_id", &self.client_id)
            .field("alb_arn", &self.alb_arn)
            .field("alb_client_id", &self.alb_client_id)
            .field("token_use", &self.token_use)
            .field("scopes", &self.scopes)
            .field("grace_seconds", &self.grace_seconds)
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("include_raw_jwt_in_errors", &self.include_raw_jwt_in_errors)
            .field("custom_jwt_check", &self.custom_jwt_check.as_ref().map(|_| "<fn>"))
            .field("uses_alb_identity", &self.uses_alb_identity)
            .finish()
    }
}

/// Per-call overrides: same shape as [`IssuerConfig`] minus `issuer` and
/// `jwks_uri`, which are never overridable. Any field left `None` falls
/// back to the matched issuer's configured value.
#[derive(Clone, Default)]
pub struct VerifyOverrides {
    pub audience: Option<Vec<String>>,
    pub client_id: Option<Vec<String>>,
    pub scopes: Option<Vec<String>>,
    pub grace_seconds: Option<i64>,
    pub allowed_algorithms: Option<Vec<Algorithm>>,
}

impl IssuerConfig {
    /// Merge per-call overrides onto this issuer's base configuration.
    /// `issuer`/`jwks_uri`/ALB fields are never overridable from a call
    /// site.
    #[must_use]
    pub fn merged(&self, overrides: &VerifyOverrides) -> IssuerConfig {
        IssuerConfig {
            audience: overrides.audience.clone().or_else(|| self.audience.clone()),
            client_id: overrides
                .client_id
                .clone()
                .or_else(|| self.client_id.clone()),
            scopes: overrides.scopes.clone().or_else(|| self.scopes.clone()),
            grace_seconds: overrides.grace_seconds.unwrap_or(self.grace_seconds),
            allowed_algorithms: overrides
                .allowed_algorithms
                .clone()
                .unwrap_or_else(|| self.allowed_algorithms.clone()),
            ..self.clone()
        }
    }
}

/// Builder for a generic, non-Cognito/non-ALB OIDC verifier over one or
/// more issuers.
pub struct JwtVerifierBuilder {
    issuers: Vec<IssuerConfig>,
}

impl JwtVerifierBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { issuers: Vec::new() }
    }

    /// Add an issuer. `jwks_uri` defaults to `<issuer>/.well-known/jwks.json`
    /// when not given explicitly.
    #[must_use]
    pub fn add_issuer(mut self, issuer: impl Into<String>, jwks_uri: Option<String>) -> Self {
        let issuer = issuer.into();
        let jwks_uri = jwks_uri.unwrap_or_else(|| format!("{issuer}/.well-known/jwks.json"));
        self.issuers.push(IssuerConfig {
            issuer,
            jwks_uri,
            audience: None,
            client_id: None,
            alb_arn: None,
            alb_client_id: None,
            token_use: None,
            scopes: None,
            grace_seconds: 0,
            allowed_algorithms: default_allowed_algorithms(),
            include_raw_jwt_in_errors: false,
            custom_jwt_check: None,
            uses_alb_identity: false,
        });
        self
    }

    /// Apply a field-setting closure to the most recently added issuer.
    /// Panics if called before any `add_issuer`, mirroring a programmer
    /// error rather than a runtime one.
    #[must_use]
    pub fn configure_last(mut self, f: impl FnOnce(&mut IssuerConfig)) -> Self {
        let last = self
            .issuers
            .last_mut()
            .expect("configure_last called before add_issuer");
        f(last);
        self
    }

    pub fn build(self) -> Result<Vec<IssuerConfig>> {
        if self.issuers.is_empty() {
            return Err(JwtVerifyError::ParameterValidation(
                "at least one issuer must be configured".into(),
            ));
        }
        Ok(self.issuers)
    }
}

impl Default for JwtVerifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a Cognito user-pool verifier. Fixes `issuer` and `jwks_uri`
/// from `region`/`user_pool_id`, and adds `token_use`/`scope` rules.
pub struct CognitoJwtVerifierBuilder {
    region: Option<String>,
    user_pool_id: Option<String>,
    client_id: Option<Vec<String>>,
    token_use: TokenUse,
    scopes: Option<Vec<String>>,
    grace_seconds: i64,
    allowed_algorithms: Vec<Algorithm>,
    include_raw_jwt_in_errors: bool,
    custom_jwt_check: Option<CustomJwtCheck>,
}

impl CognitoJwtVerifierBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            region: None,
            user_pool_id: None,
            client_id: None,
            token_use: TokenUse::Access,
            scopes: None,
            grace_seconds: 0,
            allowed_algorithms: default_allowed_algorithms(),
            include_raw_jwt_in_errors: false,
            custom_jwt_check: None,
        }
    }

    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    #[must_use]
    pub fn user_pool_id(mut self, user_pool_id: impl Into<String>) -> Self {
        self.user_pool_id = Some(user_pool_id.into());
        self
    }

    /// `None` disables client-id checking entirely.
    #[must_use]
    pub fn client_id(mut self, client_id: Option<Vec<String>>) -> Self {
        self.client_id = client_id;
        self
    }

    #[must_use]
    pub fn token_use(mut self, token_use: TokenUse) -> Self {
        self.token_use = token_use;
        self
    }

    #[must_use]
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    #[must_use]
    pub fn grace_seconds(mut self, grace_seconds: i64) -> Self {
        self.grace_seconds = grace_seconds;
        self
    }

    #[must_use]
    pub fn allowed_algorithms(mut self, allowed_algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = allowed_algorithms;
        self
    }

    #[must_use]
    pub fn include_raw_jwt_in_errors(mut self, include: bool) -> Self {
        self.include_raw_jwt_in_errors = include;
        self
    }

    #[must_use]
    pub fn custom_jwt_check(mut self, check: CustomJwtCheck) -> Self {
        self.custom_jwt_check = Some(check);
        self
    }

    /// Populate `region`/`user_pool_id`/`client_id` from `AWS_REGION`,
    /// `COGNITO_USER_POOL_ID`, and `COGNITO_CLIENT_ID` (comma-separated)
    /// if set. Additive: values already set by builder calls are kept.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.region.is_none()
            && let Ok(region) = std::env::var("AWS_REGION")
        {
            self.region = Some(region);
        }
        if self.user_pool_id.is_none()
            && let Ok(user_pool_id) = std::env::var("COGNITO_USER_POOL_ID")
        {
            self.user_pool_id = Some(user_pool_id);
        }
        if self.client_id.is_none()
            && let Ok(client_id) = std::env::var("COGNITO_CLIENT_ID")
        {
            self.client_id = Some(client_id.split(',').map(str::trim).map(str::to_string).collect());
        }
        self
    }

    pub fn build(self) -> Result<IssuerConfig> {
        let region = self
            .region
            .ok_or_else(|| JwtVerifyError::ParameterValidation("region is required".into()))?;
        let user_pool_id = self.user_pool_id.ok_or_else(|| {
            JwtVerifyError::ParameterValidation("user_pool_id is required".into())
        })?;

        let issuer = format!("https://cognito-idp.{region}.amazonaws.com/{user_pool_id}");
        let jwks_uri = format!("{issuer}/.well-known/jwks.json");

        // ID tokens carry `aud`; access tokens carry `client_id` instead
        // and have no `aud` claim at all.
        let (audience, client_id) = match self.token_use {
            TokenUse::Id => (self.client_id, None),
            TokenUse::Access => (None, self.client_id),
        };

        Ok(IssuerConfig {
            issuer,
            jwks_uri,
            audience,
            client_id,
            alb_arn: None,
            alb_client_id: None,
            token_use: Some(self.token_use),
            scopes: self.scopes,
            grace_seconds: self.grace_seconds,
            allowed_algorithms: self.allowed_algorithms,
            include_raw_jwt_in_errors: self.include_raw_jwt_in_errors,
            custom_jwt_check: self.custom_jwt_check,
            uses_alb_identity: false,
        })
    }
}

impl Default for CognitoJwtVerifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for an ALB-issued OIDC token verifier. Both `alb_arn` and
/// `client_id` must be given explicitly — `None` disables the
/// corresponding check, but omitting the call entirely is a
/// configuration error (mirrors "`undefined` is a configuration error"
/// for ALB in the source system).
pub struct AlbJwtVerifierBuilder {
    issuer: Option<String>,
    jwks_uri: Option<String>,
    alb_arn: Option<Option<Vec<String>>>,
    alb_client_id: Option<Option<Vec<String>>>,
    grace_seconds: i64,
    allowed_algorithms: Vec<Algorithm>,
    include_raw_jwt_in_errors: bool,
    custom_jwt_check: Option<CustomJwtCheck>,
}

impl AlbJwtVerifierBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            issuer: None,
            jwks_uri: None,
            alb_arn: None,
            alb_client_id: None,
            grace_seconds: 0,
            allowed_algorithms: default_allowed_algorithms(),
            include_raw_jwt_in_errors: false,
            custom_jwt_check: None,
        }
    }

    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    #[must_use]
    pub fn jwks_uri(mut self, jwks_uri: impl Into<String>) -> Self {
        self.jwks_uri = Some(jwks_uri.into());
        self
    }

    /// `Some(None)` explicitly disables the ALB-ARN check. Not calling
    /// this at all is a configuration error at `build()`.
    #[must_use]
    pub fn alb_arn(mut self, alb_arn: Option<Vec<String>>) -> Self {
        self.alb_arn = Some(alb_arn);
        self
    }

    /// `Some(None)` explicitly disables the client-id check. Not calling
    /// this at all is a configuration error at `build()`.
    #[must_use]
    pub fn client_id(mut self, client_id: Option<Vec<String>>) -> Self {
        self.alb_client_id = Some(client_id);
        self
    }

    #[must_use]
    pub fn grace_seconds(mut self, grace_seconds: i64) -> Self {
        self.grace_seconds = grace_seconds;
        self
    }

    #[must_use]
    pub fn allowed_algorithms(mut self, allowed_algorithms: Vec<Algorithm>) -> Self {
        self.allowed_algorithms = allowed_algorithms;
        self
    }

    #[must_use]
    pub fn include_raw_jwt_in_errors(mut self, include: bool) -> Self {
        self.include_raw_jwt_in_errors = include;
        self
    }

    #[must_use]
    pub fn custom_jwt_check(mut self, check: CustomJwtCheck) -> Self {
        self.custom_jwt_check = Some(check);
        self
    }

    pub fn build(self) -> Result<IssuerConfig> {
        let issuer = self
            .issuer
            .ok_or_else(|| JwtVerifyError::ParameterValidation("issuer is required".into()))?;
        let jwks_uri = self
            .jwks_uri
            .ok_or_else(|| JwtVerifyError::ParameterValidation("jwks_uri is required".into()))?;
        let alb_arn = self.alb_arn.ok_or_else(|| {
            JwtVerifyError::ParameterValidation(
                "alb_arn must be set explicitly (Some to check, None to disable)".into(),
            )
        })?;
        let alb_client_id = self.alb_client_id.ok_or_else(|| {
            JwtVerifyError::ParameterValidation(
                "client_id must be set explicitly (Some to check, None to disable)".into(),
            )
        })?;

        Ok(IssuerConfig {
            issuer,
            jwks_uri,
            audience: None,
            client_id: None,
            alb_arn,
            alb_client_id,
            token_use: None,
            scopes: None,
            grace_seconds: self.grace_seconds,
            allowed_algorithms: self.allowed_algorithms,
            include_raw_jwt_in_errors: self.include_raw_jwt_in_errors,
            custom_jwt_check: self.custom_jwt_check,
            uses_alb_identity: true,
        })
    }
}

impl Default for AlbJwtVerifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}
