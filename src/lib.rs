//! Async JWT/JWKS verification for Cognito, ALB, and generic OIDC issuers.
//!
//! A verifier is built once (typically at process startup) via
//! [`config::CognitoJwtVerifierBuilder`], [`config::AlbJwtVerifierBuilder`],
//! or [`config::JwtVerifierBuilder`] and reused across requests; its JWKS
//! cache and penalty box live as long as the verifier.

pub mod algorithm;
pub mod alb;
pub mod cache;
pub mod claims;
pub mod cognito;
pub mod config;
pub mod error;
pub mod fetch;
pub mod jwk;
pub mod jwt;
pub mod penalty_box;
pub mod verifier;

pub use alb::AlbJwtVerifier;
pub use cognito::CognitoJwtVerifier;
pub use config::{
    AlbJwtVerifierBuilder, CognitoJwtVerifierBuilder, IssuerConfig, JwtVerifierBuilder,
    VerifyOverrides,
};
pub use error::{JwtVerifyError, Result};
pub use jwk::{Jwk, Jwks};
pub use jwt::DecomposedJwt;
pub use verifier::JwtVerifier;
