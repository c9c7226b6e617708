//! JWK/JWKS model and structural validation (C2).

use serde::{Deserialize, Serialize};

use crate::error::{JwtVerifyError, Result};

/// A single JSON Web Key. Tolerant of unknown fields (`serde`'s default
/// behavior), strict about the types of the fields it does know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    // RSA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// Key type, validated from `Jwk::kty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ec,
    Okp,
}

impl Jwk {
    /// Structurally validate this key: `kty` must be one of `RSA`/`EC`/
    /// `OKP`, `use` (if present) must be `"sig"`, and the family-specific
    /// required fields must be present.
    pub fn validate(&self) -> Result<KeyType> {
        if let Some(use_) = &self.use_
            && use_ != "sig"
        {
            return Err(JwtVerifyError::JwkValidation(format!(
                "unsupported key use: {use_}"
            )));
        }

        match self.kty.as_str() {
            "RSA" => {
                if self.n.is_none() || self.e.is_none() {
                    return Err(JwtVerifyError::JwkValidation(
                        "RSA key missing 'n' or 'e'".into(),
                    ));
                }
                Ok(KeyType::Rsa)
            }
            "EC" => {
                match self.crv.as_deref() {
                    Some("P-256" | "P-384" | "P-521") => {}
                    Some(other) => {
                        return Err(JwtVerifyError::JwkValidation(format!(
                            "unsupported EC curve: {other}"
                        )));
                    }
                    None => {
                        return Err(JwtVerifyError::JwkValidation("EC key missing 'crv'".into()));
                    }
                }
                if self.x.is_none() || self.y.is_none() {
                    return Err(JwtVerifyError::JwkValidation(
                        "EC key missing 'x' or 'y'".into(),
                    ));
                }
                Ok(KeyType::Ec)
            }
            "OKP" => {
                match self.crv.as_deref() {
                    Some("Ed25519" | "Ed448") => {}
                    Some(other) => {
                        return Err(JwtVerifyError::JwkValidation(format!(
                            "unsupported OKP curve: {other}"
                        )));
                    }
                    None => {
                        return Err(JwtVerifyError::JwkValidation("OKP key missing 'crv'".into()));
                    }
                }
                if self.x.is_none() {
                    return Err(JwtVerifyError::JwkValidation("OKP key missing 'x'".into()));
                }
                Ok(KeyType::Okp)
            }
            other => Err(JwtVerifyError::JwkValidation(format!(
                "unsupported kty: {other}"
            ))),
        }
    }

    /// A JWK whose `kid` is a non-empty string — the only kind addressable
    /// by the cache.
    #[must_use]
    pub fn has_valid_kid(&self) -> bool {
        matches!(&self.kid, Some(k) if !k.is_empty())
    }
}

/// An ordered set of JWKs, as delivered at `{ "keys": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Parse and structurally validate a JWKS document from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| JwtVerifyError::JwksValidation(format!("invalid JWKS JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Refine an arbitrary parsed JSON value into a JWKS.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| JwtVerifyError::JwksValidation("JWKS must be a JSON object".into()))?;
        let keys_value = obj
            .get("keys")
            .ok_or_else(|| JwtVerifyError::JwksValidation("JWKS missing 'keys'".into()))?;
        let jwks: Jwks = serde_json::from_value(serde_json::json!({ "keys": keys_value }))
            .map_err(|e| JwtVerifyError::JwksValidation(format!("invalid 'keys' array: {e}")))?;
        Ok(jwks)
    }

    /// Look up a key by `kid`. `kid` collisions within a set are legal but
    /// ambiguous — the first match wins. Never fetches.
    #[must_use]
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_jwk(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".into(),
            use_: Some("sig".into()),
            alg: None,
            kid: Some(kid.into()),
            n: Some("modulus".into()),
            e: Some("AQAB".into()),
            crv: None,
            x: None,
            y: None,
        }
    }

    #[test]
    fn validates_rsa_key() {
        assert_eq!(rsa_jwk("k1").validate().unwrap(), KeyType::Rsa);
    }

    #[test]
    fn rejects_non_sig_use() {
        let mut jwk = rsa_jwk("k1");
        jwk.use_ = Some("enc".into());
        assert!(jwk.validate().is_err());
    }

    #[test]
    fn rejects_rsa_missing_fields() {
        let mut jwk = rsa_jwk("k1");
        jwk.e = None;
        assert!(jwk.validate().is_err());
    }

    #[test]
    fn rejects_unknown_kty() {
        let mut jwk = rsa_jwk("k1");
        jwk.kty = "oct".into();
        assert!(jwk.validate().is_err());
    }

    #[test]
    fn first_match_wins_on_kid_collision() {
        let mut a = rsa_jwk("dup");
        a.n = Some("first".into());
        let mut b = rsa_jwk("dup");
        b.n = Some("second".into());
        let jwks = Jwks { keys: vec![a, b] };
        assert_eq!(jwks.find_by_kid("dup").unwrap().n.as_deref(), Some("first"));
    }

    #[test]
    fn parses_jwks_document() {
        let body = serde_json::json!({
            "keys": [
                {"kty": "RSA", "kid": "k1", "n": "n", "e": "AQAB"},
            ]
        });
        let jwks = Jwks::parse(serde_json::to_vec(&body).unwrap().as_slice()).unwrap();
        assert_eq!(jwks.keys.len(), 1);
    }

    #[test]
    fn rejects_jwks_without_keys_field() {
        let body = serde_json::json!({"not_keys": []});
        assert!(Jwks::from_value(body).is_err());
    }
}
