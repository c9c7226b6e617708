//! Compact-serialization decomposition (C1).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};

use crate::error::{JwtVerifyError, Result};

/// A JWT split into its three parts, with the base64url-encoded header
/// and payload segments retained verbatim — signature verification is
/// computed over `header_b64 '.' payload_b64`, not over the re-serialized
/// JSON.
#[derive(Debug, Clone)]
pub struct DecomposedJwt {
    pub header: Map<String, Value>,
    pub payload: Map<String, Value>,
    pub signature: Vec<u8>,
    pub header_b64: String,
    pub payload_b64: String,
}

impl DecomposedJwt {
    /// Parse a compact-serialization JWT string.
    ///
    /// Splits on `.` into exactly three non-empty parts, base64url-decodes
    /// each, and JSON-parses header and payload (each must be a JSON
    /// object). `alg` in the header must be a non-empty string. Signature
    /// bytes are kept raw and unvalidated here; algorithm-specific length
    /// checks are the dispatcher's job.
    pub fn parse(token: &str) -> Result<Self> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().unwrap_or_default();
        let payload_b64 = parts
            .next()
            .ok_or_else(|| JwtVerifyError::JwtParse("missing payload segment".into()))?;
        let signature_b64 = parts
            .next()
            .ok_or_else(|| JwtVerifyError::JwtParse("missing signature segment".into()))?;
        if parts.next().is_some() {
            return Err(JwtVerifyError::JwtParse(
                "token has more than three segments".into(),
            ));
        }
        if header_b64.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(JwtVerifyError::JwtParse(
                "token segments must be non-empty".into(),
            ));
        }

        let header = decode_json_object(header_b64, "header")?;
        let payload = decode_json_object(payload_b64, "payload")?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| JwtVerifyError::JwtParse(format!("invalid signature base64url: {e}")))?;

        match header.get("alg") {
            Some(Value::String(s)) if !s.is_empty() => {}
            _ => {
                return Err(JwtVerifyError::JwtParse(
                    "header.alg must be a non-empty string".into(),
                ));
            }
        }

        Ok(DecomposedJwt {
            header,
            payload,
            signature,
            header_b64: header_b64.to_string(),
            payload_b64: payload_b64.to_string(),
        })
    }

    /// `header.alg`, already validated to be a non-empty string by `parse`.
    #[must_use]
    pub fn alg(&self) -> &str {
        self.header
            .get("alg")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// `header.kid`, if present and a string.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.header.get("kid").and_then(Value::as_str)
    }

    /// The exact bytes the signature is computed over:
    /// `header_b64 '.' payload_b64`.
    #[must_use]
    pub fn signing_input(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.header_b64.len() + 1 + self.payload_b64.len());
        buf.extend_from_slice(self.header_b64.as_bytes());
        buf.push(b'.');
        buf.extend_from_slice(self.payload_b64.as_bytes());
        buf
    }

    /// Recompose the original compact serialization. Used to assert
    /// decompose-compose symmetry.
    #[must_use]
    pub fn recompose(&self) -> String {
        let sig_b64 = URL_SAFE_NO_PAD.encode(&self.signature);
        format!("{}.{}.{sig_b64}", self.header_b64, self.payload_b64)
    }
}

fn decode_json_object(segment_b64: &str, name: &str) -> Result<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment_b64)
        .map_err(|e| JwtVerifyError::JwtParse(format!("invalid {name} base64url: {e}")))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| JwtVerifyError::JwtParse(format!("invalid {name} JSON: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(JwtVerifyError::JwtParse(format!(
            "{name} must be a JSON object"
        ))),
    }
}
