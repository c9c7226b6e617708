//! Signature algorithm dispatch (C6).
//!
//! `jsonwebtoken` (rust_crypto backend) covers RS256/384/512, PS256/384/512,
//! ES256, ES384, and EdDSA/Ed25519. It has no `Algorithm` variant for ES512
//! (P-521, RFC 7518 requires SHA-512 over secp521r1) or Ed448, so those two
//! families are verified directly against `p521` and `ed448-rust`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;

use crate::error::{JwtVerifyError, Result};
use crate::jwk::{Jwk, KeyType};
use crate::jwt::DecomposedJwt;

/// The full set of algorithms this crate can verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
    Es256,
    Es384,
    Es512,
    EdDsa,
}

impl Algorithm {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Rs256 => "RS256",
            Algorithm::Rs384 => "RS384",
            Algorithm::Rs512 => "RS512",
            Algorithm::Ps256 => "PS256",
            Algorithm::Ps384 => "PS384",
            Algorithm::Ps512 => "PS512",
            Algorithm::Es256 => "ES256",
            Algorithm::Es384 => "ES384",
            Algorithm::Es512 => "ES512",
            Algorithm::EdDsa => "EdDSA",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "RS256" => Algorithm::Rs256,
            "RS384" => Algorithm::Rs384,
            "RS512" => Algorithm::Rs512,
            "PS256" => Algorithm::Ps256,
            "PS384" => Algorithm::Ps384,
            "PS512" => Algorithm::Ps512,
            "ES256" => Algorithm::Es256,
            "ES384" => Algorithm::Es384,
            "ES512" => Algorithm::Es512,
            "EdDSA" => Algorithm::EdDsa,
            _ => return None,
        })
    }

    fn to_jsonwebtoken(self) -> Option<jsonwebtoken::Algorithm> {
        Some(match self {
            Algorithm::Rs256 => jsonwebtoken::Algorithm::RS256,
            Algorithm::Rs384 => jsonwebtoken::Algorithm::RS384,
            Algorithm::Rs512 => jsonwebtoken::Algorithm::RS512,
            Algorithm::Ps256 => jsonwebtoken::Algorithm::PS256,
            Algorithm::Ps384 => jsonwebtoken::Algorithm::PS384,
            Algorithm::Ps512 => jsonwebtoken::Algorithm::PS512,
            Algorithm::Es256 => jsonwebtoken::Algorithm::ES256,
            Algorithm::Es384 => jsonwebtoken::Algorithm::ES384,
            Algorithm::EdDsa => jsonwebtoken::Algorithm::EdDSA,
            Algorithm::Es512 => return None,
        })
    }
}

/// Default set of algorithms a verifier will accept, absent an explicit
/// `allowed_algorithms` override. Excludes nothing; callers who want a
/// tighter allow-list (e.g. RSA only) set it explicitly.
#[must_use]
pub fn default_allowed_algorithms() -> Vec<Algorithm> {
    vec![
        Algorithm::Rs256,
        Algorithm::Rs384,
        Algorithm::Rs512,
        Algorithm::Ps256,
        Algorithm::Ps384,
        Algorithm::Ps512,
        Algorithm::Es256,
        Algorithm::Es384,
        Algorithm::Es512,
        Algorithm::EdDsa,
    ]
}

/// Verify `decomposed`'s signature against `jwk`, subject to `allowed`.
///
/// Order of checks, each a distinct failure mode collapsed to
/// [`JwtVerifyError::InvalidSignature`] so no internal detail leaks:
/// 1. the header's `alg` is a name this crate recognizes;
/// 2. if the JWK declares its own `alg`, it must match the header's
///    (key confusion / algorithm substitution defense);
/// 3. the resolved algorithm is in the caller's `allowed` set;
/// 4. the JWK's key type/curve is compatible with the algorithm;
/// 5. the cryptographic verification itself.
pub fn verify_signature(decomposed: &DecomposedJwt, jwk: &Jwk, allowed: &[Algorithm]) -> Result<()> {
    let header_alg = decomposed.alg();
    let algorithm = Algorithm::from_name(header_alg).ok_or(JwtVerifyError::InvalidSignature)?;

    if let Some(jwk_alg) = &jwk.alg
        && jwk_alg != header_alg
    {
        return Err(JwtVerifyError::InvalidSignature);
    }

    if !allowed.contains(&algorithm) {
        return Err(JwtVerifyError::InvalidSignature);
    }

    let key_type = jwk.validate().map_err(|_| JwtVerifyError::InvalidSignature)?;
    check_family(algorithm, key_type, jwk)?;

    let signing_input = decomposed.signing_input();

    match algorithm {
        Algorithm::Es512 => verify_es512(&signing_input, &decomposed.signature, jwk),
        Algorithm::EdDsa if jwk.crv.as_deref() == Some("Ed448") => {
            verify_ed448(&signing_input, &decomposed.signature, jwk)
        }
        _ => verify_with_jsonwebtoken(algorithm, &signing_input, &decomposed.signature, jwk),
    }
}

fn check_family(algorithm: Algorithm, key_type: KeyType, jwk: &Jwk) -> Result<()> {
    let ok = match algorithm {
        Algorithm::Rs256
        | Algorithm::Rs384
        | Algorithm::Rs512
        | Algorithm::Ps256
        | Algorithm::Ps384
        | Algorithm::Ps512 => key_type == KeyType::Rsa,
        Algorithm::Es256 => key_type == KeyType::Ec && jwk.crv.as_deref() == Some("P-256"),
        Algorithm::Es384 => key_type == KeyType::Ec && jwk.crv.as_deref() == Some("P-384"),
        Algorithm::Es512 => key_type == KeyType::Ec && jwk.crv.as_deref() == Some("P-521"),
        Algorithm::EdDsa => {
            key_type == KeyType::Okp && matches!(jwk.crv.as_deref(), Some("Ed25519" | "Ed448"))
        }
    };
    if ok {
        Ok(())
    } else {
        Err(JwtVerifyError::InvalidSignature)
    }
}

fn verify_with_jsonwebtoken(
    algorithm: Algorithm,
    signing_input: &[u8],
    signature: &[u8],
    jwk: &Jwk,
) -> Result<()> {
    let jwt_alg = algorithm
        .to_jsonwebtoken()
        .ok_or(JwtVerifyError::InvalidSignature)?;

    let decoding_key = match algorithm {
        Algorithm::Rs256
        | Algorithm::Rs384
        | Algorithm::Rs512
        | Algorithm::Ps256
        | Algorithm::Ps384
        | Algorithm::Ps512 => {
            let n = jwk.n.as_deref().ok_or(JwtVerifyError::InvalidSignature)?;
            let e = jwk.e.as_deref().ok_or(JwtVerifyError::InvalidSignature)?;
            DecodingKey::from_rsa_components(n, e).map_err(|_| JwtVerifyError::InvalidSignature)?
        }
        Algorithm::Es256 | Algorithm::Es384 => {
            let x = jwk.x.as_deref().ok_or(JwtVerifyError::InvalidSignature)?;
            let y = jwk.y.as_deref().ok_or(JwtVerifyError::InvalidSignature)?;
            DecodingKey::from_ec_components(x, y).map_err(|_| JwtVerifyError::InvalidSignature)?
        }
        Algorithm::EdDsa => {
            let x = jwk.x.as_deref().ok_or(JwtVerifyError::InvalidSignature)?;
            DecodingKey::from_ed_components(x).map_err(|_| JwtVerifyError::InvalidSignature)?
        }
        Algorithm::Es512 => unreachable!("ES512 is dispatched to verify_es512"),
    };

    let signature_b64 = URL_SAFE_NO_PAD.encode(signature);
    let message_b64 = std::str::from_utf8(signing_input).map_err(|_| JwtVerifyError::InvalidSignature)?;

    let ok = jsonwebtoken::crypto::verify(&signature_b64, message_b64.as_bytes(), &decoding_key, jwt_alg)
        .map_err(|_| JwtVerifyError::InvalidSignature)?;

    if ok {
        Ok(())
    } else {
        Err(JwtVerifyError::InvalidSignature)
    }
}

/// ES512 (ECDSA P-521 / SHA-512). JOSE carries the signature as raw
/// `r || s`, each left-padded to the field's byte width (66 bytes for
/// P-521); DER is never seen on the wire here but some issuers are known
/// to emit it, so both shapes are accepted.
fn verify_es512(signing_input: &[u8], signature: &[u8], jwk: &Jwk) -> Result<()> {
    use p521::ecdsa::signature::Verifier;
    use p521::ecdsa::{Signature, VerifyingKey};

    let x = decode_b64url_field(jwk.x.as_deref())?;
    let y = decode_b64url_field(jwk.y.as_deref())?;

    let mut point = vec![0x04u8];
    point.extend_from_slice(&left_pad(&x, 66));
    point.extend_from_slice(&left_pad(&y, 66));

    let verifying_key =
        VerifyingKey::from_sec1_bytes(&point).map_err(|_| JwtVerifyError::InvalidSignature)?;

    let sig = jose_or_der_to_signature::<Signature>(signature, 66)?;

    verifying_key
        .verify(signing_input, &sig)
        .map_err(|_| JwtVerifyError::InvalidSignature)
}

/// Ed448 (EdDSA over the edwards448 curve). `jsonwebtoken` does not expose
/// an `Algorithm` for it; `ed448-rust` verifies directly against the raw
/// 57-byte public key and 114-byte signature, neither of which need
/// DER/raw normalization since Ed448 has no ASN.1 wire form in JOSE.
fn verify_ed448(signing_input: &[u8], signature: &[u8], jwk: &Jwk) -> Result<()> {
    use ed448_rust::{Ed448Error, PublicKey};

    let x = decode_b64url_field(jwk.x.as_deref())?;
    let public_key: PublicKey = x.as_slice().try_into().map_err(|_: Ed448Error| JwtVerifyError::InvalidSignature)?;

    public_key
        .verify(signing_input, signature, None)
        .map_err(|_: Ed448Error| JwtVerifyError::InvalidSignature)
}

fn decode_b64url_field(field: Option<&str>) -> Result<Vec<u8>> {
    let field = field.ok_or(JwtVerifyError::InvalidSignature)?;
    URL_SAFE_NO_PAD
        .decode(field)
        .map_err(|_| JwtVerifyError::InvalidSignature)
}

fn left_pad(bytes: &[u8], width: usize) -> Vec<u8> {
    if bytes.len() >= width {
        return bytes[bytes.len() - width..].to_vec();
    }
    let mut padded = vec![0u8; width - bytes.len()];
    padded.extend_from_slice(bytes);
    padded
}

/// JOSE ECDSA signatures are raw `r || s` (`2 * field_width` bytes); some
/// issuers have been observed sending DER instead. Detect DER by its
/// `SEQUENCE` tag and convert; otherwise treat the bytes as raw and
/// left-pad each half.
fn jose_or_der_to_signature<S>(signature: &[u8], field_width: usize) -> Result<S>
where
    S: for<'a> TryFrom<&'a [u8]>,
{
    let raw = if signature.first() == Some(&0x30) {
        der_to_raw(signature, field_width)?
    } else {
        let mut buf = Vec::with_capacity(field_width * 2);
        let half = signature.len() / 2;
        buf.extend_from_slice(&left_pad(&signature[..half], field_width));
        buf.extend_from_slice(&left_pad(&signature[half..], field_width));
        buf
    };
    S::try_from(raw.as_slice()).ok().ok_or(JwtVerifyError::InvalidSignature)
}

/// Minimal DER `SEQUENCE { INTEGER r, INTEGER s }` parser, tolerant of the
/// leading zero byte ASN.1 INTEGER encoding adds when the high bit is set.
fn der_to_raw(der: &[u8], field_width: usize) -> Result<Vec<u8>> {
    let mut pos = 0usize;
    let next = |pos: &mut usize, der: &[u8]| -> Result<u8> {
        let b = *der.get(*pos).ok_or(JwtVerifyError::InvalidSignature)?;
        *pos += 1;
        Ok(b)
    };

    if next(&mut pos, der)? != 0x30 {
        return Err(JwtVerifyError::InvalidSignature);
    }
    let _seq_len = read_der_len(der, &mut pos)?;

    let r = read_der_integer(der, &mut pos)?;
    let s = read_der_integer(der, &mut pos)?;

    let mut out = Vec::with_capacity(field_width * 2);
    out.extend_from_slice(&left_pad(&r, field_width));
    out.extend_from_slice(&left_pad(&s, field_width));
    Ok(out)
}

fn read_der_len(der: &[u8], pos: &mut usize) -> Result<usize> {
    let first = *der.get(*pos).ok_or(JwtVerifyError::InvalidSignature)?;
    *pos += 1;
    if first & 0x80 == 0 {
        return Ok(first as usize);
    }
    let num_bytes = (first & 0x7f) as usize;
    let mut len = 0usize;
    for _ in 0..num_bytes {
        let b = *der.get(*pos).ok_or(JwtVerifyError::InvalidSignature)?;
        *pos += 1;
        len = (len << 8) | usize::from(b);
    }
    Ok(len)
}

fn read_der_integer(der: &[u8], pos: &mut usize) -> Result<Vec<u8>> {
    let tag = *der.get(*pos).ok_or(JwtVerifyError::InvalidSignature)?;
    *pos += 1;
    if tag != 0x02 {
        return Err(JwtVerifyError::InvalidSignature);
    }
    let len = read_der_len(der, pos)?;
    let bytes = der
        .get(*pos..*pos + len)
        .ok_or(JwtVerifyError::InvalidSignature)?;
    *pos += len;
    // Strip a leading 0x00 pad byte added when the MSB would otherwise
    // read as a negative two's-complement integer.
    let bytes = if bytes.len() > 1 && bytes[0] == 0 {
        &bytes[1..]
    } else {
        bytes
    };
    Ok(bytes.to_vec())
}
