//! Shared helpers for integration tests: a local JWKS HTTP stub and test
//! token minting.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::traits::PublicKeyParts as _;
use serde_json::Value;
use tokio::net::TcpListener;

/// An in-process HTTP server serving a mutable JWKS document, used so
/// tests can exercise cache refresh / kid rotation against a real fetch
/// path.
pub struct JwksStub {
    pub base_url: String,
    body: Arc<Mutex<Value>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl JwksStub {
    pub async fn start(initial: Value) -> Self {
        let body = Arc::new(Mutex::new(initial));
        let app_state = body.clone();
        let app = Router::new()
            .route("/jwks.json", get(serve_jwks))
            .with_state(app_state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            body,
            _handle: handle,
        }
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}/jwks.json", self.base_url)
    }

    pub fn set_body(&self, value: Value) {
        *self.body.lock().unwrap() = value;
    }
}

async fn serve_jwks(State(body): State<Arc<Mutex<Value>>>) -> Json<Value> {
    Json(body.lock().unwrap().clone())
}

/// Generate an RSA key pair and its JWK representation (`RS256`).
pub fn rsa_key_and_jwk(kid: &str) -> (rsa::RsaPrivateKey, Value) {
    let mut rng = rand::thread_rng();
    let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public_key = rsa::RsaPublicKey::from(&private_key);
    let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
    let jwk = serde_json::json!({"kty": "RSA", "use": "sig", "kid": kid, "n": n, "e": e});
    (private_key, jwk)
}

/// Sign a header/payload pair with an RS256 key, returning the compact
/// serialization.
pub fn sign_rs256(private_key: &rsa::RsaPrivateKey, header: &Value, payload: &Value) -> String {
    use rsa::pkcs1v15::SigningKey;
    use rsa::sha2::Sha256;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
    let signing_input = format!("{header_b64}.{payload_b64}");

    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    format!("{signing_input}.{sig_b64}")
}

/// Generate a P-256 key pair and its JWK representation (`ES256`).
pub fn es256_key_and_jwk(kid: &str) -> (p256::ecdsa::SigningKey, Value) {
    let signing_key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
    let point = signing_key.verifying_key().to_encoded_point(false);
    let jwk = serde_json::json!({
        "kty": "EC",
        "use": "sig",
        "kid": kid,
        "crv": "P-256",
        "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
        "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
    });
    (signing_key, jwk)
}

pub fn sign_es256(signing_key: &p256::ecdsa::SigningKey, header: &Value, payload: &Value) -> String {
    use p256::ecdsa::signature::Signer;

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature: p256::ecdsa::Signature = signing_key.sign(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
    format!("{signing_input}.{sig_b64}")
}

pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
