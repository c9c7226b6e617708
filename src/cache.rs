//! JWKS cache: URI → JWKS, (URI, kid) → JWK, single-flight fetch (C5).

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt as _;
use futures::future::Shared;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock;

use crate::error::{JwtVerifyError, Result};
use crate::fetch::Fetcher;
use crate::jwk::{Jwk, Jwks};
use crate::jwt::DecomposedJwt;
use crate::penalty_box::PenaltyBox;

type PendingFetch = Shared<futures::future::BoxFuture<'static, Result<Jwks>>>;

/// Maps JWKS URI to the last successfully fetched [`Jwks`], resolves
/// `(uri, kid)` to a JWK, and deduplicates concurrent fetches for the
/// same URI.
///
/// Cancellation safety: a dropped `get_jwks`/`get_jwk` future simply stops
/// polling the shared in-flight future — it never cancels the underlying
/// fetch for other awaiters, and the "pending" slot is cleared by whichever
/// awaiter's poll observes completion, not by the dropped one.
pub struct JwksCache {
    fetcher: Arc<dyn Fetcher>,
    penalty_box: Arc<dyn PenaltyBox>,
    jwks: RwLock<HashMap<String, Jwks>>,
    pending: AsyncMutex<HashMap<String, PendingFetch>>,
}

impl JwksCache {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, penalty_box: Arc<dyn PenaltyBox>) -> Self {
        Self {
            fetcher,
            penalty_box,
            jwks: RwLock::new(HashMap::new()),
            pending: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Idempotent insertion, e.g. to seed the cache in tests or from a
    /// side-channel discovery document.
    pub async fn add_jwks(&self, uri: &str, jwks: Jwks) {
        self.jwks.write().await.insert(uri.to_string(), jwks);
    }

    /// Returns the cached JWKS if present, else performs a single-flight
    /// fetch. Concurrent callers for the same URI share the one pending
    /// fetch; on failure the pending entry is cleared and every waiter
    /// observes the same error, without the cache being mutated.
    pub async fn get_jwks(&self, uri: &str) -> Result<Jwks> {
        if let Some(jwks) = self.jwks.read().await.get(uri) {
            return Ok(jwks.clone());
        }
        self.fetch_and_store(uri).await
    }

    async fn fetch_and_store(&self, uri: &str) -> Result<Jwks> {
        let shared = {
            let mut pending = self.pending.lock().await;
            if let Some(existing) = pending.get(uri) {
                existing.clone()
            } else {
                let fetcher = self.fetcher.clone();
                let uri_owned = uri.to_string();
                let fut: futures::future::BoxFuture<'static, Result<Jwks>> = Box::pin(async move {
                    let bytes = fetcher.fetch(&uri_owned).await?;
                    Jwks::parse(&bytes)
                });
                let shared: PendingFetch = fut.shared();
                pending.insert(uri.to_string(), shared.clone());
                shared
            }
        };

        let result = shared.await;

        // Whoever observes completion first clears the slot and, on
        // success, publishes the JWKS; later awaiters of the same
        // `Shared` just get the cached `Result` clone.
        {
            let mut pending = self.pending.lock().await;
            pending.remove(uri);
        }

        match &result {
            Ok(jwks) => {
                self.jwks
                    .write()
                    .await
                    .insert(uri.to_string(), jwks.clone());
                tracing::debug!(uri, num_keys = jwks.keys.len(), "JWKS cache updated");
            }
            Err(e) => {
                tracing::warn!(uri, error = %e, "JWKS fetch failed");
            }
        }

        result
    }

    /// Resolve `(uri, decomposed.kid)` against the cached JWKS only.
    /// Never fetches.
    pub async fn get_cached_jwk(&self, uri: &str, decomposed: &DecomposedJwt) -> Result<Jwk> {
        let cache = self.jwks.read().await;
        let jwks = cache
            .get(uri)
            .ok_or_else(|| JwtVerifyError::JwksNotAvailableInCache(uri.to_string()))?;
        let kid = decomposed
            .kid()
            .filter(|k| !k.is_empty())
            .ok_or(JwtVerifyError::JwtWithoutValidKid)?;
        jwks.find_by_kid(kid)
            .cloned()
            .ok_or_else(|| JwtVerifyError::KidNotFoundInJwks {
                uri: uri.to_string(),
                kid: kid.to_string(),
            })
    }

    /// Resolve `(uri, decomposed.kid)`, refreshing the JWKS on a cache
    /// miss. A miss does not invalidate the previously cached JWKS — it
    /// only triggers a refresh attempt; the freshly fetched JWKS then
    /// unconditionally replaces the cached one for that URI.
    pub async fn get_jwk(&self, uri: &str, decomposed: &DecomposedJwt) -> Result<Jwk> {
        let kid = decomposed
            .kid()
            .filter(|k| !k.is_empty())
            .ok_or(JwtVerifyError::JwtWithoutValidKid)?;

        if let Ok(jwk) = self.get_cached_jwk(uri, decomposed).await {
            return Ok(jwk);
        }

        self.penalty_box.wait(uri, kid).await?;

        let refreshed = self.fetch_and_store(uri).await;
        let jwks = match refreshed {
            Ok(jwks) => jwks,
            Err(e) => {
                self.penalty_box.register_failed_attempt(uri, kid);
                return Err(e);
            }
        };

        match jwks.find_by_kid(kid) {
            Some(jwk) => {
                self.penalty_box.register_successful_attempt(uri, kid);
                Ok(jwk.clone())
            }
            None => {
                self.penalty_box.register_failed_attempt(uri, kid);
                Err(JwtVerifyError::KidNotFoundInJwks {
                    uri: uri.to_string(),
                    kid: kid.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::penalty_box::DefaultPenaltyBox;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        body: Vec<u8>,
        delay: Duration,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, _uri: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.body.clone())
        }
    }

    fn jwks_body(kids: &[&str]) -> Vec<u8> {
        let keys: Vec<_> = kids
            .iter()
            .map(|kid| serde_json::json!({"kty": "RSA", "kid": kid, "n": "n", "e": "AQAB"}))
            .collect();
        serde_json::to_vec(&serde_json::json!({"keys": keys})).unwrap()
    }

    fn token_with_kid(kid: &str) -> DecomposedJwt {
        let header = serde_json::json!({"alg": "RS256", "kid": kid});
        let payload = serde_json::json!({});
        use base64::Engine as _;
        let b64 = |v: &serde_json::Value| {
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .encode(serde_json::to_vec(v).unwrap())
        };
        let sig = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"sig");
        let token = format!("{}.{}.{sig}", b64(&header), b64(&payload));
        DecomposedJwt::parse(&token).unwrap()
    }

    #[tokio::test]
    async fn at_most_one_fetch_per_uri_under_concurrency() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(CountingFetcher {
            calls: calls.clone(),
            body: jwks_body(&["k1"]),
            delay: Duration::from_millis(50),
        });
        let cache = Arc::new(JwksCache::new(fetcher, Arc::new(DefaultPenaltyBox::new())));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.get_jwks("https://example.com/jwks.json").await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_miss_triggers_refresh_not_invalidation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(CountingFetcher {
            calls: calls.clone(),
            body: jwks_body(&["k1", "k2"]),
            delay: Duration::ZERO,
        });
        let cache = JwksCache::new(fetcher, Arc::new(DefaultPenaltyBox::new()));
        cache
            .add_jwks(
                "https://example.com/jwks.json",
                Jwks::parse(&jwks_body(&["k1"])).unwrap(),
            )
            .await;

        let jwk = cache
            .get_jwk("https://example.com/jwks.json", &token_with_kid("k2"))
            .await
            .unwrap();
        assert_eq!(jwk.kid.as_deref(), Some("k2"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Both k1 and k2 are now resolvable from cache without refetching.
        cache
            .get_cached_jwk("https://example.com/jwks.json", &token_with_kid("k1"))
            .await
            .unwrap();
        cache
            .get_cached_jwk("https://example.com/jwks.json", &token_with_kid("k2"))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_cached_jwk_never_fetches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(CountingFetcher {
            calls: calls.clone(),
            body: jwks_body(&["k1"]),
            delay: Duration::ZERO,
        });
        let cache = JwksCache::new(fetcher, Arc::new(DefaultPenaltyBox::new()));

        let err = cache
            .get_cached_jwk("https://example.com/jwks.json", &token_with_kid("k1"))
            .await
            .unwrap_err();
        assert!(matches!(err, JwtVerifyError::JwksNotAvailableInCache(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_kid_after_refresh_registers_failed_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(CountingFetcher {
            calls: calls.clone(),
            body: jwks_body(&["k1"]),
            delay: Duration::ZERO,
        });
        let penalty_box = Arc::new(DefaultPenaltyBox::with_wait_duration(Duration::from_secs(
            10,
        )));
        let cache = JwksCache::new(fetcher, penalty_box.clone());
        cache
            .add_jwks(
                "https://example.com/jwks.json",
                Jwks::parse(&jwks_body(&["k1"])).unwrap(),
            )
            .await;

        let err = cache
            .get_jwk("https://example.com/jwks.json", &token_with_kid("unknown"))
            .await
            .unwrap_err();
        assert!(matches!(err, JwtVerifyError::KidNotFoundInJwks { .. }));

        let err = penalty_box
            .wait("https://example.com/jwks.json", "unknown")
            .await
            .unwrap_err();
        assert!(matches!(err, JwtVerifyError::WaitPeriodNotYetEnded(_)));
    }

    #[tokio::test]
    async fn dropped_caller_does_not_poison_the_fetch_for_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(CountingFetcher {
            calls: calls.clone(),
            body: jwks_body(&["k1"]),
            delay: Duration::from_millis(100),
        });
        let cache = Arc::new(JwksCache::new(fetcher, Arc::new(DefaultPenaltyBox::new())));

        let dropped = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_jwks("https://example.com/jwks.json").await })
        };
        // Give it a moment to register as the in-flight fetch, then drop it.
        tokio::time::sleep(Duration::from_millis(10)).await;
        dropped.abort();

        let jwks = cache
            .get_jwks("https://example.com/jwks.json")
            .await
            .unwrap();
        assert_eq!(jwks.keys.len(), 1);
    }
}
