// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity-provider JWKS fetching and caching.
//!
//! ## Security
//!
//! - The JWKS URL must be HTTPS (enforced by [`crate::config`])
//! - Keys are cached for five minutes
//! - A stale cache is reused when a refresh fails, so a short IdP outage
//!   does not lock every user out of login

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use tracing::warn;

use super::AuthError;

/// JWKS cache TTL (5 minutes).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Fetches and caches the identity provider's signing keys.
#[derive(Clone)]
pub struct JwksManager {
    jwks_url: String,
    cache_ttl: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
    client: reqwest::Client,
}

impl std::fmt::Debug for JwksManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksManager")
            .field("jwks_url", &self.jwks_url)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl JwksManager {
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::InternalError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            jwks_url: jwks_url.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(RwLock::new(None)),
            client,
        })
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Install a key set as if it had just been fetched.
    #[cfg(test)]
    pub(crate) async fn prime(&self, jwks: JwkSet) {
        *self.cache.write().await = Some(CacheEntry {
            jwks,
            fetched_at: Instant::now(),
        });
    }

    /// Cached key set, refreshed once the TTL has passed.
    async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(entry.jwks.clone());
                }
            }
        }

        match self.fetch_jwks().await {
            Ok(jwks) => {
                *self.cache.write().await = Some(CacheEntry {
                    jwks: jwks.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(jwks)
            }
            Err(err) => {
                let cache = self.cache.read().await;
                match &*cache {
                    Some(stale) => {
                        warn!(error = %err, "JWKS refresh failed, using cached keys");
                        Ok(stale.jwks.clone())
                    }
                    None => Err(err),
                }
            }
        }
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))
    }

    /// Decoding key for `kid`, or the first usable key when the token
    /// carries no key id.
    pub async fn decoding_key(
        &self,
        kid: Option<&str>,
    ) -> Result<(DecodingKey, Algorithm), AuthError> {
        let jwks = self.get_jwks().await?;

        match kid {
            Some(kid) => {
                let jwk = jwks
                    .keys
                    .iter()
                    .find(|k| k.common.key_id.as_deref() == Some(kid))
                    .ok_or(AuthError::NoMatchingKey)?;
                jwk_to_decoding_key(jwk)
            }
            None => jwks
                .keys
                .iter()
                .find_map(|jwk| jwk_to_decoding_key(jwk).ok())
                .ok_or(AuthError::NoMatchingKey),
        }
    }
}

/// RSA and EC keys only; symmetric keys never come from a JWKS.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| AuthError::InternalError(format!("Failed to create RSA key: {e}")))?;
            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                _ => Algorithm::RS256,
            };
            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| AuthError::InternalError(format!("Failed to create EC key: {e}")))?;
            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };
            Ok((key, alg))
        }
        _ => Err(AuthError::NoMatchingKey),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// RSA public key `k1` plus a symmetric key `oct-1` that must be ignored.
    pub(crate) fn sample_jwks() -> JwkSet {
        serde_json::from_value(serde_json::json!({
            "keys": [
                {
                    "kty": "RSA",
                    "kid": "k1",
                    "alg": "RS256",
                    "use": "sig",
                    "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
                    "e": "AQAB"
                },
                {
                    "kty": "oct",
                    "kid": "oct-1",
                    "k": "c2hhcmVkLXNlY3JldA"
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn manager_keeps_url() {
        let manager = JwksManager::new("https://idp.example/.well-known/jwks.json").unwrap();
        assert_eq!(manager.jwks_url(), "https://idp.example/.well-known/jwks.json");
    }

    #[tokio::test]
    async fn key_is_found_by_kid() {
        let manager = JwksManager::new("https://idp.example/.well-known/jwks.json").unwrap();
        manager.prime(sample_jwks()).await;

        let (_, alg) = manager.decoding_key(Some("k1")).await.unwrap();
        assert_eq!(alg, Algorithm::RS256);
    }

    #[tokio::test]
    async fn unknown_kid_and_symmetric_keys_are_rejected() {
        let manager = JwksManager::new("https://idp.example/.well-known/jwks.json").unwrap();
        manager.prime(sample_jwks()).await;

        assert!(matches!(
            manager.decoding_key(Some("rotated-away")).await,
            Err(AuthError::NoMatchingKey)
        ));
        assert!(matches!(
            manager.decoding_key(Some("oct-1")).await,
            Err(AuthError::NoMatchingKey)
        ));
    }

    #[tokio::test]
    async fn token_without_kid_uses_first_usable_key() {
        let manager = JwksManager::new("https://idp.example/.well-known/jwks.json").unwrap();
        manager.prime(sample_jwks()).await;

        let (_, alg) = manager.decoding_key(None).await.unwrap();
        assert_eq!(alg, Algorithm::RS256);
    }
}
