// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User directory capability.
//!
//! The identity provider that owns user records lives outside the gateway.
//! Login hands the gateway a token the provider signed; the directory
//! verifies it and turns its subject into a [`UserIdentity`]. The gateway
//! never creates or mutates users.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::jwks::JwksManager;
use super::AuthError;
use crate::config::{IdentityConfig, IdentityKeys};

/// Longest user id accepted from an identity token.
pub const MAX_USER_ID_LEN: usize = 128;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// A user known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
    pub email: Option<String>,
}

/// Resolves identity-provider tokens to identities.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve(&self, id_token: &str) -> Result<UserIdentity, AuthError>;
}

/// Claims read from an identity-provider token.
#[derive(Debug, Deserialize)]
struct IdentityClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Clone)]
enum KeySource {
    Jwks(JwksManager),
    Shared(DecodingKey),
}

/// Directory backed by the identity provider's signed tokens.
///
/// Signature, expiry, issuer and (when configured) audience are all
/// checked before the subject is trusted.
#[derive(Clone)]
pub struct IdpDirectory {
    keys: KeySource,
    issuer: String,
    audience: Option<String>,
}

impl std::fmt::Debug for IdpDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = match &self.keys {
            KeySource::Jwks(jwks) => jwks.jwks_url().to_string(),
            KeySource::Shared(_) => "<shared secret>".to_string(),
        };
        f.debug_struct("IdpDirectory")
            .field("keys", &keys)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl IdpDirectory {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, AuthError> {
        let audience = config.audience.as_deref();
        Ok(match &config.keys {
            IdentityKeys::Jwks(url) => {
                Self::with_jwks(JwksManager::new(url.as_str())?, &config.issuer, audience)
            }
            IdentityKeys::SharedSecret(secret) => {
                Self::with_shared_secret(secret.as_bytes(), &config.issuer, audience)
            }
        })
    }

    /// Directory verifying HS256 tokens signed with `secret`.
    pub fn with_shared_secret(secret: &[u8], issuer: &str, audience: Option<&str>) -> Self {
        Self {
            keys: KeySource::Shared(DecodingKey::from_secret(secret)),
            issuer: issuer.to_string(),
            audience: audience.map(str::to_string),
        }
    }

    /// Directory verifying tokens against the keys of `jwks`.
    pub fn with_jwks(jwks: JwksManager, issuer: &str, audience: Option<&str>) -> Self {
        Self {
            keys: KeySource::Jwks(jwks),
            issuer: issuer.to_string(),
            audience: audience.map(str::to_string),
        }
    }

    async fn key_for(&self, id_token: &str) -> Result<(DecodingKey, Algorithm), AuthError> {
        match &self.keys {
            KeySource::Shared(key) => Ok((key.clone(), Algorithm::HS256)),
            KeySource::Jwks(jwks) => {
                let header = decode_header(id_token).map_err(|_| AuthError::MalformedToken)?;
                jwks.decoding_key(header.kid.as_deref()).await
            }
        }
    }
}

#[async_trait]
impl UserDirectory for IdpDirectory {
    async fn resolve(&self, id_token: &str) -> Result<UserIdentity, AuthError> {
        let id_token = id_token.trim();
        if id_token.is_empty() {
            return Err(AuthError::MissingIdentityToken);
        }

        let (key, algorithm) = self.key_for(id_token).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[self.issuer.as_str()]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let token_data = decode::<IdentityClaims>(id_token, &key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::InvalidAudience,
                jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken,
            }
        })?;

        let claims = token_data.claims;
        if !is_well_formed(&claims.sub) {
            return Err(AuthError::UnknownUser);
        }
        Ok(UserIdentity {
            user_id: claims.sub,
            email: claims
                .email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
        })
    }
}

/// Non-empty, bounded, printable, no surrounding whitespace.
fn is_well_formed(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && user_id == user_id.trim()
        && !user_id.chars().any(char::is_control)
}
