// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::aggregation::AggregationEngine;
use crate::api::rate_limit::{RateLimiter, DEFAULT_CAPACITY};
use crate::auth::{AuthError, IdpDirectory, SessionIssuer, UserDirectory};
use crate::config::Config;
use crate::providers::ProviderClient;
use crate::storage::CredentialStore;

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialStore>,
    pub provider: Arc<dyn ProviderClient>,
    pub engine: AggregationEngine,
    pub sessions: SessionIssuer,
    pub directory: Arc<dyn UserDirectory>,
    pub rate_limiter: Arc<RateLimiter>,
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        provider: Arc<dyn ProviderClient>,
        sessions: SessionIssuer,
        directory: Arc<dyn UserDirectory>,
        rate_limiter: RateLimiter,
    ) -> Self {
        let engine = AggregationEngine::new(credentials.clone(), provider.clone());
        Self {
            credentials,
            provider,
            engine,
            sessions,
            directory,
            rate_limiter: Arc::new(rate_limiter),
            allowed_origins: Vec::new(),
        }
    }

    /// Build the state for a loaded configuration.
    ///
    /// Login always verifies identity-provider tokens; there is no
    /// unauthenticated directory outside tests.
    pub fn from_config(
        config: &Config,
        credentials: Arc<dyn CredentialStore>,
        provider: Arc<dyn ProviderClient>,
    ) -> Result<Self, AuthError> {
        let directory = IdpDirectory::from_config(&config.identity)?;
        let sessions = SessionIssuer::new(config.session_secret.as_bytes(), config.session_ttl);
        let rate_limiter = RateLimiter::new(
            config.rate_limit.window,
            config.rate_limit.max_requests,
            DEFAULT_CAPACITY,
        );
        Ok(
            Self::new(credentials, provider, sessions, Arc::new(directory), rate_limiter)
                .with_allowed_origins(config.allowed_origins.clone()),
        )
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::auth::directory::tests::{idp_token, TEST_IDP_AUDIENCE, TEST_IDP_ISSUER, TEST_IDP_SECRET};
    use crate::config::{
        CREDENTIAL_KEY_ENV, IDP_AUDIENCE_ENV, IDP_ISSUER_ENV, IDP_JWT_SECRET_ENV, JWT_SECRET_ENV,
        PLAID_CLIENT_ID_ENV, PLAID_SECRET_ENV,
    };
    use crate::providers::mock::MockProvider;
    use crate::testing::temp_store;

    #[tokio::test]
    async fn configured_state_verifies_identity_tokens() {
        let env: HashMap<&str, String> = HashMap::from([
            (PLAID_CLIENT_ID_ENV, "client-id".to_string()),
            (PLAID_SECRET_ENV, "plaid-secret".to_string()),
            (JWT_SECRET_ENV, "x".repeat(32)),
            (
                CREDENTIAL_KEY_ENV,
                "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
            ),
            (IDP_ISSUER_ENV, TEST_IDP_ISSUER.to_string()),
            (IDP_AUDIENCE_ENV, TEST_IDP_AUDIENCE.to_string()),
            (
                IDP_JWT_SECRET_ENV,
                String::from_utf8(TEST_IDP_SECRET.to_vec()).unwrap(),
            ),
        ]);
        let config = Config::from_lookup(|name| env.get(name).cloned()).unwrap();
        let (store, _dir) = temp_store();

        let state = AppState::from_config(&config, store, Arc::new(MockProvider::new())).unwrap();

        let identity = state.directory.resolve(&idp_token("user_123")).await.unwrap();
        assert_eq!(identity.user_id, "user_123");
        assert!(matches!(
            state.directory.resolve("user_123").await,
            Err(AuthError::MalformedToken)
        ));
    }
}
