// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::api::rate_limit::RateLimiter;
use crate::auth::directory::tests::test_directory;
use crate::auth::{SessionIssuer, UserIdentity};
use crate::providers::mock::MockProvider;
use crate::state::AppState;
use crate::storage::sealing::KEY_LEN;
use crate::storage::{CredentialDatabase, TokenSealer};

pub const TEST_SESSION_SECRET: &[u8] = b"unit-test-session-secret-32-bytes!!";

/// Fresh credential database in a temporary directory.
pub fn temp_store() -> (Arc<CredentialDatabase>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let sealer = TokenSealer::from_bytes(&[42u8; KEY_LEN]).expect("valid test key");
    let db = CredentialDatabase::open(&dir.path().join("credentials.redb"), sealer)
        .expect("Failed to open credential database");
    (Arc::new(db), dir)
}

/// State over a temporary store and an empty [`MockProvider`].
///
/// Login accepts tokens minted by `auth::directory::tests::idp_token`.
pub fn test_state() -> (AppState, TempDir) {
    test_state_with(MockProvider::new(), 1_000)
}

pub fn test_state_with(provider: MockProvider, max_requests: u32) -> (AppState, TempDir) {
    let (store, dir) = temp_store();
    let state = AppState::new(
        store,
        Arc::new(provider),
        SessionIssuer::new(TEST_SESSION_SECRET, Duration::from_secs(3600)),
        Arc::new(test_directory()),
        RateLimiter::new(Duration::from_secs(60), max_requests, 64),
    );
    (state, dir)
}

/// `Authorization` header value for `user_id`.
pub fn bearer(state: &AppState, user_id: &str) -> String {
    let session = state
        .sessions
        .issue(&UserIdentity {
            user_id: user_id.to_string(),
            email: None,
        })
        .expect("issue test session");
    format!("Bearer {}", session.token)
}
