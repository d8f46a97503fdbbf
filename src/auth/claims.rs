// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};

/// Claims carried by a gateway session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
    /// Issuer, always the gateway itself
    pub iss: String,
    /// Session ID
    pub sid: String,
}

/// Authenticated user resolved from a verified session token.
///
/// Handlers only ever see `user_id` through this type; it is never taken
/// from request bodies or paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub session_id: String,
    /// Token expiration (Unix timestamp)
    pub expires_at: i64,
}

impl From<SessionClaims> for AuthenticatedUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            session_id: claims.sid,
            expires_at: claims.exp,
        }
    }
}
