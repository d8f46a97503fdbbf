// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session authentication for the portfolio gateway.
//!
//! ## Auth Flow
//!
//! 1. The mobile app signs in with the identity provider and receives an
//!    identity token
//! 2. It calls `POST /auth/login` with that token; the [`IdpDirectory`]
//!    verifies signature, issuer and audience (JWKS or shared secret) and the
//!    gateway answers with a session JWT signed with `JWT_SECRET`
//! 3. Every protected request sends `Authorization: Bearer <session JWT>`
//! 4. The [`Auth`] extractor verifies signature, expiry and issuer and yields
//!    the canonical `user_id`
//!
//! ## Security
//!
//! - All non-health endpoints except login require authentication
//! - HS256 with a secret of at least 32 bytes
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod directory;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod session;

pub use claims::{AuthenticatedUser, SessionClaims};
pub use directory::{IdpDirectory, UserDirectory, UserIdentity};
pub use error::AuthError;
pub use extractor::Auth;
pub use jwks::JwksManager;
pub use session::{IssuedSession, SessionIssuer};
