// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Portfolio Gateway - Linked Investment Account Aggregation
//!
//! Backend for the mobile app. It issues session tokens, brokers Plaid
//! account linking, keeps provider access tokens sealed server-side and
//! merges holdings and investment transactions across every institution a
//! user has linked.
//!
//! ## Modules
//!
//! - `aggregation` - Concurrent fan-out and deterministic merge
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Session tokens and the `Auth` extractor
//! - `config` - Environment configuration
//! - `housekeeping` - Purge of long-inactive credentials
//! - `providers` - Provider facade and the Plaid client
//! - `storage` - Credential database (redb, sealed tokens)

pub mod aggregation;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod housekeeping;
pub mod providers;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
