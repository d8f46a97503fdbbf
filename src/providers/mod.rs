// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Financial Data Provider Facade
//!
//! The gateway only ever talks to the provider through [`ProviderClient`].
//! Link-token issuance, public-token exchange and the two investment reads
//! are the whole surface the rest of the crate depends on, so the concrete
//! [`plaid::PlaidClient`] can be swapped for a scripted double in tests.
//!
//! Records returned by the data fetches are kept as opaque JSON objects:
//! the gateway merges and forwards them but never interprets their fields.

pub mod plaid;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Code used when the provider could not be reached at all.
pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
/// Code used when the provider answered with a body we cannot decode.
pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider error {code}: {message}")]
pub struct ProviderError {
    /// Machine readable code (provider `error_code` or one of the local codes).
    pub code: String,
    /// Diagnostic message. Logged, never returned to clients.
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(TRANSPORT_ERROR, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(INVALID_RESPONSE, message)
    }
}

/// Short-lived token the mobile client uses to open the provider's Link UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkToken {
    pub link_token: String,
    pub expiration: DateTime<Utc>,
}

/// Result of exchanging a Link public token.
#[derive(Clone, PartialEq, Eq)]
pub struct ExchangedItem {
    pub access_token: String,
    pub item_id: String,
}

impl std::fmt::Debug for ExchangedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangedItem")
            .field("access_token", &"<redacted>")
            .field("item_id", &self.item_id)
            .finish()
    }
}

/// Investment holdings of one linked item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoldingsPayload {
    pub accounts: Vec<Value>,
    pub holdings: Vec<Value>,
    pub securities: Vec<Value>,
}

/// Investment transactions of one linked item for a date range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionsPayload {
    pub accounts: Vec<Value>,
    pub transactions: Vec<Value>,
    pub securities: Vec<Value>,
}

/// Capability interface over the external provider.
///
/// Every method fails with [`ProviderError`] for transport or provider-side
/// failures of that one call. Implementations do not validate date ranges.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn create_link_token(
        &self,
        user_id: &str,
        redirect_uri: Option<&str>,
    ) -> Result<LinkToken, ProviderError>;

    async fn exchange_public_token(&self, public_token: &str)
        -> Result<ExchangedItem, ProviderError>;

    async fn fetch_holdings(&self, access_token: &str) -> Result<HoldingsPayload, ProviderError>;

    async fn fetch_transactions(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TransactionsPayload, ProviderError>;
}
