// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Multi-Account Aggregation
//!
//! Fans a holdings or transactions request out across every active linked
//! item of one user and merges the per-item answers into one result.
//!
//! ## Merge Rules
//!
//! - All provider calls run concurrently and every call is awaited; one slow
//!   or failing item never cancels the others
//! - Outcomes are zipped back to their credential by position, so the merged
//!   lists follow credential order regardless of completion order
//! - Failed items are logged and counted, never surfaced individually
//! - Nothing is deduplicated across items

mod dates;

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use utoipa::ToSchema;

pub use dates::{parse_range, DateRange};

use crate::providers::{ProviderClient, ProviderError};
use crate::storage::{CredentialStore, LinkedItemCredential, StorageError};

/// Failures of an aggregation request as a whole.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("{0}")]
    Validation(String),

    #[error("no connected accounts")]
    NoConnectedAccounts,

    #[error("all {attempted} connected accounts failed")]
    AllAccountsFailed {
        attempted: usize,
        failures: Vec<ItemFailure>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One failed per-item call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item_id: String,
    pub code: String,
}

/// Unified holdings across all linked items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HoldingsAggregate {
    #[schema(value_type = Vec<Object>)]
    pub accounts: Vec<Value>,
    #[schema(value_type = Vec<Object>)]
    pub holdings: Vec<Value>,
    #[schema(value_type = Vec<Object>)]
    pub securities: Vec<Value>,
    pub total_connected_accounts: usize,
    pub fetched_accounts: usize,
}

/// Unified investment transactions across all linked items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsAggregate {
    #[schema(value_type = Vec<Object>)]
    pub accounts: Vec<Value>,
    #[schema(value_type = Vec<Object>)]
    pub transactions: Vec<Value>,
    #[schema(value_type = Vec<Object>)]
    pub securities: Vec<Value>,
    pub total_connected_accounts: usize,
    pub fetched_accounts: usize,
}

/// Aggregation engine over injected store and provider handles.
#[derive(Clone)]
pub struct AggregationEngine {
    credentials: Arc<dyn CredentialStore>,
    provider: Arc<dyn ProviderClient>,
}

impl AggregationEngine {
    pub fn new(credentials: Arc<dyn CredentialStore>, provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            credentials,
            provider,
        }
    }

    /// Holdings of every active linked item of `user_id`.
    pub async fn get_holdings(&self, user_id: &str) -> Result<HoldingsAggregate, AggregationError> {
        let credentials = self.active_credentials(user_id)?;

        let calls = credentials
            .iter()
            .map(|c| self.provider.fetch_holdings(&c.access_token));
        let outcomes = join_all(calls).await;

        let (succeeded, _) = partition(user_id, "holdings", &credentials, outcomes)?;

        let mut merged = HoldingsAggregate {
            total_connected_accounts: credentials.len(),
            fetched_accounts: succeeded.len(),
            ..Default::default()
        };
        for payload in succeeded {
            merged.accounts.extend(payload.accounts);
            merged.holdings.extend(payload.holdings);
            merged.securities.extend(payload.securities);
        }
        Ok(merged)
    }

    /// Investment transactions of every active linked item of `user_id`
    /// between `start_date` and `end_date` (inclusive, `YYYY-MM-DD`).
    ///
    /// The range is validated before the store is consulted.
    pub async fn get_transactions(
        &self,
        user_id: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<TransactionsAggregate, AggregationError> {
        let range = parse_range(start_date, end_date).map_err(AggregationError::Validation)?;
        let credentials = self.active_credentials(user_id)?;

        let calls = credentials.iter().map(|c| {
            self.provider
                .fetch_transactions(&c.access_token, range.start, range.end)
        });
        let outcomes = join_all(calls).await;

        let (succeeded, _) = partition(user_id, "transactions", &credentials, outcomes)?;

        let mut merged = TransactionsAggregate {
            total_connected_accounts: credentials.len(),
            fetched_accounts: succeeded.len(),
            ..Default::default()
        };
        for payload in succeeded {
            merged.accounts.extend(payload.accounts);
            merged.transactions.extend(payload.transactions);
            merged.securities.extend(payload.securities);
        }
        Ok(merged)
    }

    fn active_credentials(&self, user_id: &str) -> Result<Vec<LinkedItemCredential>, AggregationError> {
        let credentials = self.credentials.list_active(user_id)?;
        if credentials.is_empty() {
            return Err(AggregationError::NoConnectedAccounts);
        }
        Ok(credentials)
    }
}

/// Split zipped outcomes, keeping credential order for the successes.
fn partition<T>(
    user_id: &str,
    operation: &'static str,
    credentials: &[LinkedItemCredential],
    outcomes: Vec<Result<T, ProviderError>>,
) -> Result<(Vec<T>, Vec<ItemFailure>), AggregationError> {
    let mut succeeded = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for (credential, outcome) in credentials.iter().zip(outcomes) {
        match outcome {
            Ok(payload) => succeeded.push(payload),
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    item_id = %credential.item_id,
                    code = %err.code,
                    message = %err.message,
                    operation,
                    "Provider call failed for linked item"
                );
                failures.push(ItemFailure {
                    item_id: credential.item_id.clone(),
                    code: err.code,
                });
            }
        }
    }

    if succeeded.is_empty() {
        return Err(AggregationError::AllAccountsFailed {
            attempted: credentials.len(),
            failures,
        });
    }

    info!(
        user_id = %user_id,
        operation,
        fetched = succeeded.len(),
        total = credentials.len(),
        "Aggregated linked items"
    );
    Ok((succeeded, failures))
}
