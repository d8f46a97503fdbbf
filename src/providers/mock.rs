// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scripted provider double for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;

use super::{
    ExchangedItem, HoldingsPayload, LinkToken, ProviderClient, ProviderError, TransactionsPayload,
};

struct Script {
    holdings: Result<HoldingsPayload, ProviderError>,
    transactions: Result<TransactionsPayload, ProviderError>,
    delay: Duration,
}

/// Provider double answering per access token, with optional latency.
#[derive(Default)]
pub struct MockProvider {
    scripts: Mutex<HashMap<String, Script>>,
    exchanges: Mutex<HashMap<String, ExchangedItem>>,
    data_calls: AtomicUsize,
    last_transactions_range: Mutex<Option<(NaiveDate, NaiveDate)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful token with `holdings` holdings tagged by `tag`.
    pub fn with_item(self, access_token: &str, tag: &str, holdings: usize) -> Self {
        self.with_delayed_item(access_token, tag, holdings, Duration::ZERO)
    }

    pub fn with_delayed_item(
        self,
        access_token: &str,
        tag: &str,
        holdings: usize,
        delay: Duration,
    ) -> Self {
        let script = Script {
            holdings: Ok(sample_holdings(tag, holdings)),
            transactions: Ok(sample_transactions(tag, holdings)),
            delay,
        };
        self.scripts
            .lock()
            .unwrap()
            .insert(access_token.to_string(), script);
        self
    }

    /// Script a token whose data calls fail with `code`.
    pub fn with_failing_item(self, access_token: &str, code: &str) -> Self {
        let error = ProviderError::new(code, "scripted failure");
        let script = Script {
            holdings: Err(error.clone()),
            transactions: Err(error),
            delay: Duration::ZERO,
        };
        self.scripts
            .lock()
            .unwrap()
            .insert(access_token.to_string(), script);
        self
    }

    /// Script a public token exchange.
    pub fn with_exchange(self, public_token: &str, access_token: &str, item_id: &str) -> Self {
        self.exchanges.lock().unwrap().insert(
            public_token.to_string(),
            ExchangedItem {
                access_token: access_token.to_string(),
                item_id: item_id.to_string(),
            },
        );
        self
    }

    /// Number of holdings/transactions calls issued so far.
    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub fn last_transactions_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        *self.last_transactions_range.lock().unwrap()
    }

    fn scripted<T>(
        &self,
        access_token: &str,
        pick: impl FnOnce(&Script) -> Result<T, ProviderError>,
    ) -> (Duration, Result<T, ProviderError>) {
        self.data_calls.fetch_add(1, Ordering::SeqCst);
        let scripts = self.scripts.lock().unwrap();
        match scripts.get(access_token) {
            Some(script) => (script.delay, pick(script)),
            None => (
                Duration::ZERO,
                Err(ProviderError::new("INVALID_ACCESS_TOKEN", "unknown access token")),
            ),
        }
    }
}

pub fn sample_holdings(tag: &str, holdings: usize) -> HoldingsPayload {
    HoldingsPayload {
        accounts: vec![json!({ "account_id": format!("{tag}-acc") })],
        holdings: (0..holdings)
            .map(|i| json!({ "account_id": format!("{tag}-acc"), "security_id": format!("{tag}-sec-{i}") }))
            .collect(),
        securities: (0..holdings)
            .map(|i| json!({ "security_id": format!("{tag}-sec-{i}") }))
            .collect(),
    }
}

pub fn sample_transactions(tag: &str, count: usize) -> TransactionsPayload {
    TransactionsPayload {
        accounts: vec![json!({ "account_id": format!("{tag}-acc") })],
        transactions: (0..count)
            .map(|i| json!({ "investment_transaction_id": format!("{tag}-tx-{i}") }))
            .collect(),
        securities: vec![json!({ "security_id": format!("{tag}-sec-0") })],
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn create_link_token(
        &self,
        user_id: &str,
        _redirect_uri: Option<&str>,
    ) -> Result<LinkToken, ProviderError> {
        Ok(LinkToken {
            link_token: format!("link-sandbox-{user_id}"),
            expiration: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        })
    }

    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<ExchangedItem, ProviderError> {
        self.exchanges
            .lock()
            .unwrap()
            .get(public_token)
            .cloned()
            .ok_or_else(|| ProviderError::new("INVALID_PUBLIC_TOKEN", "unknown public token"))
    }

    async fn fetch_holdings(&self, access_token: &str) -> Result<HoldingsPayload, ProviderError> {
        let (delay, outcome) = self.scripted(access_token, |s| s.holdings.clone());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    async fn fetch_transactions(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TransactionsPayload, ProviderError> {
        *self.last_transactions_range.lock().unwrap() = Some((start_date, end_date));
        let (delay, outcome) = self.scripted(access_token, |s| s.transactions.clone());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}
