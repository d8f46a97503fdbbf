// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Plaid integration for Link and the investments product.

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{
    ExchangedItem, HoldingsPayload, LinkToken, ProviderClient, ProviderError, TransactionsPayload,
};
use crate::config::ProviderConfig;

const SANDBOX_BASE_URL: &str = "https://sandbox.plaid.com";
const DEVELOPMENT_BASE_URL: &str = "https://development.plaid.com";
const PRODUCTION_BASE_URL: &str = "https://production.plaid.com";
const INVESTMENTS_PRODUCT: &str = "investments";
const LINK_LANGUAGE: &str = "en";
const TRANSACTIONS_PAGE_SIZE: usize = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaidEnvironment {
    Sandbox,
    Development,
    Production,
}

impl PlaidEnvironment {
    /// Parse the `PLAID_ENV` selector (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Some(Self::Sandbox),
            "development" => Some(Self::Development),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Development => DEVELOPMENT_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl std::fmt::Display for PlaidEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sandbox => write!(f, "sandbox"),
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct PlaidClient {
    base_url: String,
    client_id: String,
    secret: String,
    client_name: String,
    country_codes: Vec<String>,
    default_redirect_uri: Option<String>,
    http: Client,
}

impl std::fmt::Debug for PlaidClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaidClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct LinkTokenResponse {
    link_token: String,
    expiration: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
    item_id: String,
}

#[derive(Debug, Deserialize)]
struct HoldingsResponse {
    #[serde(default)]
    accounts: Vec<Value>,
    #[serde(default)]
    holdings: Vec<Value>,
    #[serde(default)]
    securities: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct InvestmentTransactionsResponse {
    #[serde(default)]
    accounts: Vec<Value>,
    #[serde(default)]
    investment_transactions: Vec<Value>,
    #[serde(default)]
    securities: Vec<Value>,
    #[serde(default)]
    total_investment_transactions: usize,
}

#[derive(Debug, Deserialize)]
struct PlaidErrorBody {
    error_code: String,
    #[serde(default)]
    error_message: String,
}

impl PlaidClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.environment.base_url().to_string(),
            client_id: config.client_id.clone(),
            secret: config.secret.clone(),
            client_name: config.client_name.clone(),
            country_codes: config.country_codes.clone(),
            default_redirect_uri: config.redirect_uri.clone(),
            http,
        })
    }

    fn link_token_body(&self, user_id: &str, redirect_uri: Option<&str>) -> Value {
        let mut body = json!({
            "client_name": self.client_name,
            "user": { "client_user_id": user_id },
            "products": [INVESTMENTS_PRODUCT],
            "country_codes": self.country_codes,
            "language": LINK_LANGUAGE,
        });
        if let Some(uri) = redirect_uri.or(self.default_redirect_uri.as_deref()) {
            body["redirect_uri"] = Value::String(uri.to_string());
        }
        body
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url.trim_end_matches('/'), path))
            .header("PLAID-CLIENT-ID", &self.client_id)
            .header("PLAID-SECRET", &self.secret)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(format!("POST {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_body(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("POST {path} invalid JSON: {e}")))
    }
}

#[async_trait]
impl ProviderClient for PlaidClient {
    async fn create_link_token(
        &self,
        user_id: &str,
        redirect_uri: Option<&str>,
    ) -> Result<LinkToken, ProviderError> {
        let body = self.link_token_body(user_id, redirect_uri);
        let response: LinkTokenResponse = self.post_json("/link/token/create", &body).await?;
        Ok(LinkToken {
            link_token: response.link_token,
            expiration: response.expiration,
        })
    }

    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<ExchangedItem, ProviderError> {
        let body = json!({ "public_token": public_token });
        let response: ExchangeResponse = self.post_json("/item/public_token/exchange", &body).await?;
        Ok(ExchangedItem {
            access_token: response.access_token,
            item_id: response.item_id,
        })
    }

    async fn fetch_holdings(&self, access_token: &str) -> Result<HoldingsPayload, ProviderError> {
        let body = json!({ "access_token": access_token });
        let response: HoldingsResponse = self.post_json("/investments/holdings/get", &body).await?;
        Ok(HoldingsPayload {
            accounts: response.accounts,
            holdings: response.holdings,
            securities: response.securities,
        })
    }

    async fn fetch_transactions(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<TransactionsPayload, ProviderError> {
        let mut pages = TransactionPages::default();

        loop {
            let body = json!({
                "access_token": access_token,
                "start_date": start_date.format("%Y-%m-%d").to_string(),
                "end_date": end_date.format("%Y-%m-%d").to_string(),
                "options": { "count": TRANSACTIONS_PAGE_SIZE, "offset": pages.offset() },
            });
            let page: InvestmentTransactionsResponse = self
                .post_json("/investments/transactions/get", &body)
                .await?;

            debug!(
                offset = pages.offset(),
                received = page.investment_transactions.len(),
                total = page.total_investment_transactions,
                "Plaid investment transactions page"
            );

            if pages.accumulate(page) {
                break;
            }
        }

        Ok(pages.into_payload())
    }
}

/// Accumulates paged `/investments/transactions/get` responses.
#[derive(Default)]
struct TransactionPages {
    accounts: Vec<Value>,
    transactions: Vec<Value>,
    securities: Vec<Value>,
    seen_securities: HashSet<String>,
}

impl TransactionPages {
    fn offset(&self) -> usize {
        self.transactions.len()
    }

    /// Add one page. Returns `true` once every transaction has been read.
    fn accumulate(&mut self, page: InvestmentTransactionsResponse) -> bool {
        if self.accounts.is_empty() {
            self.accounts = page.accounts;
        }

        for security in page.securities {
            match security.get("security_id").and_then(Value::as_str) {
                Some(id) if !self.seen_securities.insert(id.to_string()) => {}
                _ => self.securities.push(security),
            }
        }

        let received = page.investment_transactions.len();
        self.transactions.extend(page.investment_transactions);

        received == 0 || self.transactions.len() >= page.total_investment_transactions
    }

    fn into_payload(self) -> TransactionsPayload {
        TransactionsPayload {
            accounts: self.accounts,
            transactions: self.transactions,
            securities: self.securities,
        }
    }
}

fn map_error_body(status: StatusCode, body: &str) -> ProviderError {
    match serde_json::from_str::<PlaidErrorBody>(body) {
        Ok(error) => ProviderError::new(error.error_code, error.error_message),
        Err(_) => ProviderError::new(
            format!("HTTP_{}", status.as_u16()),
            format!("provider returned {status}: {body}"),
        ),
    }
}
