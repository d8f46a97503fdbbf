// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Linked account management.
//!
//! Lists the caller's linked items and unlinks them. Access tokens are never
//! part of these responses.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{auth::Auth, error::ApiError, state::AppState, storage::LinkedItemCredential};

/// Public view of a linked item.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccount {
    pub credential_id: String,
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl From<LinkedItemCredential> for LinkedAccount {
    fn from(credential: LinkedItemCredential) -> Self {
        Self {
            credential_id: credential.id,
            item_id: credential.item_id,
            institution_id: credential.institution_id,
            institution_name: credential.institution_name,
            is_active: credential.is_active,
            created_at: credential.created_at,
            updated_at: credential.updated_at,
            last_used_at: credential.last_used_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccountsResponse {
    pub accounts: Vec<LinkedAccount>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkResponse {
    pub item_id: String,
    /// False when the item was unknown or already unlinked.
    pub deactivated: bool,
}

/// List every linked item of the authenticated user, active or not.
#[utoipa::path(
    get,
    path = "/accounts",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Linked items", body = LinkedAccountsResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_accounts(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<LinkedAccountsResponse>, ApiError> {
    let mut accounts: Vec<LinkedAccount> = state
        .credentials
        .list_linked(&user.user_id)?
        .into_iter()
        .map(LinkedAccount::from)
        .collect();
    accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let total = accounts.len();
    Ok(Json(LinkedAccountsResponse { accounts, total }))
}

/// Unlink an item. Idempotent.
#[utoipa::path(
    delete,
    path = "/accounts/{item_id}",
    tag = "Accounts",
    security(("bearer_auth" = [])),
    params(
        ("item_id" = String, Path, description = "Provider item ID")
    ),
    responses(
        (status = 200, description = "Item unlinked", body = UnlinkResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn unlink_account(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<UnlinkResponse>, ApiError> {
    let deactivated = state.credentials.deactivate(&user.user_id, &item_id)?;
    if deactivated {
        info!(user_id = %user.user_id, item_id = %item_id, "Linked item deactivated");
    }
    Ok(Json(UnlinkResponse {
        item_id,
        deactivated,
    }))
}
