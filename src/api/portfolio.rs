// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Aggregated portfolio reads across every linked item.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    aggregation::{HoldingsAggregate, TransactionsAggregate},
    auth::Auth,
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsRequest {
    /// Inclusive start, `YYYY-MM-DD`.
    pub start_date: String,
    /// Inclusive end, `YYYY-MM-DD`.
    pub end_date: String,
}

/// Holdings merged across all active linked items.
#[utoipa::path(
    get,
    path = "/holdings",
    tag = "Portfolio",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Merged holdings", body = HoldingsAggregate),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No connected accounts"),
        (status = 502, description = "Every linked item failed")
    )
)]
pub async fn get_holdings(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<HoldingsAggregate>, ApiError> {
    let holdings = state.engine.get_holdings(&user.user_id).await?;
    Ok(Json(holdings))
}

/// Investment transactions merged across all active linked items.
#[utoipa::path(
    post,
    path = "/transactions",
    tag = "Portfolio",
    security(("bearer_auth" = [])),
    request_body = TransactionsRequest,
    responses(
        (status = 200, description = "Merged transactions", body = TransactionsAggregate),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No connected accounts"),
        (status = 502, description = "Every linked item failed")
    )
)]
pub async fn get_transactions(
    Auth(user): Auth,
    State(state): State<AppState>,
    payload: Result<Json<TransactionsRequest>, JsonRejection>,
) -> Result<Json<TransactionsAggregate>, ApiError> {
    let Json(request) = payload?;
    let transactions = state
        .engine
        .get_transactions(&user.user_id, &request.start_date, &request.end_date)
        .await?;
    Ok(Json(transactions))
}
