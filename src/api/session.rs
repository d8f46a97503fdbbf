// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session login endpoint.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{auth::AuthError, error::ApiError, state::AppState};

/// Login with a token issued by the identity provider.
#[derive(Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Identity-provider JWT; its `sub` becomes the session user.
    #[serde(default)]
    pub id_token: Option<String>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Session JWT for the `Authorization: Bearer` header.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
}

/// Exchange a verified identity-provider token for a session token.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Session",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Body is not valid JSON"),
        (status = 401, description = "Identity token missing or not valid")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = payload?;
    let id_token = request.id_token.ok_or(AuthError::MissingIdentityToken)?;

    let identity = state.directory.resolve(&id_token).await.map_err(|e| {
        warn!(error_code = e.error_code(), "Login rejected");
        e
    })?;
    let session = state.sessions.issue(&identity)?;

    info!(user_id = %session.user_id, "Session issued");
    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        user_id: session.user_id,
    }))
}
