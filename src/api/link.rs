// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account linking endpoints.
//!
//! Link-token issuance opens the provider's Link flow on the device; the
//! public token Link hands back is exchanged here for a long-lived access
//! token that never leaves the gateway.

use axum::{body::Bytes, extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    providers::LinkToken,
    state::AppState,
    storage::UpsertCredential,
};

/// Optional link-token parameters. The body itself may be omitted.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkTokenRequest {
    /// OAuth redirect URI overriding the configured default.
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeTokenRequest {
    /// Public token returned by the Link flow.
    pub public_token: String,
    #[serde(default)]
    pub institution: Option<InstitutionMetadata>,
}

/// Institution metadata reported by the Link flow.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionMetadata {
    #[serde(default)]
    pub institution_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeTokenResponse {
    pub item_id: String,
    pub credential_id: String,
}

fn parse_link_request(body: &Bytes) -> Result<LinkTokenRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(LinkTokenRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::validation(format!("Invalid link-token request: {e}")))
}

fn validate_redirect_uri(raw: &str) -> Result<String, ApiError> {
    let url = Url::parse(raw.trim())
        .map_err(|_| ApiError::validation("redirectUri must be an absolute URL"))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(ApiError::validation("redirectUri must use http or https"));
    }
    Ok(url.to_string())
}

/// Create a Link token for the authenticated user.
#[utoipa::path(
    post,
    path = "/link-token",
    tag = "Linking",
    security(("bearer_auth" = [])),
    request_body(content = LinkTokenRequest, description = "Optional", content_type = "application/json"),
    responses(
        (status = 200, description = "Link token created", body = LinkToken),
        (status = 400, description = "Invalid redirect URI"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Provider request failed")
    )
)]
pub async fn create_link_token(
    Auth(user): Auth,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LinkToken>, ApiError> {
    let request = parse_link_request(&body)?;
    let redirect_uri = request
        .redirect_uri
        .as_deref()
        .filter(|uri| !uri.trim().is_empty())
        .map(validate_redirect_uri)
        .transpose()?;

    let link_token = state
        .provider
        .create_link_token(&user.user_id, redirect_uri.as_deref())
        .await?;

    info!(user_id = %user.user_id, "Link token created");
    Ok(Json(link_token))
}

/// Exchange a Link public token and store the resulting access token.
///
/// Re-linking an item that is already stored replaces its token in place.
#[utoipa::path(
    post,
    path = "/exchange-token",
    tag = "Linking",
    security(("bearer_auth" = [])),
    request_body = ExchangeTokenRequest,
    responses(
        (status = 200, description = "Item linked", body = ExchangeTokenResponse),
        (status = 400, description = "Missing public token"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Provider request failed")
    )
)]
pub async fn exchange_public_token(
    Auth(user): Auth,
    State(state): State<AppState>,
    payload: Result<Json<ExchangeTokenRequest>, JsonRejection>,
) -> Result<Json<ExchangeTokenResponse>, ApiError> {
    let Json(request) = payload?;
    let public_token = request.public_token.trim();
    if public_token.is_empty() {
        return Err(ApiError::validation("publicToken is required"));
    }

    let exchanged = state.provider.exchange_public_token(public_token).await?;

    let institution = request.institution.as_ref();
    let credential_id = state.credentials.upsert(UpsertCredential {
        user_id: &user.user_id,
        item_id: &exchanged.item_id,
        access_token: &exchanged.access_token,
        institution_id: institution.and_then(|i| i.institution_id.as_deref()),
        institution_name: institution.and_then(|i| i.name.as_deref()),
    })?;

    info!(
        user_id = %user.user_id,
        item_id = %exchanged.item_id,
        credential_id = %credential_id,
        "Linked item stored"
    );
    Ok(Json(ExchangeTokenResponse {
        item_id: exchanged.item_id,
        credential_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_means_defaults() {
        let request = parse_link_request(&Bytes::from_static(b"  \n")).unwrap();
        assert!(request.redirect_uri.is_none());
    }

    #[test]
    fn malformed_body_is_validation_error() {
        let err = parse_link_request(&Bytes::from_static(b"{not json")).unwrap_err();
        assert_eq!(err.code, "validation_error");
    }

    #[test]
    fn redirect_uri_must_be_http_url() {
        assert!(validate_redirect_uri("https://app.example.com/oauth").is_ok());
        assert!(validate_redirect_uri("/relative").is_err());
        assert!(validate_redirect_uri("ftp://example.com").is_err());
    }
}
