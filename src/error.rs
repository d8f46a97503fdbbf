// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::aggregation::AggregationError;
use crate::auth::AuthError;
use crate::providers::ProviderError;
use crate::storage::StorageError;

/// Error returned by HTTP handlers.
///
/// Serialized as `{"error": <message>, "error_code": <code>}`, the same
/// body shape as [`AuthError`](crate::auth::AuthError).
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn rate_limited() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "Too many requests, try again later",
        )
    }

    pub fn storage() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            "Credential storage is unavailable",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
        });
        (self.status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Validation(message) => ApiError::validation(message),
            other => {
                error!(error = %other, "Credential storage failure");
                ApiError::storage()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::InternalError(detail) => {
                error!(detail = %detail, "Authentication internal error");
            }
            AuthError::JwksFetchError(detail) => {
                error!(detail = %detail, "Identity provider JWKS fetch failed");
            }
            _ => {}
        }
        ApiError::new(err.status_code(), err.error_code(), err.to_string())
    }
}

/// Missing fields and malformed JSON bodies are validation failures.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

/// Link-token and exchange failures. Aggregation absorbs per-item errors itself.
impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        warn!(code = %err.code, message = %err.message, "Provider request failed");
        ApiError::new(
            StatusCode::BAD_GATEWAY,
            "provider_error",
            format!("Financial data provider request failed ({})", err.code),
        )
    }
}

impl From<AggregationError> for ApiError {
    fn from(err: AggregationError) -> Self {
        match err {
            AggregationError::Validation(message) => ApiError::validation(message),
            AggregationError::NoConnectedAccounts => ApiError::new(
                StatusCode::NOT_FOUND,
                "no_connected_accounts",
                "No connected accounts. Link an institution first.",
            ),
            failed @ AggregationError::AllAccountsFailed { .. } => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "all_accounts_failed",
                failed.to_string(),
            ),
            AggregationError::Storage(storage) => storage.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::ItemFailure;
    use axum::body::to_bytes;

    #[test]
    fn aggregation_errors_map_to_status_and_code() {
        let cases = [
            (
                AggregationError::Validation("bad date".into()),
                StatusCode::BAD_REQUEST,
                "validation_error",
            ),
            (
                AggregationError::NoConnectedAccounts,
                StatusCode::NOT_FOUND,
                "no_connected_accounts",
            ),
            (
                AggregationError::AllAccountsFailed {
                    attempted: 2,
                    failures: vec![ItemFailure {
                        item_id: "item-1".into(),
                        code: "ITEM_LOGIN_REQUIRED".into(),
                    }],
                },
                StatusCode::BAD_GATEWAY,
                "all_accounts_failed",
            ),
            (
                AggregationError::Storage(StorageError::Corrupted("index".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
            ),
        ];

        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn provider_error_becomes_bad_gateway_without_message() {
        let api: ApiError = ProviderError::new("INVALID_PUBLIC_TOKEN", "secret detail").into();
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api.code, "provider_error");
        assert!(!api.message.contains("secret detail"));
    }

    #[test]
    fn auth_error_keeps_its_code() {
        let api: ApiError = AuthError::TokenExpired.into();
        assert_eq!(api.status, StatusCode::UNAUTHORIZED);
        assert_eq!(api.code, "token_expired");
    }

    #[test]
    fn storage_internals_are_not_exposed() {
        let api: ApiError = StorageError::Corrupted("index points at nothing".into()).into();
        assert!(!api.message.contains("index"));
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::validation("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"validation_error"}"#);
    }
}
