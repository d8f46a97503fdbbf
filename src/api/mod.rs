// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    aggregation::{HoldingsAggregate, TransactionsAggregate},
    providers::LinkToken,
    state::AppState,
};

pub mod accounts;
pub mod health;
pub mod link;
pub mod portfolio;
pub mod rate_limit;
pub mod session;

/// Routes that exist both at the root and under `/api`.
fn gateway_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(session::login))
        .route("/link-token", post(link::create_link_token))
        .route("/exchange-token", post(link::exchange_public_token))
        .route("/holdings", get(portfolio::get_holdings))
        .route("/transactions", post(portfolio::get_transactions))
        .route("/accounts", get(accounts::list_accounts))
        .route("/accounts/{item_id}", delete(accounts::unlink_account))
}

/// Older mobile builds call these spellings.
fn legacy_routes() -> Router<AppState> {
    Router::new()
        .route("/create_link_token", post(link::create_link_token))
        .route("/set_access_token", post(link::exchange_public_token))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn router(state: AppState) -> Router {
    let rate_limited = Router::new()
        .merge(gateway_routes())
        .nest("/api", gateway_routes().merge(legacy_routes()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ));

    let health_routes = Router::new()
        .route("/health", get(health::liveness))
        .route("/api/health", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let cors = cors_layer(&state.allowed_origins);

    Router::new()
        .merge(health_routes)
        .merge(rate_limited)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        session::login,
        link::create_link_token,
        link::exchange_public_token,
        portfolio::get_holdings,
        portfolio::get_transactions,
        accounts::list_accounts,
        accounts::unlink_account
    ),
    components(
        schemas(
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            session::LoginRequest,
            session::LoginResponse,
            link::LinkTokenRequest,
            link::ExchangeTokenRequest,
            link::InstitutionMetadata,
            link::ExchangeTokenResponse,
            LinkToken,
            portfolio::TransactionsRequest,
            HoldingsAggregate,
            TransactionsAggregate,
            accounts::LinkedAccount,
            accounts::LinkedAccountsResponse,
            accounts::UnlinkResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness checks"),
        (name = "Session", description = "Session token issuance"),
        (name = "Linking", description = "Provider account linking"),
        (name = "Portfolio", description = "Aggregated holdings and transactions"),
        (name = "Accounts", description = "Linked item management")
    )
)]
struct ApiDoc;
