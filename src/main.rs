// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use relational_portfolio_gateway::{
    api::router,
    config::{Config, LogFormat},
    housekeeping::CredentialSweeper,
    providers::plaid::PlaidClient,
    state::AppState,
    storage::{CredentialDatabase, TokenSealer},
};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Tracing is configured from the loaded config, so config errors go to stderr
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);
    info!(config = ?config, "Configuration loaded");

    let sealer = match TokenSealer::from_base64(&config.credential_key) {
        Ok(sealer) => sealer,
        Err(e) => {
            error!(error = %e, "Invalid CREDENTIAL_ENCRYPTION_KEY");
            return ExitCode::FAILURE;
        }
    };

    let database = match CredentialDatabase::open(&config.credential_db_path(), sealer) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!(error = %e, "Failed to open credential database");
            return ExitCode::FAILURE;
        }
    };

    let provider = match PlaidClient::new(&config.provider) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to build provider client");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();

    if let Some(days) = config.credential_retention_days {
        let sweeper = CredentialSweeper::new(database.clone(), days);
        tokio::spawn(sweeper.run(shutdown.clone()));
    }

    let state = match AppState::from_config(&config, database, provider) {
        Ok(state) => state,
        Err(e) => {
            error!(error = ?e, "Failed to set up identity provider verification");
            return ExitCode::FAILURE;
        }
    };
    let app = router(state);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, host = %config.host, port = config.port, "Invalid bind address");
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %addr, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!(%addr, environment = %config.provider.environment, "Portfolio gateway listening (docs at /docs)");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await;

    shutdown.cancel();
    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
