// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Sweeper
//!
//! Background task that hard-deletes unlinked credentials once they have
//! been inactive for the configured retention period
//! (`CREDENTIAL_RETENTION_DAYS`). Without that setting the sweeper is not
//! started and inactive rows are kept indefinitely.
//!
//! Active credentials are never touched; re-linking an item before its
//! inactive row is purged reactivates the same credential.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`, like the server itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::CredentialDatabase;

/// Default interval between sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub struct CredentialSweeper {
    database: Arc<CredentialDatabase>,
    retention: chrono::Duration,
    sweep_interval: Duration,
}

impl CredentialSweeper {
    pub fn new(database: Arc<CredentialDatabase>, retention_days: u32) -> Self {
        Self {
            database,
            retention: chrono::Duration::days(i64::from(retention_days)),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            retention_days = self.retention.num_days(),
            "Credential sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Credential sweeper shutting down");
                return;
            }

            self.sweep_step();

            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Credential sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// One sweep; returns the number of purged credentials.
    fn sweep_step(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        match self.database.purge_inactive(cutoff) {
            Ok(0) => {
                debug!("Credential sweeper: nothing to purge");
                0
            }
            Ok(purged) => {
                info!(purged, cutoff = %cutoff, "Credential sweeper: purged inactive credentials");
                purged
            }
            Err(e) => {
                warn!(error = %e, "Credential sweeper: purge failed");
                0
            }
        }
    }
}
