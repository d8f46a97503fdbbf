// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Storage
//!
//! Durable storage for provider access tokens, keyed by the authenticated
//! user and the provider's item id.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   credentials.redb   # redb database, tokens sealed with AES-256-GCM
//! ```
//!
//! ## Important Notes
//!
//! - Access tokens never leave this module in sealed form and never enter
//!   logs in clear (see the redacted `Debug` impls)
//! - Deactivated rows are retained until the housekeeping sweeper removes them

pub mod credentials;
pub mod sealing;

pub use credentials::{CredentialDatabase, CredentialStore, LinkedItemCredential, UpsertCredential};
pub use sealing::{SealingError, TokenSealer};

/// Errors surfaced by the credential store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("token sealing error: {0}")]
    Sealing(#[from] SealingError),

    #[error("corrupted storage: {0}")]
    Corrupted(String),

    #[error("invalid credential: {0}")]
    Validation(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
