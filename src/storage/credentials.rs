// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Linked-item credential database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `credentials`: credential_id → serialized StoredCredential
//! - `credential_index`: composite key (user_id \0 item_id) → credential_id
//!
//! The index enforces at most one credential per `(user_id, item_id)`.
//! Every write runs inside a single redb write transaction, and redb admits
//! one writer at a time, so two concurrent re-links of the same item cannot
//! both observe "absent" and insert twice.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::sealing::TokenSealer;
use super::{StorageError, StorageResult};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: credential_id → serialized StoredCredential (JSON bytes).
const CREDENTIALS: TableDefinition<&str, &[u8]> = TableDefinition::new("credentials");

/// Uniqueness index: `user_id \0 item_id` → credential_id.
const CREDENTIAL_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("credential_index");

const KEY_SEPARATOR: u8 = 0x00;

// =============================================================================
// Records
// =============================================================================

/// One provider access token scoped to one user and one linked item.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkedItemCredential {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub access_token: String,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub is_active: bool,
}

impl std::fmt::Debug for LinkedItemCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedItemCredential")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("item_id", &self.item_id)
            .field("access_token", &"<redacted>")
            .field("institution_id", &self.institution_id)
            .field("institution_name", &self.institution_name)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("last_used_at", &self.last_used_at)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Input of [`CredentialStore::upsert`].
#[derive(Debug, Clone, Copy)]
pub struct UpsertCredential<'a> {
    pub user_id: &'a str,
    pub item_id: &'a str,
    pub access_token: &'a str,
    pub institution_id: Option<&'a str>,
    pub institution_name: Option<&'a str>,
}

/// On-disk form. The access token only ever exists sealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    id: String,
    user_id: String,
    item_id: String,
    sealed_access_token: String,
    institution_id: Option<String>,
    institution_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_used_at: DateTime<Utc>,
    is_active: bool,
}

// =============================================================================
// Store Contract
// =============================================================================

/// Durable association between users and their provider access tokens.
///
/// Every method is addressed by an already authenticated `user_id`; no
/// operation reads or writes another user's rows.
pub trait CredentialStore: Send + Sync {
    /// Insert a credential or replace the token and metadata of the existing
    /// `(user_id, item_id)` row in place. Returns the credential id.
    fn upsert(&self, credential: UpsertCredential<'_>) -> StorageResult<String>;

    /// Active credentials of the user, in no guaranteed order.
    fn list_active(&self, user_id: &str) -> StorageResult<Vec<LinkedItemCredential>>;

    /// Every credential of the user, active or not.
    fn list_linked(&self, user_id: &str) -> StorageResult<Vec<LinkedItemCredential>>;

    /// Mark a credential inactive. Idempotent; returns whether a row changed.
    fn deactivate(&self, user_id: &str, item_id: &str) -> StorageResult<bool>;

    /// Verify the backing storage is readable.
    fn health_check(&self) -> StorageResult<()>;
}

// =============================================================================
// Index Key Helpers
// =============================================================================

fn make_index_key(user_id: &str, item_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + 1 + item_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(item_id.as_bytes());
    key
}

/// `[user \0, user \x01)` covers every item of one user.
fn make_user_range(user_id: &str) -> (Vec<u8>, Vec<u8>) {
    let mut start = Vec::with_capacity(user_id.len() + 1);
    start.extend_from_slice(user_id.as_bytes());
    let mut end = start.clone();
    start.push(KEY_SEPARATOR);
    end.push(KEY_SEPARATOR + 1);
    (start, end)
}

/// Ids are stored verbatim, so a value that only differs by surrounding
/// whitespace is rejected rather than silently normalized.
fn require<'a>(field: &str, value: &'a str) -> StorageResult<&'a str> {
    if value.trim().is_empty() {
        return Err(StorageError::Validation(format!("{field} is required")));
    }
    if value != value.trim() {
        return Err(StorageError::Validation(format!(
            "{field} has leading or trailing whitespace"
        )));
    }
    if value.as_bytes().contains(&KEY_SEPARATOR) {
        return Err(StorageError::Validation(format!(
            "{field} contains a NUL byte"
        )));
    }
    Ok(value)
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// CredentialDatabase
// =============================================================================

/// redb implementation of [`CredentialStore`].
pub struct CredentialDatabase {
    db: Database,
    sealer: TokenSealer,
}

impl CredentialDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path, sealer: TokenSealer) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CREDENTIALS)?;
            let _ = write_txn.open_table(CREDENTIAL_INDEX)?;
        }
        write_txn.commit()?;

        info!(path = %path.display(), "Credential database opened");
        Ok(Self { db, sealer })
    }

    fn unseal(&self, stored: StoredCredential) -> StorageResult<LinkedItemCredential> {
        let context = make_index_key(&stored.user_id, &stored.item_id);
        let access_token = self.sealer.open(&stored.sealed_access_token, &context)?;
        Ok(LinkedItemCredential {
            id: stored.id,
            user_id: stored.user_id,
            item_id: stored.item_id,
            access_token,
            institution_id: stored.institution_id,
            institution_name: stored.institution_name,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            last_used_at: stored.last_used_at,
            is_active: stored.is_active,
        })
    }

    fn list_for_user(&self, user_id: &str, active_only: bool) -> StorageResult<Vec<LinkedItemCredential>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(CREDENTIAL_INDEX)?;
        let cred_table = read_txn.open_table(CREDENTIALS)?;

        let (start, end) = make_user_range(user_id);
        let mut credentials = Vec::new();

        for entry in idx_table.range(start.as_slice()..end.as_slice())? {
            let entry = entry?;
            let credential_id = entry.1.value().to_string();

            let Some(value) = cred_table.get(credential_id.as_str())? else {
                return Err(StorageError::Corrupted(format!(
                    "index points at missing credential {credential_id}"
                )));
            };
            let stored: StoredCredential = serde_json::from_slice(value.value())?;
            if active_only && !stored.is_active {
                continue;
            }
            credentials.push(self.unseal(stored)?);
        }

        Ok(credentials)
    }

    /// Hard-delete inactive credentials last updated before `cutoff`.
    ///
    /// Housekeeping only; aggregation never calls this. Returns the number
    /// of removed credentials.
    pub fn purge_inactive(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let write_txn = self.db.begin_write()?;
        let purged = {
            let mut cred_table = write_txn.open_table(CREDENTIALS)?;
            let mut idx_table = write_txn.open_table(CREDENTIAL_INDEX)?;

            let mut stale = Vec::new();
            for entry in cred_table.iter()? {
                let entry = entry?;
                let stored: StoredCredential = serde_json::from_slice(entry.1.value())?;
                if !stored.is_active && stored.updated_at < cutoff {
                    stale.push(stored);
                }
            }

            for stored in &stale {
                let key = make_index_key(&stored.user_id, &stored.item_id);
                idx_table.remove(key.as_slice())?;
                cred_table.remove(stored.id.as_str())?;
            }
            stale.len()
        };
        write_txn.commit()?;
        Ok(purged)
    }
}

impl CredentialStore for CredentialDatabase {
    fn upsert(&self, credential: UpsertCredential<'_>) -> StorageResult<String> {
        let user_id = require("user_id", credential.user_id)?;
        let item_id = require("item_id", credential.item_id)?;
        let access_token = require("access_token", credential.access_token)?;

        let key = make_index_key(user_id, item_id);
        let sealed_access_token = self.sealer.seal(access_token, &key)?;
        let now = Utc::now();

        let write_txn = self.db.begin_write()?;
        let credential_id = {
            let mut cred_table = write_txn.open_table(CREDENTIALS)?;
            let mut idx_table = write_txn.open_table(CREDENTIAL_INDEX)?;

            // Read the existing row (if any) before mutating
            let existing_id = idx_table
                .get(key.as_slice())?
                .map(|value| value.value().to_string());
            let existing: Option<StoredCredential> = match &existing_id {
                Some(id) => {
                    let bytes = cred_table.get(id.as_str())?.map(|v| v.value().to_vec());
                    match bytes {
                        Some(bytes) => Some(serde_json::from_slice(&bytes)?),
                        None => None,
                    }
                }
                None => None,
            };

            let stored = match existing {
                Some(previous) => StoredCredential {
                    sealed_access_token,
                    institution_id: optional(credential.institution_id),
                    institution_name: optional(credential.institution_name),
                    updated_at: now,
                    last_used_at: now,
                    is_active: true,
                    ..previous
                },
                None => StoredCredential {
                    id: existing_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                    user_id: user_id.to_string(),
                    item_id: item_id.to_string(),
                    sealed_access_token,
                    institution_id: optional(credential.institution_id),
                    institution_name: optional(credential.institution_name),
                    created_at: now,
                    updated_at: now,
                    last_used_at: now,
                    is_active: true,
                },
            };

            let json = serde_json::to_vec(&stored)?;
            cred_table.insert(stored.id.as_str(), json.as_slice())?;
            idx_table.insert(key.as_slice(), stored.id.as_str())?;
            stored.id
        };
        write_txn.commit()?;

        debug!(user_id = %user_id, item_id = %item_id, credential_id = %credential_id, "Credential upserted");
        Ok(credential_id)
    }

    fn list_active(&self, user_id: &str) -> StorageResult<Vec<LinkedItemCredential>> {
        self.list_for_user(user_id, true)
    }

    fn list_linked(&self, user_id: &str) -> StorageResult<Vec<LinkedItemCredential>> {
        self.list_for_user(user_id, false)
    }

    fn deactivate(&self, user_id: &str, item_id: &str) -> StorageResult<bool> {
        let key = make_index_key(user_id, item_id);

        let write_txn = self.db.begin_write()?;
        let changed = {
            let idx_table = write_txn.open_table(CREDENTIAL_INDEX)?;
            let mut cred_table = write_txn.open_table(CREDENTIALS)?;

            let credential_id = idx_table
                .get(key.as_slice())?
                .map(|value| value.value().to_string());

            let existing_bytes = match &credential_id {
                Some(id) => cred_table.get(id.as_str())?.map(|v| v.value().to_vec()),
                None => None,
            };

            match existing_bytes {
                Some(bytes) => {
                    let mut stored: StoredCredential = serde_json::from_slice(&bytes)?;
                    if stored.is_active {
                        stored.is_active = false;
                        stored.updated_at = Utc::now();
                        let json = serde_json::to_vec(&stored)?;
                        cred_table.insert(stored.id.as_str(), json.as_slice())?;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        write_txn.commit()?;

        debug!(user_id = %user_id, item_id = %item_id, changed, "Credential deactivated");
        Ok(changed)
    }

    fn health_check(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(CREDENTIAL_INDEX)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
