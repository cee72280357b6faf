//! JSON-file-backed account store.
//!
//! Durable format: one JSON object mapping username to
//! `{ "password_hash": hex, "salt": hex, "kdf": { "algorithm", "iterations" } }`.
//! The `kdf` field defaults to the current constants when absent, so tables
//! written before parameter pinning load unchanged.
//!
//! The full table is held in memory behind an `RwLock` and rewritten to disk
//! atomically (temp file + rename) after every mutation. A mutation that
//! fails to persist is rolled back before the error is returned, so the
//! in-memory table and the file never diverge.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::hasher::{self, HASH_LEN, PBKDF2_ITERATIONS, SALT_LEN};

/// Maximum accepted username length (characters).
const MAX_USERNAME_CHARS: usize = 64;

/// Minimum accepted password length (characters).
const MIN_PASSWORD_CHARS: usize = 8;

/// Identifier recorded for credentials derived with PBKDF2-HMAC-SHA256.
const KDF_PBKDF2_SHA256: &str = "pbkdf2-sha256";

/// Salt for the dummy derivation on unknown usernames, so lookup misses pay
/// the same cryptographic cost as a real verification.
const DUMMY_SALT: [u8; SALT_LEN] = [0u8; SALT_LEN];

// ── Errors ──────────────────────────────────────────────────────────

/// Registration failure, reported as a typed result (never a panic).
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("username cannot be empty")]
    EmptyUsername,
    #[error("username too long (max 64 characters)")]
    UsernameTooLong,
    #[error("username already exists")]
    DuplicateUsername,
    #[error("password must be at least 8 characters")]
    PasswordTooShort,
    #[error("failed to persist account table")]
    Storage(#[source] io::Error),
}

impl RegisterError {
    /// Fixed user-facing message; never exposes I/O or crypto internals.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyUsername => "Username cannot be empty",
            Self::UsernameTooLong => "Username too long (max 64 characters)",
            Self::DuplicateUsername => "Username already exists",
            Self::PasswordTooShort => "Password must be at least 8 characters",
            Self::Storage(_) => "Could not save your account, please try again",
        }
    }
}

/// Login failure.
///
/// `CorruptCredential` means the stored row for the username failed
/// validation at load. It is kept distinct from `IncorrectPassword` for
/// logs and diagnosis, but [`AuthError::user_message`] maps both to the
/// same text so the distinction is invisible to an attacker.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username not found")]
    UserNotFound,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("stored credential is unreadable")]
    CorruptCredential,
}

impl AuthError {
    /// Fixed user-facing message.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UserNotFound => "Username not found",
            Self::IncorrectPassword | Self::CorruptCredential => "Incorrect password",
        }
    }
}

/// Password-change failure.
#[derive(Debug, Error)]
pub enum PasswordChangeError {
    #[error("username not found")]
    UserNotFound,
    #[error("current password is incorrect")]
    IncorrectPassword,
    #[error("stored credential is unreadable")]
    CorruptCredential,
    #[error("password must be at least 8 characters")]
    PasswordTooShort,
    #[error("failed to persist account table")]
    Storage(#[source] io::Error),
}

impl PasswordChangeError {
    /// Fixed user-facing message.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UserNotFound => "Username not found",
            Self::IncorrectPassword | Self::CorruptCredential => "Current password is incorrect",
            Self::PasswordTooShort => "Password must be at least 8 characters",
            Self::Storage(_) => "Could not save your new password, please try again",
        }
    }
}

// ── Data model ──────────────────────────────────────────────────────

/// Proof of a successful login, returned to the caller.
///
/// The frontend keeps this value and passes it to whatever needs the
/// identity; there is no process-wide authenticated flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    username: String,
    started_at: u64,
}

impl Session {
    /// The authenticated username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// When the session started (Unix epoch seconds).
    pub fn started_at(&self) -> u64 {
        self.started_at
    }
}

/// KDF parameters pinned per account at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct KdfParams {
    algorithm: String,
    iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: KDF_PBKDF2_SHA256.to_string(),
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

/// On-disk form of one account row (hex-encoded byte fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredAccount {
    password_hash: String,
    salt: String,
    #[serde(default)]
    kdf: KdfParams,
}

/// A validated account held in memory. The username is the table key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Account {
    salt: [u8; SALT_LEN],
    password_hash: [u8; HASH_LEN],
    iterations: u32,
}

impl Account {
    /// Validate and decode a stored row. The error string names the defect
    /// for the quarantine log; it never reaches a user.
    fn decode(row: &StoredAccount) -> Result<Self, &'static str> {
        if row.kdf.algorithm != KDF_PBKDF2_SHA256 {
            return Err("unknown kdf algorithm");
        }
        if row.kdf.iterations == 0 {
            return Err("zero kdf iteration count");
        }
        let salt_bytes = hex::decode(&row.salt).map_err(|_| "salt is not valid hex")?;
        let salt: [u8; SALT_LEN] = salt_bytes
            .try_into()
            .map_err(|_| "salt has the wrong length")?;
        let hash_bytes =
            hex::decode(&row.password_hash).map_err(|_| "password hash is not valid hex")?;
        let password_hash: [u8; HASH_LEN] = hash_bytes
            .try_into()
            .map_err(|_| "password hash has the wrong length")?;
        Ok(Self {
            salt,
            password_hash,
            iterations: row.kdf.iterations,
        })
    }

    fn encode(&self) -> StoredAccount {
        StoredAccount {
            password_hash: hex::encode(self.password_hash),
            salt: hex::encode(self.salt),
            kdf: KdfParams {
                algorithm: KDF_PBKDF2_SHA256.to_string(),
                iterations: self.iterations,
            },
        }
    }
}

#[derive(Debug, Default)]
struct TableState {
    accounts: HashMap<String, Account>,
    /// Rows that failed validation at load. Their usernames stay reserved
    /// and the raw rows are written back verbatim on every save.
    quarantined: BTreeMap<String, StoredAccount>,
}

impl TableState {
    fn from_rows(rows: BTreeMap<String, StoredAccount>) -> Self {
        let mut state = Self::default();
        for (username, row) in rows {
            match Account::decode(&row) {
                Ok(account) => {
                    state.accounts.insert(username, account);
                }
                Err(reason) => {
                    tracing::warn!(username = %username, reason, "Quarantining malformed account row");
                    state.quarantined.insert(username, row);
                }
            }
        }
        state
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Durable table of user accounts.
///
/// Loaded once at construction, held in memory for the process lifetime,
/// and rewritten in full after every mutation. Full rewrites are the
/// simplest correct scheme for a personal tracker's account counts; they do
/// not scale to large tables.
pub struct AccountStore {
    path: PathBuf,
    state: RwLock<TableState>,
}

impl AccountStore {
    /// Open (or create) the account table at the given path.
    ///
    /// A missing file is created holding an empty table. An unreadable or
    /// unparseable file is logged as an integrity warning and treated as
    /// empty; the bytes on disk are left alone until the next successful
    /// mutation.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("creating account table directory {}", parent.display())
            })?;
        }

        let state = if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(raw) => match serde_json::from_str::<BTreeMap<String, StoredAccount>>(&raw) {
                    Ok(rows) => TableState::from_rows(rows),
                    Err(err) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %err,
                            "Account table is corrupt; starting with an empty table"
                        );
                        TableState::default()
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "Account table is unreadable; starting with an empty table"
                    );
                    TableState::default()
                }
            }
        } else {
            let state = TableState::default();
            write_table(path, &state)
                .with_context(|| format!("creating account table {}", path.display()))?;
            state
        };

        tracing::info!(
            path = %path.display(),
            accounts = state.accounts.len(),
            quarantined = state.quarantined.len(),
            "Account table loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(state),
        })
    }

    /// Register a new account.
    ///
    /// The duplicate check, hash derivation, insertion, and persist run
    /// under one write lock, so two concurrent registrations of the same
    /// username cannot both succeed. If the persist fails the insertion is
    /// rolled back before the error is returned.
    pub fn register(&self, username: &str, password: &str) -> Result<(), RegisterError> {
        if username.is_empty() {
            return Err(RegisterError::EmptyUsername);
        }
        if username.chars().count() > MAX_USERNAME_CHARS {
            return Err(RegisterError::UsernameTooLong);
        }

        let mut state = self.state.write();
        if state.accounts.contains_key(username) || state.quarantined.contains_key(username) {
            return Err(RegisterError::DuplicateUsername);
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(RegisterError::PasswordTooShort);
        }

        let salt = hasher::generate_salt();
        let password_hash = hasher::derive_hash(password, &salt);
        state.accounts.insert(
            username.to_string(),
            Account {
                salt,
                password_hash,
                iterations: PBKDF2_ITERATIONS,
            },
        );

        if let Err(err) = write_table(&self.path, &state) {
            state.accounts.remove(username);
            return Err(RegisterError::Storage(err));
        }

        tracing::info!(username = username, "Account registered");
        Ok(())
    }

    /// Verify a login attempt. Returns a [`Session`] on success.
    ///
    /// Unknown usernames pay a dummy derivation against a fixed salt so the
    /// response time does not reveal whether the name exists.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let state = self.state.read();
        match state.accounts.get(username) {
            Some(account) => {
                if hasher::verify(
                    password,
                    &account.salt,
                    &account.password_hash,
                    account.iterations,
                ) {
                    Ok(Session {
                        username: username.to_string(),
                        started_at: epoch_secs(),
                    })
                } else {
                    Err(AuthError::IncorrectPassword)
                }
            }
            None if state.quarantined.contains_key(username) => {
                let _ = hasher::derive_hash(password, &DUMMY_SALT);
                tracing::warn!(username = username, "Login attempt against a quarantined account row");
                Err(AuthError::CorruptCredential)
            }
            None => {
                let _ = hasher::derive_hash(password, &DUMMY_SALT);
                Err(AuthError::UserNotFound)
            }
        }
    }

    /// Change an account's password after verifying the current one.
    ///
    /// Re-derives both salt and hash, and follows the same
    /// persist-or-rollback discipline as [`AccountStore::register`].
    pub fn change_password(
        &self,
        username: &str,
        current: &str,
        new_password: &str,
    ) -> Result<(), PasswordChangeError> {
        let mut state = self.state.write();
        let Some((salt, stored_hash, iterations)) = state
            .accounts
            .get(username)
            .map(|a| (a.salt, a.password_hash, a.iterations))
        else {
            let _ = hasher::derive_hash(current, &DUMMY_SALT);
            if state.quarantined.contains_key(username) {
                tracing::warn!(
                    username = username,
                    "Password change attempt against a quarantined account row"
                );
                return Err(PasswordChangeError::CorruptCredential);
            }
            return Err(PasswordChangeError::UserNotFound);
        };

        if !hasher::verify(current, &salt, &stored_hash, iterations) {
            return Err(PasswordChangeError::IncorrectPassword);
        }
        if new_password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(PasswordChangeError::PasswordTooShort);
        }

        let new_salt = hasher::generate_salt();
        let new_hash = hasher::derive_hash(new_password, &new_salt);
        let previous = state.accounts.insert(
            username.to_string(),
            Account {
                salt: new_salt,
                password_hash: new_hash,
                iterations: PBKDF2_ITERATIONS,
            },
        );

        if let Err(err) = write_table(&self.path, &state) {
            if let Some(prev) = previous {
                state.accounts.insert(username.to_string(), prev);
            }
            return Err(PasswordChangeError::Storage(err));
        }

        tracing::info!(username = username, "Password changed");
        Ok(())
    }

    /// Count registered accounts (quarantined rows excluded).
    pub fn user_count(&self) -> usize {
        self.state.read().accounts.len()
    }

    /// Whether no accounts are registered.
    pub fn is_empty(&self) -> bool {
        self.state.read().accounts.is_empty()
    }

    /// Path of the durable table file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ── Persistence ─────────────────────────────────────────────────────

/// Serialize the full table and replace the file atomically: write to a
/// temp file in the same directory, sync, then rename into place. A crash
/// mid-write leaves the previous table intact.
fn write_table(path: &Path, state: &TableState) -> io::Result<()> {
    let mut rows: BTreeMap<String, StoredAccount> = state
        .quarantined
        .iter()
        .map(|(username, row)| (username.clone(), row.clone()))
        .collect();
    for (username, account) in &state.accounts {
        rows.insert(username.clone(), account.encode());
    }

    let json = serde_json::to_string_pretty(&rows)?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Tests ───────────────────────────────────────────────────────────
