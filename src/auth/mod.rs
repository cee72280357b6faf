//! User account storage and password verification.
//!
//! Provides:
//! - Registration with username/password (PBKDF2-HMAC-SHA256, 100k rounds +
//!   per-user random salt)
//! - Login verification with constant-time hash comparison and
//!   cost-equalized handling of unknown usernames
//! - Password change with the same derive-then-persist-or-rollback
//!   discipline as registration
//! - JSON-file-backed persistent storage, rewritten in full and atomically
//!   on every mutation
//!
//! ## Design decisions
//! - A successful login returns a plain [`Session`] value; there is no
//!   ambient logged-in flag anywhere in the crate.
//! - KDF parameters are recorded per account, so the global work factor can
//!   be raised later without breaking credentials written at the old cost.
//! - Account rows that fail validation at load are quarantined rather than
//!   discarded: the username stays reserved and the raw row is carried
//!   through every save untouched.

pub mod hasher;
pub mod store;

pub use store::{AccountStore, AuthError, PasswordChangeError, RegisterError, Session};
