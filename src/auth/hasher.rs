//! Password hashing primitives for the account store.
//!
//! Pure functions, no state and no I/O: derive a PBKDF2-HMAC-SHA256 hash
//! from a password and a per-account random salt, and verify an attempt
//! against a stored hash in constant time.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

/// Salt byte length for password hashing.
pub const SALT_LEN: usize = 16;

/// Derived hash byte length (PBKDF2-HMAC-SHA256 output).
pub const HASH_LEN: usize = 32;

/// PBKDF2 iteration count recorded for newly written credentials.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Generate a fresh random salt from the OS CSPRNG.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a password hash at the current work factor.
pub fn derive_hash(password: &str, salt: &[u8; SALT_LEN]) -> [u8; HASH_LEN] {
    derive_hash_with(password, salt, PBKDF2_ITERATIONS)
}

/// Derive a password hash at an explicit iteration count.
///
/// Verification always runs at the count recorded with the account, so
/// credentials written before a work-factor bump stay verifiable.
pub fn derive_hash_with(
    password: &str,
    salt: &[u8; SALT_LEN],
    iterations: u32,
) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

/// Check a password attempt against a stored hash.
pub fn verify(
    password: &str,
    salt: &[u8; SALT_LEN],
    expected: &[u8; HASH_LEN],
    iterations: u32,
) -> bool {
    let attempt = derive_hash_with(password, salt, iterations);
    constant_time_eq(&attempt, expected)
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let h1 = derive_hash("correcthorse123", &salt);
        let h2 = derive_hash("correcthorse123", &salt);
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_salts_give_different_hashes() {
        let h1 = derive_hash("correcthorse123", &[1u8; SALT_LEN]);
        let h2 = derive_hash("correcthorse123", &[2u8; SALT_LEN]);
        assert_ne!(h1, h2);
    }

    #[test]
    fn different_iteration_counts_give_different_hashes() {
        let salt = [7u8; SALT_LEN];
        let h1 = derive_hash_with("correcthorse123", &salt, 1_000);
        let h2 = derive_hash_with("correcthorse123", &salt, 2_000);
        assert_ne!(h1, h2);
    }

    #[test]
    fn verify_accepts_matching_password() {
        let salt = generate_salt();
        let hash = derive_hash("correcthorse123", &salt);
        assert!(verify("correcthorse123", &salt, &hash, PBKDF2_ITERATIONS));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let salt = generate_salt();
        let hash = derive_hash("correcthorse123", &salt);
        assert!(!verify("wrongpass1", &salt, &hash, PBKDF2_ITERATIONS));
    }

    #[test]
    fn verify_rejects_wrong_iteration_count() {
        let salt = [7u8; SALT_LEN];
        let hash = derive_hash_with("correcthorse123", &salt, 1_000);
        assert!(!verify("correcthorse123", &salt, &hash, 2_000));
    }

    #[test]
    fn generated_salts_are_unique() {
        let s1 = generate_salt();
        let s2 = generate_salt();
        assert_ne!(s1, s2);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
