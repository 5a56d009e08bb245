//! Password hashing and verification using Argon2id
//!
//! Parameters follow the OWASP balanced profile:
//! - Memory: 64 MiB
//! - Iterations: 3
//! - Parallelism: 4 lanes
//! - Hash length: 32 bytes
//!
//! Stored hashes are PHC strings, so verification reads the parameters from
//! the hash itself and keeps working for legacy hashes.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::{debug, warn};

use warden_core::{Result, WardenError};

const MEMORY_COST_KIB: u32 = 64 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 4;
const OUTPUT_LEN: usize = 32;

fn create_argon2() -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
        .map_err(|e| WardenError::internal_error(format!("Invalid Argon2 parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into a salted Argon2id PHC string
///
/// CPU-bound; async callers should use `hash_password_async`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = create_argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| WardenError::internal_error(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

pub async fn hash_password_async(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| WardenError::internal_error(format!("Hashing task failed: {}", e)))?
}

/// Verify a password against a stored hash
///
/// Malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(stored) = PasswordHash::new(hash) else {
        warn!("Stored password hash is not a PHC string");
        return false;
    };
    let matched = Argon2::default()
        .verify_password(password.as_bytes(), &stored)
        .is_ok();
    if !matched {
        debug!("Password mismatch");
    }
    matched
}

pub async fn verify_password_async(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

/// Whether a stored hash uses weaker parameters than the current ones
///
/// Local logins re-hash the password on success when this holds.
pub fn needs_rehash(hash: &str) -> bool {
    let Ok(stored) = PasswordHash::new(hash) else {
        return true;
    };
    if stored.algorithm != argon2::ARGON2ID_IDENT {
        return true;
    }

    let param = |key: &str| stored.params.get_decimal(key);
    param("m").is_some_and(|m| m < MEMORY_COST_KIB) || param("t").is_some_and(|t| t < TIME_COST)
}

/// Random password for bootstrap accounts created without one
pub fn generate_password(length: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
