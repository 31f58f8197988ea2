//! Leaf crypto utilities built on `ring`.
//!
//! - **Random generation**: cryptographically secure bytes from the system
//!   CSPRNG, plus hex-encoded salts.
//! - **Key derivation**: PBKDF2-HMAC-SHA256 with a fixed 32-byte output,
//!   hex-encoded.
//! - **Password hashing**: the same derivation, verified in constant time.
//!
//! All salts, keys and hashes cross this API as lowercase hex strings so they
//! can be stored next to the rest of a record without a binary side channel.

use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{CryptoError, CryptoResult};

/// Length of a derived key in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Length of a generated salt in bytes.
pub const SALT_LEN: usize = 32;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// PBKDF2 algorithm: HMAC-SHA256.
static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`CryptoError::CryptoFailure`] if the system CSPRNG fails.
pub fn random_bytes(len: usize) -> CryptoResult<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)
        .map_err(|_| CryptoError::failure("failed to generate random bytes"))?;
    Ok(buf)
}

/// Generate a random 32-byte salt, hex-encoded (64 characters).
pub fn generate_salt() -> CryptoResult<String> {
    Ok(hex::encode(random_bytes(SALT_LEN)?))
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

fn iteration_count(iterations: u32) -> CryptoResult<NonZeroU32> {
    NonZeroU32::new(iterations)
        .ok_or_else(|| CryptoError::failure("PBKDF2 iteration count must be non-zero"))
}

fn decode_salt(salt: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(salt).map_err(|e| CryptoError::failure(format!("salt is not valid hex: {e}")))
}

/// Derive a 256-bit key from `password` and a hex-encoded `salt` using
/// PBKDF2-HMAC-SHA256, returning the key hex-encoded.
///
/// Deterministic: identical inputs always produce the identical key.
pub fn derive_key(password: &str, salt: &str, iterations: u32) -> CryptoResult<String> {
    let iterations = iteration_count(iterations)?;
    let salt = decode_salt(salt)?;

    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &mut key);

    tracing::trace!(iterations = iterations.get(), "derived key via PBKDF2");
    Ok(hex::encode(key))
}

/// Hash a login password for storage. Same derivation as [`derive_key`].
pub fn hash_password(password: &str, salt: &str, iterations: u32) -> CryptoResult<String> {
    derive_key(password, salt, iterations)
}

/// Verify `password` against a stored hex `hash` produced by
/// [`hash_password`] with the same `salt` and `iterations`.
///
/// The comparison runs in constant time inside `ring`. A malformed stored
/// hash simply fails verification.
pub fn verify_password(password: &str, salt: &str, hash: &str, iterations: u32) -> bool {
    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iteration_count(iterations),
        decode_salt(salt),
        hex::decode(hash),
    ) else {
        return false;
    };
    pbkdf2::verify(PBKDF2_ALG, iterations, &salt, password.as_bytes(), &expected).is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
