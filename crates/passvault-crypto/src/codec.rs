//! Field-level AES-256-CBC encryption for secrets at rest.
//!
//! Keys and ivs are hex strings on the outside (64 and 32 characters) and the
//! ciphertext is hex-encoded including the PKCS#7 padding block.
//!
//! # IV discipline
//!
//! [`Iv`] is not `Clone` and can only be created by [`Iv::generate`].
//! [`encrypt_field`] takes it by value, so one iv value seals exactly one
//! plaintext. The stored form is the hex string returned in
//! [`Sealed::iv`], which is only ever fed back into [`decrypt_field`].

use std::fmt;

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::primitives::{self, KEY_LEN};

/// Length of the AES-CBC initialization vector in bytes.
pub const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// A user's 256-bit vault key, hex-encoded.
///
/// The hex is validated on construction and wiped from memory on drop.
/// `Debug` output is redacted. There is no `PartialEq`; compare keys
/// through [`as_hex`](Self::as_hex) in tests only.
#[derive(Clone)]
pub struct EncryptionKey {
    hex: String,
}

impl EncryptionKey {
    /// Wrap a hex-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::CryptoFailure`] if `hex` is not exactly 64 hex
    /// characters.
    pub fn from_hex(hex: impl Into<String>) -> CryptoResult<Self> {
        let hex = hex.into();
        decode_exact(&hex, KEY_LEN, "key")?;
        Ok(Self { hex })
    }

    /// Derive a key from a password and hex salt (see [`primitives::derive_key`]).
    pub fn derive(password: &str, salt: &str, iterations: u32) -> CryptoResult<Self> {
        Ok(Self {
            hex: primitives::derive_key(password, salt, iterations)?,
        })
    }

    /// The hex form, for persistence by the owning directory.
    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    fn bytes(&self) -> CryptoResult<Vec<u8>> {
        decode_exact(&self.hex, KEY_LEN, "key")
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.hex.zeroize();
    }
}

/// A fresh, single-use initialization vector.
pub struct Iv {
    bytes: [u8; IV_LEN],
}

impl Iv {
    /// Draw 16 bytes from the system CSPRNG.
    pub fn generate() -> CryptoResult<Self> {
        let raw = primitives::random_bytes(IV_LEN)?;
        let mut bytes = [0u8; IV_LEN];
        bytes.copy_from_slice(&raw);
        Ok(Self { bytes })
    }

    /// Hex form (32 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self { bytes }
    }
}

impl fmt::Debug for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({})", self.to_hex())
    }
}

/// Ciphertext plus the iv that produced it, both hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: String,
    pub iv: String,
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key`, consuming `iv`.
///
/// Returns the hex ciphertext together with the hex iv.
pub fn encrypt_field(plaintext: &str, key: &EncryptionKey, iv: Iv) -> CryptoResult<Sealed> {
    let ciphertext = encrypt_bytes(plaintext.as_bytes(), key, &iv)?;
    Ok(Sealed {
        ciphertext: hex::encode(ciphertext),
        iv: iv.to_hex(),
    })
}

/// Encrypt `plaintext` under a freshly generated iv.
pub fn seal(plaintext: &str, key: &EncryptionKey) -> CryptoResult<Sealed> {
    encrypt_field(plaintext, key, Iv::generate()?)
}

fn encrypt_bytes(plaintext: &[u8], key: &EncryptionKey, iv: &Iv) -> CryptoResult<Vec<u8>> {
    let mut key_bytes = key.bytes()?;
    let cipher = Aes256CbcEnc::new_from_slices(&key_bytes, &iv.bytes)
        .map_err(|_| CryptoError::failure("invalid AES-256-CBC key or iv length"));
    key_bytes.zeroize();

    let ciphertext = cipher?.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = ciphertext.len(),
        "encrypted field"
    );
    Ok(ciphertext)
}

// ---------------------------------------------------------------------------
// Decryption
// ---------------------------------------------------------------------------

/// Decrypt hex `ciphertext` with `key` and the hex `iv` it was sealed with.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailure`] on malformed hex, a wrong-size
/// iv, bad padding, or a plaintext that is not UTF-8.
/// Returns [`CryptoError::CryptoFailure`] if the key itself is unusable.
pub fn decrypt_field(ciphertext: &str, key: &EncryptionKey, iv: &str) -> CryptoResult<String> {
    let iv_bytes = decode_exact(iv, IV_LEN, "iv")
        .map_err(|e| CryptoError::decryption(e.to_string()))?;
    let ciphertext = hex::decode(ciphertext)
        .map_err(|e| CryptoError::decryption(format!("ciphertext is not valid hex: {e}")))?;

    let plaintext = decrypt_bytes(&ciphertext, key, &iv_bytes)?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::decryption("plaintext is not valid UTF-8"))
}

fn decrypt_bytes(ciphertext: &[u8], key: &EncryptionKey, iv: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut key_bytes = key.bytes()?;
    let cipher = Aes256CbcDec::new_from_slices(&key_bytes, iv)
        .map_err(|_| CryptoError::failure("invalid AES-256-CBC key or iv length"));
    key_bytes.zeroize();

    let plaintext = cipher?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::decryption("bad padding: wrong key or corrupted data"))?;

    tracing::trace!(
        ciphertext_len = ciphertext.len(),
        plaintext_len = plaintext.len(),
        "decrypted field"
    );
    Ok(plaintext)
}

fn decode_exact(hex_str: &str, len: usize, what: &str) -> CryptoResult<Vec<u8>> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| CryptoError::failure(format!("{what} is not valid hex: {e}")))?;
    if bytes.len() != len {
        return Err(CryptoError::failure(format!(
            "{what} must be {len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
