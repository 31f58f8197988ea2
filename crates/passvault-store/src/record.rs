//! Vault record type and its binary encoding.
//!
//! # Binary Layout
//!
//! ```text
//! Size  Field
//! ----  -----
//! 8     record_id (u64 LE)
//! 8     user_id (u64 LE)
//! 4+n   site_name           (u32 LE length, UTF-8 bytes)
//! 4+n   username
//! 4+n   encrypted_password  (hex ciphertext)
//! 4+n   iv                  (hex)
//! 4+n   notes
//! 4+n   category
//! 8     created_at (u64 LE, unix seconds)
//! 8     modified_at (u64 LE, unix seconds)
//! ```
//!
//! Records are concatenated with no outer framing.

use std::io::{BufRead, ErrorKind};
use std::path::Path;

use crate::error::{StoreError, StoreResult};

/// Upper bound for any single string field.
pub const MAX_FIELD_LEN: usize = 1024 * 1024;

/// One stored vault entry, with the password still encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRecord {
    /// Assigned by the store; globally unique and monotonic.
    pub record_id: u64,
    /// Owner.
    pub user_id: u64,
    /// Index key.
    pub site_name: String,
    pub username: String,
    /// Hex ciphertext, only meaningful with the owner's key and `iv`.
    pub encrypted_password: String,
    /// Hex iv used for `encrypted_password`.
    pub iv: String,
    pub notes: String,
    pub category: String,
    pub created_at: u64,
    pub modified_at: u64,
}

impl VaultRecord {
    /// Serialize into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if a field exceeds
    /// [`MAX_FIELD_LEN`].
    pub fn encode_into(&self, out: &mut Vec<u8>) -> StoreResult<()> {
        out.extend_from_slice(&self.record_id.to_le_bytes());
        out.extend_from_slice(&self.user_id.to_le_bytes());
        for (name, value) in self.string_fields() {
            if value.len() > MAX_FIELD_LEN {
                return Err(StoreError::InvalidArgument(format!(
                    "{name} is {} bytes, limit is {MAX_FIELD_LEN}",
                    value.len()
                )));
            }
            // MAX_FIELD_LEN fits in u32.
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        out.extend_from_slice(&self.created_at.to_le_bytes());
        out.extend_from_slice(&self.modified_at.to_le_bytes());
        Ok(())
    }

    /// Serialize into a fresh buffer.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out)?;
        Ok(out)
    }

    /// Exact number of bytes [`encode`](Self::encode) produces.
    pub fn encoded_len(&self) -> usize {
        8 + 8 + 8 + 8
            + self
                .string_fields()
                .iter()
                .map(|(_, v)| 4 + v.len())
                .sum::<usize>()
    }

    fn string_fields(&self) -> [(&'static str, &str); 6] {
        [
            ("site_name", self.site_name.as_str()),
            ("username", self.username.as_str()),
            ("encrypted_password", self.encrypted_password.as_str()),
            ("iv", self.iv.as_str()),
            ("notes", self.notes.as_str()),
            ("category", self.category.as_str()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Reads one record's fields, turning an early end-of-file into
/// [`StoreError::CorruptStore`] at the record's start offset.
struct FieldReader<'a, R> {
    reader: &'a mut R,
    path: &'a Path,
    start: u64,
    consumed: u64,
}

impl<R: BufRead> FieldReader<'_, R> {
    fn fill(&mut self, buf: &mut [u8], field: &str) -> StoreResult<()> {
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.consumed += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(StoreError::CorruptStore {
                offset: self.start,
                reason: format!("record truncated inside {field}"),
            }),
            Err(e) => Err(StoreError::io(self.path)(e)),
        }
    }

    fn u64(&mut self, field: &str) -> StoreResult<u64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf, field)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn string(&mut self, field: &str) -> StoreResult<String> {
        let mut len_buf = [0u8; 4];
        self.fill(&mut len_buf, field)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FIELD_LEN {
            return Err(StoreError::CorruptStore {
                offset: self.start,
                reason: format!("{field} length {len} exceeds {MAX_FIELD_LEN}"),
            });
        }
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes, field)?;
        String::from_utf8(bytes).map_err(|_| StoreError::CorruptStore {
            offset: self.start,
            reason: format!("{field} is not valid UTF-8"),
        })
    }
}

/// Decode the next record from `reader`, which is positioned at byte
/// `offset` of the file at `path`.
///
/// Returns `Ok(None)` at a clean end of file and the byte length of the
/// record alongside it otherwise.
pub(crate) fn decode_next<R: BufRead>(
    reader: &mut R,
    path: &Path,
    offset: u64,
) -> StoreResult<Option<(VaultRecord, u64)>> {
    if reader.fill_buf().map_err(StoreError::io(path))?.is_empty() {
        return Ok(None);
    }

    let mut fields = FieldReader {
        reader,
        path,
        start: offset,
        consumed: 0,
    };
    let record = VaultRecord {
        record_id: fields.u64("record_id")?,
        user_id: fields.u64("user_id")?,
        site_name: fields.string("site_name")?,
        username: fields.string("username")?,
        encrypted_password: fields.string("encrypted_password")?,
        iv: fields.string("iv")?,
        notes: fields.string("notes")?,
        category: fields.string("category")?,
        created_at: fields.u64("created_at")?,
        modified_at: fields.u64("modified_at")?,
    };
    Ok(Some((record, fields.consumed)))
}
