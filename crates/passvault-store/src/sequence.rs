//! Index header: the root pointer and the two id sequences.
//!
//! # Binary Layout (24 bytes, start of the index file)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       8     root_id (u64 LE)
//! 8       8     next_node_id (u64 LE)
//! 16      8     next_record_id (u64 LE)
//! ```
//!
//! Both counters only move forward. The header is rewritten after every
//! structural mutation and every record id allocation, so the persisted
//! value always covers every id handed out.

use crate::error::{StoreError, StoreResult};

/// Size of the index header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Persisted header of a [`BTreeIndex`](crate::BTreeIndex).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMetadata {
    pub root_id: u64,
    pub next_node_id: u64,
    pub next_record_id: u64,
}

impl TreeMetadata {
    /// Header of a brand new index: an empty leaf root at node 0, record ids
    /// starting at 1.
    pub const fn fresh() -> Self {
        Self {
            root_id: 0,
            next_node_id: 1,
            next_record_id: 1,
        }
    }

    /// Hand out the next page slot.
    pub fn allocate_node(&mut self) -> u64 {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    /// Hand out the next record id.
    pub fn allocate_record(&mut self) -> u64 {
        let id = self.next_record_id;
        self.next_record_id += 1;
        id
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.root_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.next_node_id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.next_record_id.to_le_bytes());
        buf
    }

    /// Decode and sanity-check a header.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptHeader`] if the buffer is short, the root
    /// points past the allocated nodes, or the record counter is zero.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::CorruptHeader {
                reason: format!("header is {} bytes, expected {HEADER_SIZE}", bytes.len()),
            });
        }
        let word = |i: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            u64::from_le_bytes(b)
        };
        let meta = Self {
            root_id: word(0),
            next_node_id: word(1),
            next_record_id: word(2),
        };

        if meta.root_id >= meta.next_node_id {
            return Err(StoreError::CorruptHeader {
                reason: format!(
                    "root {} is not below next_node_id {}",
                    meta.root_id, meta.next_node_id
                ),
            });
        }
        if meta.next_record_id == 0 {
            return Err(StoreError::CorruptHeader {
                reason: "next_record_id is zero".into(),
            });
        }
        Ok(meta)
    }
}

/// Source of record ids for the [`RecordStore`](crate::RecordStore).
///
/// Implementations must persist the advanced counter before returning, so an
/// id is never issued twice across restarts.
pub trait IdAllocator {
    fn allocate_record_id(&mut self) -> StoreResult<u64>;
}
