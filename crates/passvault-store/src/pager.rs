//! Page-level I/O on the index file.
//!
//! A [`PageFile`] is opened for the duration of one index operation and
//! dropped afterwards; nothing keeps the file handle across calls. Node `n`
//! lives at byte offset `HEADER_SIZE + n * PAGE_SIZE`.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::page::{BTreeNode, PAGE_SIZE};
use crate::sequence::{HEADER_SIZE, TreeMetadata};

pub(crate) struct PageFile<'a> {
    file: File,
    path: &'a Path,
    sync: bool,
}

impl<'a> PageFile<'a> {
    /// Open an existing index file for read and write.
    pub(crate) fn open(path: &'a Path, sync: bool) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(StoreError::io(path))?;
        Ok(Self { file, path, sync })
    }

    /// Create (or truncate) an index file.
    pub(crate) fn create(path: &'a Path, sync: bool) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(StoreError::io(path))?;
        Ok(Self { file, path, sync })
    }

    /// Byte offset of node `node_id`, or `CorruptPage` if it cannot be
    /// addressed in a `u64`.
    pub(crate) fn offset_of(node_id: u64) -> StoreResult<u64> {
        node_id
            .checked_mul(PAGE_SIZE as u64)
            .and_then(|off| off.checked_add(HEADER_SIZE as u64))
            .ok_or_else(|| StoreError::page(node_id, "node offset overflows the file"))
    }

    /// Number of whole node pages an index file of `len` bytes can hold.
    pub(crate) fn pages_in(len: u64) -> u64 {
        len.saturating_sub(HEADER_SIZE as u64) / PAGE_SIZE as u64
    }

    pub(crate) fn read_header(&mut self) -> StoreResult<TreeMetadata> {
        let mut buf = [0u8; HEADER_SIZE];
        self.seek(0)?;
        match self.file.read_exact(&mut buf) {
            Ok(()) => TreeMetadata::decode(&buf),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(StoreError::CorruptHeader {
                reason: "index file is shorter than its header".into(),
            }),
            Err(e) => Err(StoreError::io(self.path)(e)),
        }
    }

    pub(crate) fn write_header(&mut self, meta: &TreeMetadata) -> StoreResult<()> {
        self.seek(0)?;
        self.file
            .write_all(&meta.encode())
            .map_err(StoreError::io(self.path))
    }

    /// Read and validate one node page.
    pub(crate) fn read_node(&mut self, node_id: u64, meta: &TreeMetadata) -> StoreResult<BTreeNode> {
        if node_id >= meta.next_node_id {
            return Err(StoreError::page(node_id, "node id was never allocated"));
        }
        let mut page = vec![0u8; PAGE_SIZE];
        self.seek(Self::offset_of(node_id)?)?;
        match self.file.read_exact(&mut page) {
            Ok(()) => BTreeNode::decode(node_id, &page, meta.next_node_id),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(StoreError::page(node_id, "page lies beyond end of file"))
            }
            Err(e) => Err(StoreError::io(self.path)(e)),
        }
    }

    /// Rewrite one node's page in full.
    pub(crate) fn write_node(&mut self, node: &BTreeNode) -> StoreResult<()> {
        let page = node.encode()?;
        self.seek(Self::offset_of(node.node_id)?)?;
        self.file.write_all(&page).map_err(StoreError::io(self.path))
    }

    /// Push buffered writes to disk when syncing is enabled.
    pub(crate) fn flush(&mut self) -> StoreResult<()> {
        self.file.flush().map_err(StoreError::io(self.path))?;
        if self.sync {
            self.file.sync_data().map_err(StoreError::io(self.path))?;
        }
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> StoreResult<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(StoreError::io(self.path))
    }
}
