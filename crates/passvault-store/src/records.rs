//! Append-only record file that sits next to the index.
//!
//! The file lives at `<index path>.records`. New records are appended;
//! updates and deletes rewrite the whole file through a temp file and an
//! atomic rename.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::file::replace_atomically;
use crate::options::StoreOptions;
use crate::record::{VaultRecord, decode_next};
use crate::sequence::IdAllocator;

/// Path of the record file belonging to the index at `index_path`.
pub fn records_path(index_path: impl AsRef<Path>) -> PathBuf {
    let mut name: OsString = index_path.as_ref().as_os_str().to_owned();
    name.push(".records");
    PathBuf::from(name)
}

/// Handle on the record file. Opens the file per operation.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    options: StoreOptions,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// Store for the index at `index_path`.
    pub fn for_index(index_path: impl AsRef<Path>, options: StoreOptions) -> Self {
        Self::new(records_path(index_path), options)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` under a freshly allocated id and return that id.
    ///
    /// Whatever `record.record_id` held is overwritten. The id is taken from
    /// `ids` before the record is written, so a failed append burns an id but
    /// never reuses one.
    pub fn append<A>(&self, ids: &mut A, mut record: VaultRecord) -> StoreResult<u64>
    where
        A: IdAllocator + ?Sized,
    {
        record.record_id = ids.allocate_record_id()?;
        let bytes = record.encode()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(StoreError::io(&self.path))?;
        file.write_all(&bytes).map_err(StoreError::io(&self.path))?;
        if self.options.sync_writes {
            file.sync_data().map_err(StoreError::io(&self.path))?;
        }

        debug!(
            record_id = record.record_id,
            user_id = record.user_id,
            bytes = bytes.len(),
            "appended record"
        );
        Ok(record.record_id)
    }

    /// Stream records in file order. A missing file reads as empty.
    pub fn scan(&self) -> StoreResult<RecordScan> {
        let reader = match File::open(&self.path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(StoreError::io(&self.path)(e)),
        };
        Ok(RecordScan {
            reader,
            path: self.path.clone(),
            offset: 0,
        })
    }

    /// Every record in file order.
    pub fn load_all(&self) -> StoreResult<Vec<VaultRecord>> {
        self.scan()?.collect()
    }

    /// The record with `record_id`, if present.
    pub fn find(&self, record_id: u64) -> StoreResult<Option<VaultRecord>> {
        for record in self.scan()? {
            let record = record?;
            if record.record_id == record_id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Largest record id present, 0 when the file is empty.
    pub fn max_record_id(&self) -> StoreResult<u64> {
        let mut max = 0u64;
        for record in self.scan()? {
            max = max.max(record?.record_id);
        }
        Ok(max)
    }

    pub fn len(&self) -> StoreResult<usize> {
        let mut count = 0;
        for record in self.scan()? {
            record?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Replace the file's contents with exactly `records`, in order.
    ///
    /// Readers observe either the previous file or the new one, never a mix.
    pub fn replace_all(&self, records: &[VaultRecord]) -> StoreResult<()> {
        let mut encoded = Vec::with_capacity(records.iter().map(VaultRecord::encoded_len).sum());
        for record in records {
            record.encode_into(&mut encoded)?;
        }

        replace_atomically(&self.path, self.options.sync_writes, |out| {
            out.write_all(&encoded)
        })?;
        info!(
            path = %self.path.display(),
            records = records.len(),
            bytes = encoded.len(),
            "rewrote record file"
        );
        Ok(())
    }
}

/// Iterator over the records of a [`RecordStore`].
///
/// Yields `Err` once on the first corrupt or unreadable record and then
/// stops.
#[derive(Debug)]
pub struct RecordScan {
    reader: Option<BufReader<File>>,
    path: PathBuf,
    offset: u64,
}

impl Iterator for RecordScan {
    type Item = StoreResult<VaultRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        match decode_next(reader, &self.path, self.offset) {
            Ok(Some((record, len))) => {
                self.offset += len;
                Some(Ok(record))
            }
            Ok(None) => {
                self.reader = None;
                None
            }
            Err(e) => {
                self.reader = None;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out ids from a plain counter.
    struct Counter(u64);

    impl IdAllocator for Counter {
        fn allocate_record_id(&mut self) -> StoreResult<u64> {
            self.0 += 1;
            Ok(self.0)
        }
    }

    fn record(user_id: u64, site: &str) -> VaultRecord {
        VaultRecord {
            record_id: 0,
            user_id,
            site_name: site.into(),
            username: "user".into(),
            encrypted_password: "ab".repeat(16),
            iv: "cd".repeat(16),
            notes: String::new(),
            category: String::new(),
            created_at: 10,
            modified_at: 10,
        }
    }

    fn store(dir: &Path) -> RecordStore {
        RecordStore::for_index(dir.join("vault.dat"), StoreOptions::new().with_sync_writes(false))
    }

    #[test]
    fn records_path_appends_suffix() {
        assert_eq!(
            records_path("/var/lib/vault.dat"),
            PathBuf::from("/var/lib/vault.dat.records")
        );
        assert_eq!(records_path("plain"), PathBuf::from("plain.records"));
    }

    #[test]
    fn missing_file_scans_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.load_all().unwrap().is_empty());
        assert_eq!(store.max_record_id().unwrap(), 0);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn append_assigns_ids_and_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut ids = Counter(0);

        let mut first = record(1, "a.com");
        first.record_id = 99;
        assert_eq!(store.append(&mut ids, first).unwrap(), 1);
        assert_eq!(store.append(&mut ids, record(2, "b.com")).unwrap(), 2);

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].record_id, 1);
        assert_eq!(all[0].site_name, "a.com");
        assert_eq!(all[1].user_id, 2);
        assert_eq!(store.find(2).unwrap().unwrap().site_name, "b.com");
        assert!(store.find(3).unwrap().is_none());
    }

    #[test]
    fn replace_all_swaps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut ids = Counter(0);
        for site in ["a.com", "b.com", "c.com"] {
            store.append(&mut ids, record(1, site)).unwrap();
        }

        let mut kept = store.load_all().unwrap();
        kept.remove(1);
        store.replace_all(&kept).unwrap();

        assert_eq!(store.load_all().unwrap(), kept);
        assert_eq!(store.max_record_id().unwrap(), 3);
    }

    #[test]
    fn truncated_tail_reports_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut ids = Counter(0);
        store.append(&mut ids, record(1, "a.com")).unwrap();
        let first_len = std::fs::metadata(store.path()).unwrap().len();
        store.append(&mut ids, record(1, "b.com")).unwrap();

        let bytes = std::fs::read(store.path()).unwrap();
        std::fs::write(store.path(), &bytes[..bytes.len() - 3]).unwrap();

        let mut scan = store.scan().unwrap();
        assert_eq!(scan.next().unwrap().unwrap().site_name, "a.com");
        match scan.next() {
            Some(Err(StoreError::CorruptStore { offset, .. })) => assert_eq!(offset, first_len),
            other => panic!("expected CorruptStore, got {other:?}"),
        }
        assert!(scan.next().is_none());
        assert!(store.load_all().is_err());
    }
}
