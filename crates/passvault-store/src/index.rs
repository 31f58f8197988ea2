//! Disk-backed B-tree mapping site names to record ids.
//!
//! Insertion uses preemptive splitting: on the way down, any full child is
//! split before it is entered, so a leaf always has room when reached. When
//! the root itself is full a new root is allocated above it first.
//!
//! Keys may repeat (several users can store the same site). Equal keys are
//! inserted after the existing ones, and [`BTreeIndex::lookup_all`] visits
//! every subtree whose key range can hold the probe.
//!
//! Every touched node is rewritten whole, followed by the header.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::file::parent_dir;
use crate::options::StoreOptions;
use crate::page::{self, BTreeNode};
use crate::pager::PageFile;
use crate::sequence::{IdAllocator, TreeMetadata};

/// Fixed-fanout on-disk B-tree index.
#[derive(Debug)]
pub struct BTreeIndex {
    path: PathBuf,
    meta: TreeMetadata,
    options: StoreOptions,
}

impl BTreeIndex {
    /// Open the index at `path`, creating an empty one if the file does not
    /// exist (or is empty).
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// [`open`](Self::open) with explicit durability options.
    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let existing_len = match std::fs::metadata(&path) {
            Ok(md) => md.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(StoreError::io(&path)(e)),
        };

        let meta = if existing_len == 0 {
            Self::initialize(&path, options.sync_writes)?
        } else {
            let mut pf = PageFile::open(&path, options.sync_writes)?;
            let meta = pf.read_header()?;
            let pages = PageFile::pages_in(existing_len);
            if meta.next_node_id > pages {
                return Err(StoreError::CorruptHeader {
                    reason: format!(
                        "header claims {} nodes but the file holds {pages} pages",
                        meta.next_node_id
                    ),
                });
            }
            // Fail fast on a damaged root rather than on first use.
            pf.read_node(meta.root_id, &meta)?;
            meta
        };

        info!(
            path = %path.display(),
            root_id = meta.root_id,
            nodes = meta.next_node_id,
            next_record_id = meta.next_record_id,
            "opened index"
        );
        Ok(Self {
            path,
            meta,
            options,
        })
    }

    fn initialize(path: &Path, sync: bool) -> StoreResult<TreeMetadata> {
        let meta = TreeMetadata::fresh();
        let mut pf = PageFile::create(path, sync)?;
        pf.write_node(&BTreeNode::new_leaf(meta.root_id))?;
        pf.write_header(&meta)?;
        pf.flush()?;
        debug!(path = %path.display(), "initialized empty index");
        Ok(meta)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the persisted header.
    pub fn metadata(&self) -> TreeMetadata {
        self.meta
    }

    /// Number of node slots ever allocated.
    pub fn node_count(&self) -> u64 {
        self.meta.next_node_id
    }

    // -- insertion ----------------------------------------------------------

    /// Insert `key -> record_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OversizedKey`] before anything is written if the
    /// key exceeds the per-key page budget.
    pub fn insert_key(&mut self, key: &str, record_id: u64) -> StoreResult<()> {
        page::check_key(key)?;

        // Work on a copy so a failed write leaves the in-memory header at the
        // last committed state.
        let mut meta = self.meta;
        let mut pf = PageFile::open(&self.path, self.options.sync_writes)?;

        let mut root = pf.read_node(meta.root_id, &meta)?;
        if root.is_full() {
            let mut new_root = BTreeNode::new_internal(meta.allocate_node());
            new_root.children.push(root.node_id);
            let sibling = split_child(&mut new_root, 0, &mut root, meta.allocate_node())?;
            pf.write_node(&root)?;
            pf.write_node(&sibling)?;
            pf.write_node(&new_root)?;
            debug!(
                old_root = root.node_id,
                new_root = new_root.node_id,
                "index grew a level"
            );
            meta.root_id = new_root.node_id;
            root = new_root;
        }

        let mut node = root;
        let mut depth = 0u64;
        loop {
            if node.is_leaf {
                node.insert_sorted(key, record_id);
                pf.write_node(&node)?;
                break;
            }

            let mut idx = node.upper_bound(key);
            depth += 1;
            guard_depth(&meta, node.children[idx], depth)?;
            let mut child = pf.read_node(node.children[idx], &meta)?;
            if child.is_full() {
                let sibling = split_child(&mut node, idx, &mut child, meta.allocate_node())?;
                pf.write_node(&child)?;
                pf.write_node(&sibling)?;
                pf.write_node(&node)?;
                if key >= node.keys[idx].as_str() {
                    idx += 1;
                    child = sibling;
                }
                debug!(
                    parent = node.node_id,
                    slot = idx,
                    "split full child"
                );
            }
            node = child;
        }

        pf.write_header(&meta)?;
        pf.flush()?;
        self.meta = meta;
        Ok(())
    }

    // -- lookup -------------------------------------------------------------

    /// Record id of one entry with `key`, if any.
    pub fn lookup_key(&self, key: &str) -> StoreResult<Option<u64>> {
        let mut pf = PageFile::open(&self.path, false)?;
        let mut node = pf.read_node(self.meta.root_id, &self.meta)?;
        let mut depth = 0u64;
        loop {
            let pos = node.lower_bound(key);
            if pos < node.num_keys() && node.keys[pos] == key {
                return Ok(Some(node.record_ids[pos]));
            }
            if node.is_leaf {
                return Ok(None);
            }
            depth += 1;
            self.guard_depth(node.children[pos], depth)?;
            node = pf.read_node(node.children[pos], &self.meta)?;
        }
    }

    /// Record ids of every entry with `key`, in key order.
    pub fn lookup_all(&self, key: &str) -> StoreResult<Vec<u64>> {
        let mut pf = PageFile::open(&self.path, false)?;
        let mut out = Vec::new();
        self.collect_matches(&mut pf, self.meta.root_id, key, &mut out, 0)?;
        Ok(out)
    }

    fn collect_matches(
        &self,
        pf: &mut PageFile<'_>,
        node_id: u64,
        key: &str,
        out: &mut Vec<u64>,
        depth: u64,
    ) -> StoreResult<()> {
        self.guard_depth(node_id, depth)?;
        let node = pf.read_node(node_id, &self.meta)?;
        let n = node.num_keys();
        // Child i holds keys in [keys[i-1], keys[i]].
        let child_may_match = |i: usize| {
            (i == 0 || node.keys[i - 1].as_str() <= key) && (i == n || key <= node.keys[i].as_str())
        };

        for i in 0..n {
            if !node.is_leaf && child_may_match(i) {
                self.collect_matches(pf, node.children[i], key, out, depth + 1)?;
            }
            if node.keys[i] == key {
                out.push(node.record_ids[i]);
            }
        }
        if !node.is_leaf && child_may_match(n) {
            self.collect_matches(pf, node.children[n], key, out, depth + 1)?;
        }
        Ok(())
    }

    /// Every `(key, record_id)` in key order.
    pub fn entries(&self) -> StoreResult<Vec<(String, u64)>> {
        let mut pf = PageFile::open(&self.path, false)?;
        let mut out = Vec::new();
        self.collect_all(&mut pf, self.meta.root_id, &mut out, 0)?;
        Ok(out)
    }

    fn collect_all(
        &self,
        pf: &mut PageFile<'_>,
        node_id: u64,
        out: &mut Vec<(String, u64)>,
        depth: u64,
    ) -> StoreResult<()> {
        self.guard_depth(node_id, depth)?;
        let node = pf.read_node(node_id, &self.meta)?;
        for i in 0..node.num_keys() {
            if !node.is_leaf {
                self.collect_all(pf, node.children[i], out, depth + 1)?;
            }
            out.push((node.keys[i].clone(), node.record_ids[i]));
        }
        if let Some(&last) = node.children.last() {
            self.collect_all(pf, last, out, depth + 1)?;
        }
        Ok(())
    }

    /// A cycle in child pointers would recurse forever; no valid tree is
    /// deeper than the number of allocated nodes.
    fn guard_depth(&self, node_id: u64, depth: u64) -> StoreResult<()> {
        guard_depth(&self.meta, node_id, depth)
    }

    /// Number of entries in the tree.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        let mut pf = PageFile::open(&self.path, false)?;
        Ok(pf.read_node(self.meta.root_id, &self.meta)?.num_keys() == 0)
    }

    /// Levels from root to leaf (1 for a lone root leaf).
    pub fn height(&self) -> StoreResult<usize> {
        let mut pf = PageFile::open(&self.path, false)?;
        let mut node = pf.read_node(self.meta.root_id, &self.meta)?;
        let mut height = 1;
        while let Some(&first) = node.children.first() {
            self.guard_depth(first, height as u64)?;
            node = pf.read_node(first, &self.meta)?;
            height += 1;
        }
        Ok(height)
    }

    // -- counters -----------------------------------------------------------

    /// Raise `next_record_id` above `max_seen` if it is not already.
    ///
    /// Returns `true` when the header had to be advanced.
    pub fn ensure_record_id_floor(&mut self, max_seen: u64) -> StoreResult<bool> {
        if self.meta.next_record_id > max_seen {
            return Ok(false);
        }
        let mut meta = self.meta;
        meta.next_record_id = max_seen + 1;
        self.persist_header(meta)?;
        warn!(
            max_seen,
            next_record_id = meta.next_record_id,
            "index record counter was behind the record file; advanced"
        );
        Ok(true)
    }

    fn persist_header(&mut self, meta: TreeMetadata) -> StoreResult<()> {
        let mut pf = PageFile::open(&self.path, self.options.sync_writes)?;
        pf.write_header(&meta)?;
        pf.flush()?;
        self.meta = meta;
        Ok(())
    }

    // -- rebuild ------------------------------------------------------------

    /// Replace the index at `path` with a fresh tree holding exactly
    /// `entries`, carrying `next_record_id` forward.
    ///
    /// The new tree is built in a sibling temp file and renamed into place.
    pub fn rebuild<I>(
        path: impl AsRef<Path>,
        entries: I,
        next_record_id: u64,
        options: StoreOptions,
    ) -> StoreResult<Self>
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let path = path.as_ref();
        let dir = parent_dir(path);
        let tmp = NamedTempFile::new_in(dir).map_err(StoreError::io(dir))?;
        let tmp_path = tmp.path().to_path_buf();

        let unsynced = StoreOptions::default().with_sync_writes(false);
        let mut staging = Self {
            path: tmp_path.clone(),
            meta: Self::initialize(&tmp_path, false)?,
            options: unsynced,
        };
        let mut count = 0usize;
        for (key, record_id) in entries {
            staging.insert_key(&key, record_id)?;
            count += 1;
        }
        let mut meta = staging.meta;
        meta.next_record_id = meta.next_record_id.max(next_record_id);
        staging.persist_header(meta)?;

        if options.sync_writes {
            tmp.as_file().sync_all().map_err(StoreError::io(&tmp_path))?;
        }
        tmp.persist(path)
            .map_err(|e| StoreError::io(path)(e.error))?;

        info!(path = %path.display(), entries = count, "rebuilt index");
        Self::open_with(path, options)
    }
}

impl IdAllocator for BTreeIndex {
    fn allocate_record_id(&mut self) -> StoreResult<u64> {
        let mut meta = self.meta;
        let id = meta.allocate_record();
        self.persist_header(meta)?;
        Ok(id)
    }
}

fn guard_depth(meta: &TreeMetadata, node_id: u64, depth: u64) -> StoreResult<()> {
    if depth >= meta.next_node_id {
        return Err(StoreError::page(node_id, "child pointers form a cycle"));
    }
    Ok(())
}

/// Split the full `child` sitting at `parent.children[idx]`.
///
/// The median key moves up into `parent` at `idx`; keys above it move to a
/// new node `new_id`, which is returned. The lower half stays in `child`.
fn split_child(
    parent: &mut BTreeNode,
    idx: usize,
    child: &mut BTreeNode,
    new_id: u64,
) -> StoreResult<BTreeNode> {
    let mid = child.num_keys() / 2;
    let mut right = if child.is_leaf {
        BTreeNode::new_leaf(new_id)
    } else {
        BTreeNode::new_internal(new_id)
    };

    right.keys = child.keys.split_off(mid + 1);
    right.record_ids = child.record_ids.split_off(mid + 1);
    if !child.is_leaf {
        right.children = child.children.split_off(mid + 1);
    }

    let (Some(median_key), Some(median_rid)) = (child.keys.pop(), child.record_ids.pop()) else {
        return Err(StoreError::page(child.node_id, "split of an empty node"));
    };

    parent.keys.insert(idx, median_key);
    parent.record_ids.insert(idx, median_rid);
    parent.children.insert(idx + 1, new_id);
    Ok(right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{MAX_KEY_LEN, MAX_KEYS, ORDER, PAGE_SIZE};
    use crate::sequence::HEADER_SIZE;

    fn fast() -> StoreOptions {
        StoreOptions::default().with_sync_writes(false)
    }

    fn key(i: usize) -> String {
        format!("site-{i:05}.example")
    }

    #[test]
    fn open_creates_header_and_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.dat");

        let index = BTreeIndex::open(&path).unwrap();
        assert_eq!(index.metadata(), TreeMetadata::fresh());
        assert!(index.is_empty().unwrap());
        assert_eq!(index.height().unwrap(), 1);

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, (HEADER_SIZE + PAGE_SIZE) as u64);
    }

    #[test]
    fn open_fails_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = BTreeIndex::open(dir.path());
        assert!(matches!(result, Err(StoreError::StorageFailure { .. })));
    }

    #[test]
    fn split_child_moves_median_up() {
        let mut child = BTreeNode::new_leaf(1);
        for i in 0..MAX_KEYS {
            child.insert_sorted(&key(i), i as u64);
        }
        let mut parent = BTreeNode::new_internal(2);
        parent.children.push(1);

        let right = split_child(&mut parent, 0, &mut child, 3).unwrap();

        assert_eq!(child.num_keys(), MAX_KEYS / 2);
        assert_eq!(right.num_keys(), MAX_KEYS - MAX_KEYS / 2 - 1);
        assert_eq!(parent.keys, vec![key(MAX_KEYS / 2)]);
        assert_eq!(parent.record_ids, vec![(MAX_KEYS / 2) as u64]);
        assert_eq!(parent.children, vec![1, 3]);
        assert!(child.keys.iter().all(|k| k < &parent.keys[0]));
        assert!(right.keys.iter().all(|k| k > &parent.keys[0]));
    }

    #[test]
    fn root_split_grows_tree() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = BTreeIndex::open_with(dir.path().join("i.dat"), fast()).unwrap();

        for i in 0..MAX_KEYS {
            index.insert_key(&key(i), i as u64 + 1).unwrap();
        }
        assert_eq!(index.height().unwrap(), 1);

        index.insert_key(&key(MAX_KEYS), 999).unwrap();
        assert_eq!(index.height().unwrap(), 2);
        assert_ne!(index.metadata().root_id, 0);
        assert_eq!(index.node_count(), 3);
        assert_eq!(index.len().unwrap(), ORDER);
    }

    #[test]
    fn lookup_finds_keys_across_levels() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = BTreeIndex::open_with(dir.path().join("i.dat"), fast()).unwrap();
        for i in 0..500 {
            index.insert_key(&key(i), i as u64 + 1).unwrap();
        }
        assert!(index.height().unwrap() >= 2);
        for i in (0..500).step_by(37) {
            assert_eq!(index.lookup_key(&key(i)).unwrap(), Some(i as u64 + 1));
        }
        assert_eq!(index.lookup_key("absent.example").unwrap(), None);
    }

    #[test]
    fn duplicate_keys_are_all_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = BTreeIndex::open_with(dir.path().join("i.dat"), fast()).unwrap();
        // Enough copies to force the duplicates across several splits.
        for rid in 1..=150u64 {
            index.insert_key("github.com", rid).unwrap();
            index.insert_key(&key(rid as usize), 1000 + rid).unwrap();
        }
        let mut hits = index.lookup_all("github.com").unwrap();
        hits.sort_unstable();
        assert_eq!(hits, (1..=150).collect::<Vec<_>>());
    }

    #[test]
    fn oversized_key_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.dat");
        let mut index = BTreeIndex::open_with(&path, fast()).unwrap();
        index.insert_key("ok.com", 1).unwrap();
        let before = std::fs::read(&path).unwrap();

        let err = index
            .insert_key(&"a".repeat(MAX_KEY_LEN + 1), 2)
            .unwrap_err();
        assert!(matches!(err, StoreError::OversizedKey { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn record_ids_persist_and_never_regress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.dat");
        {
            let mut index = BTreeIndex::open_with(&path, fast()).unwrap();
            assert_eq!(index.allocate_record_id().unwrap(), 1);
            assert_eq!(index.allocate_record_id().unwrap(), 2);
        }
        let mut index = BTreeIndex::open_with(&path, fast()).unwrap();
        assert_eq!(index.allocate_record_id().unwrap(), 3);

        assert!(!index.ensure_record_id_floor(2).unwrap());
        assert!(index.ensure_record_id_floor(10).unwrap());
        assert_eq!(index.allocate_record_id().unwrap(), 11);
    }

    #[test]
    fn corrupt_root_detected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.dat");
        BTreeIndex::open_with(&path, fast()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[HEADER_SIZE] = 7; // is_leaf flag of node 0
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            BTreeIndex::open(&path),
            Err(StoreError::CorruptPage { node_id: 0, .. })
        ));
    }

    #[test]
    fn truncated_header_detected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.dat");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(matches!(
            BTreeIndex::open(&path),
            Err(StoreError::CorruptHeader { .. })
        ));
    }

    /// Two internal nodes whose children point at each other.
    fn write_cycle(path: &Path, next_node_id: u64) {
        let header = TreeMetadata {
            root_id: 0,
            next_node_id,
            next_record_id: 10,
        };
        let mut bytes = header.encode().to_vec();
        for (id, target) in [(0u64, 1u64), (1, 0)] {
            let mut node = BTreeNode::new_internal(id);
            node.keys.push("m".into());
            node.record_ids.push(id + 1);
            node.children = vec![target, target];
            bytes.extend(node.encode().unwrap());
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn child_cycle_surfaces_as_corrupt_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.dat");
        write_cycle(&path, 2);
        let before = std::fs::read(&path).unwrap();

        let mut index = BTreeIndex::open_with(&path, fast()).unwrap();
        assert!(matches!(
            index.insert_key("z", 9),
            Err(StoreError::CorruptPage { .. })
        ));
        assert!(matches!(
            index.lookup_key("z"),
            Err(StoreError::CorruptPage { .. })
        ));
        assert!(matches!(
            index.lookup_all("m"),
            Err(StoreError::CorruptPage { .. })
        ));
        assert!(matches!(index.entries(), Err(StoreError::CorruptPage { .. })));
        assert!(matches!(index.height(), Err(StoreError::CorruptPage { .. })));

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(index.metadata().next_node_id, 2);
    }

    #[test]
    fn node_count_beyond_file_detected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.dat");
        write_cycle(&path, 50_000_000);
        assert!(matches!(
            BTreeIndex::open(&path),
            Err(StoreError::CorruptHeader { .. })
        ));
    }

    #[test]
    fn huge_root_detected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.dat");
        BTreeIndex::open_with(&path, fast()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let header = TreeMetadata {
            root_id: u64::MAX / 2,
            next_node_id: u64::MAX,
            next_record_id: 1,
        };
        bytes[..HEADER_SIZE].copy_from_slice(&header.encode());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            BTreeIndex::open(&path),
            Err(StoreError::CorruptHeader { .. })
        ));
    }

    #[test]
    fn rebuild_keeps_only_given_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("i.dat");
        let mut index = BTreeIndex::open_with(&path, fast()).unwrap();
        for i in 0..100 {
            index.insert_key(&key(i), i as u64 + 1).unwrap();
        }
        let keep: Vec<(String, u64)> = (0..100).step_by(2).map(|i| (key(i), i as u64 + 1)).collect();
        let rebuilt = BTreeIndex::rebuild(&path, keep.clone(), 500, fast()).unwrap();

        assert_eq!(rebuilt.entries().unwrap(), keep);
        assert_eq!(rebuilt.metadata().next_record_id, 500);
        assert_eq!(rebuilt.lookup_key(&key(1)).unwrap(), None);
    }
}
