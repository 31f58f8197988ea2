//! B-tree node and its fixed-size page encoding.
//!
//! Every node occupies exactly one [`PAGE_SIZE`] slot. Capacity is governed
//! by the single [`ORDER`] constant: a node holds at most `ORDER - 1` keys and
//! an internal node at most `ORDER` children.
//!
//! # Page Layout
//!
//! ```text
//! Size               Field
//! ----               -----
//! 1                  is_leaf (0 or 1)
//! 4                  num_keys (u32 LE)
//! (ORDER-1)*(2+k)    key slots: u16 LE length + UTF-8 bytes, unused slots are empty
//! ORDER*8            children (u64 LE node ids; zero on leaves and unused slots)
//! (ORDER-1)*8        record ids (u64 LE, parallel to keys)
//! ...                zero padding up to PAGE_SIZE
//! ```
//!
//! Record ids are stored on internal nodes as well, so a key promoted during a
//! split keeps pointing at its record.

use crate::error::{StoreError, StoreResult};

/// Branching factor.
pub const ORDER: usize = 41;

/// Maximum keys per node.
pub const MAX_KEYS: usize = ORDER - 1;

/// Per-key byte budget inside a page.
pub const MAX_KEY_LEN: usize = 80;

/// Size of one node slot on disk.
pub const PAGE_SIZE: usize = 4096;

const KEY_PREFIX_LEN: usize = 2;
const NODE_HEADER_LEN: usize = 1 + 4;
const MAX_ENCODED_LEN: usize =
    NODE_HEADER_LEN + MAX_KEYS * (KEY_PREFIX_LEN + MAX_KEY_LEN) + ORDER * 8 + MAX_KEYS * 8;

const _: () = assert!(MAX_ENCODED_LEN <= PAGE_SIZE);
const _: () = assert!(MAX_KEY_LEN <= u16::MAX as usize);

/// Reject keys that do not fit the per-key page budget.
pub fn check_key(key: &str) -> StoreResult<()> {
    if key.len() > MAX_KEY_LEN {
        return Err(StoreError::OversizedKey {
            len: key.len(),
            max: MAX_KEY_LEN,
        });
    }
    Ok(())
}

/// One B-tree node.
///
/// `keys` is sorted ascending (duplicates allowed) and `record_ids` runs
/// parallel to it. An internal node with `n` keys has exactly `n + 1`
/// children; a leaf has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreeNode {
    pub node_id: u64,
    pub is_leaf: bool,
    pub keys: Vec<String>,
    pub record_ids: Vec<u64>,
    pub children: Vec<u64>,
}

impl BTreeNode {
    pub fn new_leaf(node_id: u64) -> Self {
        Self {
            node_id,
            is_leaf: true,
            keys: Vec::with_capacity(MAX_KEYS),
            record_ids: Vec::with_capacity(MAX_KEYS),
            children: Vec::new(),
        }
    }

    pub fn new_internal(node_id: u64) -> Self {
        Self {
            node_id,
            is_leaf: false,
            keys: Vec::with_capacity(MAX_KEYS),
            record_ids: Vec::with_capacity(MAX_KEYS),
            children: Vec::with_capacity(ORDER),
        }
    }

    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    pub fn is_full(&self) -> bool {
        self.keys.len() >= MAX_KEYS
    }

    /// Number of keys `<= key`: the insertion point that keeps equal keys in
    /// arrival order, and the child to descend into.
    pub fn upper_bound(&self, key: &str) -> usize {
        self.keys.partition_point(|k| k.as_str() <= key)
    }

    /// Number of keys `< key`.
    pub fn lower_bound(&self, key: &str) -> usize {
        self.keys.partition_point(|k| k.as_str() < key)
    }

    /// Insert into a leaf, keeping keys sorted.
    pub(crate) fn insert_sorted(&mut self, key: &str, record_id: u64) {
        let pos = self.upper_bound(key);
        self.keys.insert(pos, key.to_owned());
        self.record_ids.insert(pos, record_id);
    }

    // -- encoding -----------------------------------------------------------

    /// Encode into a full page.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OversizedKey`] if any key exceeds the budget and
    /// [`StoreError::InvalidArgument`] if the node is over capacity or its
    /// arrays disagree.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let n = self.keys.len();
        if n > MAX_KEYS || self.record_ids.len() != n {
            return Err(StoreError::InvalidArgument(format!(
                "node {} has {n} keys and {} record ids (max {MAX_KEYS})",
                self.node_id,
                self.record_ids.len()
            )));
        }
        let expected_children = if self.is_leaf { 0 } else { n + 1 };
        if self.children.len() != expected_children {
            return Err(StoreError::InvalidArgument(format!(
                "node {} has {n} keys but {} children",
                self.node_id,
                self.children.len()
            )));
        }

        let mut page = Vec::with_capacity(PAGE_SIZE);
        page.push(u8::from(self.is_leaf));
        page.extend_from_slice(&(n as u32).to_le_bytes());

        for slot in 0..MAX_KEYS {
            let key = self.keys.get(slot).map_or("", String::as_str);
            check_key(key)?;
            page.extend_from_slice(&(key.len() as u16).to_le_bytes());
            page.extend_from_slice(key.as_bytes());
        }
        for slot in 0..ORDER {
            let child = self.children.get(slot).copied().unwrap_or(0);
            page.extend_from_slice(&child.to_le_bytes());
        }
        for slot in 0..MAX_KEYS {
            let rid = self.record_ids.get(slot).copied().unwrap_or(0);
            page.extend_from_slice(&rid.to_le_bytes());
        }

        page.resize(PAGE_SIZE, 0);
        Ok(page)
    }

    /// Decode the page of `node_id`, verifying structural invariants.
    ///
    /// `next_node_id` bounds valid child references.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CorruptPage`] if any invariant is violated.
    pub fn decode(node_id: u64, page: &[u8], next_node_id: u64) -> StoreResult<Self> {
        let mut cur = PageCursor {
            node_id,
            page,
            pos: 0,
        };

        let is_leaf = match cur.bytes(1)?[0] {
            0 => false,
            1 => true,
            other => return Err(StoreError::page(node_id, format!("is_leaf byte is {other}"))),
        };
        let n = cur.u32()? as usize;
        if n > MAX_KEYS {
            return Err(StoreError::page(
                node_id,
                format!("num_keys {n} exceeds {MAX_KEYS}"),
            ));
        }
        if !is_leaf && n == 0 {
            return Err(StoreError::page(node_id, "internal node has no keys"));
        }

        let mut keys = Vec::with_capacity(MAX_KEYS);
        for slot in 0..MAX_KEYS {
            let len = cur.u16()? as usize;
            if len > MAX_KEY_LEN {
                return Err(StoreError::page(
                    node_id,
                    format!("key slot {slot} claims {len} bytes"),
                ));
            }
            let raw = cur.bytes(len)?;
            if slot < n {
                let key = std::str::from_utf8(raw).map_err(|_| {
                    StoreError::page(node_id, format!("key slot {slot} is not UTF-8"))
                })?;
                keys.push(key.to_owned());
            }
        }
        if keys.windows(2).any(|w| w[0] > w[1]) {
            return Err(StoreError::page(node_id, "keys are not sorted"));
        }

        let mut children = Vec::with_capacity(ORDER);
        for slot in 0..ORDER {
            let child = cur.u64()?;
            if is_leaf {
                if child != 0 {
                    return Err(StoreError::page(
                        node_id,
                        format!("leaf has child {child} in slot {slot}"),
                    ));
                }
            } else if slot <= n {
                if child >= next_node_id || child == node_id {
                    return Err(StoreError::page(
                        node_id,
                        format!("child slot {slot} points at invalid node {child}"),
                    ));
                }
                children.push(child);
            }
        }

        let mut record_ids = Vec::with_capacity(MAX_KEYS);
        for slot in 0..MAX_KEYS {
            let rid = cur.u64()?;
            if slot < n {
                record_ids.push(rid);
            }
        }

        Ok(Self {
            node_id,
            is_leaf,
            keys,
            record_ids,
            children,
        })
    }
}

/// Bounds-checked reader over one page buffer.
struct PageCursor<'a> {
    node_id: u64,
    page: &'a [u8],
    pos: usize,
}

impl<'a> PageCursor<'a> {
    fn bytes(&mut self, len: usize) -> StoreResult<&'a [u8]> {
        let end = self.pos + len;
        let out = self
            .page
            .get(self.pos..end)
            .ok_or_else(|| StoreError::page(self.node_id, "page is truncated"))?;
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> StoreResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> StoreResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> StoreResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_leaf() -> BTreeNode {
        let mut node = BTreeNode::new_leaf(3);
        for i in 0..MAX_KEYS {
            node.insert_sorted(&format!("{:0>80}", i), i as u64 + 100);
        }
        node
    }

    #[test]
    fn full_node_with_max_keys_fits_a_page() {
        let node = full_leaf();
        let page = node.encode().unwrap();
        assert_eq!(page.len(), PAGE_SIZE);
        assert_eq!(BTreeNode::decode(3, &page, 10).unwrap(), node);
    }

    #[test]
    fn internal_node_decodes_with_children() {
        let mut node = BTreeNode::new_internal(7);
        node.keys = vec!["m".into(), "t".into()];
        node.record_ids = vec![11, 12];
        node.children = vec![0, 4, 5];

        let page = node.encode().unwrap();
        assert_eq!(BTreeNode::decode(7, &page, 8).unwrap(), node);
    }

    #[test]
    fn insert_sorted_keeps_duplicates_in_arrival_order() {
        let mut node = BTreeNode::new_leaf(0);
        node.insert_sorted("b", 1);
        node.insert_sorted("a", 2);
        node.insert_sorted("b", 3);
        node.insert_sorted("c", 4);
        assert_eq!(node.keys, vec!["a", "b", "b", "c"]);
        assert_eq!(node.record_ids, vec![2, 1, 3, 4]);
    }

    #[test]
    fn oversized_key_rejected() {
        assert!(check_key(&"x".repeat(MAX_KEY_LEN)).is_ok());
        assert!(matches!(
            check_key(&"x".repeat(MAX_KEY_LEN + 1)),
            Err(StoreError::OversizedKey { len: 81, max: 80 })
        ));

        let mut node = BTreeNode::new_leaf(0);
        node.keys.push("y".repeat(MAX_KEY_LEN + 1));
        node.record_ids.push(1);
        assert!(matches!(node.encode(), Err(StoreError::OversizedKey { .. })));
    }

    #[test]
    fn unsorted_keys_are_corrupt() {
        let mut node = BTreeNode::new_leaf(1);
        node.keys = vec!["b".into(), "a".into()];
        node.record_ids = vec![1, 2];
        let page = node.encode().unwrap();
        assert!(matches!(
            BTreeNode::decode(1, &page, 2),
            Err(StoreError::CorruptPage { node_id: 1, .. })
        ));
    }

    #[test]
    fn bad_flag_and_count_are_corrupt() {
        let mut page = BTreeNode::new_leaf(0).encode().unwrap();
        page[0] = 9;
        assert!(BTreeNode::decode(0, &page, 1).is_err());

        let mut page = BTreeNode::new_leaf(0).encode().unwrap();
        page[1..5].copy_from_slice(&(MAX_KEYS as u32 + 1).to_le_bytes());
        assert!(BTreeNode::decode(0, &page, 1).is_err());
    }

    #[test]
    fn dangling_child_is_corrupt() {
        let mut node = BTreeNode::new_internal(2);
        node.keys = vec!["k".into()];
        node.record_ids = vec![1];
        node.children = vec![0, 9];
        let page = node.encode().unwrap();
        assert!(BTreeNode::decode(2, &page, 3).is_err());
        assert!(BTreeNode::decode(2, &page, 10).is_ok());
    }

    #[test]
    fn mismatched_children_refused_on_encode() {
        let mut node = BTreeNode::new_internal(2);
        node.keys = vec!["k".into()];
        node.record_ids = vec![1];
        node.children = vec![0];
        assert!(matches!(node.encode(), Err(StoreError::InvalidArgument(_))));
    }
}
