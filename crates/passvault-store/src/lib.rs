//! On-disk storage engine for PassVault.
//!
//! Two files make up a vault:
//!
//! - the **index** (e.g. `vault.dat`): a 24-byte header followed by
//!   fixed-size B-tree pages mapping site names to record ids;
//! - the **record file** (`vault.dat.records`): length-prefixed
//!   [`VaultRecord`]s, appended in insertion order.
//!
//! The index also owns the record id sequence, so the record store draws ids
//! from it through [`IdAllocator`].
//!
//! # Modules
//!
//! - [`index`]: [`BTreeIndex`], insert/lookup/rebuild.
//! - [`records`]: [`RecordStore`], append/scan/rewrite.
//! - [`record`]: the record type and its encoding.
//! - [`page`]: node layout and capacity constants.
//! - [`sequence`]: index header and [`IdAllocator`].
//! - [`error`]: [`StoreError`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use passvault_store::{BTreeIndex, RecordStore, StoreOptions, VaultRecord};
//!
//! # fn example() -> passvault_store::StoreResult<()> {
//! let options = StoreOptions::default();
//! let mut index = BTreeIndex::open_with("data/vault.dat", options)?;
//! let records = RecordStore::for_index(index.path(), options);
//!
//! let record = VaultRecord {
//!     record_id: 0,
//!     user_id: 1,
//!     site_name: "github.com".into(),
//!     username: "alice".into(),
//!     encrypted_password: "…".into(),
//!     iv: "…".into(),
//!     notes: String::new(),
//!     category: String::new(),
//!     created_at: 0,
//!     modified_at: 0,
//! };
//! let id = records.append(&mut index, record)?;
//! index.insert_key("github.com", id)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod index;
pub mod options;
pub mod page;
pub mod record;
pub mod records;
pub mod sequence;

mod file;
mod pager;

pub use error::{StoreError, StoreResult};
pub use index::BTreeIndex;
pub use options::StoreOptions;
pub use page::{MAX_KEY_LEN, ORDER, PAGE_SIZE, check_key};
pub use record::{MAX_FIELD_LEN, VaultRecord};
pub use records::{RecordScan, RecordStore, records_path};
pub use sequence::{HEADER_SIZE, IdAllocator, TreeMetadata};
