//! # vdir-store — Indexed Record Store
//!
//! Durable storage for the directory's two record kinds, VASPs and
//! certificate requests, over a pluggable ordered key/value backend.
//!
//! ## Persisted Layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `vasp:<id:be64>` | JSON [`vdir_core::Vasp`] |
//! | `certreq:<id:be64>` | JSON [`vdir_core::CertificateRequest`] |
//! | `sequence` | last issued id, big-endian `u64` |
//! | `index:names:<normalized name>` | owning VASP id |
//! | `index:common_names:<normalized common name>` | owning VASP id |
//! | `index:countries:<ISO code>` | JSON array of VASP ids |
//!
//! Everything lives in one backend instance so reindexing works from a
//! single consistent snapshot.
//!
//! ## Concurrency
//!
//! [`RecordStore`] keeps the indices and sequence in memory behind a
//! `parking_lot::RwLock`. Mutations hold the write lock across the backend
//! batch and the in-memory apply; searches hold the read lock while they
//! resolve ids to records. A reader therefore sees an index either entirely
//! before or entirely after a mutation.
//!
//! ## Startup Recovery
//!
//! [`RecordStore::open`] validates the sequence against the highest stored
//! id (a sequence that is unreadable or behind is fatal) and compares the
//! persisted indices with indices rebuilt from primary records. Any
//! difference, including unreadable index entries, triggers a reindex.

pub mod backend;
pub mod error;
pub mod index;
pub mod keys;
pub mod sequence;
pub mod sqlite;
pub mod store;

pub use backend::{BatchOp, KvBackend, MemoryBackend};
pub use error::StoreError;
pub use index::IndexSet;
pub use sqlite::SqliteBackend;
pub use store::{RecordStore, SearchQuery};

/// Open a record store from a connection string.
///
/// - `memory:` opens a volatile in-process store.
/// - `sqlite:<path>` opens (creating if needed) a SQLite database file.
/// - `sqlite::memory:` opens an in-memory SQLite database.
pub fn open(dsn: &str) -> Result<RecordStore, StoreError> {
    let dsn = dsn.trim();
    if dsn == "memory:" {
        return RecordStore::open(MemoryBackend::new());
    }
    if let Some(path) = dsn.strip_prefix("sqlite:") {
        let backend = if path == ":memory:" {
            SqliteBackend::in_memory()?
        } else if path.is_empty() {
            return Err(StoreError::InvalidDsn(dsn.to_string()));
        } else {
            SqliteBackend::open(path)?
        };
        return RecordStore::open(backend);
    }
    Err(StoreError::InvalidDsn(dsn.to_string()))
}
