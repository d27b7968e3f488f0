//! Integration tests for the record store: persistence across reopen,
//! startup recovery, and index invariants under arbitrary workloads.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use vdir_core::{Contact, Vasp, VaspId};
use vdir_store::keys::{country_index_key, name_index_key, SEQUENCE_KEY};
use vdir_store::{
    BatchOp, IndexSet, KvBackend, MemoryBackend, RecordStore, SearchQuery, SqliteBackend,
    StoreError,
};

fn vasp(name: &str, country: &str) -> Vasp {
    let cn = format!("trisa.{}.io", name.to_lowercase().replace(' ', "-"));
    let mut v = Vasp::new(name, cn.clone(), country);
    v.contacts.technical = Some(Contact {
        name: "Tech".into(),
        email: format!("tech@{cn}"),
        ..Default::default()
    });
    v
}

fn assert_index_invariants(store: &RecordStore) {
    let vasps = store.list_vasps().unwrap();
    let index = store.index_snapshot();
    let known: BTreeSet<VaspId> = vasps.iter().map(|v| v.id).collect();
    for v in &vasps {
        assert_eq!(index.name(&v.name_key()), Some(v.id), "name of {}", v.id);
        assert_eq!(index.common_name(&v.common_name), Some(v.id));
        assert!(index.country(&v.country).unwrap().contains(&v.id));
    }
    assert!(index.dangling(&known).is_empty());
}

#[test]
fn sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vdir.db");

    let alice_id = {
        let store = RecordStore::open(SqliteBackend::open(&path).unwrap()).unwrap();
        let mut alice = vasp("Alice", "US");
        let id = store.create_vasp(&mut alice).unwrap();
        store.create_vasp(&mut vasp("Bob", "GB")).unwrap();
        id
    };

    let store = RecordStore::open(SqliteBackend::open(&path).unwrap()).unwrap();
    assert_eq!(store.retrieve_vasp(alice_id).unwrap().name, "Alice");
    assert_eq!(store.sequence(), 2);
    let found = store.search(&SearchQuery::by_country(["gb"])).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Bob");

    let mut carol = vasp("Carol", "US");
    assert_eq!(store.create_vasp(&mut carol).unwrap(), VaspId(3));
}

#[test]
fn open_rebuilds_stale_index() {
    let backend = Arc::new(MemoryBackend::new());
    {
        let store = RecordStore::open(Arc::clone(&backend)).unwrap();
        store.create_vasp(&mut vasp("Alice", "US")).unwrap();
        store.create_vasp(&mut vasp("Bob", "US")).unwrap();
    }

    // Drop one entry and point another at a record that does not exist.
    backend
        .write_batch(vec![
            BatchOp::Delete(name_index_key("alice")),
            BatchOp::Put(country_index_key("FR"), b"[99]".to_vec()),
        ])
        .unwrap();

    let store = RecordStore::open(Arc::clone(&backend)).unwrap();
    assert_index_invariants(&store);
    assert!(store.index_snapshot().country("FR").is_none());
    assert_eq!(
        IndexSet::load(&*backend).unwrap(),
        store.index_snapshot(),
        "repaired index is persisted"
    );
}

#[test]
fn open_reindexes_unreadable_index() {
    let backend = Arc::new(MemoryBackend::new());
    {
        let store = RecordStore::open(Arc::clone(&backend)).unwrap();
        store.create_vasp(&mut vasp("Alice", "US")).unwrap();
    }
    backend
        .write_batch(vec![BatchOp::Put(
            country_index_key("US"),
            b"{not json".to_vec(),
        )])
        .unwrap();

    let store = RecordStore::open(Arc::clone(&backend)).unwrap();
    assert_index_invariants(&store);
}

#[test]
fn sequence_behind_records_is_fatal() {
    let backend = Arc::new(MemoryBackend::new());
    {
        let store = RecordStore::open(Arc::clone(&backend)).unwrap();
        store.create_vasp(&mut vasp("Alice", "US")).unwrap();
        store.create_vasp(&mut vasp("Bob", "US")).unwrap();
    }
    backend
        .write_batch(vec![BatchOp::Put(
            SEQUENCE_KEY.to_vec(),
            1u64.to_be_bytes().to_vec(),
        )])
        .unwrap();

    let err = RecordStore::open(Arc::clone(&backend)).unwrap_err();
    assert!(matches!(err, StoreError::CorruptedSequence(_)));
    assert!(err.is_corruption());
}

#[test]
fn undecodable_record_is_fatal() {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .write_batch(vec![
            BatchOp::Put(SEQUENCE_KEY.to_vec(), 1u64.to_be_bytes().to_vec()),
            BatchOp::Put(vdir_store::keys::vasp_key(VaspId(1)), b"garbage".to_vec()),
        ])
        .unwrap();
    assert!(matches!(
        RecordStore::open(backend),
        Err(StoreError::CorruptedRecord { .. })
    ));
}

#[test]
fn explicit_reindex_is_idempotent() {
    let store = RecordStore::open(MemoryBackend::new()).unwrap();
    for (name, country) in [("Alice", "US"), ("Bob", "DE"), ("Carol", "US")] {
        store.create_vasp(&mut vasp(name, country)).unwrap();
    }
    let before = store.index_snapshot();
    assert_eq!(store.reindex().unwrap(), 3);
    assert_eq!(store.reindex().unwrap(), 3);
    assert_eq!(store.index_snapshot(), before);
}

#[test]
fn concurrent_creates_issue_unique_ids() {
    let store = Arc::new(RecordStore::open(MemoryBackend::new()).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                (0..10)
                    .map(|i| {
                        store
                            .create_vasp(&mut vasp(&format!("vasp {t} {i}"), "US"))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = BTreeSet::new();
    for handle in handles {
        let per_thread = handle.join().unwrap();
        assert!(per_thread.windows(2).all(|w| w[0] < w[1]));
        ids.extend(per_thread);
    }
    assert_eq!(ids.len(), 80);
    assert_index_invariants(&store);
}

fn workload() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(
        ("[a-d]{1,3}", prop::sample::select(vec!["US", "GB", "DE", "SG"]))
            .prop_map(|(name, country)| (name, country.to_string())),
        1..24,
    )
}

proptest! {
    /// Sequential creates return strictly increasing ids, and duplicates
    /// (case-insensitive) are rejected without consuming one.
    #[test]
    fn ids_strictly_increase(ops in workload()) {
        let store = RecordStore::open(MemoryBackend::new()).unwrap();
        let mut last = 0u64;
        let mut seen = BTreeSet::new();
        for (name, country) in ops {
            let upper = name.to_uppercase();
            let candidate = if seen.len() % 2 == 0 { name.clone() } else { upper };
            match store.create_vasp(&mut vasp(&candidate, &country)) {
                Ok(id) => {
                    prop_assert!(seen.insert(name.clone()));
                    prop_assert!(id.get() > last);
                    last = id.get();
                }
                Err(StoreError::DuplicateEntity { .. }) => {
                    prop_assert!(seen.contains(&name));
                    prop_assert_eq!(store.sequence(), last);
                }
                Err(e) => prop_assert!(false, "unexpected error: {e}"),
            }
        }
    }

    /// Reopening after arbitrary index damage yields exactly the indices
    /// derived from primary records.
    #[test]
    fn reindex_independent_of_corruption(
        ops in workload(),
        damage in prop::collection::vec((0usize..3, "[a-z]{1,3}"), 0..6),
    ) {
        let backend = Arc::new(MemoryBackend::new());
        let expected = {
            let store = RecordStore::open(Arc::clone(&backend)).unwrap();
            for (name, country) in &ops {
                let _ = store.create_vasp(&mut vasp(name, country));
            }
            store.index_snapshot()
        };

        let mut batch = Vec::new();
        for (kind, key) in damage {
            batch.push(match kind {
                0 => BatchOp::Delete(name_index_key(&key)),
                1 => BatchOp::Put(name_index_key(&key), b"12345".to_vec()),
                _ => BatchOp::Put(country_index_key(&key.to_uppercase()), b"oops".to_vec()),
            });
        }
        backend.write_batch(batch).unwrap();

        let store = RecordStore::open(Arc::clone(&backend)).unwrap();
        prop_assert_eq!(store.index_snapshot(), expected);
        assert_index_invariants(&store);
    }
}
