//! # Secondary Index Set
//!
//! Three derived indices over VASP records:
//!
//! - **names**: normalized organization name → id (unique)
//! - **common names**: normalized TLS common name → id (unique)
//! - **countries**: ISO country code → set of ids
//!
//! The indices are rebuildable from primary records at any time
//! ([`IndexSet::from_records`]). Mutations are staged first
//! ([`IndexSet::stage`]) so the store can persist the resulting
//! [`IndexEdit`] in the same atomic batch as the primary record and only
//! then apply it in memory.

use std::collections::{BTreeMap, BTreeSet};

use vdir_core::{normalize_country, normalize_name, Vasp, VaspId};

use crate::backend::{BatchOp, KvBackend};
use crate::error::StoreError;
use crate::keys::{
    common_name_index_key, country_index_key, name_index_key, COMMON_NAMES_PREFIX,
    COUNTRIES_PREFIX, INDEX_PREFIX, NAMES_PREFIX,
};

/// In-memory secondary indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSet {
    names: BTreeMap<String, VaspId>,
    common_names: BTreeMap<String, VaspId>,
    countries: BTreeMap<String, BTreeSet<VaspId>>,
}

/// Index changes produced by one record mutation.
///
/// `None` (or an empty set) means the entry is removed.
#[derive(Debug, Default)]
pub struct IndexEdit {
    names: Vec<(String, Option<VaspId>)>,
    common_names: Vec<(String, Option<VaspId>)>,
    countries: Vec<(String, BTreeSet<VaspId>)>,
}

impl IndexSet {
    /// Build indices from primary records.
    ///
    /// Records must be supplied in ascending id order. If two records share
    /// a normalized name or common name (possible only when primary data was
    /// edited outside the store) the lower id keeps the index entry.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Vasp>) -> Self {
        let mut set = IndexSet::default();
        for vasp in records {
            let name = vasp.name_key();
            if let Some(existing) = set.names.get(&name) {
                tracing::warn!(
                    name = %name,
                    kept = %existing,
                    dropped = %vasp.id,
                    "duplicate name in primary records; keeping lower id"
                );
            } else {
                set.names.insert(name, vasp.id);
            }

            let common_name = vasp.common_name_key();
            if let Some(existing) = set.common_names.get(&common_name) {
                tracing::warn!(
                    common_name = %common_name,
                    kept = %existing,
                    dropped = %vasp.id,
                    "duplicate common name in primary records; keeping lower id"
                );
            } else {
                set.common_names.insert(common_name, vasp.id);
            }

            set.countries
                .entry(vasp.country_key())
                .or_default()
                .insert(vasp.id);
        }
        set
    }

    /// Load persisted indices.
    ///
    /// Fails with [`StoreError::CorruptedIndex`] if any entry cannot be
    /// decoded.
    pub fn load(backend: &dyn KvBackend) -> Result<Self, StoreError> {
        let mut set = IndexSet::default();
        for (key, value) in backend.scan_prefix(NAMES_PREFIX)? {
            let name = decode_suffix(NAMES_PREFIX, &key)?;
            set.names.insert(name, decode_id(&key, &value)?);
        }
        for (key, value) in backend.scan_prefix(COMMON_NAMES_PREFIX)? {
            let name = decode_suffix(COMMON_NAMES_PREFIX, &key)?;
            set.common_names.insert(name, decode_id(&key, &value)?);
        }
        for (key, value) in backend.scan_prefix(COUNTRIES_PREFIX)? {
            let code = decode_suffix(COUNTRIES_PREFIX, &key)?;
            let ids: BTreeSet<VaspId> = serde_json::from_slice(&value).map_err(|e| {
                StoreError::CorruptedIndex(format!("{}: {e}", String::from_utf8_lossy(&key)))
            })?;
            set.countries.insert(code, ids);
        }
        Ok(set)
    }

    /// Whether every index is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.common_names.is_empty() && self.countries.is_empty()
    }

    /// Number of distinct names indexed.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Id registered under an exact (already normalized) name.
    pub fn name(&self, normalized: &str) -> Option<VaspId> {
        self.names.get(normalized).copied()
    }

    /// Ids whose normalized name starts with `prefix`.
    pub fn names_with_prefix(&self, prefix: &str) -> impl Iterator<Item = VaspId> + '_ {
        let prefix = prefix.to_string();
        self.names
            .range(prefix.clone()..)
            .take_while(move |(name, _)| name.starts_with(&prefix))
            .map(|(_, id)| *id)
    }

    /// Id registered under a common name (normalized here).
    pub fn common_name(&self, common_name: &str) -> Option<VaspId> {
        self.common_names.get(&normalize_name(common_name)).copied()
    }

    /// Ids registered in a country (normalized here).
    pub fn country(&self, code: &str) -> Option<&BTreeSet<VaspId>> {
        self.countries.get(&normalize_country(code))
    }

    /// Stage the index changes for replacing `old` with `new`.
    ///
    /// Pass `old = None` for a create and `new = None` for a delete. Fails
    /// with [`StoreError::DuplicateEntity`] if `new` would take a name or
    /// common name owned by a different id.
    pub fn stage(&self, old: Option<&Vasp>, new: Option<&Vasp>) -> Result<IndexEdit, StoreError> {
        let mut edit = IndexEdit::default();

        stage_unique(
            &self.names,
            "name",
            old.map(|v| (v.name_key(), v.id)),
            new.map(|v| (v.name_key(), v.id)),
            &mut edit.names,
        )?;
        stage_unique(
            &self.common_names,
            "common name",
            old.map(|v| (v.common_name_key(), v.id)),
            new.map(|v| (v.common_name_key(), v.id)),
            &mut edit.common_names,
        )?;

        let old_country = old.map(|v| (v.country_key(), v.id));
        let new_country = new.map(|v| (v.country_key(), v.id));
        if old_country != new_country {
            let mut touched: BTreeMap<String, BTreeSet<VaspId>> = BTreeMap::new();
            if let Some((code, id)) = old_country {
                let set = touched
                    .entry(code.clone())
                    .or_insert_with(|| self.countries.get(&code).cloned().unwrap_or_default());
                set.remove(&id);
            }
            if let Some((code, id)) = new_country {
                let set = touched
                    .entry(code.clone())
                    .or_insert_with(|| self.countries.get(&code).cloned().unwrap_or_default());
                set.insert(id);
            }
            edit.countries.extend(touched);
        }

        Ok(edit)
    }

    /// Apply a staged edit that has already been persisted.
    pub fn apply(&mut self, edit: IndexEdit) {
        apply_unique(&mut self.names, edit.names);
        apply_unique(&mut self.common_names, edit.common_names);
        for (code, ids) in edit.countries {
            if ids.is_empty() {
                self.countries.remove(&code);
            } else {
                self.countries.insert(code, ids);
            }
        }
    }

    /// Batch that replaces every persisted index entry with this set.
    pub fn rewrite_ops(&self, backend: &dyn KvBackend) -> Result<Vec<BatchOp>, StoreError> {
        let mut ops: Vec<BatchOp> = backend
            .scan_prefix(INDEX_PREFIX)?
            .into_iter()
            .map(|(key, _)| BatchOp::Delete(key))
            .collect();
        for (name, id) in &self.names {
            ops.push(BatchOp::Put(name_index_key(name), encode_id(*id)));
        }
        for (name, id) in &self.common_names {
            ops.push(BatchOp::Put(common_name_index_key(name), encode_id(*id)));
        }
        for (code, ids) in &self.countries {
            ops.push(BatchOp::Put(
                country_index_key(code),
                serde_json::to_vec(ids)?,
            ));
        }
        Ok(ops)
    }

    /// Index entries that reference ids missing from `known`.
    pub fn dangling(&self, known: &BTreeSet<VaspId>) -> Vec<VaspId> {
        let mut dangling: BTreeSet<VaspId> = BTreeSet::new();
        let all = self
            .names
            .values()
            .chain(self.common_names.values())
            .chain(self.countries.values().flatten());
        for id in all {
            if !known.contains(id) {
                dangling.insert(*id);
            }
        }
        dangling.into_iter().collect()
    }
}

impl IndexEdit {
    /// Whether the edit changes nothing.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.common_names.is_empty() && self.countries.is_empty()
    }

    /// Backend ops persisting this edit.
    pub fn batch_ops(&self) -> Result<Vec<BatchOp>, StoreError> {
        let mut ops = Vec::new();
        for (name, id) in &self.names {
            ops.push(match id {
                Some(id) => BatchOp::Put(name_index_key(name), encode_id(*id)),
                None => BatchOp::Delete(name_index_key(name)),
            });
        }
        for (name, id) in &self.common_names {
            ops.push(match id {
                Some(id) => BatchOp::Put(common_name_index_key(name), encode_id(*id)),
                None => BatchOp::Delete(common_name_index_key(name)),
            });
        }
        for (code, ids) in &self.countries {
            ops.push(if ids.is_empty() {
                BatchOp::Delete(country_index_key(code))
            } else {
                BatchOp::Put(country_index_key(code), serde_json::to_vec(ids)?)
            });
        }
        Ok(ops)
    }
}

fn stage_unique(
    index: &BTreeMap<String, VaspId>,
    kind: &'static str,
    old: Option<(String, VaspId)>,
    new: Option<(String, VaspId)>,
    out: &mut Vec<(String, Option<VaspId>)>,
) -> Result<(), StoreError> {
    if old == new {
        return Ok(());
    }
    if let Some((key, id)) = &new {
        if let Some(owner) = index.get(key) {
            if owner != id {
                return Err(StoreError::DuplicateEntity {
                    kind,
                    key: key.clone(),
                });
            }
        }
    }
    if let Some((key, id)) = old {
        // Only release the entry if this record actually owns it.
        if index.get(&key) == Some(&id) && new.as_ref().map(|(k, _)| k) != Some(&key) {
            out.push((key, None));
        }
    }
    if let Some((key, id)) = new {
        if index.get(&key) != Some(&id) {
            out.push((key, Some(id)));
        }
    }
    Ok(())
}

fn apply_unique(index: &mut BTreeMap<String, VaspId>, changes: Vec<(String, Option<VaspId>)>) {
    for (key, id) in changes {
        match id {
            Some(id) => {
                index.insert(key, id);
            }
            None => {
                index.remove(&key);
            }
        }
    }
}

fn encode_id(id: VaspId) -> Vec<u8> {
    id.get().to_string().into_bytes()
}

fn decode_id(key: &[u8], value: &[u8]) -> Result<VaspId, StoreError> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|id| *id != 0)
        .map(VaspId)
        .ok_or_else(|| {
            StoreError::CorruptedIndex(format!(
                "{}: invalid id {:?}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            ))
        })
}

fn decode_suffix(prefix: &[u8], key: &[u8]) -> Result<String, StoreError> {
    key.strip_prefix(prefix)
        .and_then(|suffix| String::from_utf8(suffix.to_vec()).ok())
        .ok_or_else(|| {
            StoreError::CorruptedIndex(format!(
                "undecodable index key {}",
                String::from_utf8_lossy(key)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn vasp(id: u64, name: &str, cn: &str, country: &str) -> Vasp {
        let mut v = Vasp::new(name, cn, country);
        v.id = VaspId(id);
        v
    }

    #[test]
    fn from_records_builds_all_indices() {
        let records = vec![
            vasp(1, "Alice VASP", "alice.io", "US"),
            vasp(2, "Bob VASP", "bob.io", "us"),
            vasp(3, "Charlie", "charlie.io", "DE"),
        ];
        let set = IndexSet::from_records(&records);
        assert_eq!(set.name("alice vasp"), Some(VaspId(1)));
        assert_eq!(set.common_name("BOB.io"), Some(VaspId(2)));
        assert_eq!(
            set.country("us").unwrap().iter().copied().collect::<Vec<_>>(),
            vec![VaspId(1), VaspId(2)]
        );
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn duplicate_names_keep_lower_id() {
        let records = vec![
            vasp(1, "Alice", "a1.io", "US"),
            vasp(2, "ALICE", "a2.io", "US"),
        ];
        let set = IndexSet::from_records(&records);
        assert_eq!(set.name("alice"), Some(VaspId(1)));
    }

    #[test]
    fn stage_rejects_name_collision() {
        let set = IndexSet::from_records(&[vasp(1, "Alice", "alice.io", "US")]);
        let err = set
            .stage(None, Some(&vasp(2, " alice ", "other.io", "US")))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEntity { kind: "name", .. }));

        let err = set
            .stage(None, Some(&vasp(2, "Other", "ALICE.IO", "US")))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateEntity {
                kind: "common name",
                ..
            }
        ));
    }

    #[test]
    fn stage_and_apply_moves_country_and_name() {
        let old = vasp(1, "Alice", "alice.io", "US");
        let mut set = IndexSet::from_records([&old]);

        let new = vasp(1, "Alice Renamed", "alice.io", "GB");
        let edit = set.stage(Some(&old), Some(&new)).unwrap();
        set.apply(edit);

        assert_eq!(set.name("alice"), None);
        assert_eq!(set.name("alice renamed"), Some(VaspId(1)));
        assert!(set.country("US").is_none());
        assert!(set.country("GB").unwrap().contains(&VaspId(1)));
        assert_eq!(set, IndexSet::from_records([&new]));
    }

    #[test]
    fn unchanged_update_is_empty_edit() {
        let old = vasp(1, "Alice", "alice.io", "US");
        let set = IndexSet::from_records([&old]);
        let mut new = old.clone();
        new.website = "https://alice.io".into();
        assert!(set.stage(Some(&old), Some(&new)).unwrap().is_empty());
    }

    #[test]
    fn delete_releases_entries() {
        let old = vasp(1, "Alice", "alice.io", "US");
        let mut set = IndexSet::from_records([&old]);
        let edit = set.stage(Some(&old), None).unwrap();
        set.apply(edit);
        assert!(set.is_empty());
    }

    #[test]
    fn persisted_round_trip_through_backend() {
        let backend = MemoryBackend::new();
        let set = IndexSet::from_records(&[
            vasp(1, "Alice", "alice.io", "US"),
            vasp(2, "Bob", "bob.io", "US"),
        ]);
        backend.write_batch(set.rewrite_ops(&backend).unwrap()).unwrap();
        assert_eq!(IndexSet::load(&backend).unwrap(), set);

        // Rewriting with an empty set clears every index key.
        backend
            .write_batch(IndexSet::default().rewrite_ops(&backend).unwrap())
            .unwrap();
        assert!(backend.scan_prefix(INDEX_PREFIX).unwrap().is_empty());
    }

    #[test]
    fn undecodable_entry_is_corruption() {
        let backend = MemoryBackend::new();
        backend
            .write_batch(vec![BatchOp::Put(name_index_key("alice"), b"not-an-id".to_vec())])
            .unwrap();
        assert!(matches!(
            IndexSet::load(&backend),
            Err(StoreError::CorruptedIndex(_))
        ));
    }

    #[test]
    fn prefix_iteration() {
        let set = IndexSet::from_records(&[
            vasp(1, "Alpha", "a.io", "US"),
            vasp(2, "Alphabet", "b.io", "US"),
            vasp(3, "Beta", "c.io", "US"),
        ]);
        let ids: Vec<VaspId> = set.names_with_prefix("alpha").collect();
        assert_eq!(ids, vec![VaspId(1), VaspId(2)]);
        assert_eq!(set.names_with_prefix("").count(), 3);
    }

    #[test]
    fn dangling_entries_detected() {
        let set = IndexSet::from_records(&[vasp(4, "Alice", "alice.io", "US")]);
        let known: BTreeSet<VaspId> = [VaspId(1)].into_iter().collect();
        assert_eq!(set.dangling(&known), vec![VaspId(4)]);
    }
}
