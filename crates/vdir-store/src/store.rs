//! # Record Store
//!
//! Owns the primary key space for VASPs and certificate requests and keeps
//! the [`IndexSet`] and [`Sequence`] consistent with it.
//!
//! Every mutation is one backend batch: the primary record plus whatever
//! index entries change. The in-memory indices are updated only after the
//! batch commits, under the same write lock, so a failed write leaves both
//! the backend and memory untouched.

use std::collections::BTreeSet;

use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use vdir_core::{
    normalize_country, normalize_name, CertReqId, CertificateRequest, Vasp, VaspId,
};

use crate::backend::{BatchOp, KvBackend};
use crate::error::StoreError;
use crate::index::IndexSet;
use crate::keys::{certreq_key, decode_id, display_key, vasp_key, CERTREQ_PREFIX, VASP_PREFIX};
use crate::sequence::Sequence;

/// Search criteria. Blank entries are ignored.
///
/// A name ending in `*` matches every name with that prefix. Names and
/// countries are each unioned; when both are given the result is their
/// intersection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub names: Vec<String>,
    pub countries: Vec<String>,
}

impl SearchQuery {
    /// Query by names only.
    pub fn by_name<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            countries: Vec::new(),
        }
    }

    /// Query by countries only.
    pub fn by_country<S: Into<String>>(countries: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: Vec::new(),
            countries: countries.into_iter().map(Into::into).collect(),
        }
    }
}

struct State {
    indices: IndexSet,
    sequence: Sequence,
}

/// Durable, indexed storage for directory records.
pub struct RecordStore {
    backend: Box<dyn KvBackend>,
    state: RwLock<State>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("RecordStore")
            .field("sequence", &state.sequence.current())
            .field("indexed_names", &state.indices.len())
            .finish()
    }
}

/// A name that is empty once any trailing wildcard is removed selects nothing.
fn is_blank_pattern(name: &str) -> bool {
    name.strip_suffix('*').unwrap_or(name).trim_end().is_empty()
}

impl RecordStore {
    /// Open a store over `backend`, validating and repairing persisted state.
    ///
    /// Fails with [`StoreError::CorruptedSequence`] if the counter is
    /// unreadable or lower than a stored id, and with
    /// [`StoreError::CorruptedRecord`] if a primary record cannot be decoded.
    /// Indices that are missing, unreadable, or disagree with the primary
    /// records are rebuilt.
    pub fn open(backend: impl KvBackend + 'static) -> Result<Self, StoreError> {
        let backend: Box<dyn KvBackend> = Box::new(backend);
        let sequence = Sequence::load(backend.as_ref())?;
        let vasps: Vec<Vasp> = decode_records(backend.as_ref(), VASP_PREFIX, |v: &Vasp| v.id.get())?;
        let certreqs: Vec<CertificateRequest> =
            decode_records(backend.as_ref(), CERTREQ_PREFIX, |r: &CertificateRequest| {
                r.id.get()
            })?;

        let max_id = vasps
            .iter()
            .map(|v| v.id.get())
            .chain(certreqs.iter().map(|r| r.id.get()))
            .max()
            .unwrap_or(0);
        if max_id > sequence.current() {
            return Err(StoreError::CorruptedSequence(format!(
                "sequence at {} but records exist up to id {max_id}",
                sequence.current()
            )));
        }

        let rebuilt = IndexSet::from_records(&vasps);
        let consistent = match IndexSet::load(backend.as_ref()) {
            Ok(persisted) => persisted == rebuilt,
            Err(StoreError::CorruptedIndex(reason)) => {
                tracing::warn!(%reason, "persisted index unreadable");
                false
            }
            Err(e) => return Err(e),
        };
        if !consistent {
            tracing::warn!(
                vasps = vasps.len(),
                "indices inconsistent with primary records; reindexing"
            );
            backend.write_batch(rebuilt.rewrite_ops(backend.as_ref())?)?;
        }

        tracing::info!(
            vasps = vasps.len(),
            certreqs = certreqs.len(),
            sequence = sequence.current(),
            "record store opened"
        );

        Ok(Self {
            backend,
            state: RwLock::new(State {
                indices: rebuilt,
                sequence,
            }),
        })
    }

    /// The last id issued by the sequence.
    pub fn sequence(&self) -> u64 {
        self.state.read().sequence.current()
    }

    /// A copy of the current in-memory indices.
    pub fn index_snapshot(&self) -> IndexSet {
        self.state.read().indices.clone()
    }

    // ── VASPs ───────────────────────────────────────────────────────

    /// Register a new VASP and return its id.
    ///
    /// On success `vasp` is updated with the assigned id and listing
    /// timestamps. A name or common name already indexed (case-insensitive)
    /// fails with [`StoreError::DuplicateEntity`] and allocates no id.
    pub fn create_vasp(&self, vasp: &mut Vasp) -> Result<VaspId, StoreError> {
        vasp.validate(true)?;

        let mut state = self.state.write();
        let mut record = vasp.clone();
        record.id = VaspId::UNASSIGNED;
        state.indices.stage(None, Some(&record))?;

        let id = VaspId(state.sequence.next(self.backend.as_ref())?);
        let now = Utc::now();
        record.id = id;
        record.first_listed = Some(now);
        record.last_updated = Some(now);

        let edit = state.indices.stage(None, Some(&record))?;
        let mut ops = edit.batch_ops()?;
        ops.push(BatchOp::Put(vasp_key(id), serde_json::to_vec(&record)?));
        self.backend.write_batch(ops)?;
        state.indices.apply(edit);

        tracing::debug!(vasp_id = %id, name = %record.name, "vasp created");
        *vasp = record;
        Ok(id)
    }

    /// Fetch a VASP by id.
    pub fn retrieve_vasp(&self, id: VaspId) -> Result<Vasp, StoreError> {
        let key = vasp_key(id);
        match self.backend.get(&key)? {
            Some(raw) => decode(&key, &raw),
            None => Err(StoreError::vasp_not_found(id)),
        }
    }

    /// Replace an existing VASP, moving index entries as needed.
    pub fn update_vasp(&self, vasp: &mut Vasp) -> Result<(), StoreError> {
        vasp.validate(false)?;

        let mut state = self.state.write();
        let old = self.retrieve_vasp(vasp.id)?;
        let mut record = vasp.clone();
        record.last_updated = Some(Utc::now());

        let edit = state.indices.stage(Some(&old), Some(&record))?;
        let mut ops = edit.batch_ops()?;
        ops.push(BatchOp::Put(vasp_key(record.id), serde_json::to_vec(&record)?));
        self.backend.write_batch(ops)?;
        state.indices.apply(edit);

        *vasp = record;
        Ok(())
    }

    /// Remove a VASP and its index entries.
    pub fn delete_vasp(&self, id: VaspId) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let old = self.retrieve_vasp(id)?;
        let edit = state.indices.stage(Some(&old), None)?;
        let mut ops = edit.batch_ops()?;
        ops.push(BatchOp::Delete(vasp_key(id)));
        self.backend.write_batch(ops)?;
        state.indices.apply(edit);
        Ok(())
    }

    /// Every VASP in id order.
    pub fn list_vasps(&self) -> Result<Vec<Vasp>, StoreError> {
        decode_records(self.backend.as_ref(), VASP_PREFIX, |v: &Vasp| v.id.get())
    }

    /// Find VASPs by name pattern and/or country, in id order.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<Vasp>, StoreError> {
        let names: Vec<String> = query
            .names
            .iter()
            .map(|n| normalize_name(n))
            .filter(|n| !is_blank_pattern(n))
            .collect();
        let countries: Vec<String> = query
            .countries
            .iter()
            .map(|c| normalize_country(c))
            .filter(|c| !c.is_empty())
            .collect();
        if names.is_empty() && countries.is_empty() {
            return Err(StoreError::NoSearchCriteria);
        }

        let state = self.state.read();

        let by_name = (!names.is_empty()).then(|| {
            let mut ids = BTreeSet::new();
            for name in &names {
                match name.strip_suffix('*') {
                    Some(prefix) => ids.extend(state.indices.names_with_prefix(prefix.trim_end())),
                    None => ids.extend(state.indices.name(name)),
                }
            }
            ids
        });
        let by_country = (!countries.is_empty()).then(|| {
            let mut ids = BTreeSet::new();
            for code in &countries {
                if let Some(members) = state.indices.country(code) {
                    ids.extend(members.iter().copied());
                }
            }
            ids
        });

        let ids: BTreeSet<VaspId> = match (by_name, by_country) {
            (Some(n), Some(c)) => n.intersection(&c).copied().collect(),
            (Some(n), None) => n,
            (None, Some(c)) => c,
            (None, None) => BTreeSet::new(),
        };

        // Resolve under the read lock so results match the index snapshot.
        ids.into_iter()
            .map(|id| match self.retrieve_vasp(id) {
                Err(StoreError::EntityNotFound { .. }) => Err(StoreError::CorruptedIndex(
                    format!("index references missing vasp {id}"),
                )),
                other => other,
            })
            .collect()
    }

    /// Fetch a VASP by its TLS common name (case-insensitive).
    pub fn lookup_common_name(&self, common_name: &str) -> Result<Vasp, StoreError> {
        let state = self.state.read();
        match state.indices.common_name(common_name) {
            Some(id) => self.retrieve_vasp(id),
            None => Err(StoreError::vasp_not_found(common_name.trim())),
        }
    }

    /// Rebuild every index from primary VASP records.
    ///
    /// Returns the number of records indexed. Idempotent.
    pub fn reindex(&self) -> Result<usize, StoreError> {
        let mut state = self.state.write();
        let vasps = self.list_vasps()?;
        let rebuilt = IndexSet::from_records(&vasps);
        self.backend
            .write_batch(rebuilt.rewrite_ops(self.backend.as_ref())?)?;
        state.indices = rebuilt;
        tracing::info!(vasps = vasps.len(), "reindex complete");
        Ok(vasps.len())
    }

    // ── Certificate requests ────────────────────────────────────────

    /// Store a new certificate request and return its id.
    ///
    /// The referenced VASP must exist, and a VASP may have at most one
    /// non-terminal request.
    pub fn create_cert_req(&self, req: &mut CertificateRequest) -> Result<CertReqId, StoreError> {
        req.validate(true)?;

        let mut state = self.state.write();
        if self.backend.get(&vasp_key(req.vasp))?.is_none() {
            return Err(StoreError::vasp_not_found(req.vasp));
        }
        if !req.status.is_terminal() {
            self.ensure_no_open_request(req.vasp, None)?;
        }

        let id = CertReqId(state.sequence.next(self.backend.as_ref())?);
        let now = Utc::now();
        let mut record = req.clone();
        record.id = id;
        record.created = now;
        record.modified = now;
        self.backend.write_batch(vec![BatchOp::Put(
            certreq_key(id),
            serde_json::to_vec(&record)?,
        )])?;

        tracing::debug!(request_id = %id, vasp_id = %record.vasp, "certificate request created");
        *req = record;
        Ok(id)
    }

    /// Fetch a certificate request by id.
    pub fn retrieve_cert_req(&self, id: CertReqId) -> Result<CertificateRequest, StoreError> {
        let key = certreq_key(id);
        match self.backend.get(&key)? {
            Some(raw) => decode(&key, &raw),
            None => Err(StoreError::certreq_not_found(id)),
        }
    }

    /// Replace an existing certificate request.
    pub fn update_cert_req(&self, req: &mut CertificateRequest) -> Result<(), StoreError> {
        req.validate(false)?;

        let _guard = self.state.write();
        if self.backend.get(&certreq_key(req.id))?.is_none() {
            return Err(StoreError::certreq_not_found(req.id));
        }
        if !req.status.is_terminal() {
            self.ensure_no_open_request(req.vasp, Some(req.id))?;
        }

        let mut record = req.clone();
        record.modified = Utc::now();
        self.backend.write_batch(vec![BatchOp::Put(
            certreq_key(record.id),
            serde_json::to_vec(&record)?,
        )])?;
        *req = record;
        Ok(())
    }

    /// Remove a certificate request.
    pub fn delete_cert_req(&self, id: CertReqId) -> Result<(), StoreError> {
        let _guard = self.state.write();
        let key = certreq_key(id);
        if self.backend.get(&key)?.is_none() {
            return Err(StoreError::certreq_not_found(id));
        }
        self.backend.write_batch(vec![BatchOp::Delete(key)])
    }

    /// Every certificate request in id order.
    pub fn list_cert_reqs(&self) -> Result<Vec<CertificateRequest>, StoreError> {
        decode_records(self.backend.as_ref(), CERTREQ_PREFIX, |r: &CertificateRequest| {
            r.id.get()
        })
    }

    /// Certificate requests belonging to one VASP, in id order.
    pub fn cert_reqs_for_vasp(&self, vasp: VaspId) -> Result<Vec<CertificateRequest>, StoreError> {
        Ok(self
            .list_cert_reqs()?
            .into_iter()
            .filter(|r| r.vasp == vasp)
            .collect())
    }

    fn ensure_no_open_request(
        &self,
        vasp: VaspId,
        except: Option<CertReqId>,
    ) -> Result<(), StoreError> {
        let conflict = self
            .list_cert_reqs()?
            .into_iter()
            .find(|r| r.vasp == vasp && !r.status.is_terminal() && Some(r.id) != except);
        match conflict {
            Some(existing) => Err(StoreError::DuplicateEntity {
                kind: "certificate request",
                key: format!("vasp {vasp} already has open request {}", existing.id),
            }),
            None => Ok(()),
        }
    }
}

fn decode<T: DeserializeOwned>(key: &[u8], raw: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(raw).map_err(|e| StoreError::CorruptedRecord {
        key: display_key(key),
        reason: e.to_string(),
    })
}

/// Decode every record under `prefix`, checking that each stored id agrees
/// with its key.
fn decode_records<T: DeserializeOwned>(
    backend: &dyn KvBackend,
    prefix: &[u8],
    id_of: impl Fn(&T) -> u64,
) -> Result<Vec<T>, StoreError> {
    backend
        .scan_prefix(prefix)?
        .into_iter()
        .map(|(key, raw)| {
            let record: T = decode(&key, &raw)?;
            let key_id = decode_id(prefix, &key);
            if key_id != Some(id_of(&record)) {
                return Err(StoreError::CorruptedRecord {
                    key: display_key(&key),
                    reason: format!("record id {} does not match key", id_of(&record)),
                });
            }
            Ok(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use vdir_core::{Certificate, CertificateRequestState, Contact, VerificationState};

    fn vasp(name: &str, cn: &str, country: &str) -> Vasp {
        let mut v = Vasp::new(name, cn, country);
        v.contacts.technical = Some(Contact {
            name: "Tech".into(),
            email: format!("tech@{cn}"),
            ..Default::default()
        });
        v
    }

    fn store() -> RecordStore {
        RecordStore::open(MemoryBackend::new()).unwrap()
    }

    fn certreq(vasp: VaspId) -> CertificateRequest {
        CertificateRequest::new(vasp, "trisa.example.io", vec![1; 28], vec![2; 32])
    }

    #[test]
    fn create_assigns_increasing_ids_and_timestamps() {
        let store = store();
        let mut a = vasp("Alice", "alice.io", "US");
        let mut b = vasp("Bob", "bob.io", "GB");
        let id_a = store.create_vasp(&mut a).unwrap();
        let id_b = store.create_vasp(&mut b).unwrap();
        assert!(id_a < id_b);
        assert_eq!(a.id, id_a);
        assert!(a.first_listed.is_some());
        assert_eq!(store.retrieve_vasp(id_b).unwrap().name, "Bob");
    }

    #[test]
    fn duplicate_name_is_rejected_case_insensitively() {
        let store = store();
        store
            .create_vasp(&mut vasp("Alice VASP", "alice.io", "US"))
            .unwrap();
        let seq = store.sequence();
        let err = store
            .create_vasp(&mut vasp("  ALICE vasp ", "other.io", "US"))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEntity { kind: "name", .. }));
        assert_eq!(store.sequence(), seq, "rejected create burns no id");
    }

    #[test]
    fn incomplete_record_is_rejected() {
        let store = store();
        let mut v = vasp("Alice", "alice.io", "US");
        v.contacts.technical = None;
        assert!(matches!(
            store.create_vasp(&mut v),
            Err(StoreError::IncompleteRecord(_))
        ));
    }

    #[test]
    fn retrieve_missing_is_not_found() {
        let err = store().retrieve_vasp(VaspId(42)).unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound { kind: "vasp", .. }));
    }

    #[test]
    fn update_moves_name_and_country() {
        let store = store();
        let mut a = vasp("Alice", "alice.io", "US");
        store.create_vasp(&mut a).unwrap();
        let mut b = vasp("Bob", "bob.io", "US");
        store.create_vasp(&mut b).unwrap();

        a.name = "Alicia".into();
        a.country = "DE".into();
        store.update_vasp(&mut a).unwrap();

        assert!(store.search(&SearchQuery::by_name(["alice"])).unwrap().is_empty());
        assert_eq!(store.search(&SearchQuery::by_name(["ALICIA"])).unwrap()[0].id, a.id);
        let us: Vec<VaspId> = store
            .search(&SearchQuery::by_country(["US"]))
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(us, vec![b.id]);

        a.name = "bob".into();
        assert!(matches!(
            store.update_vasp(&mut a),
            Err(StoreError::DuplicateEntity { kind: "name", .. })
        ));
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = store();
        let mut v = vasp("Alice", "alice.io", "US");
        v.id = VaspId(9);
        assert!(matches!(
            store.update_vasp(&mut v),
            Err(StoreError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn search_semantics() {
        let store = store();
        let mut ids = Vec::new();
        for (name, cn, country) in [
            ("Alpha Exchange", "alpha.io", "US"),
            ("Alphabet Custody", "alphabet.io", "GB"),
            ("Beta Wallet", "beta.io", "US"),
        ] {
            ids.push(store.create_vasp(&mut vasp(name, cn, country)).unwrap());
        }

        assert!(matches!(
            store.search(&SearchQuery::default()),
            Err(StoreError::NoSearchCriteria)
        ));
        assert!(matches!(
            store.search(&SearchQuery::by_name(["  "])),
            Err(StoreError::NoSearchCriteria)
        ));
        assert!(matches!(
            store.search(&SearchQuery::by_name(["*", " * "])),
            Err(StoreError::NoSearchCriteria)
        ));
        assert_eq!(
            store
                .search(&SearchQuery {
                    names: vec!["*".into()],
                    countries: vec!["GB".into()],
                })
                .unwrap()
                .len(),
            1
        );

        let found = |q: SearchQuery| -> Vec<VaspId> {
            store.search(&q).unwrap().into_iter().map(|v| v.id).collect()
        };

        assert_eq!(found(SearchQuery::by_country(["us"])), vec![ids[0], ids[2]]);
        assert_eq!(found(SearchQuery::by_name(["alpha*"])), vec![ids[0], ids[1]]);
        assert_eq!(found(SearchQuery::by_name(["Alpha"])), Vec::<VaspId>::new());
        assert_eq!(
            found(SearchQuery {
                names: vec!["alpha*".into()],
                countries: vec!["US".into()],
            }),
            vec![ids[0]]
        );
        assert_eq!(
            found(SearchQuery::by_name(["beta wallet", "alpha exchange"])),
            vec![ids[0], ids[2]]
        );
    }

    #[test]
    fn lookup_by_common_name() {
        let store = store();
        let mut a = vasp("Alice", "trisa.alice.io", "US");
        store.create_vasp(&mut a).unwrap();
        assert_eq!(store.lookup_common_name("TRISA.alice.io").unwrap().id, a.id);
        assert!(matches!(
            store.lookup_common_name("nobody.io"),
            Err(StoreError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn delete_releases_name() {
        let store = store();
        let mut a = vasp("Alice", "alice.io", "US");
        store.create_vasp(&mut a).unwrap();
        store.delete_vasp(a.id).unwrap();
        assert!(store.index_snapshot().is_empty());
        store.create_vasp(&mut vasp("alice", "alice.io", "US")).unwrap();
    }

    #[test]
    fn certificate_without_verification_is_incomplete() {
        let store = store();
        let mut a = vasp("Alice", "alice.io", "US");
        store.create_vasp(&mut a).unwrap();
        a.certificate = Some(Certificate {
            version: 3,
            serial_number: "1A".into(),
            signature_algorithm: "sha256WithRSAEncryption".into(),
            public_key_algorithm: "RSA".into(),
            subject: Default::default(),
            issuer: Default::default(),
            not_before: Utc::now(),
            not_after: Utc::now(),
            revoked: false,
            data: String::new(),
        });
        a.verification_status = VerificationState::IssuingCertificate;
        assert!(matches!(
            store.update_vasp(&mut a),
            Err(StoreError::IncompleteRecord(_))
        ));
    }

    #[test]
    fn cert_req_requires_existing_vasp() {
        let store = store();
        let err = store.create_cert_req(&mut certreq(VaspId(5))).unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound { kind: "vasp", .. }));
    }

    #[test]
    fn one_open_cert_req_per_vasp() {
        let store = store();
        let mut a = vasp("Alice", "alice.io", "US");
        let vasp_id = store.create_vasp(&mut a).unwrap();

        let mut first = certreq(vasp_id);
        let first_id = store.create_cert_req(&mut first).unwrap();
        assert!(first_id.get() > vasp_id.get(), "ids shared across kinds");

        let err = store.create_cert_req(&mut certreq(vasp_id)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DuplicateEntity {
                kind: "certificate request",
                ..
            }
        ));

        first.transition(CertificateRequestState::Rejected).unwrap();
        store.update_cert_req(&mut first).unwrap();
        store.create_cert_req(&mut certreq(vasp_id)).unwrap();
        assert_eq!(store.cert_reqs_for_vasp(vasp_id).unwrap().len(), 2);
    }

    #[test]
    fn cert_req_update_and_delete() {
        let store = store();
        let vasp_id = store
            .create_vasp(&mut vasp("Alice", "alice.io", "US"))
            .unwrap();
        let mut req = certreq(vasp_id);
        let id = store.create_cert_req(&mut req).unwrap();

        req.transition(CertificateRequestState::ReadyToSubmit).unwrap();
        store.update_cert_req(&mut req).unwrap();
        assert_eq!(
            store.retrieve_cert_req(id).unwrap().status,
            CertificateRequestState::ReadyToSubmit
        );

        req.status = CertificateRequestState::Processing;
        assert!(matches!(
            store.update_cert_req(&mut req),
            Err(StoreError::IncompleteRecord(_))
        ));

        store.delete_cert_req(id).unwrap();
        assert!(matches!(
            store.retrieve_cert_req(id),
            Err(StoreError::EntityNotFound { .. })
        ));
        assert!(store.list_cert_reqs().unwrap().is_empty());
    }
}
