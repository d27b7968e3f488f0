//! # Scripted Certificate Authority
//!
//! In-memory [`CertAuthority`] for tests and local development. Authorities
//! and their balances are configured up front; submitted batches start out
//! processing with one active certificate, and tests script their progress
//! with [`MockCertAuthority::set_batch`] and
//! [`MockCertAuthority::set_archive`].

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::authority::{
    Authority, BatchParams, BatchResponse, BatchStatus, CertAuthority, ProcessingInfo,
};
use crate::error::CaError;

/// A batch the mock has accepted, with the parameters it was sent.
#[derive(Debug, Clone)]
pub struct SubmittedBatch {
    pub batch_id: i64,
    pub authority_id: i64,
    pub batch_name: String,
    pub common_name: String,
    pub pkcs12_password: String,
}

#[derive(Debug, Default)]
struct MockBatch {
    detail: BatchResponse,
    processing: ProcessingInfo,
    archive: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockState {
    authorities: Vec<(Authority, i64)>,
    batches: BTreeMap<i64, MockBatch>,
    submitted: Vec<SubmittedBatch>,
    next_batch_id: i64,
    outage: Option<String>,
    calls: BTreeMap<&'static str, usize>,
}

/// Scripted certificate authority.
#[derive(Debug, Default)]
pub struct MockCertAuthority {
    state: Mutex<MockState>,
}

impl MockCertAuthority {
    /// A mock with no authorities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an authority with the given balance.
    pub fn with_authority(self, id: i64, ecosystem: &str, balance: i64) -> Self {
        self.state.lock().authorities.push((
            Authority {
                id,
                ecosystem: ecosystem.to_string(),
                profile_name: format!("{ecosystem} profile"),
            },
            balance,
        ));
        self
    }

    /// Fail every call as unavailable until cleared with `None`.
    pub fn set_outage(&self, reason: Option<&str>) {
        self.state.lock().outage = reason.map(str::to_string);
    }

    /// Script the status and counts a batch reports.
    pub fn set_batch(
        &self,
        batch_id: i64,
        status: BatchStatus,
        reject_reason: &str,
        processing: ProcessingInfo,
    ) {
        let mut state = self.state.lock();
        let batch = state.batches.entry(batch_id).or_default();
        batch.detail.batch_id = batch_id;
        batch.detail.status = status;
        batch.detail.reject_reason = reject_reason.to_string();
        batch.detail.active = processing.active > 0;
        batch.processing = processing;
    }

    /// Archive returned when the batch is downloaded.
    pub fn set_archive(&self, batch_id: i64, archive: Vec<u8>) {
        self.state
            .lock()
            .batches
            .entry(batch_id)
            .or_default()
            .archive = Some(archive);
    }

    /// Every batch submitted so far.
    pub fn submitted(&self) -> Vec<SubmittedBatch> {
        self.state.lock().submitted.clone()
    }

    /// Remaining balance on an authority.
    pub fn balance(&self, authority_id: i64) -> Option<i64> {
        self.state
            .lock()
            .authorities
            .iter()
            .find(|(a, _)| a.id == authority_id)
            .map(|(_, balance)| *balance)
    }

    /// Number of times an operation has been called.
    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    fn enter(&self, operation: &'static str) -> Result<parking_lot::MutexGuard<'_, MockState>, CaError> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_default() += 1;
        if let Some(reason) = &state.outage {
            return Err(CaError::Unavailable {
                operation,
                reason: reason.clone(),
            });
        }
        Ok(state)
    }
}

impl CertAuthority for MockCertAuthority {
    fn authenticate(&self) -> Result<(), CaError> {
        self.enter("authenticate").map(|_| ())
    }

    fn list_authorities(&self) -> Result<Vec<Authority>, CaError> {
        let state = self.enter("list_authorities")?;
        Ok(state.authorities.iter().map(|(a, _)| a.clone()).collect())
    }

    fn authority_balance(&self, authority_id: i64) -> Result<i64, CaError> {
        let state = self.enter("authority_balance")?;
        state
            .authorities
            .iter()
            .find(|(a, _)| a.id == authority_id)
            .map(|(_, balance)| *balance)
            .ok_or(CaError::NotFound {
                kind: "authority",
                id: authority_id,
            })
    }

    fn submit_batch(
        &self,
        authority_id: i64,
        batch_name: &str,
        params: &BatchParams,
    ) -> Result<BatchResponse, CaError> {
        let mut state = self.enter("submit_batch")?;
        let balance = state
            .authorities
            .iter_mut()
            .find(|(a, _)| a.id == authority_id)
            .map(|(_, balance)| balance)
            .ok_or(CaError::NotFound {
                kind: "authority",
                id: authority_id,
            })?;
        if *balance <= 0 {
            return Err(CaError::Rejected {
                operation: "submit_batch",
                status: 402,
                body: "no available balance".into(),
            });
        }
        *balance -= 1;

        state.next_batch_id += 1;
        let batch_id = 1000 + state.next_batch_id;
        let detail = BatchResponse {
            batch_id,
            order_number: 5000 + state.next_batch_id,
            creation_date: "2026-01-01T00:00:00Z".into(),
            profile: format!("authority {authority_id}"),
            size: 1,
            status: BatchStatus::Processing,
            active: true,
            batch_name: batch_name.to_string(),
            reject_reason: String::new(),
        };
        state.batches.insert(
            batch_id,
            MockBatch {
                detail: detail.clone(),
                processing: ProcessingInfo {
                    active: 1,
                    success: 0,
                    failed: 0,
                },
                archive: None,
            },
        );
        state.submitted.push(SubmittedBatch {
            batch_id,
            authority_id,
            batch_name: batch_name.to_string(),
            common_name: params.common_name.clone(),
            pkcs12_password: params.pkcs12_password.as_str().to_string(),
        });
        Ok(detail)
    }

    fn batch_detail(&self, batch_id: i64) -> Result<BatchResponse, CaError> {
        let state = self.enter("batch_detail")?;
        state
            .batches
            .get(&batch_id)
            .map(|b| b.detail.clone())
            .ok_or(CaError::NotFound {
                kind: "batch",
                id: batch_id,
            })
    }

    fn processing_status(&self, batch_id: i64) -> Result<ProcessingInfo, CaError> {
        let state = self.enter("processing_status")?;
        state
            .batches
            .get(&batch_id)
            .map(|b| b.processing)
            .ok_or(CaError::NotFound {
                kind: "batch",
                id: batch_id,
            })
    }

    fn download_batch(&self, batch_id: i64) -> Result<Vec<u8>, CaError> {
        let state = self.enter("download_batch")?;
        state
            .batches
            .get(&batch_id)
            .and_then(|b| b.archive.clone())
            .ok_or(CaError::NotFound {
                kind: "batch archive",
                id: batch_id,
            })
    }

    fn adapter_name(&self) -> &'static str {
        "MockCertAuthority"
    }
}
