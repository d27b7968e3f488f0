//! # Issuance Pipeline Steps
//!
//! Each method advances one certificate request by one step and persists
//! the result before returning. The steps are synchronous: they call the CA
//! and the store directly and are run by [`crate::CertManager`] on the
//! blocking thread pool.
//!
//! ## Steps
//!
//! | From | Step | To |
//! |------|------|----|
//! | `READY_TO_SUBMIT` | [`Pipeline::submit`] | `PROCESSING` |
//! | `PROCESSING` | [`Pipeline::check`] | `PROCESSING`, `DOWNLOADING`, `CR_REJECTED`, `CR_ERRORED` |
//! | `DOWNLOADING` | [`Pipeline::download`] | `DOWNLOADED`, `CR_ERRORED` |
//! | `DOWNLOADED` | [`Pipeline::complete`] | `COMPLETED` |
//!
//! A step that fails with a transient error leaves the request untouched so
//! the next tick repeats it. The linked VASP is moved to
//! `ISSUING_CERTIFICATE` on submission and to `VERIFIED` on completion; a
//! rejected or errored request leaves it at `ISSUING_CERTIFICATE`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use vdir_ca_client::{BatchParams, BatchStatus, CertAuthority};
use vdir_core::{
    CertReqId, Certificate, CertificateRequest, CertificateRequestState, VerificationState,
};
use vdir_crypto::SecretBox;
use vdir_email::Notifier;
use vdir_store::RecordStore;

use crate::archive::{single_entry, ArchiveStore};
use crate::error::CertManError;

/// Result of polling a processing batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The CA is still working on the batch.
    StillProcessing,
    /// The batch is ready; the request is now `DOWNLOADING`.
    ReadyForDownload,
    /// The CA rejected the batch; the request is `CR_REJECTED`.
    Rejected,
    /// The batch failed without a rejection; the request is `CR_ERRORED`.
    Errored,
    /// The CA reported a combination the pipeline does not act on.
    Unexpected,
}

/// What one scan of the request table did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub scanned: usize,
    pub submitted: usize,
    pub polled: usize,
    pub failed: usize,
    /// Requests that need a download task.
    pub to_download: Vec<CertReqId>,
}

/// The collaborators a pipeline step needs.
pub struct Pipeline {
    store: Arc<RecordStore>,
    authority: Arc<dyn CertAuthority>,
    secrets: Arc<SecretBox>,
    notifier: Notifier,
    archives: ArchiveStore,
    directory_id: String,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("authority", &self.authority.adapter_name())
            .field("notifier", &self.notifier)
            .field("archives", &self.archives)
            .field("directory_id", &self.directory_id)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        store: Arc<RecordStore>,
        authority: Arc<dyn CertAuthority>,
        secrets: Arc<SecretBox>,
        notifier: Notifier,
        archives: ArchiveStore,
        directory_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            authority,
            secrets,
            notifier,
            archives,
            directory_id: directory_id.into(),
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn archives(&self) -> &ArchiveStore {
        &self.archives
    }

    /// Advance every open request one step.
    ///
    /// Requests in `DOWNLOADING` or `DOWNLOADED` whose id is not in
    /// `in_flight` are returned for a download task, which resumes work a
    /// previous process left unfinished.
    pub fn scan(&self, in_flight: &HashSet<CertReqId>) -> ScanReport {
        let mut report = ScanReport::default();
        let requests = match self.store.list_cert_reqs() {
            Ok(requests) => requests,
            Err(e) => {
                tracing::error!(error = %e, "cert manager could not list certificate requests");
                report.failed += 1;
                return report;
            }
        };

        for mut req in requests.into_iter().filter(|r| !r.status.is_terminal()) {
            report.scanned += 1;
            let span = tracing::info_span!(
                "certreq",
                request_id = %req.id,
                common_name = %req.common_name
            );
            let _enter = span.enter();

            match req.status {
                CertificateRequestState::ReadyToSubmit => match self.submit(&mut req) {
                    Ok(()) => {
                        report.submitted += 1;
                        tracing::info!(batch_id = ?req.batch_id, "certificate request submitted");
                    }
                    Err(e) => {
                        report.failed += 1;
                        log_step_error("submit", &e);
                    }
                },
                CertificateRequestState::Processing => match self.check(&mut req) {
                    Ok(outcome) => {
                        report.polled += 1;
                        tracing::debug!(?outcome, "processing check complete");
                        if outcome == CheckOutcome::ReadyForDownload {
                            report.to_download.push(req.id);
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        log_step_error("check", &e);
                    }
                },
                CertificateRequestState::Downloading | CertificateRequestState::Downloaded => {
                    if !in_flight.contains(&req.id) {
                        tracing::info!(status = %req.status, "resuming certificate download");
                        report.to_download.push(req.id);
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(
            scanned = report.scanned,
            submitted = report.submitted,
            polled = report.polled,
            failed = report.failed,
            "cert manager scan complete"
        );
        report
    }

    /// Submit a `READY_TO_SUBMIT` request to the CA.
    pub fn submit(&self, req: &mut CertificateRequest) -> Result<(), CertManError> {
        let mut vasp = self.store.retrieve_vasp(req.vasp)?;
        if vasp.verification_status != VerificationState::IssuingCertificate {
            vasp.verification_status = VerificationState::IssuingCertificate;
            self.store.update_vasp(&mut vasp)?;
        }

        let authority_id = self.find_authority()?;

        let password = self
            .secrets
            .decrypt(&req.pkcs12_password, &req.pkcs12_signature)
            .map_err(CertManError::Password)?;
        let params = BatchParams::new(req.common_name.clone(), password);

        let batch_name = format!(
            "{} certificate request for {} (id: {})",
            self.directory_id, req.common_name, req.id
        );
        let batch = self
            .authority
            .submit_batch(authority_id, &batch_name, &params)?;

        req.authority_id = Some(authority_id);
        req.batch_id = Some(batch.batch_id);
        req.batch_name = if batch.batch_name.is_empty() {
            batch_name
        } else {
            batch.batch_name
        };
        req.batch_status = batch.status.to_string();
        req.order_number = Some(batch.order_number);
        req.creation_date = batch.creation_date;
        req.profile = batch.profile;
        req.reject_reason = batch.reject_reason;
        req.transition(CertificateRequestState::Processing)?;
        self.store.update_cert_req(req)?;
        Ok(())
    }

    /// The first authority reporting a strictly positive balance.
    ///
    /// Balance lookup failures are logged and the authority skipped.
    pub fn find_authority(&self) -> Result<i64, CertManError> {
        let authorities = self.authority.list_authorities()?;
        for authority in &authorities {
            match self.authority.authority_balance(authority.id) {
                Ok(balance) if balance > 0 => return Ok(authority.id),
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(authority = authority.id, error = %e, "could not fetch authority balance")
                }
            }
        }
        Err(CertManError::NoAuthorityBalance {
            authorities: authorities.len(),
        })
    }

    /// Poll a `PROCESSING` request's batch and act on the counts.
    pub fn check(&self, req: &mut CertificateRequest) -> Result<CheckOutcome, CertManError> {
        let batch_id = req.batch_id.ok_or_else(|| CertManError::MissingBatch {
            request_id: req.id.to_string(),
        })?;

        let detail = self.authority.batch_detail(batch_id)?;
        req.batch_status = detail.status.to_string();
        req.reject_reason = detail.reject_reason.clone();

        let info = self.authority.processing_status(batch_id)?;
        tracing::debug!(
            batch_id,
            status = %detail.status,
            reject = %req.reject_reason,
            active = info.active,
            failed = info.failed,
            success = info.success,
            "batch processing status"
        );

        if info.active > 0 {
            req.transition(CertificateRequestState::Processing)?;
            self.store.update_cert_req(req)?;
            return Ok(CheckOutcome::StillProcessing);
        }

        let ready = detail.status == BatchStatus::ReadyForDownload;
        if info.failed > 0 {
            if info.success > 0 || ready {
                tracing::warn!(
                    batch_id,
                    failed = info.failed,
                    success = info.success,
                    status = %detail.status,
                    "certificate batch mixed success and failure"
                );
            } else {
                let (state, outcome) =
                    if !req.reject_reason.is_empty() || detail.status.is_rejection() {
                        (CertificateRequestState::Rejected, CheckOutcome::Rejected)
                    } else {
                        (CertificateRequestState::Errored, CheckOutcome::Errored)
                    };
                tracing::warn!(
                    batch_id,
                    failed = info.failed,
                    status = %detail.status,
                    reason = %req.reject_reason,
                    result = %state,
                    "certificate batch failed"
                );
                req.transition(state)?;
                self.store.update_cert_req(req)?;
                return Ok(outcome);
            }
        }

        if info.success == 0 || !ready {
            tracing::error!(batch_id, status = %detail.status, "unhandled certificate batch state");
            req.transition(CertificateRequestState::Processing)?;
            self.store.update_cert_req(req)?;
            return Ok(CheckOutcome::Unexpected);
        }

        req.transition(CertificateRequestState::Downloading)?;
        self.store.update_cert_req(req)?;
        Ok(CheckOutcome::ReadyForDownload)
    }

    /// Fetch, store and extract a `DOWNLOADING` request's certificate, then
    /// complete it.
    ///
    /// An archive saved by an earlier attempt is reused instead of fetched
    /// again. Transient CA and storage errors leave the request in
    /// `DOWNLOADING` for the next tick; any other failure ends it in
    /// `CR_ERRORED`.
    pub fn download(&self, req: &mut CertificateRequest) -> Result<(), CertManError> {
        let batch_id = req.batch_id.ok_or_else(|| CertManError::MissingBatch {
            request_id: req.id.to_string(),
        })?;

        let certificate = match self.fetch_certificate(req, batch_id) {
            Ok(certificate) => certificate,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                tracing::warn!(batch_id, error = %e, "certificate download failed permanently");
                req.transition(CertificateRequestState::Errored)?;
                self.store.update_cert_req(req)?;
                return Err(e);
            }
        };
        tracing::info!(batch_id, serial_number = %certificate.serial_number, "certificate downloaded");

        req.certificate = Some(certificate);
        req.transition(CertificateRequestState::Downloaded)?;
        self.store.update_cert_req(req)?;

        self.complete(req)
    }

    /// Extract the certificate from the saved archive, downloading and
    /// saving the archive first if there is none.
    fn fetch_certificate(
        &self,
        req: &CertificateRequest,
        batch_id: i64,
    ) -> Result<Certificate, CertManError> {
        let archive = match self.archives.load(batch_id) {
            Ok(archive) => {
                tracing::info!(batch_id, "using previously saved certificate archive");
                archive
            }
            Err(CertManError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                let archive = self.authority.download_batch(batch_id)?;
                self.archives.save(batch_id, &archive)?;
                archive
            }
            Err(e) => return Err(e),
        };
        self.extract(req, batch_id, &archive)
    }

    /// Attach a `DOWNLOADED` request's certificate to its VASP, deliver the
    /// archive and mark the request `COMPLETED`.
    ///
    /// Delivery failures are logged only.
    pub fn complete(&self, req: &mut CertificateRequest) -> Result<(), CertManError> {
        let batch_id = req.batch_id.ok_or_else(|| CertManError::MissingBatch {
            request_id: req.id.to_string(),
        })?;
        let certificate = match req.certificate.clone() {
            Some(certificate) => certificate,
            None => {
                let archive = self.archives.load(batch_id)?;
                self.extract(req, batch_id, &archive)?
            }
        };

        let mut vasp = self.store.retrieve_vasp(req.vasp)?;
        let serial = certificate.serial_number.clone();
        vasp.attach_certificate(certificate, Utc::now());
        self.store.update_vasp(&mut vasp)?;

        let filename = ArchiveStore::filename(batch_id);
        match self.archives.load(batch_id) {
            Ok(archive) => {
                if let Err(e) = self.notifier.deliver_certificate(&vasp, &filename, archive) {
                    tracing::error!(vasp_id = %vasp.id, error = %e, "could not deliver certificate");
                }
            }
            Err(e) => {
                tracing::error!(vasp_id = %vasp.id, error = %e, "certificate archive missing; not delivered")
            }
        }

        req.certificate = None;
        req.transition(CertificateRequestState::Completed)?;
        self.store.update_cert_req(req)?;
        tracing::info!(vasp_id = %vasp.id, serial_number = %serial, "certificate issued and delivered");
        Ok(())
    }

    /// Run the download or completion step for a request by id.
    pub fn resume(&self, id: CertReqId) -> Result<(), CertManError> {
        let mut req = self.store.retrieve_cert_req(id)?;
        match req.status {
            CertificateRequestState::Downloading => self.download(&mut req),
            CertificateRequestState::Downloaded => self.complete(&mut req),
            _ => Ok(()),
        }
    }

    fn extract(
        &self,
        req: &CertificateRequest,
        batch_id: i64,
        archive: &[u8],
    ) -> Result<Certificate, CertManError> {
        let bundle = single_entry(batch_id, archive)?;
        let password = self
            .secrets
            .decrypt(&req.pkcs12_password, &req.pkcs12_signature)
            .map_err(CertManError::Password)?;
        vdir_crypto::extract_certificate(&bundle, &password).map_err(CertManError::Extraction)
    }
}

pub(crate) fn log_step_error(step: &'static str, e: &CertManError) {
    if e.is_transient() {
        tracing::warn!(step, error = %e, "certificate request step failed; retrying next tick");
    } else {
        tracing::error!(step, error = %e, "certificate request step failed");
    }
}
