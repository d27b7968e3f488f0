//! # Registration Workflows
//!
//! Register, contact verification and admin review. Each step mutates the
//! record in memory, sends its email, and persists only once the email went
//! out, so a failed send can be retried with the same token.
//!
//! These functions block: the mailer waits on the runtime for delivery.
//! Handlers run them through [`tokio::task::spawn_blocking`].

use vdir_core::{
    CertificateRequest, CertificateRequestState, ServiceState, Vasp, VaspId, VerificationState,
};
use vdir_crypto::create_token;

use crate::auth::constant_time_token_eq;
use crate::error::AppError;
use crate::state::AppState;

/// Length of the per-contact email verification token.
pub const CONTACT_TOKEN_LEN: usize = 48;

/// Length of the token the review email hands to administrators.
pub const ADMIN_TOKEN_LEN: usize = 48;

/// Length of the generated PKCS12 password.
pub const PKCS12_PASSWORD_LEN: usize = 16;

/// Outcome of a contact verification.
#[derive(Debug)]
pub struct Verification {
    pub vasp: Vasp,
    /// Plaintext PKCS12 password, present only on the first verification.
    pub pkcs12_password: Option<String>,
}

/// Derive a TLS common name from a `host:port` endpoint.
pub fn host_from_endpoint(endpoint: &str) -> Result<String, AppError> {
    let endpoint = endpoint.trim();
    let invalid = |reason: &str| AppError::BadRequest(format!("address {endpoint}: {reason}"));

    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port in address"))?;
    let host = match host.strip_prefix('[') {
        Some(inner) => inner
            .strip_suffix(']')
            .ok_or_else(|| invalid("missing ']' in address"))?,
        None if host.contains(':') => return Err(invalid("too many colons in address")),
        None => host,
    };
    if host.is_empty() {
        return Err(invalid("missing host in address"));
    }
    port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
    Ok(host.to_string())
}

/// Create a VASP record and email a verification token to each contact.
///
/// Server-managed fields on `vasp` are reset: the record always starts
/// `SUBMITTED` with unverified contacts and no certificate.
pub fn register(state: &AppState, mut vasp: Vasp) -> Result<Vasp, AppError> {
    vasp.id = VaspId::UNASSIGNED;
    vasp.registered_directory = state.directory_id.clone();
    vasp.verification_status = VerificationState::Submitted;
    vasp.service_status = ServiceState::Unknown;
    vasp.certificate = None;
    vasp.verified_on = None;
    vasp.admin_verification_token = None;
    for contact in vasp.contacts.iter_mut() {
        contact.verified = false;
        contact.token = None;
    }

    if vasp.common_name.trim().is_empty() && !vasp.endpoint.trim().is_empty() {
        vasp.common_name = host_from_endpoint(&vasp.endpoint)?;
    }

    state.store.create_vasp(&mut vasp)?;
    tracing::info!(vasp_id = %vasp.id, name = %vasp.name, "registered VASP");

    for contact in vasp.contacts.iter_mut().filter(|c| c.has_email()) {
        contact.token = Some(create_token(CONTACT_TOKEN_LEN));
    }
    state.store.update_vasp(&mut vasp)?;

    let sent = state.notifier.verify_contacts(&vasp)?;
    tracing::info!(vasp_id = %vasp.id, sent, "contact email verifications sent");
    Ok(vasp)
}

/// Mark the contact holding `token` as verified.
///
/// The first verified contact moves the record to `PENDING_REVIEW`: the
/// admins get a review request, and an `INITIALIZED` certificate request is
/// stored with a freshly generated, encrypted PKCS12 password. The password
/// is returned once and never stored in the clear.
pub fn verify_email(state: &AppState, id: VaspId, token: &str) -> Result<Verification, AppError> {
    let mut vasp = state.store.retrieve_vasp(id)?;

    let mut found = false;
    for contact in vasp.contacts.iter_mut() {
        let matches = contact
            .token
            .as_deref()
            .is_some_and(|expected| constant_time_token_eq(token, expected));
        if matches {
            contact.verified = true;
            contact.token = None;
            found = true;
            tracing::info!(vasp_id = %id, email = %contact.email, "contact email verified");
        }
    }
    if !found {
        return Err(AppError::NotFound(
            "could not find contact with specified token".into(),
        ));
    }

    if vasp.contacts.verified_count() > 1 {
        state.store.update_vasp(&mut vasp)?;
        return Ok(Verification {
            vasp,
            pkcs12_password: None,
        });
    }

    vasp.verification_status = VerificationState::EmailVerified;
    vasp.admin_verification_token = Some(create_token(ADMIN_TOKEN_LEN));
    state.notifier.review_request(&vasp)?;
    vasp.verification_status = VerificationState::PendingReview;

    let password = create_token(PKCS12_PASSWORD_LEN);
    let (ciphertext, signature) = state.secrets.encrypt(&password)?;
    let mut request =
        CertificateRequest::new(vasp.id, vasp.common_name.clone(), ciphertext, signature);
    state.store.create_cert_req(&mut request)?;
    state.store.update_vasp(&mut vasp)?;

    tracing::info!(
        vasp_id = %vasp.id,
        request_id = %request.id,
        "verification review sent; certificate request initialized"
    );
    Ok(Verification {
        vasp,
        pkcs12_password: Some(password),
    })
}

/// Accept or reject a registration awaiting review.
///
/// `token` must match the record's admin verification token. Accepting
/// releases the certificate request to the cert manager; rejecting closes
/// it with `reject_reason`.
pub fn review(
    state: &AppState,
    id: VaspId,
    token: &str,
    accept: bool,
    reject_reason: &str,
) -> Result<Vasp, AppError> {
    let mut vasp = state.store.retrieve_vasp(id)?;

    if vasp.verification_status != VerificationState::PendingReview {
        return Err(AppError::Conflict(format!(
            "VASP {id} is {}; review requires {}",
            vasp.verification_status,
            VerificationState::PendingReview
        )));
    }
    let authorized = vasp
        .admin_verification_token
        .as_deref()
        .is_some_and(|expected| constant_time_token_eq(token, expected));
    if !authorized {
        tracing::warn!(vasp_id = %id, "review attempted with invalid admin verification token");
        return Err(AppError::Forbidden(
            "admin verification token does not match".into(),
        ));
    }

    let mut request = state
        .store
        .cert_reqs_for_vasp(id)?
        .into_iter()
        .rev()
        .find(|r| r.status == CertificateRequestState::Initialized)
        .ok_or_else(|| {
            AppError::Conflict(format!("VASP {id} has no certificate request awaiting review"))
        })?;

    if accept {
        request.transition(CertificateRequestState::ReadyToSubmit)?;
        vasp.verification_status = VerificationState::Reviewed;
    } else {
        request.transition(CertificateRequestState::Rejected)?;
        request.reject_reason = reject_reason.trim().to_string();
        vasp.verification_status = VerificationState::Rejected;
    }
    vasp.admin_verification_token = None;

    // The cert manager acts on the request and then advances the VASP, so
    // the VASP must already be written when the request is released.
    state.store.update_vasp(&mut vasp)?;
    state.store.update_cert_req(&mut request)?;

    tracing::info!(
        vasp_id = %id,
        request_id = %request.id,
        accepted = accept,
        "registration reviewed"
    );
    Ok(vasp)
}
