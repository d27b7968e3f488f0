//! # PKCS12 Certificate Extraction
//!
//! The CA delivers each issued certificate as a password-protected PKCS12
//! bundle. This module unlocks the bundle and converts its leaf certificate
//! into the directory's [`Certificate`] record: version, serial number,
//! signature and public-key algorithms, subject and issuer names, validity
//! window and PEM encoding.
//!
//! Only the leaf certificate is recorded; any chain certificates in the
//! bundle are ignored.

use chrono::{DateTime, TimeZone, Utc};
use openssl::asn1::{Asn1StringRef, Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::Id;
use openssl::x509::{X509NameRef, X509Ref};

use vdir_core::{Certificate, Name};

use crate::error::CryptoError;

/// Unlock a DER-encoded PKCS12 bundle with `password` and extract its leaf.
pub fn extract_certificate(pkcs12_der: &[u8], password: &str) -> Result<Certificate, CryptoError> {
    let bundle = Pkcs12::from_der(pkcs12_der)
        .map_err(|e| CryptoError::Pkcs12(format!("could not decode bundle: {e}")))?;
    let parsed = bundle
        .parse2(password)
        .map_err(|e| CryptoError::Pkcs12(format!("could not unlock bundle: {e}")))?;
    let cert = parsed
        .cert
        .ok_or_else(|| CryptoError::Pkcs12("bundle contains no leaf certificate".into()))?;
    certificate_from_x509(&cert)
}

/// Convert an X.509 certificate into a directory [`Certificate`].
pub fn certificate_from_x509(cert: &X509Ref) -> Result<Certificate, CryptoError> {
    let serial_number = cert.serial_number().to_bn()?.to_hex_str()?.to_string();
    let signature_algorithm = cert
        .signature_algorithm()
        .object()
        .nid()
        .long_name()?
        .to_string();
    let public_key_algorithm = match cert.public_key()?.id() {
        Id::RSA => "RSA",
        Id::DSA => "DSA",
        Id::EC => "ECDSA",
        Id::ED25519 => "Ed25519",
        _ => "UnknownPublicKeyAlgorithm",
    }
    .to_string();

    let data = String::from_utf8(cert.to_pem()?)
        .map_err(|e| CryptoError::Certificate(format!("PEM is not UTF-8: {e}")))?;

    Ok(Certificate {
        // X.509 stores the version zero-based.
        version: i64::from(cert.version()) + 1,
        serial_number,
        signature_algorithm,
        public_key_algorithm,
        subject: name_from_x509(cert.subject_name())?,
        issuer: name_from_x509(cert.issuer_name())?,
        not_before: asn1_to_utc(cert.not_before())?,
        not_after: asn1_to_utc(cert.not_after())?,
        revoked: false,
        data,
    })
}

fn entries(name: &X509NameRef, nid: Nid) -> Result<Vec<String>, CryptoError> {
    name.entries_by_nid(nid)
        .map(|entry| entry_text(entry.data()))
        .collect()
}

/// Decode a name entry to UTF-8, refusing values with an embedded NUL.
///
/// The UTF-8 conversion stops at the first NUL, so `trisa.alice.io\0.evil`
/// would otherwise read back as `trisa.alice.io`.
fn entry_text(data: &Asn1StringRef) -> Result<String, CryptoError> {
    let text = data.as_utf8()?.to_string();
    let raw = data.as_slice();
    if let Some(nul) = raw.iter().position(|&b| b == 0) {
        if raw[..nul] == *text.as_bytes() {
            return Err(CryptoError::Certificate(format!(
                "name entry {text:?} contains an embedded NUL"
            )));
        }
    }
    Ok(text)
}

fn name_from_x509(name: &X509NameRef) -> Result<Name, CryptoError> {
    Ok(Name {
        common_name: entries(name, Nid::COMMONNAME)?
            .into_iter()
            .next()
            .unwrap_or_default(),
        serial_number: entries(name, Nid::SERIALNUMBER)?
            .into_iter()
            .next()
            .unwrap_or_default(),
        organization: entries(name, Nid::ORGANIZATIONNAME)?,
        organizational_unit: entries(name, Nid::ORGANIZATIONALUNITNAME)?,
        street_address: entries(name, Nid::STREETADDRESS)?,
        locality: entries(name, Nid::LOCALITYNAME)?,
        province: entries(name, Nid::STATEORPROVINCENAME)?,
        postal_code: entries(name, Nid::POSTALCODE)?,
        country: entries(name, Nid::COUNTRYNAME)?,
    })
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, CryptoError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| CryptoError::Certificate(format!("timestamp out of range: {secs}")))
}
