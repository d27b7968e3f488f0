//! # Decrypt Subcommand
//!
//! Recover the PKCS12 password of a certificate request. Used by support
//! staff when a member lost the password returned at verification.

use std::io::Write;

use anyhow::Context;
use clap::Args;

use vdir_core::CertReqId;
use vdir_crypto::SecretBox;
use vdir_store::RecordStore;

/// Arguments for the `vdir decrypt` subcommand.
#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Certificate request id.
    pub certreq: CertReqId,
}

/// Decrypt with the key in `VDIR_SECRET_KEY`.
pub fn run_decrypt(args: &DecryptArgs, store: &RecordStore, out: &mut dyn Write) -> anyhow::Result<u8> {
    let key = std::env::var("VDIR_SECRET_KEY").context("VDIR_SECRET_KEY must be set")?;
    let secrets = SecretBox::new(&key)?;
    run_decrypt_with(args, store, &secrets, out)
}

/// Decrypt with an explicit secret box.
pub fn run_decrypt_with(
    args: &DecryptArgs,
    store: &RecordStore,
    secrets: &SecretBox,
    out: &mut dyn Write,
) -> anyhow::Result<u8> {
    let request = store.retrieve_cert_req(args.certreq)?;
    let password = secrets
        .decrypt(&request.pkcs12_password, &request.pkcs12_signature)
        .with_context(|| format!("decrypting password of certificate request {}", request.id))?;
    tracing::warn!(request_id = %request.id, vasp_id = %request.vasp, "PKCS12 password decrypted");
    writeln!(out, "{password}")?;
    Ok(0)
}
