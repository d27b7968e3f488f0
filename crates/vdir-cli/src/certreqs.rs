//! # Certreqs Subcommand
//!
//! Certificate requests as the cert manager sees them: state, CA batch and
//! reject reason.

use std::io::Write;

use clap::{Args, Subcommand};

use vdir_core::{CertificateRequest, VaspId};
use vdir_store::RecordStore;

/// Arguments for the `vdir certreqs` subcommand.
#[derive(Args, Debug)]
pub struct CertReqArgs {
    #[command(subcommand)]
    pub command: CertReqCommand,
}

/// Certificate request subcommands.
#[derive(Subcommand, Debug)]
pub enum CertReqCommand {
    /// List certificate requests, optionally for a single VASP.
    List {
        /// Only show requests for this VASP.
        #[arg(long)]
        vasp: Option<VaspId>,
    },
}

/// Execute a certreqs subcommand.
pub fn run_certreqs(
    args: &CertReqArgs,
    store: &RecordStore,
    out: &mut dyn Write,
) -> anyhow::Result<u8> {
    match &args.command {
        CertReqCommand::List { vasp } => {
            let requests = match vasp {
                Some(id) => store.cert_reqs_for_vasp(*id)?,
                None => store.list_cert_reqs()?,
            };
            for request in &requests {
                writeln!(out, "{}", summary(request))?;
            }
            tracing::debug!(count = requests.len(), "listed certificate requests");
        }
    }
    Ok(0)
}

fn summary(request: &CertificateRequest) -> String {
    let batch = request
        .batch_id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    let mut line = format!(
        "{}\tvasp={}\t{}\t{}\tbatch={}",
        request.id, request.vasp, request.common_name, request.status, batch
    );
    if !request.reject_reason.is_empty() {
        line.push_str(&format!("\treason={}", request.reject_reason));
    }
    line
}
