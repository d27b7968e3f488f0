//! # CA Subcommand
//!
//! Read-only queries against the certificate authority account, plus a
//! manual archive download for batches the cert manager could not fetch.
//!
//! The HTTP client is synchronous over a tokio runtime, so
//! [`run_ca`] enters a multi-threaded runtime before building it.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};

use vdir_ca_client::{CertAuthority, HttpCertAuthority, SectigoConfig};

/// Arguments for the `vdir ca` subcommand.
#[derive(Args, Debug)]
pub struct CaArgs {
    #[command(subcommand)]
    pub command: CaCommand,
}

/// CA subcommands.
#[derive(Subcommand, Debug)]
pub enum CaCommand {
    /// List the authorities available to the account.
    Authorities,

    /// Show the remaining certificate balance of an authority.
    Balance {
        /// Authority id.
        authority: i64,
    },

    /// Show a batch's detail and processing counts.
    Batch {
        /// Batch id.
        id: i64,
    },

    /// Download a batch archive to `<out>/<id>.zip`.
    Download {
        /// Batch id.
        id: i64,

        /// Output directory.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

/// Execute a CA subcommand against the configured Sectigo account.
pub fn run_ca(args: &CaArgs, out: &mut dyn Write) -> anyhow::Result<u8> {
    let config = SectigoConfig::from_env().context("loading CA configuration")?;
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let _guard = runtime.enter();
    let authority = HttpCertAuthority::new(config)?;
    run_ca_with(args, &authority, out)
}

/// Execute a CA subcommand against `authority`.
pub fn run_ca_with(
    args: &CaArgs,
    authority: &dyn CertAuthority,
    out: &mut dyn Write,
) -> anyhow::Result<u8> {
    tracing::debug!(adapter = authority.adapter_name(), "running CA command");
    match &args.command {
        CaCommand::Authorities => {
            for a in authority.list_authorities()? {
                writeln!(out, "{}\t{}\t{}", a.id, a.ecosystem, a.profile_name)?;
            }
        }
        CaCommand::Balance { authority: id } => {
            let balance = authority
                .authority_balance(*id)
                .with_context(|| format!("fetching balance of authority {id}"))?;
            writeln!(out, "authority {id}: {balance} certificates remaining")?;
        }
        CaCommand::Batch { id } => {
            let detail = authority
                .batch_detail(*id)
                .with_context(|| format!("fetching batch {id}"))?;
            let processing = authority.processing_status(*id)?;
            let report = serde_json::json!({
                "detail": detail,
                "processing": processing,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        }
        CaCommand::Download { id, out: dir } => {
            let archive = authority
                .download_batch(*id)
                .with_context(|| format!("downloading batch {id}"))?;
            let path = write_archive(dir, *id, &archive)?;
            tracing::info!(batch_id = id, bytes = archive.len(), path = %path.display(), "archive saved");
            writeln!(out, "OK: wrote {} ({} bytes)", path.display(), archive.len())?;
        }
    }
    Ok(0)
}

fn write_archive(dir: &Path, batch_id: i64, archive: &[u8]) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{batch_id}.zip"));
    std::fs::write(&path, archive).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::output;
    use vdir_ca_client::{BatchParams, BatchStatus, MockCertAuthority, ProcessingInfo};

    fn run(ca: &MockCertAuthority, command: CaCommand) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        run_ca_with(&CaArgs { command }, ca, &mut buf)?;
        Ok(output(buf))
    }

    fn mock_with_batch() -> (MockCertAuthority, i64) {
        let ca = MockCertAuthority::new().with_authority(7, "TestNet", 3);
        let batch = ca
            .submit_batch(7, "vdir-test", &BatchParams::new("trisa.alice.io", "secret"))
            .unwrap();
        (ca, batch.batch_id)
    }

    #[test]
    fn authorities_and_balance() {
        let ca = MockCertAuthority::new().with_authority(7, "TestNet", 3);
        let listed = run(&ca, CaCommand::Authorities).unwrap();
        assert_eq!(listed.trim(), "7\tTestNet\tTestNet profile");
        assert_eq!(
            run(&ca, CaCommand::Balance { authority: 7 }).unwrap().trim(),
            "authority 7: 3 certificates remaining"
        );
    }

    #[test]
    fn batch_reports_detail_and_processing() {
        let (ca, id) = mock_with_batch();
        ca.set_batch(
            id,
            BatchStatus::Rejected,
            "bad CSR",
            ProcessingInfo {
                active: 0,
                success: 0,
                failed: 1,
            },
        );

        let out = run(&ca, CaCommand::Batch { id }).unwrap();
        let report: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["detail"]["batchId"], id);
        assert_eq!(report["detail"]["rejectReason"], "bad CSR");
        assert_eq!(report["processing"]["failed"], 1);
    }

    #[test]
    fn download_writes_archive_named_by_batch() {
        let (ca, id) = mock_with_batch();
        ca.set_archive(id, b"PK-archive".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("archives");

        let out = run(
            &ca,
            CaCommand::Download {
                id,
                out: target.clone(),
            },
        )
        .unwrap();
        assert!(out.starts_with("OK: wrote"));
        assert_eq!(
            std::fs::read(target.join(format!("{id}.zip"))).unwrap(),
            b"PK-archive"
        );
    }

    #[test]
    fn unknown_batch_fails_with_context() {
        let ca = MockCertAuthority::new();
        let err = run(&ca, CaCommand::Batch { id: 99 }).unwrap_err();
        assert!(format!("{err:#}").starts_with("fetching batch 99"));
    }
}
