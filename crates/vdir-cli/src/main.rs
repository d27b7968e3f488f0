//! # vdir CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vdir_cli::ca::{run_ca, CaArgs};
use vdir_cli::certreqs::{run_certreqs, CertReqArgs};
use vdir_cli::decrypt::{run_decrypt, DecryptArgs};
use vdir_cli::store::{run_store, StoreArgs};
use vdir_cli::{open_store, resolve_database};
use vdir_store::RecordStore;

/// VASP directory operator tool.
///
/// Store maintenance, certificate request inspection, certificate authority
/// queries and PKCS12 password recovery.
#[derive(Parser, Debug)]
#[command(name = "vdir", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Store connection string (`memory:`, `sqlite:<path>`). Falls back to
    /// `VDIR_DATABASE`.
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect VASP records and rebuild indices.
    Store(StoreArgs),

    /// Inspect certificate requests.
    Certreqs(CertReqArgs),

    /// Query the certificate authority account.
    Ca(CaArgs),

    /// Print the PKCS12 password of a certificate request.
    Decrypt(DecryptArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<u8> {
    let mut out = std::io::stdout().lock();
    match &cli.command {
        Commands::Store(args) => run_store(args, &store(cli)?, &mut out),
        Commands::Certreqs(args) => run_certreqs(args, &store(cli)?, &mut out),
        Commands::Decrypt(args) => run_decrypt(args, &store(cli)?, &mut out),
        Commands::Ca(args) => run_ca(args, &mut out),
    }
}

fn store(cli: &Cli) -> anyhow::Result<RecordStore> {
    let database = resolve_database(cli.database.as_deref());
    tracing::debug!(%database, "opening store");
    open_store(&database)
}
