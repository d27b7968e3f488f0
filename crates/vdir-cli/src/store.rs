//! # Store Subcommand
//!
//! Inspect VASP records and rebuild the secondary indices.

use std::io::Write;

use anyhow::Context;
use clap::{Args, Subcommand};

use vdir_core::VaspId;
use vdir_store::RecordStore;

/// Arguments for the `vdir store` subcommand.
#[derive(Args, Debug)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub command: StoreCommand,
}

/// Store subcommands.
#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    /// Rebuild the name, common name and country indices from the records.
    Reindex,

    /// List every VASP record, one per line.
    List,

    /// Print one VASP record as JSON.
    Show {
        /// VASP id.
        id: VaspId,
    },
}

/// Execute a store subcommand.
pub fn run_store(args: &StoreArgs, store: &RecordStore, out: &mut dyn Write) -> anyhow::Result<u8> {
    match &args.command {
        StoreCommand::Reindex => {
            let count = store.reindex().context("reindexing store")?;
            tracing::info!(count, "indices rebuilt");
            writeln!(out, "OK: reindexed {count} VASP records")?;
        }
        StoreCommand::List => {
            let vasps = store.list_vasps()?;
            for vasp in &vasps {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    vasp.id, vasp.name, vasp.common_name, vasp.country, vasp.verification_status
                )?;
            }
            tracing::debug!(count = vasps.len(), "listed VASP records");
        }
        StoreCommand::Show { id } => {
            let vasp = store.retrieve_vasp(*id)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&vasp)?)?;
        }
    }
    Ok(0)
}
