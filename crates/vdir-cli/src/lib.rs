//! # vdir-cli — VASP Directory Operator Tool
//!
//! Maintenance commands run against the directory's record store and the
//! certificate authority account:
//!
//! - `vdir store reindex` rebuilds the secondary indices from the records.
//! - `vdir store list` / `vdir store show <id>` inspect VASP records.
//! - `vdir certreqs list` shows certificate requests and their batches.
//! - `vdir ca authorities|balance|batch|download` query the CA account.
//! - `vdir decrypt <certreq-id>` recovers a PKCS12 password for support.
//!
//! Each subcommand module exposes an `Args` struct and a `run_*` function
//! returning the process exit code. Output goes to the writer passed in so
//! the commands can be exercised without a terminal.

pub mod ca;
pub mod certreqs;
pub mod decrypt;
pub mod store;

use anyhow::Context;
use vdir_store::RecordStore;

/// Connection string used when neither `--database` nor `VDIR_DATABASE` is set.
pub const DEFAULT_DATABASE: &str = "memory:";

/// Resolve the connection string: flag, then environment, then default.
pub fn resolve_database(flag: Option<&str>) -> String {
    flag.map(str::to_string)
        .or_else(|| std::env::var("VDIR_DATABASE").ok())
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string())
}

/// Open the record store named by `database`.
pub fn open_store(database: &str) -> anyhow::Result<RecordStore> {
    if database.trim() == DEFAULT_DATABASE {
        tracing::warn!("using a volatile in-memory store; set --database or VDIR_DATABASE");
    }
    vdir_store::open(database).with_context(|| format!("opening store {database}"))
}
