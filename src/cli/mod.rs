//! CLI module for trackdb
//!
//! Thin operator front end over the backup and restore managers:
//! - backup full|incremental: create a backup
//! - list, show, verify, delete, prune: catalog maintenance
//! - restore, restore-at, restore-tables: restoration
//! - validate: dry-run a restoration

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{BackupCommand, Cli, Command};
pub use commands::{run, run_command, LOG_ENV};
pub use config::Config;
pub use errors::{CliError, CliResult};
pub use io::{write_error, write_response};
