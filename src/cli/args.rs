//! CLI argument definitions using clap
//!
//! Commands:
//! - trackdb backup full|incremental
//! - trackdb list | show | verify | delete | prune
//! - trackdb restore | restore-at | restore-tables | validate

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::backup::{BackupKind, BackupStatus};

/// trackdb - backup and point-in-time restore for the task store
#[derive(Parser, Debug)]
#[command(name = "trackdb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./trackdb.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a backup
    Backup {
        #[command(subcommand)]
        kind: BackupCommand,
    },

    /// List backups, newest first
    List {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one backup's catalog record
    Show { id: String },

    /// Verify a backup's artifact against the catalog
    Verify { id: String },

    /// Delete a backup and its artifact
    Delete { id: String },

    /// Delete expired backups
    Prune,

    /// Restore the state captured by a backup
    Restore {
        id: String,
        /// Take a full backup of the current state first
        #[arg(long)]
        preserve: bool,
        /// Skip artifact verification
        #[arg(long)]
        no_verify: bool,
    },

    /// Restore the state at an RFC 3339 instant
    RestoreAt {
        instant: String,
        #[arg(long)]
        preserve: bool,
        #[arg(long)]
        no_verify: bool,
    },

    /// Restore only some tables from a backup
    RestoreTables {
        id: String,
        /// Managed table to restore (repeatable)
        #[arg(long = "table", required = true)]
        tables: Vec<String>,
        #[arg(long)]
        preserve: bool,
        #[arg(long)]
        no_verify: bool,
    },

    /// Dry-run a restore into a scratch store and report the result
    Validate { id: String },
}

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// Snapshot every managed table
    Full {
        #[command(flatten)]
        common: BackupArgs,
    },

    /// Capture rows changed since a parent backup
    Incremental {
        /// Parent backup id
        #[arg(long)]
        parent: String,
        #[command(flatten)]
        common: BackupArgs,
    },
}

#[derive(clap::Args, Debug)]
pub struct BackupArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Write an uncompressed artifact
    #[arg(long)]
    pub no_compress: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum KindArg {
    Full,
    Incremental,
}

impl From<KindArg> for BackupKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Full => BackupKind::Full,
            KindArg::Incremental => BackupKind::Incremental,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum StatusArg {
    Pending,
    InProgress,
    Completed,
    Failed,
    Corrupted,
}

impl From<StatusArg> for BackupStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => BackupStatus::Pending,
            StatusArg::InProgress => BackupStatus::InProgress,
            StatusArg::Completed => BackupStatus::Completed,
            StatusArg::Failed => BackupStatus::Failed,
            StatusArg::Corrupted => BackupStatus::Corrupted,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
