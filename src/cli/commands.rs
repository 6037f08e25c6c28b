//! CLI command implementations
//!
//! Each command opens the store named in the configuration, runs one engine
//! operation and returns its result as JSON. `run` writes that result, or
//! the error, as the single stdout response.

use std::path::Path;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::backup::{BackupError, BackupFilter, BackupManager, BackupOptions};
use crate::restore::{PartialRestoreOptions, RestoreManager, RestoreOptions};
use crate::store::timestamp::{self, parse_timestamp};
use crate::store::Store;

use super::args::{BackupArgs, BackupCommand, Cli, Command};
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "TRACKDB_LOG";

/// Parse arguments, run the command, and write the JSON response.
pub fn run() -> CliResult<()> {
    init_logging();
    let cli = Cli::parse_args();

    match run_command(&cli.config, cli.command) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code(), &e.to_string())?;
            Err(e)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    // Already installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run one command against the store named in `config_path`.
pub fn run_command(config_path: &Path, cmd: Command) -> CliResult<Value> {
    let config = Config::load(config_path)?;
    let store = Store::open(&config.database_path())?;
    let ctx = Context {
        backups: BackupManager::new(store.clone(), config.backup_config()),
        restores: RestoreManager::new(store, config.backup_config()),
        verify_before_restore: config.verify_before_restore,
    };

    match cmd {
        Command::Backup { kind } => ctx.backup(kind),
        Command::List {
            kind,
            status,
            limit,
        } => {
            let filter = BackupFilter {
                kind: kind.map(Into::into),
                status: status.map(Into::into),
                limit,
                ..BackupFilter::default()
            };
            Ok(serde_json::to_value(ctx.backups.list_backups(&filter)?)?)
        }
        Command::Show { id } => {
            let record = ctx
                .backups
                .get_backup_metadata(&id)?
                .ok_or(BackupError::NotFound(id))?;
            Ok(serde_json::to_value(record)?)
        }
        Command::Verify { id } => Ok(serde_json::to_value(
            ctx.backups.verify_backup_report(&id)?,
        )?),
        Command::Delete { id } => {
            ctx.backups.delete_backup(&id)?;
            Ok(json!({ "deleted": [id] }))
        }
        Command::Prune => {
            let deleted = ctx.backups.prune_expired(timestamp::now())?;
            Ok(json!({ "deleted": deleted }))
        }
        Command::Restore {
            id,
            preserve,
            no_verify,
        } => {
            let opts = ctx.restore_options(preserve, no_verify);
            Ok(serde_json::to_value(
                ctx.restores.restore_from_backup(&id, &opts)?,
            )?)
        }
        Command::RestoreAt {
            instant,
            preserve,
            no_verify,
        } => {
            let at = parse_timestamp(&instant).ok_or_else(|| {
                CliError::InvalidArgument(format!("not an RFC 3339 timestamp: {}", instant))
            })?;
            let opts = ctx.restore_options(preserve, no_verify);
            Ok(serde_json::to_value(
                ctx.restores.restore_to_point_in_time(at, &opts)?,
            )?)
        }
        Command::RestoreTables {
            id,
            tables,
            preserve,
            no_verify,
        } => {
            let opts = PartialRestoreOptions {
                preserve_existing: preserve,
                verify: ctx.verify_before_restore && !no_verify,
                ..PartialRestoreOptions::tables(tables)
            };
            Ok(serde_json::to_value(ctx.restores.restore_partial(&id, &opts)?)?)
        }
        Command::Validate { id } => Ok(serde_json::to_value(
            ctx.restores.validate_restoration(&id)?,
        )?),
    }
}

struct Context {
    backups: BackupManager,
    restores: RestoreManager,
    verify_before_restore: bool,
}

impl Context {
    fn backup(&self, cmd: BackupCommand) -> CliResult<Value> {
        let record = match cmd {
            BackupCommand::Full { common } => {
                self.backups.create_full_backup(&backup_options(common))?
            }
            BackupCommand::Incremental { parent, common } => self
                .backups
                .create_incremental_backup(&backup_options(common).with_parent(parent))?,
        };
        Ok(serde_json::to_value(record)?)
    }

    fn restore_options(&self, preserve: bool, no_verify: bool) -> RestoreOptions {
        RestoreOptions {
            preserve_existing: preserve,
            verify: self.verify_before_restore && !no_verify,
            cancel: CancellationToken::new(),
        }
    }
}

fn backup_options(args: BackupArgs) -> BackupOptions {
    BackupOptions {
        name: args.name,
        description: args.description,
        compress: if args.no_compress { Some(false) } else { None },
        ..BackupOptions::default()
    }
}
