//! Restore subsystem for trackdb
//!
//! Restore reconstructs the managed tables from a chain of backups: one full
//! backup followed by the incrementals taken after it.
//!
//! # Guarantees
//!
//! - The store lock is held for the whole restoration
//! - The whole plan is applied in one transaction, or not at all
//! - Planning, verification and artifact loading happen before the store is
//!   touched; their failures leave it as it was
//! - Incrementals are applied strictly in creation order
//!
//! # Limitation
//!
//! Incrementals cannot carry row deletions. Rows deleted between the anchor
//! and the target reappear after a point-in-time restore.

mod errors;
mod executor;
mod planner;
mod progress;
mod validator;

pub use errors::{RestoreError, RestoreResult};
pub use executor::{RestoreOptions, RestoreReport, RestoreScope};
pub use planner::{plan, plan_through, RestorationPlan};
pub use progress::{ProgressTracker, RestoreProgress};
pub use validator::{RestorationValidation, TableCheck};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::backup::{BackupConfig, BackupRecord, Catalog};
use crate::store::{ManagedTable, Store};

/// A restoration plan resolved to catalog records, anchor first.
#[derive(Debug, Clone)]
pub struct PlannedRestore {
    pub target: DateTime<Utc>,
    pub backups: Vec<BackupRecord>,
}

impl PlannedRestore {
    fn resolve(plan: &RestorationPlan, records: &[BackupRecord]) -> Self {
        Self {
            target: plan.target,
            backups: plan.records(records).into_iter().cloned().collect(),
        }
    }

    pub fn backup_ids(&self) -> Vec<&str> {
        self.backups.iter().map(|b| b.id.as_str()).collect()
    }
}

/// Options for restoring a subset of the managed tables.
#[derive(Debug, Clone)]
pub struct PartialRestoreOptions {
    pub tables: Vec<String>,
    pub preserve_existing: bool,
    pub verify: bool,
    pub cancel: CancellationToken,
}

impl PartialRestoreOptions {
    pub fn tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            preserve_existing: false,
            verify: true,
            cancel: CancellationToken::new(),
        }
    }
}

/// Public restore operations over a store.
#[derive(Debug, Clone)]
pub struct RestoreManager {
    store: Store,
    config: BackupConfig,
    progress: Option<Arc<ProgressTracker>>,
}

impl RestoreManager {
    /// `config` is used for the safety backup taken by `preserve_existing`.
    pub fn new(store: Store, config: BackupConfig) -> Self {
        Self {
            store,
            config,
            progress: None,
        }
    }

    /// Report progress of every restoration into `tracker`.
    pub fn with_progress(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.progress = Some(tracker);
        self
    }

    pub fn progress(&self, restore_id: &str) -> Option<RestoreProgress> {
        self.progress.as_ref()?.get_progress(restore_id)
    }

    /// Plan a restoration to the state at `target`.
    pub fn plan(&self, target: DateTime<Utc>) -> RestoreResult<PlannedRestore> {
        let conn = self.store.lock()?;
        let records = Catalog::new(&conn).all()?;
        let plan = planner::plan(&records, target)?;
        Ok(PlannedRestore::resolve(&plan, &records))
    }

    /// Apply a plan to the whole store.
    pub fn execute(&self, planned: &PlannedRestore, opts: &RestoreOptions) -> RestoreResult<RestoreReport> {
        let conn = self.store.lock()?;
        executor::execute_locked(
            &conn,
            &self.config,
            self.progress.as_deref(),
            &planned.backups,
            &RestoreScope::All,
            opts,
        )
    }

    /// Restore the state captured by backup `id`.
    pub fn restore_from_backup(&self, id: &str, opts: &RestoreOptions) -> RestoreResult<RestoreReport> {
        let conn = self.store.lock()?;
        let records = Catalog::new(&conn).all()?;
        let plan = plan_through(&records, id)?;
        let planned = PlannedRestore::resolve(&plan, &records);

        executor::execute_locked(
            &conn,
            &self.config,
            self.progress.as_deref(),
            &planned.backups,
            &RestoreScope::All,
            opts,
        )
    }

    /// Restore the state at `instant`.
    pub fn restore_to_point_in_time(
        &self,
        instant: DateTime<Utc>,
        opts: &RestoreOptions,
    ) -> RestoreResult<RestoreReport> {
        let conn = self.store.lock()?;
        let records = Catalog::new(&conn).all()?;
        let plan = planner::plan(&records, instant)?;
        let planned = PlannedRestore::resolve(&plan, &records);
        tracing::info!(instant = %instant, backups = ?planned.backup_ids(), "point-in-time restore planned");

        executor::execute_locked(
            &conn,
            &self.config,
            self.progress.as_deref(),
            &planned.backups,
            &RestoreScope::All,
            opts,
        )
    }

    /// Restore only `opts.tables` from backup `id`. Other tables keep their
    /// current rows.
    pub fn restore_partial(&self, id: &str, opts: &PartialRestoreOptions) -> RestoreResult<RestoreReport> {
        let tables = opts
            .tables
            .iter()
            .map(|name| ManagedTable::parse(name).ok_or_else(|| RestoreError::UnknownTable(name.clone())))
            .collect::<RestoreResult<Vec<_>>>()?;
        if tables.is_empty() {
            return Err(RestoreError::UnknownTable("<none given>".to_string()));
        }

        let conn = self.store.lock()?;
        let records = Catalog::new(&conn).all()?;
        let plan = plan_through(&records, id)?;
        let planned = PlannedRestore::resolve(&plan, &records);

        executor::execute_locked(
            &conn,
            &self.config,
            self.progress.as_deref(),
            &planned.backups,
            &RestoreScope::Tables(tables),
            &RestoreOptions {
                preserve_existing: opts.preserve_existing,
                verify: opts.verify,
                cancel: opts.cancel.clone(),
            },
        )
    }

    /// Check what restoring backup `id` would produce, without touching the store.
    pub fn validate_restoration(&self, id: &str) -> RestoreResult<RestorationValidation> {
        let conn = self.store.lock()?;
        validator::validate_locked(&conn, id)
    }
}
