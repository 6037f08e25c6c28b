//! Restoration planning
//!
//! Planning is a pure function over catalog records already loaded in memory.
//! A plan is a list of indices into that slice: the anchor full backup first,
//! then incrementals in application order.

use chrono::{DateTime, Utc};

use super::errors::{RestoreError, RestoreResult};
use crate::backup::BackupRecord;
use crate::store::timestamp::format_timestamp;

/// Backups to apply, as indices into the record slice the plan was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorationPlan {
    pub target: DateTime<Utc>,
    pub steps: Vec<usize>,
}

impl RestorationPlan {
    pub fn anchor(&self) -> usize {
        self.steps[0]
    }

    /// Resolve the steps against the slice the plan was built from.
    pub fn records<'r>(&self, records: &'r [BackupRecord]) -> Vec<&'r BackupRecord> {
        self.steps.iter().map(|&i| &records[i]).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Plan a restoration to the state at `target`.
///
/// The anchor is the latest completed full backup created at or before
/// `target`, ties broken by the greater id. It is followed by every completed
/// incremental created after the anchor and at or before `target`, ordered by
/// creation time then id.
///
/// Every planned incremental must still reach the anchor through its parent.
/// A parent that is no longer completed fails the plan instead of being
/// skipped.
pub fn plan(records: &[BackupRecord], target: DateTime<Utc>) -> RestoreResult<RestorationPlan> {
    let plan = select(records, target)?;
    check_lineage(records, &plan)?;
    Ok(plan)
}

/// Plan a restoration that ends exactly at backup `id`.
///
/// A full backup restores alone. An incremental restores the plan to its
/// creation time, cut off after itself.
pub fn plan_through(records: &[BackupRecord], id: &str) -> RestoreResult<RestorationPlan> {
    let index = records
        .iter()
        .position(|r| r.id == id)
        .ok_or_else(|| RestoreError::NotFound(id.to_string()))?;
    let record = &records[index];

    if !record.is_completed() {
        return Err(RestoreError::IncompleteBackup {
            id: record.id.clone(),
            status: record.status,
        });
    }

    if record.is_full() {
        return Ok(RestorationPlan {
            target: record.created_at,
            steps: vec![index],
        });
    }

    let mut plan = select(records, record.created_at)?;
    match plan.steps.iter().position(|&i| i == index) {
        Some(pos) => {
            plan.steps.truncate(pos + 1);
            check_lineage(records, &plan)?;
            Ok(plan)
        }
        // Created at the same instant as the anchor
        None => Err(RestoreError::NoBaseBackup {
            target: format_timestamp(record.created_at),
        }),
    }
}

fn select(records: &[BackupRecord], target: DateTime<Utc>) -> RestoreResult<RestorationPlan> {
    let anchor = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_completed() && r.is_full() && r.created_at <= target)
        .max_by(|(_, a), (_, b)| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
        .map(|(i, _)| i)
        .ok_or_else(|| RestoreError::NoBaseBackup {
            target: format_timestamp(target),
        })?;
    let anchored_at = records[anchor].created_at;

    let mut incrementals: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            r.is_completed() && !r.is_full() && r.created_at > anchored_at && r.created_at <= target
        })
        .map(|(i, _)| i)
        .collect();
    incrementals.sort_by(|&a, &b| {
        records[a]
            .created_at
            .cmp(&records[b].created_at)
            .then_with(|| records[a].id.cmp(&records[b].id))
    });

    let mut steps = Vec::with_capacity(incrementals.len() + 1);
    steps.push(anchor);
    steps.extend(incrementals);

    Ok(RestorationPlan { target, steps })
}

/// An incremental only carries changes since its parent was taken, so its
/// parent must be an earlier step or predate the anchor.
fn check_lineage(records: &[BackupRecord], plan: &RestorationPlan) -> RestoreResult<()> {
    let anchored_at = records[plan.anchor()].created_at;

    for (pos, &step) in plan.steps.iter().enumerate().skip(1) {
        let Some(parent_id) = records[step].parent_id.as_deref() else {
            continue;
        };
        if plan.steps[..pos].iter().any(|&i| records[i].id == parent_id) {
            continue;
        }
        let parent = records
            .iter()
            .find(|r| r.id == parent_id)
            .ok_or_else(|| RestoreError::NotFound(parent_id.to_string()))?;
        if parent.created_at <= anchored_at {
            continue;
        }
        return Err(RestoreError::IncompleteBackup {
            id: parent.id.clone(),
            status: parent.status,
        });
    }
    Ok(())
}
