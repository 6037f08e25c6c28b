//! Retention selection
//!
//! A backup is expired once `expires_at <= now`. An expired backup is still
//! kept while any surviving backup names it as parent.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::record::BackupRecord;

/// Records to delete at `now`, newest first so children go before parents.
pub fn select_expired(records: &[BackupRecord], now: DateTime<Utc>) -> Vec<&BackupRecord> {
    let mut doomed: HashSet<&str> = records
        .iter()
        .filter(|r| r.expires_at.map_or(false, |at| at <= now))
        .map(|r| r.id.as_str())
        .collect();

    // Keeping a parent can keep its own parent, so repeat until stable
    loop {
        let protected: HashSet<&str> = records
            .iter()
            .filter(|r| !doomed.contains(r.id.as_str()))
            .filter_map(|r| r.parent_id.as_deref())
            .collect();

        let before = doomed.len();
        doomed.retain(|id| !protected.contains(id));
        if doomed.len() == before {
            break;
        }
    }

    let mut selected: Vec<&BackupRecord> = records
        .iter()
        .filter(|r| doomed.contains(r.id.as_str()))
        .collect();
    selected.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    selected
}
