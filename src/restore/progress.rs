//! Restore progress tracking
//!
//! Purely observational. The executor reports into a tracker when one is
//! attached and behaves identically without one.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::timestamp;

/// Last reported state of one restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreProgress {
    pub restore_id: String,
    pub total_steps: usize,
    pub current_step: usize,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl RestoreProgress {
    pub fn is_finished(&self) -> bool {
        self.current_step >= self.total_steps
    }

    /// Completed fraction in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total_steps == 0 {
            return 1.0;
        }
        (self.current_step.min(self.total_steps) as f64) / (self.total_steps as f64)
    }
}

/// Shared registry of restore progress, keyed by restore id.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    entries: Mutex<HashMap<String, RestoreProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_progress(
        &self,
        restore_id: &str,
        total_steps: usize,
        current_step: usize,
        message: impl Into<String>,
    ) {
        let progress = RestoreProgress {
            restore_id: restore_id.to_string(),
            total_steps,
            current_step,
            message: message.into(),
            updated_at: timestamp::now(),
        };
        tracing::debug!(
            restore_id = %restore_id,
            step = current_step,
            total = total_steps,
            message = %progress.message,
            "restore progress"
        );

        // A poisoned map only loses progress reports
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(restore_id.to_string(), progress);
        }
    }

    pub fn get_progress(&self, restore_id: &str) -> Option<RestoreProgress> {
        self.entries.lock().ok()?.get(restore_id).cloned()
    }

    /// Every tracked restore, oldest update first.
    pub fn all(&self) -> Vec<RestoreProgress> {
        let mut all: Vec<RestoreProgress> = match self.entries.lock() {
            Ok(entries) => entries.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        all.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        all
    }

    pub fn clear(&self, restore_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(restore_id);
        }
    }
}
