//! Retention sweep: delete aged task artifacts.
//!
//! Deletion is best-effort per entry; one unreadable or already-gone
//! entry never aborts the rest of the sweep. Stranded in-flight
//! directories under `tasks/` are reaped on the same schedule as
//! terminal ones.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::retention::is_expired;
use crate::io::config::EngineConfig;
use crate::io::paths::EnginePaths;

/// Counters for one sweep invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub deleted: u32,
    pub kept: u32,
    pub errors: u32,
}

#[instrument(skip_all)]
pub fn run_sweep(config: &EngineConfig) -> Result<SweepReport> {
    let paths = EnginePaths::new(&config.root);
    paths.ensure_layout()?;

    let now = SystemTime::now();
    let mut report = SweepReport::default();
    for dir in [&paths.completed_dir, &paths.failed_dir, &paths.tasks_dir] {
        sweep_dir(dir, now, config.retention_days, &mut report);
    }

    info!(
        deleted = report.deleted,
        kept = report.kept,
        errors = report.errors,
        "retention sweep finished"
    );
    Ok(report)
}

fn sweep_dir(dir: &Path, now: SystemTime, retention_days: u32, report: &mut SweepReport) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), err = %err, "cannot read directory, skipping");
            report.errors += 1;
            return;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %dir.display(), err = %err, "unreadable entry, skipping");
                report.errors += 1;
                continue;
            }
        };
        let path = entry.path();
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                warn!(entry = %path.display(), err = %err, "cannot stat entry, skipping");
                report.errors += 1;
                continue;
            }
        };
        if !is_expired(modified, now, retention_days) {
            report.kept += 1;
            continue;
        }
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Ok(()) => {
                debug!(entry = %path.display(), "deleted aged entry");
                report.deleted += 1;
            }
            Err(err) => {
                warn!(entry = %path.display(), err = %err, "delete failed, continuing");
                report.errors += 1;
            }
        }
    }
}
