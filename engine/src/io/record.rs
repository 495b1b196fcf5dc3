//! The per-task metadata record.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::io::paths::write_atomic;

/// Terminal metadata for one task (`metadata.json`).
///
/// Written once via write-temp-then-rename, so a reader never observes a
/// half-written record; immutable afterwards until the sweeper deletes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_id: String,
    /// Original inbox file name.
    pub source_file: String,
    /// Subprocess exit code; `-1` when there was none (timeout, signal,
    /// or a task rejected before invocation).
    pub exit_code: i32,
    pub timed_out: bool,
    /// RFC 3339 completion timestamp.
    pub completed_at: String,
}

pub fn write_record(path: &Path, record: &TaskRecord) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(record).context("serialize task record")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}

pub fn read_record(path: &Path) -> Result<TaskRecord> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read record {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse record {}", path.display()))
}
