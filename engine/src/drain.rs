//! The drain loop: process queued tasks, oldest first, until the inbox is
//! empty.
//!
//! One drain runs at a time (advisory lock), and every task is moved out
//! of the inbox before anything else happens to it. Together those two
//! facts give at-most-once execution per task: a crash mid-task leaves a
//! stranded result directory for the sweeper, never a re-run.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::task::is_blank;
use crate::io::config::EngineConfig;
use crate::io::executor::{ExecRequest, Executor};
use crate::io::git::Workspace;
use crate::io::lock::try_exclusive;
use crate::io::notify::{CompletionEvent, Notifier};
use crate::io::paths::{EnginePaths, METADATA_FILE, OUTPUT_FILE, STDERR_FILE};
use crate::io::queue::{ClaimedTask, claim_task, scan_inbox};
use crate::io::record::{TaskRecord, write_record};
use crate::io::secrets::{GIT_TOKEN_VAR, bundle_value, load_bundle};

/// Summary of one drain invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Another drain held the lock; nothing was processed.
    pub busy: bool,
    pub completed: u32,
    pub failed: u32,
}

/// How one task ended.
#[derive(Debug, Clone)]
struct TaskResult {
    exit_code: i32,
    completed: bool,
    completed_at: String,
}

/// Drain the inbox to empty.
///
/// Setup must have materialized the environment bundle; a missing or
/// unusable bundle fails the whole drain before any task is touched.
/// Task-level failures never do: they are filed under `failed/` and the
/// loop moves on.
#[instrument(skip_all)]
pub fn run_drain<E: Executor, N: Notifier>(
    config: &EngineConfig,
    executor: &E,
    notifier: &N,
) -> Result<DrainReport> {
    let paths = EnginePaths::new(&config.root);
    paths.ensure_layout()?;

    let Some(_guard) = try_exclusive(&paths.drain_lock_path)? else {
        info!("drain already in flight, yielding");
        return Ok(DrainReport {
            busy: true,
            ..DrainReport::default()
        });
    };

    let bundle = load_bundle(&paths.bundle_path)?;
    let workspace = Workspace::new(&paths, &config.repo_url, &config.branch);
    workspace.prepare(bundle_value(&bundle, GIT_TOKEN_VAR))?;

    let mut report = DrainReport::default();
    loop {
        let mut queue = scan_inbox(&paths.inbox_dir, &config.task_extensions)?;
        if queue.is_empty() {
            break;
        }
        let next = queue.remove(0);
        let claimed = claim_task(&paths, &next, Utc::now())?;

        let result = match process_task(config, &paths, executor, &bundle, &claimed) {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    task_id = %claimed.task_id,
                    err = %format!("{err:#}"),
                    "unexpected task failure, filing under failed/"
                );
                salvage_failed(&paths, &claimed)
            }
        };
        if result.completed {
            report.completed += 1;
        } else {
            report.failed += 1;
        }

        let event = CompletionEvent {
            task_id: claimed.task_id.clone(),
            exit_code: result.exit_code,
            timestamp: result.completed_at.clone(),
        };
        if let Err(err) = notifier.notify(&event) {
            warn!(
                task_id = %event.task_id,
                err = %format!("{err:#}"),
                "completion webhook failed (non-fatal)"
            );
        }
    }

    info!(
        completed = report.completed,
        failed = report.failed,
        "drain cycle finished"
    );
    Ok(report)
}

/// Run one claimed task through validation, execution, and filing.
fn process_task<E: Executor>(
    config: &EngineConfig,
    paths: &EnginePaths,
    executor: &E,
    bundle: &[(String, String)],
    claimed: &ClaimedTask,
) -> Result<TaskResult> {
    let content = fs::read_to_string(&claimed.task_path)
        .with_context(|| format!("read task {}", claimed.task_path.display()))?;
    if is_blank(&content) {
        warn!(task_id = %claimed.task_id, "empty task, rejecting without invocation");
        return finalize(paths, claimed, -1, false, false);
    }

    let request = ExecRequest {
        workdir: paths.workspace_dir.clone(),
        prompt: content,
        stdout_path: claimed.dir.join(OUTPUT_FILE),
        stderr_path: claimed.dir.join(STDERR_FILE),
        timeout: Duration::from_secs(config.task_timeout_secs),
        output_limit_bytes: config.output_limit_bytes,
        env: bundle.to_vec(),
    };
    let outcome = executor.exec(&request)?;
    finalize(
        paths,
        claimed,
        outcome.exit_code,
        outcome.timed_out,
        outcome.succeeded(),
    )
}

/// Persist the metadata record, then move the task to its terminal
/// directory. Record first: a reader that sees the terminal directory
/// must also see a complete `metadata.json` inside it.
fn finalize(
    paths: &EnginePaths,
    claimed: &ClaimedTask,
    exit_code: i32,
    timed_out: bool,
    completed: bool,
) -> Result<TaskResult> {
    let completed_at = Utc::now().to_rfc3339();
    let record = TaskRecord {
        task_id: claimed.task_id.clone(),
        source_file: claimed.source_file.clone(),
        exit_code,
        timed_out,
        completed_at: completed_at.clone(),
    };
    write_record(&claimed.dir.join(METADATA_FILE), &record)?;

    let dest = paths.terminal_dir(&claimed.task_id, completed);
    fs::rename(&claimed.dir, &dest)
        .with_context(|| format!("file task under {}", dest.display()))?;
    info!(
        task_id = %claimed.task_id,
        exit_code,
        terminal = if completed { "completed" } else { "failed" },
        "task filed"
    );
    Ok(TaskResult {
        exit_code,
        completed,
        completed_at,
    })
}

/// Last-resort trap for a task that blew up mid-pipeline: best-effort
/// record and relocation to `failed/`, so no task stays invisible to both
/// the queue and the result store. If even the rename fails, the sweeper
/// reaps the stranded directory later.
fn salvage_failed(paths: &EnginePaths, claimed: &ClaimedTask) -> TaskResult {
    let completed_at = Utc::now().to_rfc3339();
    let record = TaskRecord {
        task_id: claimed.task_id.clone(),
        source_file: claimed.source_file.clone(),
        exit_code: -1,
        timed_out: false,
        completed_at: completed_at.clone(),
    };
    if let Err(err) = write_record(&claimed.dir.join(METADATA_FILE), &record) {
        warn!(
            task_id = %claimed.task_id,
            err = %format!("{err:#}"),
            "could not write failure record"
        );
    }
    let dest = paths.terminal_dir(&claimed.task_id, false);
    if let Err(err) = fs::rename(&claimed.dir, &dest) {
        warn!(
            task_id = %claimed.task_id,
            err = %format!("{err:#}"),
            "task stranded under tasks/; retention sweep will reap it"
        );
    }
    TaskResult {
        exit_code: -1,
        completed: false,
        completed_at,
    }
}
