//! The directory-backed task inbox.
//!
//! The inbox is a durable single-producer/single-consumer queue: external
//! submitters enqueue by atomic rename into `inbox/`, and the worker
//! dequeues by renaming the file out into the task's own result directory.
//! The filesystem imposes no order; the worker imposes FIFO-by-mtime here.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::core::task::task_id;
use crate::io::paths::EnginePaths;

/// One inbox entry eligible for pickup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub modified: SystemTime,
}

/// A task moved out of the inbox and exclusively owned by the worker.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub task_id: String,
    /// The in-flight result directory (`tasks/<task_id>/`).
    pub dir: PathBuf,
    /// The relocated task file inside `dir`.
    pub task_path: PathBuf,
    /// Original inbox file name.
    pub source_file: String,
}

/// List inbox files with a recognized extension, oldest mtime first.
///
/// Ties break by file name so a drain cycle is deterministic. Anything
/// without a matching extension is left alone, not an error.
#[instrument(skip_all, fields(inbox = %inbox_dir.display()))]
pub fn scan_inbox(inbox_dir: &Path, extensions: &[String]) -> Result<Vec<QueuedFile>> {
    let mut queued = Vec::new();
    let entries = fs::read_dir(inbox_dir)
        .with_context(|| format!("read inbox {}", inbox_dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read inbox entry in {}", inbox_dir.display()))?;
        let path = entry.path();
        let metadata = entry
            .metadata()
            .with_context(|| format!("stat {}", path.display()))?;
        if !metadata.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|allowed| allowed == ext));
        if !matches {
            continue;
        }
        let modified = metadata
            .modified()
            .with_context(|| format!("mtime of {}", path.display()))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        queued.push(QueuedFile {
            path,
            file_name,
            modified,
        });
    }
    queued.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    debug!(queued = queued.len(), "inbox scanned");
    Ok(queued)
}

/// Move a queued file out of the inbox into its own result directory.
///
/// The rename happens before anything else touches the task; once it
/// lands, the task can never be re-admitted by a later trigger. Same-stem
/// pickups within one second get a numeric suffix so ids stay unique.
#[instrument(skip_all, fields(file = %queued.file_name))]
pub fn claim_task(
    paths: &EnginePaths,
    queued: &QueuedFile,
    picked_at: DateTime<Utc>,
) -> Result<ClaimedTask> {
    let base_id = task_id(&queued.file_name, picked_at);
    let (id, dir) = fresh_task_dir(paths, &base_id)?;
    let task_path = dir.join(&queued.file_name);
    fs::rename(&queued.path, &task_path).with_context(|| {
        format!(
            "claim task {} into {}",
            queued.path.display(),
            dir.display()
        )
    })?;
    debug!(task_id = %id, "task claimed");
    Ok(ClaimedTask {
        task_id: id,
        dir,
        task_path,
        source_file: queued.file_name.clone(),
    })
}

fn fresh_task_dir(paths: &EnginePaths, base_id: &str) -> Result<(String, PathBuf)> {
    for attempt in 0u32..100 {
        let id = if attempt == 0 {
            base_id.to_string()
        } else {
            format!("{base_id}-{attempt}")
        };
        let dir = paths.task_dir(&id);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((id, dir)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("create task directory {}", dir.display()));
            }
        }
    }
    Err(anyhow!("cannot find a fresh task directory for {base_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::File;
    use std::time::Duration;

    fn exts() -> Vec<String> {
        vec!["md".to_string()]
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        let file = File::options().write(true).open(path).expect("open");
        file.set_times(fs::FileTimes::new().set_modified(when))
            .expect("set mtime");
    }

    fn pickup() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn scan_sorts_oldest_first_and_skips_other_extensions() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = EnginePaths::new(temp.path());
        paths.ensure_layout().expect("layout");

        let older = paths.inbox_dir.join("older.md");
        let newer = paths.inbox_dir.join("newer.md");
        let ignored = paths.inbox_dir.join("notes.bak");
        fs::write(&older, "a").expect("write");
        fs::write(&newer, "b").expect("write");
        fs::write(&ignored, "c").expect("write");
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        set_mtime(&older, base);
        set_mtime(&newer, base + Duration::from_secs(60));

        let queued = scan_inbox(&paths.inbox_dir, &exts()).expect("scan");
        let names: Vec<&str> = queued.iter().map(|q| q.file_name.as_str()).collect();
        assert_eq!(names, vec!["older.md", "newer.md"]);
    }

    #[test]
    fn scan_breaks_mtime_ties_by_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = EnginePaths::new(temp.path());
        paths.ensure_layout().expect("layout");

        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        for name in ["b.md", "a.md"] {
            let path = paths.inbox_dir.join(name);
            fs::write(&path, "x").expect("write");
            set_mtime(&path, base);
        }
        let queued = scan_inbox(&paths.inbox_dir, &exts()).expect("scan");
        let names: Vec<&str> = queued.iter().map(|q| q.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.md"]);
    }

    #[test]
    fn claim_moves_the_file_out_of_the_inbox() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = EnginePaths::new(temp.path());
        paths.ensure_layout().expect("layout");
        let task = paths.inbox_dir.join("fix.md");
        fs::write(&task, "do it").expect("write");

        let queued = scan_inbox(&paths.inbox_dir, &exts())
            .expect("scan")
            .remove(0);
        let claimed = claim_task(&paths, &queued, pickup()).expect("claim");

        assert_eq!(claimed.task_id, "fix-20260806_090000");
        assert!(!task.exists());
        assert!(claimed.task_path.is_file());
        assert_eq!(claimed.source_file, "fix.md");
        assert!(scan_inbox(&paths.inbox_dir, &exts()).expect("rescan").is_empty());
    }

    #[test]
    fn same_second_pickups_get_distinct_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = EnginePaths::new(temp.path());
        paths.ensure_layout().expect("layout");

        for dir in ["inbox", "other"] {
            let path = temp.path().join(dir).join("fix.md");
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, "x").expect("write");
        }
        let first = scan_inbox(&paths.inbox_dir, &exts()).expect("scan").remove(0);
        let first = claim_task(&paths, &first, pickup()).expect("claim");

        // Second file with the same stem arrives and is picked up in the
        // same wall-clock second.
        fs::rename(
            temp.path().join("other").join("fix.md"),
            paths.inbox_dir.join("fix.md"),
        )
        .expect("enqueue");
        let second = scan_inbox(&paths.inbox_dir, &exts()).expect("scan").remove(0);
        let second = claim_task(&paths, &second, pickup()).expect("claim");

        assert_eq!(first.task_id, "fix-20260806_090000");
        assert_eq!(second.task_id, "fix-20260806_090000-1");
    }
}
