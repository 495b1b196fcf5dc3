//! Canonical on-disk layout for an engine root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// All canonical paths under the engine root.
///
/// `inbox/` is the only directory external submitters may write into (via
/// atomic rename). `tasks/` holds in-flight result directories; terminal
/// tasks land under `completed/` or `failed/`. `state/` holds the
/// environment bundle, the drain lock, and git credentials. `workspace/`
/// is the source checkout the worker subprocess runs in.
#[derive(Debug, Clone)]
pub struct EnginePaths {
    pub root: PathBuf,
    pub inbox_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub completed_dir: PathBuf,
    pub failed_dir: PathBuf,
    pub state_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub bundle_path: PathBuf,
    pub drain_lock_path: PathBuf,
    pub credentials_path: PathBuf,
    pub assistant_config_dir: PathBuf,
}

impl EnginePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join("state");
        Self {
            inbox_dir: root.join("inbox"),
            tasks_dir: root.join("tasks"),
            completed_dir: root.join("completed"),
            failed_dir: root.join("failed"),
            workspace_dir: root.join("workspace"),
            bundle_path: state_dir.join("engine.env"),
            drain_lock_path: state_dir.join("drain.lock"),
            credentials_path: state_dir.join("git-credentials"),
            assistant_config_dir: state_dir.join("assistant-config"),
            state_dir,
            root,
        }
    }

    /// Create every engine-owned directory that must pre-exist.
    ///
    /// `workspace/` is deliberately left alone: the workspace preparer
    /// clones into it and `git clone` wants the target absent or empty.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            &self.inbox_dir,
            &self.tasks_dir,
            &self.completed_dir,
            &self.failed_dir,
            &self.state_dir,
            &self.assistant_config_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Result directory for an in-flight task.
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.tasks_dir.join(task_id)
    }

    /// Terminal directory for a task, by outcome.
    pub fn terminal_dir(&self, task_id: &str, completed: bool) -> PathBuf {
        if completed {
            self.completed_dir.join(task_id)
        } else {
            self.failed_dir.join(task_id)
        }
    }
}

/// Names of the per-task artifacts inside a result directory.
pub const OUTPUT_FILE: &str = "output.json";
pub const STDERR_FILE: &str = "stderr.log";
pub const METADATA_FILE: &str = "metadata.json";

/// Atomically write `contents` to `path` (write temp, then rename).
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = tmp_sibling(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
