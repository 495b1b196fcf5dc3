//! Test-only fakes and fixtures.
//!
//! Scripted implementations of the engine's trait seams, plus a
//! [`TestEngine`] fixture wiring a temp root, a local git upstream, and a
//! pre-materialized environment bundle so drain tests never need real
//! secrets, network, or a privileged setup run.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use anyhow::{Context, Result, anyhow};

use crate::io::config::{EngineConfig, SecretsConfig};
use crate::io::executor::{ExecOutcome, ExecRequest, Executor};
use crate::io::nft::Firewall;
use crate::io::notify::{CompletionEvent, Notifier};
use crate::io::paths::EnginePaths;
use crate::io::resolve::Resolver;
use crate::io::secrets::{API_KEY_VAR, CONFIG_DIR_VAR};

/// One scripted assistant invocation.
#[derive(Debug, Clone)]
pub struct ScriptedExec {
    pub exit_code: i32,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptedExec {
    pub fn exiting(exit_code: i32) -> Self {
        Self {
            exit_code,
            timed_out: false,
            stdout: format!("{{\"result\":\"scripted exit {exit_code}\"}}\n"),
            stderr: String::new(),
        }
    }

    pub fn timing_out() -> Self {
        Self {
            exit_code: -1,
            timed_out: true,
            stdout: String::new(),
            stderr: "killed after timeout\n".to_string(),
        }
    }
}

/// Executor that replays a script and records every request.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: RefCell<VecDeque<ScriptedExec>>,
    calls: RefCell<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub fn new(script: Vec<ScriptedExec>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ExecRequest> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        let next = self
            .script
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("unscripted executor call for {}", request.workdir.display()))?;
        fs::write(&request.stdout_path, &next.stdout).context("write scripted stdout")?;
        fs::write(&request.stderr_path, &next.stderr).context("write scripted stderr")?;
        self.calls.borrow_mut().push(request.clone());
        Ok(ExecOutcome {
            exit_code: next.exit_code,
            timed_out: next.timed_out,
        })
    }
}

/// Executor whose infrastructure always fails (spawn-level error).
#[derive(Debug, Default)]
pub struct FailingExecutor;

impl Executor for FailingExecutor {
    fn exec(&self, _request: &ExecRequest) -> Result<ExecOutcome> {
        Err(anyhow!("executor infrastructure failure (scripted)"))
    }
}

/// Notifier that records every event.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: RefCell<Vec<CompletionEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<CompletionEvent> {
        self.events.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &CompletionEvent) -> Result<()> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

/// Notifier whose delivery always fails.
#[derive(Debug, Default)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _event: &CompletionEvent) -> Result<()> {
        Err(anyhow!("webhook endpoint unreachable (scripted)"))
    }
}

/// Resolver with scripted per-domain answers; unknown domains error.
#[derive(Debug, Default)]
pub struct ScriptedResolver {
    answers: HashMap<String, Vec<String>>,
}

impl ScriptedResolver {
    pub fn with(mut self, domain: &str, answers: &[&str]) -> Self {
        self.answers.insert(
            domain.to_string(),
            answers.iter().map(|a| a.to_string()).collect(),
        );
        self
    }
}

impl Resolver for ScriptedResolver {
    fn resolve(&self, domain: &str) -> Result<Vec<String>> {
        self.answers
            .get(domain)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted answer for {domain}"))
    }
}

/// Firewall that records applied scripts instead of touching nftables.
#[derive(Debug, Default)]
pub struct RecordingFirewall {
    scripts: RefCell<Vec<String>>,
}

impl RecordingFirewall {
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.borrow().clone()
    }
}

impl Firewall for RecordingFirewall {
    fn apply(&self, script: &str) -> Result<()> {
        self.scripts.borrow_mut().push(script.to_string());
        Ok(())
    }
}

/// A complete engine root in a tempdir, backed by a seeded local git
/// upstream so workspace preparation works offline.
pub struct TestEngine {
    pub temp: tempfile::TempDir,
    pub config: EngineConfig,
    pub paths: EnginePaths,
    pub upstream: PathBuf,
}

impl TestEngine {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let upstream = temp.path().join("upstream");
        seed_upstream(&upstream)?;

        let root = temp.path().join("engine");
        let config = EngineConfig {
            root: root.clone(),
            repo_url: upstream.to_str().context("utf8 upstream path")?.to_string(),
            allowed_tools: vec!["Read".to_string(), "Edit".to_string()],
            secrets: SecretsConfig {
                api_key_file: temp.path().join("api-key"),
                git_token_file: None,
            },
            ..EngineConfig::default()
        };
        let paths = EnginePaths::new(&config.root);
        paths.ensure_layout()?;

        Ok(Self {
            temp,
            config,
            paths,
            upstream,
        })
    }

    /// Write the environment bundle directly, as a completed privileged
    /// setup would have.
    pub fn write_bundle(&self) -> Result<()> {
        let contents = format!(
            "{API_KEY_VAR}=test-api-key\n{CONFIG_DIR_VAR}={}\n",
            self.paths.assistant_config_dir.display()
        );
        fs::write(&self.paths.bundle_path, contents).context("write bundle")?;
        Ok(())
    }

    /// Drop a task file into the inbox.
    pub fn submit(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.paths.inbox_dir.join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Drop a task file with a controlled mtime.
    pub fn submit_at(&self, name: &str, contents: &str, modified: SystemTime) -> Result<PathBuf> {
        let path = self.submit(name, contents)?;
        let file = fs::File::options()
            .write(true)
            .open(&path)
            .context("open task")?;
        file.set_times(fs::FileTimes::new().set_modified(modified))
            .context("set mtime")?;
        Ok(path)
    }
}

/// The only entry of a directory; panics if the directory is not a
/// singleton (tests use it to locate a freshly filed task).
pub fn sole_entry(dir: &Path) -> PathBuf {
    let entries: Vec<_> = fs::read_dir(dir)
        .unwrap_or_else(|err| panic!("read {}: {err}", dir.display()))
        .map(|e| e.expect("dir entry").path())
        .collect();
    assert_eq!(entries.len(), 1, "expected exactly one entry in {}", dir.display());
    entries.into_iter().next().expect("sole entry")
}

fn seed_upstream(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).context("create upstream dir")?;
    run_git(dir, &["init", "-b", "main"])?;
    run_git(dir, &["config", "user.name", "Upstream"])?;
    run_git(dir, &["config", "user.email", "upstream@local.invalid"])?;
    fs::write(dir.join("README.txt"), "seed\n").context("write seed file")?;
    run_git(dir, &["add", "."])?;
    run_git(dir, &["commit", "-m", "seed"])?;
    Ok(())
}

fn run_git(dir: &Path, args: &[&str]) -> Result<()> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {args:?}"))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}
