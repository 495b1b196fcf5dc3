//! Executor abstraction for the assistant subprocess.
//!
//! The [`Executor`] trait decouples the drain loop from the actual
//! assistant backend (currently the `claude` CLI in one-shot mode). Tests
//! use scripted executors that produce predetermined outputs without
//! spawning processes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::io::config::EngineConfig;
use crate::io::process::run_with_timeout;

/// Parameters for one assistant invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the subprocess (the prepared checkout).
    pub workdir: PathBuf,
    /// Task instructions, fed on stdin.
    pub prompt: String,
    /// Where raw stdout is written (opaque, even if structured).
    pub stdout_path: PathBuf,
    /// Where raw stderr is written.
    pub stderr_path: PathBuf,
    /// Wall-clock ceiling for the invocation.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Environment handed to the subprocess (the materialized bundle).
    pub env: Vec<(String, String)>,
}

/// What one invocation came to. A nonzero exit or a timeout is data, not
/// an error: the worker routes on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ExecOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Abstraction over assistant execution backends.
pub trait Executor {
    /// Run the assistant. Must write `request.stdout_path` and
    /// `request.stderr_path`. Errors only on infrastructure failure
    /// (spawn, filesystem), never on the assistant's own exit status.
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutcome>;
}

/// Executor that spawns the `claude` CLI non-interactively.
#[derive(Debug, Clone)]
pub struct ClaudeExecutor {
    allowed_tools: Vec<String>,
    max_turns: u32,
    max_budget_usd: f64,
    model: String,
    system_prompt: Option<String>,
}

impl ClaudeExecutor {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            allowed_tools: config.allowed_tools.clone(),
            max_turns: config.max_turns,
            max_budget_usd: config.max_budget_usd,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        }
    }

    /// The fixed flag set for one-shot execution. The prompt arrives on
    /// stdin; output is machine-readable JSON on stdout.
    fn cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--max-turns".to_string(),
            self.max_turns.to_string(),
            "--max-budget-usd".to_string(),
            self.max_budget_usd.to_string(),
            "--allowedTools".to_string(),
            self.allowed_tools.join(","),
        ];
        if let Some(prompt) = &self.system_prompt {
            args.push("--append-system-prompt".to_string());
            args.push(prompt.clone());
        }
        args
    }
}

impl Executor for ClaudeExecutor {
    #[instrument(skip_all, fields(workdir = %request.workdir.display(), timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        info!(model = %self.model, max_turns = self.max_turns, "starting assistant");

        let mut cmd = Command::new("claude");
        cmd.args(self.cli_args())
            .current_dir(&request.workdir)
            .env_clear()
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        // A minimal PATH so the assistant can reach git and the usual tools.
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }

        let captured = run_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run assistant subprocess")?;

        fs::write(&request.stdout_path, &captured.stdout)
            .with_context(|| format!("write {}", request.stdout_path.display()))?;
        fs::write(&request.stderr_path, &captured.stderr)
            .with_context(|| format!("write {}", request.stderr_path.display()))?;

        debug!(
            exit_code = captured.exit_code,
            timed_out = captured.timed_out,
            "assistant finished"
        );
        Ok(ExecOutcome {
            exit_code: captured.exit_code,
            timed_out: captured.timed_out,
        })
    }
}
