//! Engine configuration (TOML).
//!
//! The config file is operator-owned and loaded from an explicit path. A
//! missing or unparsable file is a fatal startup error: processing tasks
//! against a defaulted configuration is worse than not processing at all.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::egress::parse_cidr;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine root; all queue/result/state directories live under it.
    pub root: PathBuf,

    /// Repository the workspace preparer clones and fast-forwards.
    pub repo_url: String,
    /// Tracked branch.
    pub branch: String,

    /// Inbox file extensions that count as tasks; anything else is ignored.
    pub task_extensions: Vec<String>,

    /// Capability allow-list handed to the assistant subprocess.
    pub allowed_tools: Vec<String>,
    /// Maximum assistant turns per task.
    pub max_turns: u32,
    /// Maximum assistant spend per task, in USD.
    pub max_budget_usd: f64,
    /// Model identifier for the assistant subprocess.
    pub model: String,
    /// Optional system prompt override.
    pub system_prompt: Option<String>,

    /// Optional completion webhook target.
    pub webhook_url: Option<String>,

    /// Age threshold (days) for the retention sweeper.
    pub retention_days: u32,
    /// Per-task wall-clock ceiling, independent of the assistant's own
    /// turn/budget limits.
    pub task_timeout_secs: u64,
    /// Truncate captured subprocess output beyond this many bytes.
    pub output_limit_bytes: usize,

    pub secrets: SecretsConfig,
    pub egress: EgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SecretsConfig {
    /// Path to the primary API key in the external secret store. Required.
    pub api_key_file: PathBuf,
    /// Optional VCS token path for HTTPS git operations.
    pub git_token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EgressConfig {
    /// Domains whose resolved addresses are permitted for egress.
    pub domains: Vec<String>,
    /// Static allow-list ranges, honored independently of DNS resolution.
    pub static_v4: Vec<String>,
    pub static_v6: Vec<String>,

    /// nftables table and set names the engine owns.
    pub table: String,
    pub v4_set: String,
    pub v6_set: String,
    pub static_v4_set: String,
    pub static_v6_set: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            repo_url: String::new(),
            branch: "main".to_string(),
            task_extensions: vec!["md".to_string()],
            allowed_tools: Vec::new(),
            max_turns: 25,
            max_budget_usd: 5.0,
            model: "claude-sonnet-4-5".to_string(),
            system_prompt: None,
            webhook_url: None,
            retention_days: 30,
            task_timeout_secs: 60 * 60,
            output_limit_bytes: 10_000_000,
            secrets: SecretsConfig::default(),
            egress: EgressConfig::default(),
        }
    }
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            domains: vec!["api.anthropic.com".to_string()],
            // Published ranges for the primary upstream API; the fallback
            // path when DNS-based resolution is unavailable.
            static_v4: vec!["160.79.104.0/23".to_string()],
            static_v6: vec!["2607:6bc0::/48".to_string()],
            table: "engine-egress".to_string(),
            v4_set: "allow4".to_string(),
            v6_set: "allow6".to_string(),
            static_v4_set: "static4".to_string(),
            static_v6_set: "static6".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(anyhow!("root must be set"));
        }
        if self.repo_url.trim().is_empty() {
            return Err(anyhow!("repo_url must be set"));
        }
        if self.branch.trim().is_empty() {
            return Err(anyhow!("branch must be set"));
        }
        if self.task_extensions.is_empty()
            || self.task_extensions.iter().any(|e| e.trim().is_empty())
        {
            return Err(anyhow!("task_extensions must be a non-empty list"));
        }
        if self.allowed_tools.is_empty()
            || self.allowed_tools.iter().any(|t| t.trim().is_empty())
        {
            return Err(anyhow!("allowed_tools must be a non-empty list"));
        }
        if self.max_turns == 0 {
            return Err(anyhow!("max_turns must be > 0"));
        }
        if self.max_budget_usd.is_nan() || self.max_budget_usd <= 0.0 {
            return Err(anyhow!("max_budget_usd must be > 0"));
        }
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be set"));
        }
        if self.retention_days == 0 {
            return Err(anyhow!("retention_days must be > 0"));
        }
        if self.task_timeout_secs == 0 {
            return Err(anyhow!("task_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.secrets.api_key_file.as_os_str().is_empty() {
            return Err(anyhow!("secrets.api_key_file must be set"));
        }
        self.egress.validate()
    }
}

impl EgressConfig {
    pub fn validate(&self) -> Result<()> {
        if self.domains.is_empty() || self.domains.iter().any(|d| d.trim().is_empty()) {
            return Err(anyhow!("egress.domains must be a non-empty list"));
        }
        for range in self.static_v4.iter().chain(self.static_v6.iter()) {
            if parse_cidr(range).is_none() {
                return Err(anyhow!("egress static range '{range}' is not a valid CIDR"));
            }
        }
        for name in [
            &self.table,
            &self.v4_set,
            &self.v6_set,
            &self.static_v4_set,
            &self.static_v6_set,
        ] {
            if name.trim().is_empty() {
                return Err(anyhow!("egress table/set names must be non-empty"));
            }
        }
        Ok(())
    }
}

/// Load and validate config from a TOML file.
///
/// Unlike state files, config is never defaulted on absence.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config(root: &Path) -> EngineConfig {
        EngineConfig {
            root: root.to_path_buf(),
            repo_url: "https://example.invalid/repo.git".to_string(),
            allowed_tools: vec!["Read".to_string(), "Edit".to_string()],
            secrets: SecretsConfig {
                api_key_file: root.join("api-key"),
                git_token_file: None,
            },
            ..EngineConfig::default()
        }
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_config(&temp.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("read config"));
    }

    #[test]
    fn defaults_alone_do_not_validate() {
        let err = EngineConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("root"));
    }

    #[test]
    fn load_round_trips_through_toml() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = valid_config(temp.path());
        let path = temp.path().join("engine.toml");
        fs::write(&path, toml::to_string_pretty(&cfg).expect("serialize")).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn rejects_empty_allow_lists() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cfg = valid_config(temp.path());
        cfg.allowed_tools.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = valid_config(temp.path());
        cfg.egress.domains.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_static_ranges() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cfg = valid_config(temp.path());
        cfg.egress.static_v4 = vec!["160.79.104.0/99".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("not a valid CIDR"));
    }

    #[test]
    fn rejects_zero_ceilings() {
        let temp = tempfile::tempdir().expect("tempdir");
        for mutate in [
            (|c: &mut EngineConfig| c.max_turns = 0) as fn(&mut EngineConfig),
            |c| c.max_budget_usd = 0.0,
            |c| c.task_timeout_secs = 0,
            |c| c.retention_days = 0,
            |c| c.output_limit_bytes = 0,
        ] {
            let mut cfg = valid_config(temp.path());
            mutate(&mut cfg);
            assert!(cfg.validate().is_err());
        }
    }
}
