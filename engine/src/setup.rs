//! Boot-time setup: secrets, workspace, static egress sets.
//!
//! This is the privileged half of the engine. It must complete before any
//! drain runs; a failure here blocks processing entirely, because running
//! tasks against a stale or credential-less environment is worse than not
//! running them at all.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::io::config::EngineConfig;
use crate::io::git::Workspace;
use crate::io::nft::{Firewall, render_bootstrap_script};
use crate::io::paths::EnginePaths;
use crate::io::secrets::{GIT_TOKEN_VAR, bundle_value, load_bundle, materialize_bundle};

/// Run setup to completion, in dependency order.
///
/// Secrets come first and fail closed; the workspace and the firewall
/// bootstrap never run against a half-materialized environment.
#[instrument(skip_all)]
pub fn run_setup<F: Firewall>(config: &EngineConfig, firewall: &F) -> Result<()> {
    let paths = EnginePaths::new(&config.root);
    paths.ensure_layout()?;

    materialize_bundle(&paths, &config.secrets)?;
    let bundle = load_bundle(&paths.bundle_path)?;

    let workspace = Workspace::new(&paths, &config.repo_url, &config.branch);
    workspace.prepare(bundle_value(&bundle, GIT_TOKEN_VAR))?;

    let script = render_bootstrap_script(&config.egress);
    firewall
        .apply(&script)
        .context("install static egress sets")?;

    info!(root = %config.root.display(), "setup complete");
    Ok(())
}
