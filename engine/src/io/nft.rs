//! Firewall address sets: a small, explicit wrapper around `nft`.
//!
//! All mutations go through `nft -f -` so each cycle is one kernel
//! transaction: the dynamic sets are flushed and refilled atomically, and
//! a rejected script leaves the installed sets exactly as they were.

use std::fmt::Write as _;
use std::io::Write as _;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::egress::PartitionedAddrs;
use crate::io::config::EgressConfig;

/// Abstraction over the firewall backend.
pub trait Firewall {
    /// Apply one nftables script as a single transaction.
    fn apply(&self, script: &str) -> Result<()>;
}

/// Firewall backed by the real `nft` binary.
#[derive(Debug, Clone, Default)]
pub struct NftFirewall;

impl Firewall for NftFirewall {
    #[instrument(skip_all, fields(bytes = script.len()))]
    fn apply(&self, script: &str) -> Result<()> {
        let mut child = Command::new("nft")
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("spawn nft")?;
        child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("nft stdin was not piped"))?
            .write_all(script.as_bytes())
            .context("write nft script")?;
        let output = child.wait_with_output().context("wait for nft")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("nft rejected ruleset: {}", stderr.trim()));
        }
        debug!("nft transaction applied");
        Ok(())
    }
}

/// Render the boot-time script: the engine's table, all four sets, and
/// the static allow-list contents.
///
/// `add table`/`add set` are idempotent re-declarations; only the static
/// sets are (re)filled here. The dynamic sets belong to the update cycle.
pub fn render_bootstrap_script(egress: &EgressConfig) -> String {
    let table = &egress.table;
    let mut script = String::new();
    let _ = writeln!(script, "add table inet {table}");
    let _ = writeln!(
        script,
        "add set inet {table} {} {{ type ipv4_addr ; }}",
        egress.v4_set
    );
    let _ = writeln!(
        script,
        "add set inet {table} {} {{ type ipv6_addr ; }}",
        egress.v6_set
    );
    let _ = writeln!(
        script,
        "add set inet {table} {} {{ type ipv4_addr ; flags interval ; }}",
        egress.static_v4_set
    );
    let _ = writeln!(
        script,
        "add set inet {table} {} {{ type ipv6_addr ; flags interval ; }}",
        egress.static_v6_set
    );
    render_refill(
        &mut script,
        table,
        &egress.static_v4_set,
        egress.static_v4.iter().map(String::as_str),
    );
    render_refill(
        &mut script,
        table,
        &egress.static_v6_set,
        egress.static_v6.iter().map(String::as_str),
    );
    script
}

/// Render one dynamic update: flush + refill per family, single script.
///
/// A family that resolved no addresses is skipped entirely, leaving its
/// previously installed set in place; `None` means both families were
/// empty and there is nothing safe to install.
pub fn render_dynamic_script(egress: &EgressConfig, addrs: &PartitionedAddrs) -> Option<String> {
    if addrs.is_empty() {
        return None;
    }
    let mut script = String::new();
    if !addrs.v4.is_empty() {
        render_refill(
            &mut script,
            &egress.table,
            &egress.v4_set,
            addrs.v4.iter().map(|a| a.to_string()),
        );
    }
    if !addrs.v6.is_empty() {
        render_refill(
            &mut script,
            &egress.table,
            &egress.v6_set,
            addrs.v6.iter().map(|a| a.to_string()),
        );
    }
    Some(script)
}

fn render_refill<S: AsRef<str>>(
    script: &mut String,
    table: &str,
    set: &str,
    elements: impl Iterator<Item = S>,
) {
    let joined = elements
        .map(|e| e.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(script, "flush set inet {table} {set}");
    if !joined.is_empty() {
        let _ = writeln!(script, "add element inet {table} {set} {{ {joined} }}");
    }
}
