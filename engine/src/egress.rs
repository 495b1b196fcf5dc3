//! One dynamic egress policy cycle: resolve, validate, install.
//!
//! A cycle that cannot produce a single valid address fails loudly and
//! installs nothing: the previously installed sets (and the static
//! allow-list) stay in force, so a transient resolution failure narrows
//! the policy window at worst, never widens or empties it.

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::egress::partition_candidates;
use crate::io::config::EngineConfig;
use crate::io::nft::{Firewall, render_dynamic_script};
use crate::io::resolve::Resolver;

/// Summary of one successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EgressReport {
    pub v4: usize,
    pub v6: usize,
    pub rejected: usize,
}

#[instrument(skip_all)]
pub fn run_egress_cycle<R: Resolver, F: Firewall>(
    config: &EngineConfig,
    resolver: &R,
    firewall: &F,
) -> Result<EgressReport> {
    let mut candidates = Vec::new();
    for domain in &config.egress.domains {
        match resolver.resolve(domain) {
            Ok(mut answers) => candidates.append(&mut answers),
            Err(err) => warn!(
                domain = %domain,
                err = %format!("{err:#}"),
                "resolution failed, continuing with remaining domains"
            ),
        }
    }

    let addrs = partition_candidates(candidates.iter().map(String::as_str));
    for rejected in &addrs.rejected {
        warn!(candidate = %rejected, "rejected resolver answer that is not an address literal");
    }

    let Some(script) = render_dynamic_script(&config.egress, &addrs) else {
        return Err(anyhow!(
            "egress cycle resolved zero valid addresses across {} domain(s); \
             installed sets left untouched",
            config.egress.domains.len()
        ));
    };
    firewall
        .apply(&script)
        .context("apply dynamic egress sets")?;

    let report = EgressReport {
        v4: addrs.v4.len(),
        v6: addrs.v6.len(),
        rejected: addrs.rejected.len(),
    };
    info!(
        v4 = report.v4,
        v6 = report.v6,
        rejected = report.rejected,
        "egress sets updated"
    );
    Ok(report)
}
