//! Domain resolution for the egress policy.
//!
//! The [`Resolver`] trait decouples the policy cycle from real DNS so
//! tests can script answers (including garbage) without network access.
//! Answers are returned as raw strings: validation is the caller's job,
//! never the resolver's.

use std::net::ToSocketAddrs;

use anyhow::{Context, Result};
use tracing::debug;

/// Abstraction over address resolution backends.
pub trait Resolver {
    /// Resolve a domain to candidate address strings (A and AAAA).
    fn resolve(&self, domain: &str) -> Result<Vec<String>>;
}

/// Resolver backed by the system's stub resolver.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, domain: &str) -> Result<Vec<String>> {
        // The port is irrelevant; it only satisfies the lookup API.
        let candidates: Vec<String> = (domain, 443u16)
            .to_socket_addrs()
            .with_context(|| format!("resolve {domain}"))?
            .map(|addr| addr.ip().to_string())
            .collect();
        debug!(domain, count = candidates.len(), "resolved");
        Ok(candidates)
    }
}
