//! Candidate address validation for the egress policy.
//!
//! DNS answers are treated as untrusted text until they survive a strict
//! parse as an IPv4 or IPv6 literal. Anything else is rejected and counted,
//! never installed.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Validated addresses split by family, plus whatever failed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionedAddrs {
    pub v4: BTreeSet<Ipv4Addr>,
    pub v6: BTreeSet<Ipv6Addr>,
    pub rejected: Vec<String>,
}

impl PartitionedAddrs {
    /// True when no valid address survived in either family.
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}

/// Partition resolver candidates into per-family sets.
///
/// Each candidate must parse as a bare IPv4 or IPv6 literal. Duplicates
/// collapse; rejects are preserved verbatim for reporting.
pub fn partition_candidates<'a, I>(candidates: I) -> PartitionedAddrs
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = PartitionedAddrs::default();
    for candidate in candidates {
        match candidate.parse::<IpAddr>() {
            Ok(IpAddr::V4(addr)) => {
                out.v4.insert(addr);
            }
            Ok(IpAddr::V6(addr)) => {
                out.v6.insert(addr);
            }
            Err(_) => out.rejected.push(candidate.to_string()),
        }
    }
    out
}

/// A parsed CIDR range (or bare address, treated as a full-length prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub addr: IpAddr,
    pub prefix: u8,
}

/// Strictly parse `addr/prefix` (or a bare address literal).
pub fn parse_cidr(input: &str) -> Option<Cidr> {
    let (addr_part, prefix_part) = match input.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (input, None),
    };
    let addr: IpAddr = addr_part.parse().ok()?;
    let max_prefix = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    let prefix = match prefix_part {
        Some(raw) => raw.parse::<u8>().ok().filter(|p| *p <= max_prefix)?,
        None => max_prefix,
    };
    Some(Cidr { addr, prefix })
}
