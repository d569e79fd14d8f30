//! SRV-based service discovery.
//!
//! Servers advertise their real endpoint under `_minecraft._tcp.<domain>`.
//! Lookup failures are never fatal: the caller keeps the address it already
//! has.

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use rand::RngExt;
use tracing::{debug, info};

const SERVICE_LABEL: &str = "_minecraft._tcp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub target: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// Resolve the advertised endpoint for `domain`, if any.
///
/// Only attempted for domain names (an address with at least one letter);
/// numeric addresses cannot carry SRV records. Returns `None` on resolver
/// errors or when no record exists, leaving the original address in force.
pub async fn lookup_service(domain: &str) -> Option<(String, u16)> {
    if domain.is_empty() || !domain.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
    let name = format!("{SERVICE_LABEL}.{domain}");

    let lookup = match resolver.srv_lookup(name).await {
        Ok(lookup) => lookup,
        Err(e) => {
            debug!(error = %e, domain, "SRV lookup failed, keeping original address");
            return None;
        }
    };

    let records: Vec<SrvRecord> = lookup
        .iter()
        .map(|srv| SrvRecord {
            target: srv.target().to_utf8().trim_end_matches('.').to_string(),
            port: srv.port(),
            priority: srv.priority(),
            weight: srv.weight(),
        })
        .collect();

    let chosen = pick_record(&records, &mut rand::rng())?;
    info!(
        target = %chosen.target,
        port = chosen.port,
        domain,
        "found SRV service record"
    );
    Some((chosen.target.clone(), chosen.port))
}

/// Order records by ascending priority, then descending weight, breaking the
/// remaining ties uniformly at random, and return the winner.
fn pick_record<'a>(records: &'a [SrvRecord], rng: &mut impl RngExt) -> Option<&'a SrvRecord> {
    records
        .iter()
        .map(|record| (record, rng.random::<u64>()))
        .min_by_key(|(record, tiebreak)| {
            (record.priority, std::cmp::Reverse(record.weight), *tiebreak)
        })
        .map(|(record, _)| record)
}
