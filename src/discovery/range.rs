//! Address range grammar for discovery.
//!
//! Accepted forms:
//! - a single IPv4 address: `192.168.1.20`
//! - a dash range over the last octet: `192.168.1.1-254` or `192.168.1.1-192.168.1.254`
//! - CIDR: `192.168.1.0/24`. Only `/24` is expanded; any other prefix
//!   length yields no addresses.

use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("invalid address range '{range}': {reason}")]
pub struct RangeError {
    pub range: String,
    pub reason: String,
}

impl RangeError {
    fn new(range: &str, reason: impl Into<String>) -> Self {
        Self {
            range: range.to_string(),
            reason: reason.into(),
        }
    }
}

/// Expand `range` into the addresses to probe, in ascending order.
pub fn parse_range(range: &str) -> Result<Vec<Ipv4Addr>, RangeError> {
    let range = range.trim();
    if range.is_empty() {
        return Err(RangeError::new(range, "empty range"));
    }

    if let Some((start, end)) = range.split_once('-') {
        let start: Ipv4Addr = start
            .trim()
            .parse()
            .map_err(|_| RangeError::new(range, "start is not an IPv4 address"))?;
        let end = end.trim();
        let [a, b, c, first] = start.octets();

        let last = match end.parse::<u8>() {
            Ok(octet) => octet,
            Err(_) => {
                let end: Ipv4Addr = end
                    .parse()
                    .map_err(|_| RangeError::new(range, "end is neither an octet nor an IPv4 address"))?;
                let [ea, eb, ec, ed] = end.octets();
                if [ea, eb, ec] != [a, b, c] {
                    return Err(RangeError::new(range, "start and end must share the first three octets"));
                }
                ed
            }
        };

        return Ok((first..=last).map(|d| Ipv4Addr::new(a, b, c, d)).collect());
    }

    if let Some((base, prefix)) = range.split_once('/') {
        let base: Ipv4Addr = base
            .trim()
            .parse()
            .map_err(|_| RangeError::new(range, "base is not an IPv4 address"))?;
        let prefix: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| RangeError::new(range, "prefix length is not a number"))?;
        if prefix > 32 {
            return Err(RangeError::new(range, "prefix length exceeds 32"));
        }
        if prefix != 24 {
            tracing::warn!("Discovery: only /24 ranges are expanded, '{}' yields no addresses", range);
            return Ok(Vec::new());
        }
        return Ok(last_octet_sweep(base));
    }

    let single: Ipv4Addr = range
        .parse()
        .map_err(|_| RangeError::new(range, "not an IPv4 address"))?;
    Ok(vec![single])
}

/// `a.b.c.1` through `a.b.c.254` for the network containing `address`.
pub fn last_octet_sweep(address: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, _] = address.octets();
    (1..=254).map(|d| Ipv4Addr::new(a, b, c, d)).collect()
}
