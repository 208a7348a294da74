//! Probe module for network monitoring.
//!
//! Supports ICMP ping, TCP connect and HTTP probes, plus TLS certificate
//! inspection. Every probe is bounded by a timeout and reports a typed
//! outcome instead of an error.

mod http;
mod ping;
mod tcp;
mod tls;

pub use http::*;
pub use ping::*;
pub use tcp::*;
pub use tls::*;

use async_trait::async_trait;
use serde::Serialize;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("command failed: {0}")]
    Command(String),
}

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Reachability {
    Reachable { response_time_ms: f64 },
    Unreachable,
    TimedOut,
}

/// Result of a TCP connect probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Open,
    Closed,
    FilteredOrTimeout,
}

/// Network operations used by discovery and device checks.
#[async_trait]
pub trait NetworkProber: Send + Sync {
    async fn probe_reachability(&self, address: IpAddr, timeout: Duration) -> Reachability;
    async fn probe_tcp_port(&self, address: IpAddr, port: u16, timeout: Duration) -> PortState;
    /// Reverse lookup; `None` when the address has no name.
    async fn resolve_hostname(&self, address: IpAddr) -> Option<String>;
}

/// Prober backed by the host's network stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProber;

#[async_trait]
impl NetworkProber for SystemProber {
    async fn probe_reachability(&self, address: IpAddr, timeout: Duration) -> Reachability {
        probe_reachability(address, timeout).await
    }

    async fn probe_tcp_port(&self, address: IpAddr, port: u16, timeout: Duration) -> PortState {
        probe_tcp_port(address, port, timeout).await
    }

    async fn resolve_hostname(&self, address: IpAddr) -> Option<String> {
        let name = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&address))
            .await
            .ok()?
            .ok()?;

        // Some resolvers hand the address back when there is no PTR record.
        if name.is_empty() || name.parse::<IpAddr>().is_ok() {
            return None;
        }
        Some(name)
    }
}

/// Render an error with its source chain, e.g. "error sending request: connection refused".
pub(crate) fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(Inner);
    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "error sending request")
        }
    }
    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection refused")
        }
    }
    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }
    impl std::error::Error for Inner {}

    #[test]
    fn test_error_chain_includes_sources() {
        assert_eq!(
            error_chain(&Outer(Inner)),
            "error sending request: connection refused"
        );
    }

    #[test]
    fn test_reachability_serializes_tagged() {
        let json = serde_json::to_value(Reachability::Reachable { response_time_ms: 1.5 }).unwrap();
        assert_eq!(json["state"], "reachable");
        assert_eq!(json["response_time_ms"], 1.5);
    }
}
