//! Configuration module for Beacon.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::discovery::DiscoverySettings;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "beacon.db")
    pub db_path: String,
    /// Seconds between monitoring cycles (default: 300)
    pub cycle_interval_secs: u64,
    /// Checks allowed in flight at once (default: 20)
    pub max_concurrent_checks: usize,
    pub discovery_concurrency: usize,
    pub port_scan_concurrency: usize,
    pub discovery_timeout_ms: u64,
    pub port_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "beacon.db".to_string(),
            cycle_interval_secs: 300,
            max_concurrent_checks: 20,
            discovery_concurrency: 20,
            port_scan_concurrency: 10,
            discovery_timeout_ms: 3000,
            port_timeout_ms: 2000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BEACON_HTTP_PORT`: HTTP port (default: 8080)
    /// - `BEACON_DB_PATH`: Database file path (default: "beacon.db")
    /// - `BEACON_CYCLE_INTERVAL_SECS`: cycle tick (default: 300)
    /// - `BEACON_MAX_CONCURRENT_CHECKS`: dispatch limit (default: 20)
    /// - `BEACON_DISCOVERY_CONCURRENCY`: addresses probed at once (default: 20)
    /// - `BEACON_PORT_SCAN_CONCURRENCY`: ports probed at once per device (default: 10)
    /// - `BEACON_DISCOVERY_TIMEOUT_MS`: reachability timeout (default: 3000)
    /// - `BEACON_PORT_TIMEOUT_MS`: port probe timeout (default: 2000)
    ///
    /// Values that do not parse are ignored.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        set_parsed(&lookup, "BEACON_HTTP_PORT", &mut cfg.http_port);
        if let Some(db_path) = lookup("BEACON_DB_PATH") {
            cfg.db_path = db_path;
        }
        set_parsed(&lookup, "BEACON_CYCLE_INTERVAL_SECS", &mut cfg.cycle_interval_secs);
        set_parsed(&lookup, "BEACON_MAX_CONCURRENT_CHECKS", &mut cfg.max_concurrent_checks);
        set_parsed(&lookup, "BEACON_DISCOVERY_CONCURRENCY", &mut cfg.discovery_concurrency);
        set_parsed(&lookup, "BEACON_PORT_SCAN_CONCURRENCY", &mut cfg.port_scan_concurrency);
        set_parsed(&lookup, "BEACON_DISCOVERY_TIMEOUT_MS", &mut cfg.discovery_timeout_ms);
        set_parsed(&lookup, "BEACON_PORT_TIMEOUT_MS", &mut cfg.port_timeout_ms);

        cfg.cycle_interval_secs = cfg.cycle_interval_secs.max(1);
        cfg.max_concurrent_checks = cfg.max_concurrent_checks.max(1);
        cfg.discovery_concurrency = cfg.discovery_concurrency.max(1);
        cfg.port_scan_concurrency = cfg.port_scan_concurrency.max(1);

        cfg
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn discovery_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            address_concurrency: self.discovery_concurrency,
            port_concurrency: self.port_scan_concurrency,
            reachability_timeout: Duration::from_millis(self.discovery_timeout_ms),
            port_timeout: Duration::from_millis(self.port_timeout_ms),
        }
    }
}

fn set_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!("Ignoring unparsable {}={:?}", key, raw),
        }
    }
}
