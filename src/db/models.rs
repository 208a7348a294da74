//! Database model types.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Certificates expiring within this many days are flagged.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

pub const DEFAULT_TIMEOUT_SECONDS: i64 = 30;
pub const DEFAULT_CHECK_INTERVAL_MINUTES: i64 = 5;
pub const MAX_TIMEOUT_SECONDS: i64 = 3_600;
/// One year.
pub const MAX_CHECK_INTERVAL_MINUTES: i64 = 525_600;

/// What kind of address a target points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Url,
    Ip,
}

impl EndpointKind {
    /// Bare IP addresses are devices, everything else is probed over HTTP.
    pub fn infer(endpoint: &str) -> Self {
        if endpoint.trim().parse::<IpAddr>().is_ok() {
            EndpointKind::Ip
        } else {
            EndpointKind::Url
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Url => "url",
            EndpointKind::Ip => "ip",
        }
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(EndpointKind::Url),
            "ip" => Ok(EndpointKind::Ip),
            other => Err(format!("unknown endpoint kind: {}", other)),
        }
    }
}

/// Last observed state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    #[default]
    Unknown,
    Up,
    Down,
    Timeout,
    Error,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Unknown => "unknown",
            TargetStatus::Up => "up",
            TargetStatus::Down => "down",
            TargetStatus::Timeout => "timeout",
            TargetStatus::Error => "error",
        }
    }

    /// Down, Timeout and Error all count as "down" on the dashboard.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TargetStatus::Down | TargetStatus::Timeout | TargetStatus::Error
        )
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(TargetStatus::Unknown),
            "up" => Ok(TargetStatus::Up),
            "down" => Ok(TargetStatus::Down),
            "timeout" => Ok(TargetStatus::Timeout),
            "error" => Ok(TargetStatus::Error),
            other => Err(format!("unknown target status: {}", other)),
        }
    }
}

/// Certificate classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    #[default]
    Unknown,
    Valid,
    ExpiringSoon,
    Expired,
    Invalid,
}

impl CertificateStatus {
    /// Classify a certificate by its expiry relative to `now`.
    pub fn classify(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now > expires_at {
            CertificateStatus::Expired
        } else if now + ChronoDuration::days(EXPIRY_WARNING_DAYS) > expires_at {
            CertificateStatus::ExpiringSoon
        } else {
            CertificateStatus::Valid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Unknown => "unknown",
            CertificateStatus::Valid => "valid",
            CertificateStatus::ExpiringSoon => "expiring_soon",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Invalid => "invalid",
        }
    }
}

impl FromStr for CertificateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(CertificateStatus::Unknown),
            "valid" => Ok(CertificateStatus::Valid),
            "expiring_soon" => Ok(CertificateStatus::ExpiringSoon),
            "expired" => Ok(CertificateStatus::Expired),
            "invalid" => Ok(CertificateStatus::Invalid),
            other => Err(format!("unknown certificate status: {}", other)),
        }
    }
}

/// A TLS certificate observed on a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    /// 0 until the certificate has been stored.
    pub id: i64,
    pub common_name: String,
    pub issuer: String,
    /// SHA-256 fingerprint of the DER encoding, uppercase hex.
    pub thumbprint: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub algorithm: String,
    pub key_size: u32,
    pub status: CertificateStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expiring_soon(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && now + ChronoDuration::days(EXPIRY_WARNING_DAYS) > self.expires_at
    }

    /// Whole days until expiry, truncated toward zero. Negative once expired.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days()
    }
}

/// A URL monitor or a managed device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorTarget {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub endpoint: String,
    pub endpoint_kind: EndpointKind,
    /// Heuristic classification, only set for devices.
    pub device_type: Option<String>,
    pub is_active: bool,
    pub timeout_seconds: i64,
    pub check_interval_minutes: i64,
    pub monitor_tls: bool,

    pub status: TargetStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_response_code: Option<u16>,
    pub last_response_time_ms: Option<f64>,
    pub last_error: String,
    pub consecutive_failures: i64,
    pub total_checks: i64,
    pub successful_checks: i64,
    pub uptime_percentage: f64,
    pub last_uptime_at: Option<DateTime<Utc>>,
    pub last_downtime_at: Option<DateTime<Utc>>,
    pub certificate: Option<Certificate>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitorTarget {
    /// Create an unsaved target with defaults chosen by endpoint kind.
    pub fn new(endpoint: &str) -> Self {
        let endpoint = endpoint.trim().to_string();
        let endpoint_kind = EndpointKind::infer(&endpoint);
        let now = Utc::now();
        Self {
            id: 0,
            name: endpoint.clone(),
            description: String::new(),
            endpoint,
            endpoint_kind,
            device_type: None,
            is_active: true,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            check_interval_minutes: DEFAULT_CHECK_INTERVAL_MINUTES,
            monitor_tls: endpoint_kind == EndpointKind::Url,
            status: TargetStatus::Unknown,
            last_checked_at: None,
            last_response_code: None,
            last_response_time_ms: None,
            last_error: String::new(),
            consecutive_failures: 0,
            total_checks: 0,
            successful_checks: 0,
            uptime_percentage: 0.0,
            last_uptime_at: None,
            last_downtime_at: None,
            certificate: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace non-positive timeout/interval values with the defaults and cap
    /// oversized ones.
    pub fn normalize(&mut self) {
        if self.timeout_seconds <= 0 {
            self.timeout_seconds = DEFAULT_TIMEOUT_SECONDS;
        }
        self.timeout_seconds = self.timeout_seconds.min(MAX_TIMEOUT_SECONDS);
        if self.check_interval_minutes <= 0 {
            self.check_interval_minutes = DEFAULT_CHECK_INTERVAL_MINUTES;
        }
        self.check_interval_minutes = self.check_interval_minutes.min(MAX_CHECK_INTERVAL_MINUTES);
    }

    pub fn timeout(&self) -> Duration {
        let secs = if self.timeout_seconds <= 0 {
            DEFAULT_TIMEOUT_SECONDS
        } else {
            self.timeout_seconds.min(MAX_TIMEOUT_SECONDS)
        };
        Duration::from_secs(secs as u64)
    }

    /// Active and either never checked or checked at least one interval ago.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_checked_at {
            None => true,
            // An interval too large to represent never comes due.
            Some(last) => ChronoDuration::try_minutes(self.check_interval_minutes)
                .is_some_and(|interval| now - last >= interval),
        }
    }

    /// URL to GET, defaulting the scheme to http.
    pub fn url(&self) -> String {
        if has_scheme(&self.endpoint, "http://") || has_scheme(&self.endpoint, "https://") {
            self.endpoint.clone()
        } else {
            format!("http://{}", self.endpoint)
        }
    }

    pub fn is_secure(&self) -> bool {
        match self.endpoint_kind {
            EndpointKind::Url => has_scheme(&self.endpoint, "https://"),
            EndpointKind::Ip => self.monitor_tls,
        }
    }

    /// Host and port to inspect when certificate monitoring applies.
    pub fn tls_endpoint(&self) -> Option<(String, u16)> {
        if !self.monitor_tls || !self.is_secure() {
            return None;
        }
        match self.endpoint_kind {
            EndpointKind::Ip => Some((self.endpoint.clone(), 443)),
            EndpointKind::Url => {
                let rest = &self.endpoint["https://".len()..];
                let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
                let authority = authority.rsplit('@').next().unwrap_or(authority);
                split_host_port(authority, 443)
            }
        }
    }
}

/// Case-insensitive scheme prefix check; `scheme` includes the `://`.
fn has_scheme(endpoint: &str, scheme: &str) -> bool {
    endpoint
        .get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

/// Split `host[:port]`, handling bracketed IPv6 literals.
fn split_host_port(authority: &str, default_port: u16) -> Option<(String, u16)> {
    if authority.is_empty() {
        return None;
    }
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().ok()?,
            None => default_port,
        };
        return Some((host.to_string(), port));
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => Some((host.to_string(), port.parse().ok()?)),
        None => Some((authority.to_string(), default_port)),
    }
}

/// State of a monitored port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    #[default]
    Unknown,
    Open,
    Closed,
    Filtered,
    Timeout,
}

impl PortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortStatus::Unknown => "unknown",
            PortStatus::Open => "open",
            PortStatus::Closed => "closed",
            PortStatus::Filtered => "filtered",
            PortStatus::Timeout => "timeout",
        }
    }
}

impl FromStr for PortStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(PortStatus::Unknown),
            "open" => Ok(PortStatus::Open),
            "closed" => Ok(PortStatus::Closed),
            "filtered" => Ok(PortStatus::Filtered),
            "timeout" => Ok(PortStatus::Timeout),
            other => Err(format!("unknown port status: {}", other)),
        }
    }
}

/// A port recorded for a device target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredPort {
    pub id: i64,
    pub target_id: i64,
    pub port: u16,
    pub protocol: String,
    pub service_name: String,
    pub is_secure: bool,
    pub status: PortStatus,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Which certificates to list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CertificateFilter {
    All,
    Status(CertificateStatus),
    /// Not yet expired and expiring within the given number of days.
    ExpiringWithin { days: i64 },
}

/// Certificate counts by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CertificateBreakdown {
    pub total: usize,
    pub valid: usize,
    pub expiring_soon: usize,
    pub expired: usize,
    pub invalid: usize,
    pub unknown: usize,
}

/// Aggregate numbers for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitoringStats {
    pub total_targets: usize,
    pub active_targets: usize,
    pub up_targets: usize,
    pub down_targets: usize,
    pub unknown_targets: usize,
    pub certificates: CertificateBreakdown,
    pub average_response_time_ms: f64,
    pub overall_uptime_percentage: f64,
}

impl MonitoringStats {
    pub fn compute(targets: &[MonitorTarget], certificates: &[Certificate]) -> Self {
        let mut stats = MonitoringStats {
            total_targets: targets.len(),
            ..Default::default()
        };

        let mut response_sum = 0.0;
        let mut response_count = 0usize;
        let mut total_checks = 0i64;
        let mut successful_checks = 0i64;

        for t in targets {
            if t.is_active {
                stats.active_targets += 1;
            }
            match t.status {
                TargetStatus::Up => stats.up_targets += 1,
                status if status.is_failure() => stats.down_targets += 1,
                _ => stats.unknown_targets += 1,
            }
            if let Some(ms) = t.last_response_time_ms {
                response_sum += ms;
                response_count += 1;
            }
            total_checks += t.total_checks;
            successful_checks += t.successful_checks;
        }

        if response_count > 0 {
            stats.average_response_time_ms = response_sum / response_count as f64;
        }
        if total_checks > 0 {
            stats.overall_uptime_percentage =
                successful_checks as f64 / total_checks as f64 * 100.0;
        }

        stats.certificates.total = certificates.len();
        for c in certificates {
            match c.status {
                CertificateStatus::Valid => stats.certificates.valid += 1,
                CertificateStatus::ExpiringSoon => stats.certificates.expiring_soon += 1,
                CertificateStatus::Expired => stats.certificates.expired += 1,
                CertificateStatus::Invalid => stats.certificates.invalid += 1,
                CertificateStatus::Unknown => stats.certificates.unknown += 1,
            }
        }

        stats
    }
}
