//! Per-target check: probe the endpoint and, where it applies, inspect its certificate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

use crate::db::{EndpointKind, MonitorTarget, TargetStatus};
use crate::probe::{
    CertificateInfo, CertificateInspector, HttpOutcome, HttpProber, NetworkProber, Reachability,
};

pub const TIMEOUT_MESSAGE: &str = "Request timed out";

/// Outcome of one check, in the target's status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Up,
    Down,
    Timeout,
    Error,
}

impl CheckOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckOutcome::Up)
    }
}

impl From<CheckOutcome> for TargetStatus {
    fn from(outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Up => TargetStatus::Up,
            CheckOutcome::Down => TargetStatus::Down,
            CheckOutcome::Timeout => TargetStatus::Timeout,
            CheckOutcome::Error => TargetStatus::Error,
        }
    }
}

/// What certificate inspection produced during a check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CertificateCheck {
    NotChecked,
    Inspected(CertificateInfo),
    Failed { message: String },
}

/// Result of checking one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub target_id: i64,
    pub endpoint: String,
    pub outcome: CheckOutcome,
    pub checked_at: DateTime<Utc>,
    pub response_code: Option<u16>,
    pub response_time_ms: Option<f64>,
    /// Empty on success.
    pub error: String,
    pub certificate: CertificateCheck,
}

impl CheckResult {
    fn new(target: &MonitorTarget, outcome: CheckOutcome, checked_at: DateTime<Utc>) -> Self {
        Self {
            target_id: target.id,
            endpoint: target.endpoint.clone(),
            outcome,
            checked_at,
            response_code: None,
            response_time_ms: None,
            error: String::new(),
            certificate: CertificateCheck::NotChecked,
        }
    }

    /// An `Error` result for a check that could not run to completion.
    pub fn error(target: &MonitorTarget, checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            ..Self::new(target, CheckOutcome::Error, checked_at)
        }
    }
}

/// Runs the full check for one target.
///
/// Implementations report every failure inside the returned `CheckResult`.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, target: &MonitorTarget) -> CheckResult;
}

/// Checker backed by real network probes.
pub struct NetworkChecker {
    http: HttpProber,
    inspector: CertificateInspector,
    network: Arc<dyn NetworkProber>,
}

impl NetworkChecker {
    pub fn new(http: HttpProber, inspector: CertificateInspector, network: Arc<dyn NetworkProber>) -> Self {
        Self {
            http,
            inspector,
            network,
        }
    }

    async fn check_url(&self, target: &MonitorTarget, checked_at: DateTime<Utc>) -> CheckResult {
        match self.http.probe(&target.url(), target.timeout()).await {
            HttpOutcome::Response {
                status_code,
                body_time_ms,
            } => {
                let outcome = if (200..300).contains(&status_code) {
                    CheckOutcome::Up
                } else {
                    CheckOutcome::Down
                };
                let mut result = CheckResult::new(target, outcome, checked_at);
                result.response_code = Some(status_code);
                result.response_time_ms = Some(body_time_ms);
                if outcome == CheckOutcome::Down {
                    result.error = format!("HTTP {}", status_code);
                }
                result
            }
            HttpOutcome::TimedOut => CheckResult {
                error: TIMEOUT_MESSAGE.to_string(),
                ..CheckResult::new(target, CheckOutcome::Timeout, checked_at)
            },
            HttpOutcome::TransportError { message } => CheckResult::error(target, checked_at, message),
        }
    }

    async fn check_device(&self, target: &MonitorTarget, checked_at: DateTime<Utc>) -> CheckResult {
        let address: IpAddr = match target.endpoint.parse() {
            Ok(a) => a,
            Err(_) => {
                return CheckResult::error(
                    target,
                    checked_at,
                    format!("invalid IP address: {}", target.endpoint),
                )
            }
        };

        match self.network.probe_reachability(address, target.timeout()).await {
            Reachability::Reachable { response_time_ms } => CheckResult {
                response_time_ms: Some(response_time_ms),
                ..CheckResult::new(target, CheckOutcome::Up, checked_at)
            },
            Reachability::Unreachable => CheckResult {
                error: "Host unreachable".to_string(),
                ..CheckResult::new(target, CheckOutcome::Down, checked_at)
            },
            Reachability::TimedOut => CheckResult {
                error: TIMEOUT_MESSAGE.to_string(),
                ..CheckResult::new(target, CheckOutcome::Timeout, checked_at)
            },
        }
    }

    async fn check_certificate(&self, target: &MonitorTarget) -> CertificateCheck {
        let Some((host, port)) = target.tls_endpoint() else {
            return CertificateCheck::NotChecked;
        };

        match self.inspector.inspect(&host, port, target.timeout()).await {
            Ok(info) => CertificateCheck::Inspected(info),
            Err(e) => {
                tracing::debug!("Checker: certificate inspection of {}:{} failed: {}", host, port, e);
                CertificateCheck::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Checker for NetworkChecker {
    async fn check(&self, target: &MonitorTarget) -> CheckResult {
        let checked_at = Utc::now();
        let mut result = match target.endpoint_kind {
            EndpointKind::Url => self.check_url(target, checked_at).await,
            EndpointKind::Ip => self.check_device(target, checked_at).await,
        };

        // Certificate state is independent of the availability outcome.
        result.certificate = self.check_certificate(target).await;
        result
    }
}
