//! Monitoring verbs exposed to the API.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::db::{
    Certificate, CertificateFilter, DbError, EndpointKind, MonitorTarget, MonitoredPort,
    MonitoringStats,
};
use crate::discovery::{DiscoveredDevice, DiscoveryEngine, DiscoveryError};
use crate::registry::TargetRegistry;
use crate::scheduler::{CheckResult, CycleError, CycleReport, CycleRunner, Dispatcher};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("target {0} not found")]
    NotFound(i64),
    #[error("{0}")]
    InvalidRange(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("{0}")]
    LocalNetwork(String),
}

impl From<DiscoveryError> for MonitorError {
    fn from(e: DiscoveryError) -> Self {
        match e {
            DiscoveryError::Range(e) => MonitorError::InvalidRange(e.to_string()),
            e @ DiscoveryError::NoLocalAddress(_) => MonitorError::LocalNetwork(e.to_string()),
        }
    }
}

/// Target configuration as submitted by a client. Missing fields keep their
/// current (or default) values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub endpoint: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub device_type: Option<String>,
    pub is_active: Option<bool>,
    pub timeout_seconds: Option<i64>,
    pub check_interval_minutes: Option<i64>,
    pub monitor_tls: Option<bool>,
}

impl TargetConfig {
    fn apply_to(self, target: &mut MonitorTarget) {
        if let Some(name) = self.name {
            target.name = name;
        }
        if let Some(description) = self.description {
            target.description = description;
        }
        if self.device_type.is_some() {
            target.device_type = self.device_type;
        }
        if let Some(active) = self.is_active {
            target.is_active = active;
        }
        if let Some(timeout) = self.timeout_seconds {
            target.timeout_seconds = timeout;
        }
        if let Some(interval) = self.check_interval_minutes {
            target.check_interval_minutes = interval;
        }
        if let Some(tls) = self.monitor_tls {
            target.monitor_tls = tls;
        }
    }
}

/// A target together with the check that just updated it.
#[derive(Debug, Clone, Serialize)]
pub struct TargetCheck {
    pub target: MonitorTarget,
    pub result: CheckResult,
}

#[derive(Clone)]
pub struct MonitorService {
    registry: TargetRegistry,
    runner: Arc<CycleRunner>,
    discovery: DiscoveryEngine,
    dispatcher: Dispatcher,
}

impl MonitorService {
    pub fn new(
        registry: TargetRegistry,
        runner: Arc<CycleRunner>,
        discovery: DiscoveryEngine,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            registry,
            runner,
            discovery,
            dispatcher,
        }
    }

    /// Run one cycle now and wait for it.
    pub async fn run_cycle_now(&self) -> Result<CycleReport, MonitorError> {
        Ok(self.runner.run_cycle().await?)
    }

    /// Check one target immediately, due or not.
    pub async fn check_single_target(&self, id: i64) -> Result<TargetCheck, MonitorError> {
        let target = self.registry.get(id)?.ok_or(MonitorError::NotFound(id))?;
        let (target, result) = self.runner.check_one(target).await?;
        Ok(TargetCheck { target, result })
    }

    /// Discover `range`, or the local /24 when `range` is `None`, and tag
    /// devices whose address is already registered.
    pub async fn discover(&self, range: Option<&str>) -> Result<Vec<DiscoveredDevice>, MonitorError> {
        let mut devices = match range.map(str::trim).filter(|r| !r.is_empty()) {
            Some(range) => self.discovery.discover_range(range).await?,
            None => self.discovery.discover_local().await?,
        };

        for device in &mut devices {
            device.already_managed = self
                .registry
                .find_by_endpoint(&device.ip_address.to_string())?
                .is_some();
        }
        Ok(devices)
    }

    /// Register a discovered device and record its open ports.
    pub fn promote_device(&self, device: &DiscoveredDevice) -> Result<MonitorTarget, MonitorError> {
        let target = self.registry.add(device.to_target())?;
        let now = Utc::now();
        let ports: Vec<MonitoredPort> = device
            .open_ports
            .iter()
            .map(|s| s.to_monitored_port(target.id, now))
            .collect();
        self.registry.replace_ports(target.id, &ports)?;

        tracing::info!(
            "Discovery: Added {} ({}) with {} ports",
            target.endpoint,
            target.name,
            ports.len()
        );
        Ok(target)
    }

    /// Register a target. IP targets also get a background port scan, queued
    /// on the shared dispatcher; its handle is returned.
    pub fn add_target(
        &self,
        config: TargetConfig,
    ) -> Result<(MonitorTarget, Option<JoinHandle<Result<Vec<MonitoredPort>, MonitorError>>>), MonitorError> {
        let endpoint = config.endpoint.trim().to_string();
        validate_endpoint(&endpoint)?;

        let mut target = MonitorTarget::new(&endpoint);
        config.apply_to(&mut target);
        let target = self.registry.add(target)?;
        tracing::info!("Registry: Added target {} ({})", target.name, target.endpoint);

        let scan = match (target.endpoint_kind, target.endpoint.parse::<IpAddr>()) {
            (EndpointKind::Ip, Ok(address)) => Some(self.queue_port_scan(target.id, address)),
            _ => None,
        };
        Ok((target, scan))
    }

    pub fn update_target(&self, id: i64, config: TargetConfig) -> Result<MonitorTarget, MonitorError> {
        let mut target = self.registry.get(id)?.ok_or(MonitorError::NotFound(id))?;

        let endpoint = config.endpoint.trim().to_string();
        if !endpoint.is_empty() && endpoint != target.endpoint {
            validate_endpoint(&endpoint)?;
            target.endpoint_kind = EndpointKind::infer(&endpoint);
            target.endpoint = endpoint;
        }
        config.apply_to(&mut target);

        Ok(self.registry.update(target)?)
    }

    pub fn delete_target(&self, id: i64) -> Result<(), MonitorError> {
        self.registry.remove(id).map_err(|e| match e {
            DbError::NotFound => MonitorError::NotFound(id),
            other => other.into(),
        })
    }

    pub fn get_target(&self, id: i64) -> Result<MonitorTarget, MonitorError> {
        self.registry.get(id)?.ok_or(MonitorError::NotFound(id))
    }

    pub fn list_targets(&self) -> Result<Vec<MonitorTarget>, MonitorError> {
        Ok(self.registry.list()?)
    }

    pub fn target_ports(&self, id: i64) -> Result<Vec<MonitoredPort>, MonitorError> {
        self.get_target(id)?;
        Ok(self.registry.ports(id)?)
    }

    pub fn list_certificates(&self, filter: CertificateFilter) -> Result<Vec<Certificate>, MonitorError> {
        Ok(self.registry.certificates(filter)?)
    }

    pub fn get_stats(&self) -> Result<MonitoringStats, MonitorError> {
        let targets = self.registry.list()?;
        let certificates = self.registry.certificates(CertificateFilter::All)?;
        Ok(MonitoringStats::compute(&targets, &certificates))
    }

    fn queue_port_scan(
        &self,
        target_id: i64,
        address: IpAddr,
    ) -> JoinHandle<Result<Vec<MonitoredPort>, MonitorError>> {
        let discovery = self.discovery.clone();
        let registry = self.registry.clone();

        self.dispatcher.spawn(async move {
            let now = Utc::now();
            let ports: Vec<MonitoredPort> = discovery
                .scan_ports(address)
                .await
                .iter()
                .map(|s| s.to_monitored_port(target_id, now))
                .collect();

            match registry.replace_ports(target_id, &ports) {
                Ok(()) => {
                    tracing::info!("Registry: Port scan of {} found {} open ports", address, ports.len());
                    Ok(ports)
                }
                Err(e) => {
                    tracing::warn!("Registry: Failed to store port scan of {}: {}", address, e);
                    Err(e.into())
                }
            }
        })
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), MonitorError> {
    if endpoint.is_empty() {
        return Err(MonitorError::InvalidTarget("endpoint is required".to_string()));
    }
    if EndpointKind::infer(endpoint) == EndpointKind::Url {
        let probe = MonitorTarget::new(endpoint);
        let url = reqwest::Url::parse(&probe.url())
            .map_err(|e| MonitorError::InvalidTarget(format!("{}: {}", endpoint, e)))?;
        if url.host_str().is_none() {
            return Err(MonitorError::InvalidTarget(format!("{}: missing host", endpoint)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Store, TargetStatus};
    use crate::discovery::DiscoverySettings;
    use crate::probe::{NetworkProber, PortState, Reachability};
    use crate::scheduler::{CheckOutcome, Checker};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// 10.0.0.2 answers with SSH open; everything else is silent.
    struct FakeNetwork;

    #[async_trait]
    impl NetworkProber for FakeNetwork {
        async fn probe_reachability(&self, address: IpAddr, _timeout: Duration) -> Reachability {
            if address.to_string() == "10.0.0.2" {
                Reachability::Reachable { response_time_ms: 1.0 }
            } else {
                Reachability::TimedOut
            }
        }
        async fn probe_tcp_port(&self, address: IpAddr, port: u16, _timeout: Duration) -> PortState {
            if address.to_string() == "10.0.0.2" && port == 22 {
                PortState::Open
            } else {
                PortState::FilteredOrTimeout
            }
        }
        async fn resolve_hostname(&self, _address: IpAddr) -> Option<String> {
            Some("build-srv".to_string())
        }
    }

    struct AlwaysUp;

    #[async_trait]
    impl Checker for AlwaysUp {
        async fn check(&self, target: &MonitorTarget) -> CheckResult {
            let mut result = CheckResult::error(target, Utc::now(), "");
            result.outcome = CheckOutcome::Up;
            result.response_code = Some(200);
            result.response_time_ms = Some(8.0);
            result
        }
    }

    fn setup() -> (MonitorService, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(file.path()).unwrap());
        let registry = TargetRegistry::new(store);
        let dispatcher = Dispatcher::new(4);
        let runner = Arc::new(CycleRunner::new(registry.clone(), Arc::new(AlwaysUp), dispatcher.clone()));
        let discovery = DiscoveryEngine::new(Arc::new(FakeNetwork), DiscoverySettings::default());
        (MonitorService::new(registry, runner, discovery, dispatcher), file)
    }

    fn config(endpoint: &str) -> TargetConfig {
        TargetConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_url_target_has_no_port_scan() {
        let (service, _file) = setup();
        let (target, scan) = service.add_target(config("https://example.com")).unwrap();
        assert!(scan.is_none());
        assert_eq!(target.endpoint_kind, EndpointKind::Url);
        assert!(target.monitor_tls);
    }

    #[tokio::test]
    async fn test_add_ip_target_scans_ports_in_background() {
        let (service, _file) = setup();
        let (target, scan) = service.add_target(config("10.0.0.2")).unwrap();

        let ports = scan.unwrap().await.unwrap().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 22);

        let stored = service.target_ports(target.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].service_name, "SSH");
        assert!(stored[0].is_secure);
    }

    #[tokio::test]
    async fn test_duplicate_endpoint_is_conflict() {
        let (service, _file) = setup();
        service.add_target(config("https://example.com")).unwrap();
        let err = service.add_target(config("https://example.com")).unwrap_err();
        assert!(matches!(err, MonitorError::Db(DbError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_invalid_targets_rejected() {
        let (service, _file) = setup();
        assert!(matches!(
            service.add_target(config("  ")),
            Err(MonitorError::InvalidTarget(_))
        ));
        assert!(matches!(
            service.add_target(config("http://")),
            Err(MonitorError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn test_discover_tags_managed_devices_and_promotes() {
        let (service, _file) = setup();

        let devices = service.discover(Some("10.0.0.1-3")).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_type, "Server");
        assert!(!devices[0].already_managed);

        let target = service.promote_device(&devices[0]).unwrap();
        assert_eq!(target.name, "build-srv");
        assert_eq!(service.target_ports(target.id).unwrap().len(), 1);

        let devices = service.discover(Some("10.0.0.1-3")).await.unwrap();
        assert!(devices[0].already_managed);
        assert!(matches!(
            service.promote_device(&devices[0]),
            Err(MonitorError::Db(DbError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn test_discover_invalid_range() {
        let (service, _file) = setup();
        let err = service.discover(Some("10.0.0.1-999")).await.unwrap_err();
        assert!(matches!(err, MonitorError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_check_single_target_and_stats() {
        let (service, _file) = setup();
        let (target, _) = service.add_target(config("https://example.com")).unwrap();
        service.add_target(TargetConfig {
            is_active: Some(false),
            ..config("https://paused.example.com")
        })
        .unwrap();

        let check = service.check_single_target(target.id).await.unwrap();
        assert_eq!(check.target.status, TargetStatus::Up);
        assert_eq!(check.target.last_response_code, Some(200));
        assert_eq!(check.target.consecutive_failures, 0);

        let stats = service.get_stats().unwrap();
        assert_eq!(stats.total_targets, 2);
        assert_eq!(stats.active_targets, 1);
        assert_eq!(stats.up_targets, 1);
        assert_eq!(stats.unknown_targets, 1);
        assert_eq!(stats.overall_uptime_percentage, 100.0);
        assert_eq!(stats.average_response_time_ms, 8.0);

        assert!(matches!(
            service.check_single_target(999).await,
            Err(MonitorError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (service, _file) = setup();
        let (target, _) = service.add_target(config("https://example.com")).unwrap();

        let updated = service
            .update_target(
                target.id,
                TargetConfig {
                    name: Some("Example".to_string()),
                    check_interval_minutes: Some(15),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Example");
        assert_eq!(updated.endpoint, "https://example.com");
        assert_eq!(service.get_target(target.id).unwrap().check_interval_minutes, 15);

        service.delete_target(target.id).unwrap();
        assert!(matches!(
            service.delete_target(target.id),
            Err(MonitorError::NotFound(_))
        ));
    }
}
