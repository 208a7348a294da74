//! Network discovery.
//!
//! Sweeps an IPv4 range for reachable hosts, probes each one for a fixed set
//! of well-known TCP ports and guesses what kind of device it is. Results are
//! scan-scoped; nothing is stored until a device is promoted to a target.

mod classify;
mod range;

pub use classify::*;
pub use range::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;

use crate::db::{MonitorTarget, MonitoredPort, PortStatus};
use crate::probe::{NetworkProber, PortState, Reachability};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("could not determine the local address: {0}")]
    NoLocalAddress(#[source] std::io::Error),
}

/// An open port found on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredService {
    pub port: u16,
    pub protocol: String,
    pub service_name: String,
    pub is_secure: bool,
}

impl DiscoveredService {
    fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: "TCP".to_string(),
            service_name: service_name(port).unwrap_or("Unknown").to_string(),
            is_secure: is_secure_port(port),
        }
    }

    pub fn to_monitored_port(&self, target_id: i64, now: DateTime<Utc>) -> MonitoredPort {
        MonitoredPort {
            id: 0,
            target_id,
            port: self.port,
            protocol: self.protocol.clone(),
            service_name: self.service_name.clone(),
            is_secure: self.is_secure,
            status: PortStatus::Open,
            last_checked: Some(now),
        }
    }
}

/// A host that answered during a discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub ip_address: Ipv4Addr,
    pub hostname: String,
    pub is_reachable: bool,
    pub response_time_ms: f64,
    pub open_ports: Vec<DiscoveredService>,
    pub device_type: String,
    /// Set when a target with this address is already registered.
    #[serde(default)]
    pub already_managed: bool,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    /// An unsaved IP target for this device.
    pub fn to_target(&self) -> MonitorTarget {
        let mut target = MonitorTarget::new(&self.ip_address.to_string());
        target.name = self.hostname.clone();
        target.description = format!("Discovered {}", self.device_type);
        target.device_type = Some(self.device_type.clone());
        target
    }
}

/// Concurrency and timeouts for a discovery run.
#[derive(Debug, Clone, Copy)]
pub struct DiscoverySettings {
    pub address_concurrency: usize,
    pub port_concurrency: usize,
    pub reachability_timeout: Duration,
    pub port_timeout: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            address_concurrency: 20,
            port_concurrency: 10,
            reachability_timeout: Duration::from_millis(3000),
            port_timeout: Duration::from_millis(2000),
        }
    }
}

#[derive(Clone)]
pub struct DiscoveryEngine {
    prober: Arc<dyn NetworkProber>,
    settings: DiscoverySettings,
}

impl DiscoveryEngine {
    pub fn new(prober: Arc<dyn NetworkProber>, settings: DiscoverySettings) -> Self {
        Self { prober, settings }
    }

    /// Probe every address in `range` and return the devices that answered,
    /// ordered by last octet.
    pub async fn discover_range(&self, range: &str) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
        let addresses = parse_range(range)?;
        tracing::info!(
            "Discovery: Probing {} addresses in range {}",
            addresses.len(),
            range
        );

        let permits = Arc::new(Semaphore::new(self.settings.address_concurrency.max(1)));
        let handles: Vec<_> = addresses
            .into_iter()
            .map(|address| {
                let engine = self.clone();
                let permits = permits.clone();
                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    engine.probe_device(address).await
                })
            })
            .collect();

        let mut devices = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(device)) => devices.push(device),
                Ok(None) => {}
                Err(e) => tracing::warn!("Discovery: probe task failed: {}", e),
            }
        }

        devices.sort_by_key(|d| d.ip_address.octets()[3]);
        tracing::info!("Discovery: Found {} devices in {}", devices.len(), range);
        Ok(devices)
    }

    /// Sweep the /24 network of the local interface that routes to the internet.
    pub async fn discover_local(&self) -> Result<Vec<DiscoveredDevice>, DiscoveryError> {
        let local = local_ipv4().await.map_err(DiscoveryError::NoLocalAddress)?;
        let [a, b, c, _] = local.octets();
        self.discover_range(&format!("{}.{}.{}.1-254", a, b, c)).await
    }

    /// Probe one address. `None` when it does not answer.
    pub async fn probe_device(&self, address: Ipv4Addr) -> Option<DiscoveredDevice> {
        let ip = IpAddr::V4(address);
        let response_time_ms = match self
            .prober
            .probe_reachability(ip, self.settings.reachability_timeout)
            .await
        {
            Reachability::Reachable { response_time_ms } => response_time_ms,
            Reachability::Unreachable | Reachability::TimedOut => return None,
        };

        let hostname = self
            .prober
            .resolve_hostname(ip)
            .await
            .unwrap_or_else(|| format!("Unknown-{}", address));
        let open_ports = self.scan_ports(ip).await;
        let port_numbers: Vec<u16> = open_ports.iter().map(|s| s.port).collect();
        let device_type = classify_device(&hostname, &port_numbers).to_string();

        tracing::debug!(
            "Discovery: {} ({}) answered in {:.1}ms, {} open ports",
            address,
            hostname,
            response_time_ms,
            open_ports.len()
        );

        Some(DiscoveredDevice {
            ip_address: address,
            hostname,
            is_reachable: true,
            response_time_ms,
            open_ports,
            device_type,
            already_managed: false,
            discovered_at: Utc::now(),
        })
    }

    /// Probe the well-known ports on `address`; open ones, by port number.
    pub async fn scan_ports(&self, address: IpAddr) -> Vec<DiscoveredService> {
        let permits = Arc::new(Semaphore::new(self.settings.port_concurrency.max(1)));
        let handles: Vec<_> = WELL_KNOWN_PORTS
            .iter()
            .map(|&(port, _)| {
                let prober = self.prober.clone();
                let permits = permits.clone();
                let timeout = self.settings.port_timeout;
                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    (port, prober.probe_tcp_port(address, port, timeout).await)
                })
            })
            .collect();

        let mut open = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((port, PortState::Open)) => open.push(DiscoveredService::tcp(port)),
                Ok(_) => {}
                Err(e) => tracing::warn!("Discovery: port probe task failed: {}", e),
            }
        }
        open.sort_by_key(|s| s.port);
        open
    }
}

/// The local address the OS would use to reach the internet. No packets are sent.
async fn local_ipv4() -> std::io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect(("8.8.8.8", 65530)).await?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(v4) if !v4.is_unspecified() => Ok(v4),
        other => Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("no usable IPv4 address (got {})", other),
        )),
    }
}
