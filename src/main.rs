//! Beacon - uptime and certificate-expiry monitor
//!
//! Periodically checks registered URLs and network devices, inspects their
//! TLS certificates and discovers hosts on the local network.

mod config;
mod db;
mod discovery;
mod probe;
mod registry;
mod scheduler;
mod service;
mod web;

use config::ServerConfig;
use db::Store;
use discovery::DiscoveryEngine;
use probe::{CertificateInspector, HttpProber, SystemProber};
use registry::TargetRegistry;
use scheduler::{CycleRunner, Dispatcher, NetworkChecker, Scheduler};
use service::MonitorService;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("beacon=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting Beacon on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let registry = TargetRegistry::new(store);
    let dispatcher = Dispatcher::new(cfg.max_concurrent_checks);
    tracing::info!("Running at most {} checks at once", dispatcher.limit());
    let network = Arc::new(SystemProber);

    let checker = NetworkChecker::new(HttpProber::new()?, CertificateInspector::new()?, network.clone());
    let runner = Arc::new(CycleRunner::new(registry.clone(), Arc::new(checker), dispatcher.clone()));
    let discovery = DiscoveryEngine::new(network, cfg.discovery_settings());

    // Start scheduler
    let scheduler = Scheduler::new(runner.clone(), cfg.cycle_interval());
    let scheduler_task = scheduler.start();

    // Start web server
    let service = MonitorService::new(registry, runner, discovery, dispatcher);
    let server = Server::new(cfg, service);
    let result = server.start().await;

    scheduler.stop();
    let _ = scheduler_task.await;
    result
}
