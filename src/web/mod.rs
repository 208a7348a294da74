//! Web server module.

mod handlers;

use crate::config::ServerConfig;
use crate::service::MonitorService;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub service: MonitorService,
}

/// JSON API server for Beacon.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, service: MonitorService) -> Self {
        Self {
            state: AppState { config, service },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route(
                "/api/targets",
                get(handlers::handle_get_targets).post(handlers::handle_create_target),
            )
            .route(
                "/api/targets/{id}",
                get(handlers::handle_get_target)
                    .put(handlers::handle_update_target)
                    .delete(handlers::handle_delete_target),
            )
            .route("/api/targets/{id}/check", post(handlers::handle_check_target))
            .route("/api/targets/{id}/ports", get(handlers::handle_get_ports))
            .route("/api/cycle", post(handlers::handle_run_cycle))
            .route("/api/discovery", post(handlers::handle_discover))
            .route("/api/discovery/add", post(handlers::handle_add_discovered))
            .route("/api/certificates", get(handlers::handle_get_certificates))
            .route("/api/stats", get(handlers::handle_get_stats))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web server listening on {}", addr);
        self.serve(listener).await
    }

    async fn serve(
        &self,
        listener: tokio::net::TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        axum::serve(listener, self.routes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::discovery::{DiscoveryEngine, DiscoverySettings};
    use crate::probe::{CertificateInspector, HttpProber, SystemProber};
    use crate::registry::TargetRegistry;
    use crate::scheduler::{CycleRunner, Dispatcher, NetworkChecker};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tokio::net::TcpListener;

    async fn spawn_server() -> (String, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(file.path()).unwrap());
        let registry = TargetRegistry::new(store);
        let dispatcher = Dispatcher::new(4);
        let network = Arc::new(SystemProber);
        let checker = NetworkChecker::new(
            HttpProber::new().unwrap(),
            CertificateInspector::new().unwrap(),
            network.clone(),
        );
        let runner = Arc::new(CycleRunner::new(registry.clone(), Arc::new(checker), dispatcher.clone()));
        let discovery = DiscoveryEngine::new(network, DiscoverySettings::default());
        let service = MonitorService::new(registry, runner, discovery, dispatcher);
        let server = Server::new(ServerConfig::default(), service);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });
        (base, file)
    }

    #[tokio::test]
    async fn test_target_lifecycle_over_http() {
        let (base, _file) = spawn_server().await;
        let client = reqwest::Client::new();

        let created: Value = client
            .post(format!("{}/api/targets", base))
            .json(&json!({"endpoint": "https://example.com", "name": "Example"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["name"], "Example");
        assert_eq!(created["endpoint_kind"], "url");

        let duplicate = client
            .post(format!("{}/api/targets", base))
            .json(&json!({"endpoint": "https://example.com"}))
            .send()
            .await
            .unwrap();
        assert_eq!(duplicate.status(), 409);

        let missing = client
            .get(format!("{}/api/targets/{}", base, id + 100))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);

        let stats: Value = client
            .get(format!("{}/api/stats", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["total_targets"], 1);

        let deleted = client
            .delete(format!("{}/api/targets/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), 204);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let (base, _file) = spawn_server().await;
        let client = reqwest::Client::new();

        let bad_range = client
            .post(format!("{}/api/discovery", base))
            .json(&json!({"range": "10.0.0.1-999"}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_range.status(), 400);

        let bad_target = client
            .post(format!("{}/api/targets", base))
            .json(&json!({"endpoint": ""}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_target.status(), 400);

        let certs: Value = client
            .get(format!("{}/api/certificates?expiring_within=30", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(certs, json!([]));
    }
}
