//! HTTP request handlers.

use super::AppState;
use crate::db::{Certificate, CertificateFilter, CertificateStatus, DbError, EXPIRY_WARNING_DAYS};
use crate::discovery::DiscoveredDevice;
use crate::scheduler::{CycleError, CycleReport};
use crate::service::{MonitorError, TargetConfig};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Map a service error to a status code and message.
fn error_response(e: MonitorError) -> Response {
    let status = match &e {
        MonitorError::NotFound(_) | MonitorError::Db(DbError::NotFound) => StatusCode::NOT_FOUND,
        MonitorError::Db(DbError::Conflict(_)) => StatusCode::CONFLICT,
        MonitorError::InvalidRange(_) | MonitorError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("API: {}", e);
    }
    (status, e.to_string()).into_response()
}

// ============================================================================
// API: Targets
// ============================================================================

pub async fn handle_get_targets(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.list_targets() {
        Ok(targets) => Json(targets).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_target(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.service.get_target(id) {
        Ok(target) => Json(target).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_create_target(
    State(state): State<AppState>,
    Json(req): Json<TargetConfig>,
) -> impl IntoResponse {
    match state.service.add_target(req) {
        // The port scan, if any, finishes in the background and logs its own outcome.
        Ok((target, _scan)) => (StatusCode::CREATED, Json(target)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_update_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<TargetConfig>,
) -> impl IntoResponse {
    match state.service.update_target(id, req) {
        Ok(target) => Json(target).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_delete_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.service.delete_target(id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_check_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.service.check_single_target(id).await {
        Ok(check) => Json(check).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_ports(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.service.target_ports(id) {
        Ok(ports) => Json(ports).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// API: Cycle
// ============================================================================

#[derive(Debug, Serialize)]
struct FailedCycle {
    error: String,
    report: CycleReport,
}

pub async fn handle_run_cycle(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.run_cycle_now().await {
        Ok(report) => Json(report).into_response(),
        // Checks ran but were not saved: still show what they found.
        Err(MonitorError::Cycle(CycleError::Persistence { source, report })) => {
            tracing::error!("API: cycle results not saved: {}", source);
            let body = FailedCycle {
                error: format!("failed to save cycle results: {}", source),
                report,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
        Err(e) => error_response(e),
    }
}

// ============================================================================
// API: Discovery
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryRequest {
    /// Omit to sweep the local network.
    #[serde(default)]
    pub range: Option<String>,
}

pub async fn handle_discover(
    State(state): State<AppState>,
    body: Option<Json<DiscoveryRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    match state.service.discover(req.range.as_deref()).await {
        Ok(devices) => Json(devices).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_add_discovered(
    State(state): State<AppState>,
    Json(device): Json<DiscoveredDevice>,
) -> impl IntoResponse {
    match state.service.promote_device(&device) {
        Ok(target) => (StatusCode::CREATED, Json(target)).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// API: Certificates & stats
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CertificatesQuery {
    /// Only certificates expiring within this many days.
    #[serde(default)]
    pub expiring_within: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A certificate with its expiry figures computed for now.
#[derive(Debug, Serialize)]
pub struct CertificateView {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub days_until_expiry: i64,
    pub is_expired: bool,
    pub is_expiring_soon: bool,
}

impl From<Certificate> for CertificateView {
    fn from(certificate: Certificate) -> Self {
        let now = Utc::now();
        Self {
            days_until_expiry: certificate.days_until_expiry(now),
            is_expired: certificate.is_expired(now),
            is_expiring_soon: certificate.is_expiring_soon(now),
            certificate,
        }
    }
}

pub async fn handle_get_certificates(
    State(state): State<AppState>,
    Query(query): Query<CertificatesQuery>,
) -> impl IntoResponse {
    let filter = match (query.expiring_within, query.status) {
        (Some(days), _) => CertificateFilter::ExpiringWithin {
            days: if days <= 0 { EXPIRY_WARNING_DAYS } else { days },
        },
        (None, Some(status)) => match status.parse::<CertificateStatus>() {
            Ok(s) => CertificateFilter::Status(s),
            Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
        },
        (None, None) => CertificateFilter::All,
    };

    match state.service.list_certificates(filter) {
        Ok(certs) => {
            let views: Vec<CertificateView> = certs.into_iter().map(CertificateView::from).collect();
            Json(views).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.get_stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(e),
    }
}
