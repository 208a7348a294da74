//! Database module for Beacon.
//!
//! Provides the persistence seam used by the monitoring core and its SQLite
//! implementation.

mod models;
mod store;

pub use models::*;
pub use store::*;

/// Load/save operations the monitoring core needs from its backing store.
///
/// Implementations must reject a second target with an endpoint that is
/// already stored (`DbError::Conflict`) and keep at most one certificate row
/// per thumbprint.
pub trait TargetStore: Send + Sync {
    fn load_targets(&self) -> Result<Vec<MonitorTarget>, DbError>;
    fn load_active_targets(&self) -> Result<Vec<MonitorTarget>, DbError>;
    fn load_target(&self, id: i64) -> Result<Option<MonitorTarget>, DbError>;
    fn load_target_by_endpoint(&self, endpoint: &str) -> Result<Option<MonitorTarget>, DbError>;

    /// Insert a new target and set its ID.
    fn insert_target(&self, target: &mut MonitorTarget) -> Result<i64, DbError>;

    /// Update configuration columns only; check state is left alone.
    fn update_target_config(&self, target: &MonitorTarget) -> Result<(), DbError>;

    /// Write check state for a batch of targets in one transaction.
    ///
    /// Each target's certificate, if any, is upserted by thumbprint and
    /// linked to the target.
    fn upsert_targets(&self, targets: &[MonitorTarget]) -> Result<(), DbError>;

    fn delete_target(&self, id: i64) -> Result<(), DbError>;

    fn upsert_certificate(&self, cert: &mut Certificate) -> Result<i64, DbError>;
    fn list_certificates(&self, filter: CertificateFilter) -> Result<Vec<Certificate>, DbError>;

    fn replace_ports(&self, target_id: i64, ports: &[MonitoredPort]) -> Result<(), DbError>;
    fn load_ports(&self, target_id: i64) -> Result<Vec<MonitoredPort>, DbError>;
}
