//! Registry of monitored targets.
//!
//! A thin view over the backing store that owns the rules the monitoring
//! core relies on: which targets are due, endpoint uniqueness, and
//! normalization of configuration before it is saved.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{
    Certificate, CertificateFilter, DbError, MonitorTarget, MonitoredPort, TargetStore,
};

#[derive(Clone)]
pub struct TargetRegistry {
    store: Arc<dyn TargetStore>,
}

impl TargetRegistry {
    pub fn new(store: Arc<dyn TargetStore>) -> Self {
        Self { store }
    }

    /// Active targets never checked, or checked at least one interval before `now`.
    pub fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<MonitorTarget>, DbError> {
        let targets = self.store.load_active_targets()?;
        Ok(targets.into_iter().filter(|t| t.is_due(now)).collect())
    }

    pub fn list(&self) -> Result<Vec<MonitorTarget>, DbError> {
        self.store.load_targets()
    }

    pub fn get(&self, id: i64) -> Result<Option<MonitorTarget>, DbError> {
        self.store.load_target(id)
    }

    pub fn find_by_endpoint(&self, endpoint: &str) -> Result<Option<MonitorTarget>, DbError> {
        self.store.load_target_by_endpoint(endpoint.trim())
    }

    /// Register a new target. A duplicate endpoint is a `Conflict`.
    pub fn add(&self, mut target: MonitorTarget) -> Result<MonitorTarget, DbError> {
        target.endpoint = target.endpoint.trim().to_string();
        target.normalize();
        if self.store.load_target_by_endpoint(&target.endpoint)?.is_some() {
            return Err(DbError::Conflict(target.endpoint));
        }
        self.store.insert_target(&mut target)?;
        Ok(target)
    }

    /// Save configuration changes. Check state is not touched.
    pub fn update(&self, mut target: MonitorTarget) -> Result<MonitorTarget, DbError> {
        target.endpoint = target.endpoint.trim().to_string();
        target.normalize();
        if let Some(existing) = self.store.load_target_by_endpoint(&target.endpoint)? {
            if existing.id != target.id {
                return Err(DbError::Conflict(target.endpoint));
            }
        }
        target.updated_at = Utc::now();
        self.store.update_target_config(&target)?;
        Ok(target)
    }

    /// Persist the check state of one target.
    pub fn save(&self, target: &MonitorTarget) -> Result<(), DbError> {
        self.save_all(std::slice::from_ref(target))
    }

    /// Persist the check state of a batch of targets in one write.
    pub fn save_all(&self, targets: &[MonitorTarget]) -> Result<(), DbError> {
        if targets.is_empty() {
            return Ok(());
        }
        self.store.upsert_targets(targets)
    }

    pub fn remove(&self, id: i64) -> Result<(), DbError> {
        self.store.delete_target(id)
    }

    pub fn certificates(&self, filter: CertificateFilter) -> Result<Vec<Certificate>, DbError> {
        self.store.list_certificates(filter)
    }

    pub fn ports(&self, target_id: i64) -> Result<Vec<MonitoredPort>, DbError> {
        self.store.load_ports(target_id)
    }

    pub fn replace_ports(&self, target_id: i64, ports: &[MonitoredPort]) -> Result<(), DbError> {
        self.store.replace_ports(target_id, ports)
    }
}
