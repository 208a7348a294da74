//! One monitoring cycle: list due targets, check them, fold and save.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::db::{DbError, MonitorTarget};
use crate::registry::TargetRegistry;

use super::aggregate;
use super::check::{CheckOutcome, CheckResult, Checker};
use super::dispatcher::Dispatcher;

/// The two conditions that fail a whole cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("failed to list due targets: {0}")]
    Listing(#[source] DbError),
    /// The checks ran; `report` holds their outcomes even though nothing was saved.
    #[error("failed to save results of {} checks: {source}", .report.checked)]
    Persistence { source: DbError, report: CycleReport },
}

/// Per-target outcomes of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checked: usize,
    pub up: usize,
    pub failed: usize,
    pub results: Vec<CheckResult>,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>, results: Vec<CheckResult>) -> Self {
        let up = results.iter().filter(|r| r.outcome == CheckOutcome::Up).count();
        Self {
            started_at,
            finished_at: Utc::now(),
            checked: results.len(),
            up,
            failed: results.len() - up,
            results,
        }
    }
}

/// Runs cycles against a registry. Holds no check state between cycles.
#[derive(Clone)]
pub struct CycleRunner {
    registry: TargetRegistry,
    checker: Arc<dyn Checker>,
    dispatcher: Dispatcher,
    /// Held while results are folded into freshly read targets and saved, so
    /// overlapping cycles and single checks never overwrite each other.
    fold_lock: Arc<Mutex<()>>,
}

impl CycleRunner {
    pub fn new(registry: TargetRegistry, checker: Arc<dyn Checker>, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            checker,
            dispatcher,
            fold_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Check every due target and save the new state in one batch.
    ///
    /// A failed or panicking check only affects its own target. Listing and
    /// the final save are the only cycle-fatal steps.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        let due = self.registry.list_due(started_at).map_err(|e| {
            tracing::error!("Cycle: failed to list due targets: {}", e);
            CycleError::Listing(e)
        })?;

        if due.is_empty() {
            tracing::debug!("Cycle: no targets due");
            return Ok(CycleReport::new(started_at, Vec::new()));
        }
        tracing::info!("Cycle: checking {} due targets", due.len());

        let results = self.check_all(due).await;

        let saved = {
            let _guard = self.fold_lock.lock().await;
            self.fold(&results)
                .and_then(|updated| self.registry.save_all(&updated).map(|_| updated.len()))
        };
        let report = CycleReport::new(started_at, results);

        let saved = match saved {
            Ok(saved) => saved,
            Err(e) => {
                tracing::error!("Cycle: failed to save {} results: {}", report.checked, e);
                return Err(CycleError::Persistence { source: e, report });
            }
        };
        if saved < report.checked {
            tracing::debug!("Cycle: {} targets were deleted while being checked", report.checked - saved);
        }

        tracing::info!(
            "Cycle: {} checked, {} up, {} failed in {}ms",
            report.checked,
            report.up,
            report.failed,
            (report.finished_at - report.started_at).num_milliseconds()
        );
        Ok(report)
    }

    /// Check one target now, regardless of whether it is due, and save it.
    pub async fn check_one(&self, target: MonitorTarget) -> Result<(MonitorTarget, CheckResult), DbError> {
        let result = self
            .check_all(vec![target])
            .await
            .into_iter()
            .next()
            .ok_or(DbError::NotFound)?;

        let _guard = self.fold_lock.lock().await;
        let updated = self
            .fold(std::slice::from_ref(&result))?
            .into_iter()
            .next()
            .ok_or(DbError::NotFound)?;
        self.registry.save(&updated)?;
        Ok((updated, result))
    }

    /// Apply each result to the target's current stored state. Targets
    /// deleted since they were checked are dropped.
    fn fold(&self, results: &[CheckResult]) -> Result<Vec<MonitorTarget>, DbError> {
        let mut updated = Vec::with_capacity(results.len());
        for result in results {
            if let Some(current) = self.registry.get(result.target_id)? {
                updated.push(aggregate::apply(&current, result));
            }
        }
        Ok(updated)
    }

    async fn check_all(&self, targets: Vec<MonitorTarget>) -> Vec<CheckResult> {
        let handles: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let checker = self.checker.clone();
                let task_target = target.clone();
                let handle = self
                    .dispatcher
                    .spawn(async move { checker.check(&task_target).await });
                (target, handle)
            })
            .collect();

        let mut out = Vec::with_capacity(handles.len());
        for (target, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Cycle: check of {} failed: {}", target.endpoint, e);
                    CheckResult::error(&target, Utc::now(), format!("check task failed: {}", e))
                }
            };
            if !result.outcome.is_success() {
                tracing::debug!("Cycle: {} is {:?}: {}", target.endpoint, result.outcome, result.error);
            }
            out.push(result);
        }
        out
    }
}
