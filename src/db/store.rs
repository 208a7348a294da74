//! SQLite database store implementation.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use super::TargetStore;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found")]
    NotFound,
    #[error("a target with endpoint {0} already exists")]
    Conflict(String),
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

const TARGET_COLUMNS: &str = "id, name, description, endpoint, endpoint_kind, device_type, \
    is_active, timeout_seconds, check_interval_minutes, monitor_tls, status, last_checked_at, \
    last_response_code, last_response_time_ms, last_error, consecutive_failures, total_checks, \
    successful_checks, uptime_percentage, last_uptime_at, last_downtime_at, certificate_id, \
    created_at, updated_at";

const CERTIFICATE_COLUMNS: &str = "id, common_name, issuer, thumbprint, issued_at, expires_at, \
    algorithm, key_size, status, last_checked, created_at, updated_at";

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database with migrations.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn query_targets(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<MonitorTarget>, DbError> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM targets {} ORDER BY id ASC", TARGET_COLUMNS, filter);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, target_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        let mut targets = Vec::with_capacity(rows.len());
        for (mut target, certificate_id) in rows {
            if let Some(id) = certificate_id {
                target.certificate = load_certificate(&conn, id)?;
            }
            targets.push(target);
        }
        Ok(targets)
    }
}

impl TargetStore for Store {
    // --- Targets ---

    fn load_targets(&self) -> Result<Vec<MonitorTarget>, DbError> {
        self.query_targets("", &[])
    }

    fn load_active_targets(&self) -> Result<Vec<MonitorTarget>, DbError> {
        self.query_targets("WHERE is_active = 1", &[])
    }

    fn load_target(&self, id: i64) -> Result<Option<MonitorTarget>, DbError> {
        Ok(self.query_targets("WHERE id = ?1", &[&id])?.into_iter().next())
    }

    fn load_target_by_endpoint(&self, endpoint: &str) -> Result<Option<MonitorTarget>, DbError> {
        Ok(self
            .query_targets("WHERE endpoint = ?1", &[&endpoint])?
            .into_iter()
            .next())
    }

    fn insert_target(&self, target: &mut MonitorTarget) -> Result<i64, DbError> {
        target.normalize();
        let conn = self.conn();
        let id = insert_target_row(&conn, target)?;
        target.id = id;
        Ok(id)
    }

    fn update_target_config(&self, target: &MonitorTarget) -> Result<(), DbError> {
        let mut target = target.clone();
        target.normalize();
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE targets SET name=?1, description=?2, endpoint=?3, endpoint_kind=?4, device_type=?5, \
                 is_active=?6, timeout_seconds=?7, check_interval_minutes=?8, monitor_tls=?9, updated_at=?10 \
                 WHERE id=?11",
                params![
                    target.name,
                    target.description,
                    target.endpoint,
                    target.endpoint_kind.as_str(),
                    target.device_type,
                    target.is_active,
                    target.timeout_seconds,
                    target.check_interval_minutes,
                    target.monitor_tls,
                    format_db_time(Utc::now()),
                    target.id,
                ],
            )
            .map_err(|e| map_conflict(e, &target.endpoint))?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    fn upsert_targets(&self, targets: &[MonitorTarget]) -> Result<(), DbError> {
        if targets.is_empty() {
            return Ok(());
        }

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;

        for target in targets {
            let certificate_id = match &target.certificate {
                Some(cert) => Some(upsert_certificate_row(&tx, cert)?),
                None => None,
            };

            // A target deleted since it was loaded matches no row and is skipped.
            tx.execute(
                "UPDATE targets SET status=?1, last_checked_at=?2, last_response_code=?3, \
                 last_response_time_ms=?4, last_error=?5, consecutive_failures=?6, total_checks=?7, \
                 successful_checks=?8, uptime_percentage=?9, last_uptime_at=?10, last_downtime_at=?11, \
                 certificate_id=?12, updated_at=?13 WHERE id=?14",
                params![
                    target.status.as_str(),
                    target.last_checked_at.map(format_db_time),
                    target.last_response_code,
                    target.last_response_time_ms,
                    target.last_error,
                    target.consecutive_failures,
                    target.total_checks,
                    target.successful_checks,
                    target.uptime_percentage,
                    target.last_uptime_at.map(format_db_time),
                    target.last_downtime_at.map(format_db_time),
                    certificate_id,
                    format_db_time(target.updated_at),
                    target.id,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_target(&self, id: i64) -> Result<(), DbError> {
        let conn = self.conn();
        conn.execute("DELETE FROM monitored_ports WHERE target_id = ?1", params![id])?;
        let changed = conn.execute("DELETE FROM targets WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    // --- Certificates ---

    fn upsert_certificate(&self, cert: &mut Certificate) -> Result<i64, DbError> {
        let conn = self.conn();
        let id = upsert_certificate_row(&conn, cert)?;
        cert.id = id;
        Ok(id)
    }

    fn list_certificates(&self, filter: CertificateFilter) -> Result<Vec<Certificate>, DbError> {
        let conn = self.conn();
        let base = format!("SELECT {} FROM certificates", CERTIFICATE_COLUMNS);

        let certs = match filter {
            CertificateFilter::All => {
                let mut stmt = conn.prepare(&format!("{} ORDER BY expires_at ASC", base))?;
                let rows = stmt.query_map([], certificate_from_row)?;
                rows.collect::<SqlResult<Vec<_>>>()?
            }
            CertificateFilter::Status(status) => {
                let mut stmt =
                    conn.prepare(&format!("{} WHERE status = ?1 ORDER BY expires_at ASC", base))?;
                let rows = stmt.query_map(params![status.as_str()], certificate_from_row)?;
                rows.collect::<SqlResult<Vec<_>>>()?
            }
            CertificateFilter::ExpiringWithin { days } => {
                let now = Utc::now();
                // Stored times compare as text, which only holds for four-digit years.
                let cutoff = ChronoDuration::try_days(days)
                    .and_then(|window| now.checked_add_signed(window))
                    .filter(|cutoff| cutoff.year() <= 9999);
                match cutoff {
                    Some(cutoff) => {
                        let mut stmt = conn.prepare(&format!(
                            "{} WHERE expires_at > ?1 AND expires_at <= ?2 ORDER BY expires_at ASC",
                            base
                        ))?;
                        let rows = stmt.query_map(
                            params![format_db_time(now), format_db_time(cutoff)],
                            certificate_from_row,
                        )?;
                        rows.collect::<SqlResult<Vec<_>>>()?
                    }
                    // Window past any representable date: everything not yet expired.
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "{} WHERE expires_at > ?1 ORDER BY expires_at ASC",
                            base
                        ))?;
                        let rows = stmt.query_map(params![format_db_time(now)], certificate_from_row)?;
                        rows.collect::<SqlResult<Vec<_>>>()?
                    }
                }
            }
        };

        Ok(certs)
    }

    // --- Monitored ports ---

    fn replace_ports(&self, target_id: i64, ports: &[MonitoredPort]) -> Result<(), DbError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM monitored_ports WHERE target_id = ?1", params![target_id])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO monitored_ports (target_id, port, protocol, service_name, is_secure, status, last_checked) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for p in ports {
                stmt.execute(params![
                    target_id,
                    p.port,
                    p.protocol,
                    p.service_name,
                    p.is_secure,
                    p.status.as_str(),
                    p.last_checked.map(format_db_time),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn load_ports(&self, target_id: i64) -> Result<Vec<MonitoredPort>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, target_id, port, protocol, service_name, is_secure, status, last_checked \
             FROM monitored_ports WHERE target_id = ?1 ORDER BY port ASC",
        )?;

        let ports = stmt
            .query_map(params![target_id], |row| {
                Ok(MonitoredPort {
                    id: row.get(0)?,
                    target_id: row.get(1)?,
                    port: row.get(2)?,
                    protocol: row.get(3)?,
                    service_name: row.get(4)?,
                    is_secure: row.get(5)?,
                    status: parse_column(6, row.get(6)?)?,
                    last_checked: optional_time(row.get(7)?),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(ports)
    }
}

fn insert_target_row(conn: &Connection, target: &MonitorTarget) -> Result<i64, DbError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM targets WHERE endpoint = ?1",
            params![target.endpoint],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(DbError::Conflict(target.endpoint.clone()));
    }

    conn.execute(
        "INSERT INTO targets (name, description, endpoint, endpoint_kind, device_type, is_active, \
         timeout_seconds, check_interval_minutes, monitor_tls, status, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            target.name,
            target.description,
            target.endpoint,
            target.endpoint_kind.as_str(),
            target.device_type,
            target.is_active,
            target.timeout_seconds,
            target.check_interval_minutes,
            target.monitor_tls,
            target.status.as_str(),
            format_db_time(target.created_at),
            format_db_time(target.updated_at),
        ],
    )
    .map_err(|e| map_conflict(e, &target.endpoint))?;

    Ok(conn.last_insert_rowid())
}

/// Insert a certificate, or refresh the row sharing its thumbprint.
fn upsert_certificate_row(conn: &Connection, cert: &Certificate) -> Result<i64, DbError> {
    let now = format_db_time(Utc::now());
    conn.execute(
        "INSERT INTO certificates (common_name, issuer, thumbprint, issued_at, expires_at, algorithm, \
         key_size, status, last_checked, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10) \
         ON CONFLICT(thumbprint) DO UPDATE SET \
         status=excluded.status, last_checked=excluded.last_checked, updated_at=excluded.updated_at",
        params![
            cert.common_name,
            cert.issuer,
            cert.thumbprint,
            format_db_time(cert.issued_at),
            format_db_time(cert.expires_at),
            cert.algorithm,
            cert.key_size,
            cert.status.as_str(),
            cert.last_checked.map(format_db_time),
            now,
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM certificates WHERE thumbprint = ?1",
        params![cert.thumbprint],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn load_certificate(conn: &Connection, id: i64) -> Result<Option<Certificate>, DbError> {
    let cert = conn
        .query_row(
            &format!("SELECT {} FROM certificates WHERE id = ?1", CERTIFICATE_COLUMNS),
            params![id],
            certificate_from_row,
        )
        .optional()?;
    Ok(cert)
}

fn target_from_row(row: &Row<'_>) -> SqlResult<(MonitorTarget, Option<i64>)> {
    let target = MonitorTarget {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        endpoint: row.get(3)?,
        endpoint_kind: parse_column(4, row.get(4)?)?,
        device_type: row.get(5)?,
        is_active: row.get(6)?,
        timeout_seconds: row.get(7)?,
        check_interval_minutes: row.get(8)?,
        monitor_tls: row.get(9)?,
        status: parse_column(10, row.get(10)?)?,
        last_checked_at: optional_time(row.get(11)?),
        last_response_code: row.get(12)?,
        last_response_time_ms: row.get(13)?,
        last_error: row.get(14)?,
        consecutive_failures: row.get(15)?,
        total_checks: row.get(16)?,
        successful_checks: row.get(17)?,
        uptime_percentage: row.get(18)?,
        last_uptime_at: optional_time(row.get(19)?),
        last_downtime_at: optional_time(row.get(20)?),
        certificate: None,
        created_at: required_time(22, row.get(22)?)?,
        updated_at: required_time(23, row.get(23)?)?,
    };
    Ok((target, row.get(21)?))
}

fn certificate_from_row(row: &Row<'_>) -> SqlResult<Certificate> {
    Ok(Certificate {
        id: row.get(0)?,
        common_name: row.get(1)?,
        issuer: row.get(2)?,
        thumbprint: row.get(3)?,
        issued_at: required_time(4, row.get(4)?)?,
        expires_at: required_time(5, row.get(5)?)?,
        algorithm: row.get(6)?,
        key_size: row.get(7)?,
        status: parse_column(8, row.get(8)?)?,
        last_checked: optional_time(row.get(9)?),
        created_at: required_time(10, row.get(10)?)?,
        updated_at: required_time(11, row.get(11)?)?,
    })
}

fn parse_column<T: FromStr<Err = String>>(idx: usize, value: String) -> SqlResult<T> {
    value
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn required_time(idx: usize, value: String) -> SqlResult<DateTime<Utc>> {
    parse_db_time(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp: {}", value).into(),
        )
    })
}

fn optional_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| parse_db_time(&s))
}

fn map_conflict(e: rusqlite::Error, endpoint: &str) -> DbError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            DbError::Conflict(endpoint.to_string())
        }
        _ => DbError::Sqlite(e),
    }
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    // Try various formats
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.9fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    // Try ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (NamedTempFile, Store) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (tmp, store)
    }

    fn test_certificate(thumbprint: &str) -> Certificate {
        let now = Utc::now();
        Certificate {
            id: 0,
            common_name: "example.com".to_string(),
            issuer: "CN=Test CA".to_string(),
            thumbprint: thumbprint.to_string(),
            issued_at: now - ChronoDuration::days(10),
            expires_at: now + ChronoDuration::days(80),
            algorithm: "sha256WithRSAEncryption".to_string(),
            key_size: 2048,
            status: CertificateStatus::Valid,
            last_checked: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_target_crud() {
        let (_tmp, store) = test_store();

        // Create
        let mut target = MonitorTarget::new("https://example.com");
        target.name = "Example".to_string();
        let id = store.insert_target(&mut target).unwrap();
        assert!(id > 0);

        // Read
        let fetched = store.load_target(id).unwrap().unwrap();
        assert_eq!(fetched.name, "Example");
        assert_eq!(fetched.endpoint_kind, EndpointKind::Url);
        assert_eq!(fetched.status, TargetStatus::Unknown);

        // Update
        let mut updated = fetched;
        updated.name = "Updated".to_string();
        updated.check_interval_minutes = 0;
        store.update_target_config(&updated).unwrap();

        let fetched2 = store.load_target(id).unwrap().unwrap();
        assert_eq!(fetched2.name, "Updated");
        assert_eq!(fetched2.check_interval_minutes, DEFAULT_CHECK_INTERVAL_MINUTES);

        // Delete
        store.delete_target(id).unwrap();
        assert!(store.load_target(id).unwrap().is_none());
        assert!(matches!(store.delete_target(id), Err(DbError::NotFound)));
    }

    #[test]
    fn test_duplicate_endpoint_is_conflict() {
        let (_tmp, store) = test_store();
        store.insert_target(&mut MonitorTarget::new("10.0.0.2")).unwrap();

        let err = store
            .insert_target(&mut MonitorTarget::new("10.0.0.2"))
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(ref e) if e == "10.0.0.2"));
        assert_eq!(store.load_targets().unwrap().len(), 1);
    }

    #[test]
    fn test_active_filter_and_endpoint_lookup() {
        let (_tmp, store) = test_store();
        store.insert_target(&mut MonitorTarget::new("https://a.example")).unwrap();
        let mut inactive = MonitorTarget::new("https://b.example");
        inactive.is_active = false;
        store.insert_target(&mut inactive).unwrap();

        let active = store.load_active_targets().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].endpoint, "https://a.example");

        let found = store.load_target_by_endpoint("https://b.example").unwrap();
        assert!(found.is_some_and(|t| !t.is_active));
        assert!(store.load_target_by_endpoint("https://c.example").unwrap().is_none());
    }

    #[test]
    fn test_upsert_targets_persists_state_and_certificate() {
        let (_tmp, store) = test_store();
        let mut target = MonitorTarget::new("https://example.com");
        store.insert_target(&mut target).unwrap();

        let now = Utc::now();
        target.status = TargetStatus::Up;
        target.last_checked_at = Some(now);
        target.last_response_code = Some(200);
        target.last_response_time_ms = Some(12.5);
        target.total_checks = 3;
        target.successful_checks = 2;
        target.uptime_percentage = 2.0 / 3.0 * 100.0;
        target.certificate = Some(test_certificate("AA11"));
        store.upsert_targets(std::slice::from_ref(&target)).unwrap();

        let loaded = store.load_target(target.id).unwrap().unwrap();
        assert_eq!(loaded.status, TargetStatus::Up);
        assert_eq!(loaded.last_response_code, Some(200));
        assert_eq!(loaded.total_checks, 3);
        assert_eq!(loaded.successful_checks, 2);
        let cert = loaded.certificate.unwrap();
        assert!(cert.id > 0);
        assert_eq!(cert.thumbprint, "AA11");

        // Same thumbprint again: still one row.
        store.upsert_targets(std::slice::from_ref(&target)).unwrap();
        assert_eq!(store.list_certificates(CertificateFilter::All).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_skips_deleted_target() {
        let (_tmp, store) = test_store();
        let mut gone = MonitorTarget::new("https://gone.example.com");
        store.insert_target(&mut gone).unwrap();
        let mut kept = MonitorTarget::new("https://kept.example.com");
        store.insert_target(&mut kept).unwrap();
        store.delete_target(gone.id).unwrap();

        gone.total_checks = 1;
        kept.total_checks = 1;
        store.upsert_targets(&[gone, kept.clone()]).unwrap();

        let targets = store.load_targets().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, kept.id);
        assert_eq!(targets[0].total_checks, 1);
    }

    #[test]
    fn test_certificate_refresh_by_thumbprint() {
        let (_tmp, store) = test_store();
        let mut cert = test_certificate("BB22");
        let id = store.upsert_certificate(&mut cert).unwrap();

        let mut again = test_certificate("BB22");
        again.status = CertificateStatus::Invalid;
        let id2 = store.upsert_certificate(&mut again).unwrap();

        assert_eq!(id, id2);
        let certs = store.list_certificates(CertificateFilter::All).unwrap();
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].status, CertificateStatus::Invalid);
    }

    #[test]
    fn test_certificate_filters() {
        let (_tmp, store) = test_store();
        let now = Utc::now();

        let mut soon = test_certificate("S1");
        soon.expires_at = now + ChronoDuration::days(5);
        soon.status = CertificateStatus::ExpiringSoon;
        store.upsert_certificate(&mut soon).unwrap();

        let mut later = test_certificate("L1");
        later.expires_at = now + ChronoDuration::days(200);
        store.upsert_certificate(&mut later).unwrap();

        let mut expired = test_certificate("E1");
        expired.expires_at = now - ChronoDuration::days(1);
        expired.status = CertificateStatus::Expired;
        store.upsert_certificate(&mut expired).unwrap();

        let all = store.list_certificates(CertificateFilter::All).unwrap();
        assert_eq!(
            all.iter().map(|c| c.thumbprint.as_str()).collect::<Vec<_>>(),
            vec!["E1", "S1", "L1"]
        );

        let expiring = store
            .list_certificates(CertificateFilter::ExpiringWithin { days: 30 })
            .unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].thumbprint, "S1");

        let by_status = store
            .list_certificates(CertificateFilter::Status(CertificateStatus::Expired))
            .unwrap();
        assert_eq!(by_status.len(), 1);
        assert_eq!(by_status[0].thumbprint, "E1");

        for days in [3_000_000, 100_000_000, i64::MAX] {
            let unexpired = store
                .list_certificates(CertificateFilter::ExpiringWithin { days })
                .unwrap();
            assert_eq!(
                unexpired.iter().map(|c| c.thumbprint.as_str()).collect::<Vec<_>>(),
                vec!["S1", "L1"]
            );
        }
    }

    #[test]
    fn test_replace_ports() {
        let (_tmp, store) = test_store();
        let mut target = MonitorTarget::new("10.0.0.5");
        store.insert_target(&mut target).unwrap();

        let port = |p: u16, name: &str| MonitoredPort {
            id: 0,
            target_id: target.id,
            port: p,
            protocol: "TCP".to_string(),
            service_name: name.to_string(),
            is_secure: p == 443,
            status: PortStatus::Open,
            last_checked: None,
        };

        store.replace_ports(target.id, &[port(443, "HTTPS"), port(22, "SSH")]).unwrap();
        let ports = store.load_ports(target.id).unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, 22);
        assert!(ports[1].is_secure);

        store.replace_ports(target.id, &[port(80, "HTTP")]).unwrap();
        let ports = store.load_ports(target.id).unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].service_name, "HTTP");
    }

    #[test]
    fn test_parse_db_time_formats() {
        assert!(parse_db_time("2024-01-02 03:04:05.123456789").is_some());
        assert!(parse_db_time("2024-01-02 03:04:05").is_some());
        assert!(parse_db_time("2024-01-02T03:04:05Z").is_some());
        assert!(parse_db_time("2024-01-02T03:04:05+02:00").is_some());
        assert!(parse_db_time("not a time").is_none());
    }
}
