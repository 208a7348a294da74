//! Folds check results into target state.

use crate::db::{CertificateStatus, MonitorTarget};

use super::check::{CertificateCheck, CheckResult};

/// Return `target` updated with one check result.
///
/// Every call counts as one check. The certificate association is replaced
/// only when a different thumbprint is observed; the same certificate seen
/// again is refreshed in place.
pub fn apply(target: &MonitorTarget, result: &CheckResult) -> MonitorTarget {
    let mut next = target.clone();
    let now = result.checked_at;

    next.total_checks += 1;
    if result.outcome.is_success() {
        next.successful_checks += 1;
        next.consecutive_failures = 0;
        next.last_uptime_at = Some(now);
    } else {
        next.consecutive_failures += 1;
        next.last_downtime_at = Some(now);
    }
    next.status = result.outcome.into();

    next.last_checked_at = Some(now);
    next.last_response_code = result.response_code;
    next.last_response_time_ms = result.response_time_ms;
    next.last_error = result.error.clone();
    next.uptime_percentage = uptime_percentage(next.successful_checks, next.total_checks);
    next.updated_at = now;

    match &result.certificate {
        CertificateCheck::NotChecked => {}
        CertificateCheck::Inspected(info) => match next.certificate.as_mut() {
            Some(current) if current.thumbprint == info.thumbprint => {
                current.status = info.status;
                current.last_checked = Some(now);
                current.updated_at = now;
            }
            _ => next.certificate = Some(info.to_certificate(now)),
        },
        CertificateCheck::Failed { .. } => {
            if let Some(current) = next.certificate.as_mut() {
                current.status = CertificateStatus::Invalid;
                current.last_checked = Some(now);
                current.updated_at = now;
            }
        }
    }

    next
}

/// `successful / total * 100`, clamped to `[0, 100]`; 0 before any check.
pub fn uptime_percentage(successful: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (successful as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TargetStatus;
    use crate::probe::CertificateInfo;
    use crate::scheduler::check::CheckOutcome;
    use chrono::{Duration as ChronoDuration, Utc};

    fn result(target: &MonitorTarget, outcome: CheckOutcome) -> CheckResult {
        CheckResult {
            target_id: target.id,
            endpoint: target.endpoint.clone(),
            outcome,
            checked_at: Utc::now(),
            response_code: if outcome.is_success() { Some(200) } else { None },
            response_time_ms: Some(12.5),
            error: if outcome.is_success() { String::new() } else { "boom".to_string() },
            certificate: CertificateCheck::NotChecked,
        }
    }

    fn info(thumbprint: &str, days: i64) -> CertificateInfo {
        let now = Utc::now();
        let expires_at = now + ChronoDuration::days(days);
        CertificateInfo {
            common_name: "example.com".to_string(),
            issuer: "CN=Test CA".to_string(),
            thumbprint: thumbprint.to_string(),
            issued_at: now - ChronoDuration::days(30),
            expires_at,
            algorithm: "sha256WithRSAEncryption".to_string(),
            key_size: 2048,
            status: CertificateStatus::classify(expires_at, now),
        }
    }

    #[test]
    fn test_success_updates_counters() {
        let target = MonitorTarget::new("https://example.com");
        let r = result(&target, CheckOutcome::Up);

        let next = apply(&target, &r);
        assert_eq!(next.status, TargetStatus::Up);
        assert_eq!(next.total_checks, 1);
        assert_eq!(next.successful_checks, 1);
        assert_eq!(next.consecutive_failures, 0);
        assert_eq!(next.last_response_code, Some(200));
        assert_eq!(next.last_uptime_at, Some(r.checked_at));
        assert_eq!(next.last_checked_at, Some(r.checked_at));
        assert_eq!(next.uptime_percentage, 100.0);
    }

    #[test]
    fn test_consecutive_failures_track_latest_kind() {
        let mut target = MonitorTarget::new("https://example.com");
        target = apply(&target, &result(&target, CheckOutcome::Up));

        let mut downtimes = Vec::new();
        for outcome in [CheckOutcome::Down, CheckOutcome::Error, CheckOutcome::Timeout] {
            let mut r = result(&target, outcome);
            r.checked_at = Utc::now() + ChronoDuration::seconds(downtimes.len() as i64 + 1);
            target = apply(&target, &r);
            assert_eq!(target.last_downtime_at, Some(r.checked_at));
            downtimes.push(r.checked_at);
        }

        assert_eq!(target.consecutive_failures, 3);
        assert_eq!(target.status, TargetStatus::Timeout);
        assert_eq!(target.total_checks, 4);
        assert_eq!(target.successful_checks, 1);
        assert_eq!(target.uptime_percentage, 25.0);
        assert_eq!(target.last_error, "boom");

        target = apply(&target, &result(&target, CheckOutcome::Up));
        assert_eq!(target.consecutive_failures, 0);
        assert_eq!(target.last_error, "");
    }

    #[test]
    fn test_counters_stay_consistent() {
        let outcomes = [
            CheckOutcome::Up,
            CheckOutcome::Down,
            CheckOutcome::Up,
            CheckOutcome::Timeout,
            CheckOutcome::Error,
            CheckOutcome::Up,
        ];
        let mut target = MonitorTarget::new("10.0.0.1");
        for outcome in outcomes.iter().cycle().take(50) {
            target = apply(&target, &result(&target, *outcome));
            assert!(target.successful_checks <= target.total_checks);
            assert!((0.0..=100.0).contains(&target.uptime_percentage));
            let expected = target.successful_checks as f64 / target.total_checks as f64 * 100.0;
            assert!((target.uptime_percentage - expected).abs() < 1e-9);
        }
        assert_eq!(target.total_checks, 50);
    }

    #[test]
    fn test_repeated_success_counts_each_check() {
        let target = MonitorTarget::new("https://example.com");
        let mut r = result(&target, CheckOutcome::Up);
        r.certificate = CertificateCheck::Inspected(info("AA11", 90));

        let once = apply(&target, &r);
        let twice = apply(&once, &r);
        assert_eq!(twice.total_checks, 2);
        assert_eq!(twice.successful_checks, 2);
        assert_eq!(twice.certificate.as_ref().unwrap().thumbprint, "AA11");
    }

    #[test]
    fn test_same_thumbprint_refreshes_existing_certificate() {
        let target = MonitorTarget::new("https://example.com");
        let mut r = result(&target, CheckOutcome::Up);
        r.certificate = CertificateCheck::Inspected(info("AA11", 90));
        let mut stored = apply(&target, &r);
        stored.certificate.as_mut().unwrap().id = 42;

        let mut again = result(&stored, CheckOutcome::Up);
        again.checked_at = r.checked_at + ChronoDuration::minutes(5);
        again.certificate = CertificateCheck::Inspected(info("AA11", 10));

        let next = apply(&stored, &again);
        let cert = next.certificate.unwrap();
        assert_eq!(cert.id, 42);
        assert_eq!(cert.status, CertificateStatus::ExpiringSoon);
        assert_eq!(cert.last_checked, Some(again.checked_at));
    }

    #[test]
    fn test_new_thumbprint_replaces_association() {
        let target = MonitorTarget::new("https://example.com");
        let mut r = result(&target, CheckOutcome::Up);
        r.certificate = CertificateCheck::Inspected(info("AA11", 90));
        let mut stored = apply(&target, &r);
        stored.certificate.as_mut().unwrap().id = 42;

        r.certificate = CertificateCheck::Inspected(info("BB22", 365));
        let next = apply(&stored, &r);
        let cert = next.certificate.unwrap();
        assert_eq!(cert.id, 0);
        assert_eq!(cert.thumbprint, "BB22");
    }

    #[test]
    fn test_inspection_failure_marks_certificate_invalid() {
        let target = MonitorTarget::new("https://example.com");
        let mut r = result(&target, CheckOutcome::Up);
        r.certificate = CertificateCheck::Inspected(info("AA11", 90));
        let stored = apply(&target, &r);

        r.certificate = CertificateCheck::Failed {
            message: "handshake failed".to_string(),
        };
        let next = apply(&stored, &r);
        // Availability is judged separately from the certificate.
        assert_eq!(next.status, TargetStatus::Up);
        let cert = next.certificate.unwrap();
        assert_eq!(cert.thumbprint, "AA11");
        assert_eq!(cert.status, CertificateStatus::Invalid);
    }

    #[test]
    fn test_inspection_failure_without_certificate_is_noop() {
        let target = MonitorTarget::new("https://example.com");
        let mut r = result(&target, CheckOutcome::Error);
        r.certificate = CertificateCheck::Failed {
            message: "connect failed".to_string(),
        };
        assert!(apply(&target, &r).certificate.is_none());
    }

    #[test]
    fn test_uptime_percentage_zero_checks() {
        assert_eq!(uptime_percentage(0, 0), 0.0);
        assert_eq!(uptime_percentage(1, 4), 25.0);
    }
}
