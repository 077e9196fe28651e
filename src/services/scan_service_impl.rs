//! `SeaORM` implementation of the [`ScanService`] trait.

use crate::db::{Store, is_unique_violation};
use crate::domain::{CallerIdentity, ScanDirection};
use crate::models::attendance::{AttendanceSession, QR_CHECKOUT_MARKER, QR_SCAN_SOURCE};
use crate::models::company::Employee;
use crate::models::qr::QrRecord;
use crate::qr::{ReplayGuard, SignatureService, token};
use crate::services::scan_service::{
    ScanError, ScanResult, ScanService, VerifiedCheckIn, VerifyPolicies, VerifyPolicy,
    check_live_latency,
};
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

/// Token and caller that passed every check up to the attendance write.
struct Authorized {
    record: QrRecord,
    employee: Employee,
}

pub struct SeaOrmScanService {
    store: Store,
    signer: Arc<SignatureService>,
    replay: Arc<dyn ReplayGuard>,
    policies: VerifyPolicies,
}

impl SeaOrmScanService {
    #[must_use]
    pub fn new(
        store: Store,
        signer: Arc<SignatureService>,
        replay: Arc<dyn ReplayGuard>,
        policies: VerifyPolicies,
    ) -> Self {
        Self {
            store,
            signer,
            replay,
            policies,
        }
    }

    async fn authorize_at(
        &self,
        wire: &str,
        caller: &CallerIdentity,
        policy: VerifyPolicy,
        now: DateTime<Utc>,
    ) -> Result<Authorized, ScanError> {
        let payload = token::parse(wire, &self.signer)?;

        let expires_at = payload.expires_at()?;
        let live = payload.live_at()?;
        if policy.enforce_payload_expiry && expires_at < now {
            return Err(ScanError::TokenExpired);
        }
        check_live_latency(live, now, policy.max_live_latency)?;

        let record = self
            .store
            .get_qr_record(payload.id)
            .await?
            .filter(|record| record.is_active)
            .ok_or(ScanError::RecordInactiveOrMissing)?;

        if !bool::from(record.token.as_bytes().ct_eq(payload.token.as_bytes())) {
            return Err(ScanError::TokenMismatch);
        }
        if record.is_expired_at(now) {
            return Err(ScanError::RecordExpired);
        }

        if !self
            .replay
            .try_mark(&payload.token, &payload.live, policy.replay_ttl, now)
            .await?
        {
            return Err(ScanError::ReplayDetected);
        }

        let employee = self.resolve_employee(caller, record.company_id).await?;

        Ok(Authorized { record, employee })
    }

    async fn resolve_employee(
        &self,
        caller: &CallerIdentity,
        record_company_id: i32,
    ) -> Result<Employee, ScanError> {
        if caller.user_id.trim().is_empty() {
            return Err(ScanError::EmployeeNotRecognized);
        }

        if let Some(claimed) = caller.company_id {
            if claimed != record_company_id {
                return Err(ScanError::CompanyMismatch);
            }

            return self
                .store
                .get_employee_by_user_and_company(&caller.user_id, claimed)
                .await?
                .ok_or(ScanError::EmployeeNotRecognized);
        }

        let employee = self
            .store
            .get_employee_by_user(&caller.user_id)
            .await?
            .ok_or(ScanError::EmployeeNotRecognized)?;

        if employee.company_id != record_company_id {
            return Err(ScanError::CompanyMismatch);
        }

        Ok(employee)
    }

    async fn apply_at(
        &self,
        employee: &Employee,
        direction: ScanDirection,
        now: DateTime<Utc>,
    ) -> Result<AttendanceSession, ScanError> {
        let open = self.store.find_open_session(employee.id).await?;

        match direction {
            ScanDirection::CheckIn => {
                if open.is_some() {
                    return Err(ScanError::AlreadyCheckedIn);
                }
                self.store
                    .insert_check_in(employee.id, now, QR_SCAN_SOURCE)
                    .await
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            ScanError::AlreadyCheckedIn
                        } else {
                            ScanError::from(e)
                        }
                    })
            }
            ScanDirection::CheckOut => {
                let session = open.ok_or(ScanError::NoOpenSession)?;
                let source = format!("{}{QR_CHECKOUT_MARKER}", session.source);
                Ok(self.store.update_checkout(session.id, now, &source).await?)
            }
        }
    }

    pub(crate) async fn verify_programmatic_at(
        &self,
        wire: &str,
        caller: &CallerIdentity,
        now: DateTime<Utc>,
    ) -> Result<VerifiedCheckIn, ScanError> {
        let authorized = match self
            .authorize_at(wire.trim(), caller, self.policies.api, now)
            .await
        {
            Ok(authorized) => authorized,
            Err(e) => {
                record_outcome("api", e.code());
                warn!(user_id = %caller.user_id, reason = e.code(), "QR verification rejected");
                return Err(e);
            }
        };

        let Authorized { record, employee } = authorized;
        let attendance_id = match self.apply_at(&employee, ScanDirection::CheckIn, now).await {
            Ok(session) => Some(session.id),
            Err(e) => {
                warn!(
                    employee_id = employee.id,
                    qr_id = record.id,
                    reason = e.code(),
                    error = %e,
                    "Attendance check-in skipped after verification"
                );
                None
            }
        };

        record_outcome("api", "accepted");
        info!(
            employee_id = employee.id,
            company_id = record.company_id,
            qr_id = record.id,
            ?attendance_id,
            "QR verification accepted"
        );

        Ok(VerifiedCheckIn {
            employee_id: employee.id,
            company_id: record.company_id,
            qr_id: record.id,
            attendance_id,
        })
    }

    pub(crate) async fn verify_scan_at(
        &self,
        raw_data: &str,
        caller: &CallerIdentity,
        direction: ScanDirection,
        now: DateTime<Utc>,
    ) -> ScanResult {
        let decoded = urlencoding::decode(raw_data).unwrap_or(Cow::Borrowed(raw_data));
        let outcome = self
            .scan_inner(decoded.trim(), caller, direction, now)
            .await;

        match outcome {
            Ok((record, employee, session)) => {
                record_outcome("scan", "accepted");
                info!(
                    employee_id = employee.id,
                    company_id = record.company_id,
                    qr_id = record.id,
                    attendance_id = session.id,
                    %direction,
                    "QR scan accepted"
                );

                let message = if direction.is_checkout() {
                    "Checked out"
                } else {
                    "Checked in"
                };

                ScanResult {
                    success: true,
                    message: message.to_string(),
                    reason: None,
                    employee_id: Some(employee.id),
                    company_id: Some(record.company_id),
                    attendance_id: Some(session.id),
                    is_checkout: direction.is_checkout(),
                }
            }
            Err(e) => {
                record_outcome("scan", e.code());
                if e.is_infrastructure() {
                    warn!(user_id = %caller.user_id, error = %e, %direction, "QR scan failed");
                } else {
                    info!(user_id = %caller.user_id, reason = e.code(), %direction, "QR scan rejected");
                }
                ScanResult::rejected(&e, direction)
            }
        }
    }

    async fn scan_inner(
        &self,
        wire: &str,
        caller: &CallerIdentity,
        direction: ScanDirection,
        now: DateTime<Utc>,
    ) -> Result<(QrRecord, Employee, AttendanceSession), ScanError> {
        let Authorized { record, employee } = self
            .authorize_at(wire, caller, self.policies.scan, now)
            .await?;
        let session = self.apply_at(&employee, direction, now).await?;
        Ok((record, employee, session))
    }
}

fn record_outcome(path: &'static str, outcome: &'static str) {
    metrics::counter!("qr_verifications_total", "path" => path, "outcome" => outcome)
        .increment(1);
}

#[async_trait::async_trait]
impl ScanService for SeaOrmScanService {
    async fn verify_programmatic(
        &self,
        token: &str,
        caller: &CallerIdentity,
    ) -> Result<VerifiedCheckIn, ScanError> {
        self.verify_programmatic_at(token, caller, Utc::now()).await
    }

    async fn verify_scan(
        &self,
        raw_data: &str,
        caller: &CallerIdentity,
        direction: ScanDirection,
    ) -> ScanResult {
        self.verify_scan_at(raw_data, caller, direction, Utc::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::qr::MemoryReplayGuard;
    use crate::qr::codec;
    use crate::qr::signer::test_signer;
    use crate::qr::token::TokenPayload;
    use crate::services::qr_service::QrSettings;
    use crate::services::qr_service_impl::SeaOrmQrService;
    use crate::services::{QrService, ScanService};
    use chrono::{Duration, SubsecRound};

    struct Fixture {
        store: Store,
        qr: SeaOrmQrService,
        scan: Arc<SeaOrmScanService>,
    }

    async fn fixture() -> Fixture {
        let store = temp_store().await;
        let signer = Arc::new(test_signer());
        let qr = SeaOrmQrService::new(store.clone(), signer.clone(), QrSettings::default());
        let scan = Arc::new(SeaOrmScanService::new(
            store.clone(),
            signer,
            Arc::new(MemoryReplayGuard::new()),
            VerifyPolicies::default(),
        ));

        // Companies 1..=7.
        for n in 1..=7 {
            store.add_company(&format!("Company {n}"), true).await.unwrap();
        }

        Fixture { store, qr, scan }
    }

    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    fn scan_data(wire: &str) -> String {
        urlencoding::encode(wire).into_owned()
    }

    #[tokio::test]
    async fn check_in_then_check_out_closes_same_session() {
        let f = fixture().await;
        let employee = f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let caller = CallerIdentity::new("user-5");
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();

        let wire = f.qr.live_token_at(&record, t0).unwrap();
        let checked_in = f
            .scan
            .verify_scan_at(&scan_data(&wire), &caller, ScanDirection::CheckIn, t0 + Duration::seconds(1))
            .await;
        assert!(checked_in.success, "{checked_in:?}");
        assert_eq!(checked_in.employee_id, Some(employee.id));
        assert_eq!(checked_in.company_id, Some(5));
        assert!(!checked_in.is_checkout);

        let open = f.store.find_open_session(employee.id).await.unwrap().unwrap();
        assert_eq!(Some(open.id), checked_in.attendance_id);
        assert_eq!(open.source, QR_SCAN_SOURCE);

        let t1 = t0 + Duration::minutes(1);
        let wire = f.qr.live_token_at(&record, t1).unwrap();
        let checked_out = f
            .scan
            .verify_scan_at(&scan_data(&wire), &caller, ScanDirection::CheckOut, t1)
            .await;
        assert!(checked_out.success, "{checked_out:?}");
        assert!(checked_out.is_checkout);
        assert_eq!(checked_out.attendance_id, checked_in.attendance_id);

        let closed = f.store.get_attendance(open.id).await.unwrap().unwrap();
        assert_eq!(closed.check_out_time, Some(t1));
        assert_eq!(closed.source, "QRScan|QRScan-Checkout");

        let t2 = t0 + Duration::minutes(2);
        let wire = f.qr.live_token_at(&record, t2).unwrap();
        let again = f
            .scan
            .verify_scan_at(&scan_data(&wire), &caller, ScanDirection::CheckOut, t2)
            .await;
        assert!(!again.success);
        assert_eq!(again.reason.as_deref(), Some("no_open_session"));
    }

    #[tokio::test]
    async fn employee_of_other_company_is_rejected_without_writes() {
        let f = fixture().await;
        let outsider = f.store.add_employee(7, Some("user-7"), "Bob").await.unwrap();
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();

        let wire = f.qr.live_token_at(&record, t0).unwrap();
        let err = f
            .scan
            .verify_programmatic_at(&wire, &CallerIdentity::new("user-7"), t0)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::CompanyMismatch);

        let wire = f.qr.live_token_at(&record, t0 + Duration::seconds(1)).unwrap();
        let err = f
            .scan
            .verify_programmatic_at(
                &wire,
                &CallerIdentity::new("user-7").with_company(7),
                t0 + Duration::seconds(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::CompanyMismatch);

        assert!(f.store.list_attendance(outsider.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn company_claim_scopes_employee_lookup() {
        let f = fixture().await;
        f.store.add_employee(7, Some("user-x"), "Cy").await.unwrap();
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();

        // Claim matches the record but the user has no employee there.
        let wire = f.qr.live_token_at(&record, t0).unwrap();
        let err = f
            .scan
            .verify_programmatic_at(&wire, &CallerIdentity::new("user-x").with_company(5), t0)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::EmployeeNotRecognized);

        let wire = f.qr.live_token_at(&record, t0 + Duration::seconds(1)).unwrap();
        let err = f
            .scan
            .verify_programmatic_at(&wire, &CallerIdentity::new("nobody"), t0 + Duration::seconds(1))
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::EmployeeNotRecognized);
    }

    #[tokio::test]
    async fn replayed_token_is_rejected() {
        let f = fixture().await;
        f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let caller = CallerIdentity::new("user-5");
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();
        let wire = f.qr.live_token_at(&record, t0).unwrap();

        f.scan.verify_programmatic_at(&wire, &caller, t0).await.unwrap();
        let err = f
            .scan
            .verify_programmatic_at(&wire, &caller, t0 + Duration::seconds(5))
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::ReplayDetected);
    }

    #[tokio::test]
    async fn concurrent_replays_have_one_winner() {
        let f = fixture().await;
        f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();
        let wire = f.qr.live_token_at(&record, t0).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scan = f.scan.clone();
                let wire = wire.clone();
                tokio::spawn(async move {
                    scan.verify_programmatic_at(&wire, &CallerIdentity::new("user-5"), t0)
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert_eq!(e, ScanError::ReplayDetected),
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_check_ins_open_one_session() {
        let f = fixture().await;
        let employee = f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();

        // Distinct live stamps, so the replay guard lets every scan through.
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let at = t0 + Duration::milliseconds(n);
                let data = scan_data(&f.qr.live_token_at(&record, at).unwrap());
                let scan = f.scan.clone();
                tokio::spawn(async move {
                    scan.verify_scan_at(
                        &data,
                        &CallerIdentity::new("user-5"),
                        ScanDirection::CheckIn,
                        at,
                    )
                    .await
                })
            })
            .collect();

        let mut checked_in = 0;
        for handle in handles {
            let result = handle.await.unwrap();
            if result.success {
                checked_in += 1;
            } else {
                assert_eq!(result.reason.as_deref(), Some("already_checked_in"));
            }
        }

        assert_eq!(checked_in, 1);
        let sessions = f.store.list_attendance(employee.id).await.unwrap();
        assert_eq!(sessions.iter().filter(|s| s.is_open()).count(), 1);
    }

    #[tokio::test]
    async fn latency_window_boundary() {
        let f = fixture().await;
        f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let caller = CallerIdentity::new("user-5");
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();

        let wire = f.qr.live_token_at(&record, t0).unwrap();
        let late = t0 + Duration::minutes(2) + Duration::milliseconds(1);
        let err = f
            .scan
            .verify_programmatic_at(&wire, &caller, late)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::LiveTimestampOutOfRange);

        // Rejection above happened before the replay mark, so the same token
        // is still usable exactly at the boundary.
        f.scan
            .verify_programmatic_at(&wire, &caller, t0 + Duration::minutes(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn record_expiry_is_enforced_on_both_paths() {
        let f = fixture().await;
        f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let caller = CallerIdentity::new("user-5");
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();
        let later = t0 + Duration::minutes(11);

        let wire = f.qr.live_token_at(&record, later).unwrap();
        let result = f
            .scan
            .verify_scan_at(&wire, &caller, ScanDirection::CheckIn, later)
            .await;
        assert_eq!(result.reason.as_deref(), Some("record_expired"));

        let wire = f
            .qr
            .live_token_at(&record, later + Duration::seconds(1))
            .unwrap();
        let err = f
            .scan
            .verify_programmatic_at(&wire, &caller, later + Duration::seconds(1))
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::TokenExpired);
    }

    #[tokio::test]
    async fn inactive_or_unknown_record_is_rejected() {
        let f = fixture().await;
        f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let caller = CallerIdentity::new("user-5");
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();
        f.qr.deactivate(5, record.id).await.unwrap();

        let wire = f.qr.live_token_at(&record, t0).unwrap();
        let err = f.scan.verify_programmatic_at(&wire, &caller, t0).await.unwrap_err();
        assert_eq!(err, ScanError::RecordInactiveOrMissing);

        let ghost = QrRecord { id: 9_999, ..record };
        let wire = f.qr.live_token_at(&ghost, t0).unwrap();
        let err = f.scan.verify_programmatic_at(&wire, &caller, t0).await.unwrap_err();
        assert_eq!(err, ScanError::RecordInactiveOrMissing);
    }

    #[tokio::test]
    async fn token_value_must_match_record() {
        let f = fixture().await;
        f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();

        let forged = TokenPayload {
            token: record.token.to_uppercase(),
            ..TokenPayload::for_record(&record, t0)
        };
        let wire = token::encode(&forged, &test_signer()).unwrap();
        let err = f
            .scan
            .verify_programmatic_at(&wire, &CallerIdentity::new("user-5"), t0)
            .await
            .unwrap_err();
        assert_eq!(err, ScanError::TokenMismatch);
    }

    #[tokio::test]
    async fn tampered_or_garbled_scan_data() {
        let f = fixture().await;
        f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let caller = CallerIdentity::new("user-5");
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();

        let result = f
            .scan
            .verify_scan_at("hello world", &caller, ScanDirection::CheckIn, t0)
            .await;
        assert_eq!(result.reason.as_deref(), Some("bad_format"));

        let wire = f.qr.live_token_at(&record, t0).unwrap();
        let other_sig = codec::encode(&[0u8; 32]);
        let mut parts: Vec<&str> = wire.split('.').collect();
        parts[2] = &other_sig;
        let result = f
            .scan
            .verify_scan_at(&parts.join("."), &caller, ScanDirection::CheckIn, t0)
            .await;
        assert_eq!(result.reason.as_deref(), Some("invalid_signature"));

        // Surrounding whitespace from scanner apps is ignored.
        let padded = format!("%20{}%0A", scan_data(&wire));
        let result = f
            .scan
            .verify_scan_at(&padded, &caller, ScanDirection::CheckIn, t0)
            .await;
        assert!(result.success, "{result:?}");
    }

    #[tokio::test]
    async fn programmatic_path_swallows_attendance_failures() {
        let f = fixture().await;
        let employee = f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let caller = CallerIdentity::new("user-5").with_company(5);
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();

        let first = f
            .scan
            .verify_programmatic_at(&f.qr.live_token_at(&record, t0).unwrap(), &caller, t0)
            .await
            .unwrap();
        assert!(first.attendance_id.is_some());
        assert_eq!(first.qr_id, record.id);

        let t1 = t0 + Duration::seconds(30);
        let second = f
            .scan
            .verify_programmatic_at(&f.qr.live_token_at(&record, t1).unwrap(), &caller, t1)
            .await
            .unwrap();
        assert_eq!(second.employee_id, employee.id);
        assert_eq!(second.attendance_id, None);
        assert_eq!(f.store.list_attendance(employee.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scan_path_reports_already_checked_in() {
        let f = fixture().await;
        f.store.add_employee(5, Some("user-5"), "Ada").await.unwrap();
        let caller = CallerIdentity::new("user-5");
        let t0 = now();
        let record = f.qr.create_at(5, Duration::minutes(10), t0).await.unwrap();

        let first = f
            .scan
            .verify_scan(
                &scan_data(&f.qr.live_token(&record).unwrap()),
                &caller,
                ScanDirection::CheckIn,
            )
            .await;
        assert!(first.success, "{first:?}");

        let t1 = Utc::now() + Duration::seconds(1);
        let second = f
            .scan
            .verify_scan_at(
                &scan_data(&f.qr.live_token_at(&record, t1).unwrap()),
                &caller,
                ScanDirection::CheckIn,
                t1,
            )
            .await;
        assert!(!second.success);
        assert_eq!(second.reason.as_deref(), Some("already_checked_in"));
        assert_eq!(second.message, "Already checked in");
    }
}
