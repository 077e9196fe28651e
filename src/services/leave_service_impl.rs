//! `SeaORM` implementation of the [`LeaveService`] trait.

use crate::db::Store;
use crate::domain::CallerIdentity;
use crate::models::company::Employee;
use crate::models::qr::QrRecord;
use crate::qr::render;
use crate::services::leave_service::{
    LeaveError, LeaveQr, LeaveService, LeaveStart, clean_scanned_token,
};
use crate::services::qr_service::QrService;
use crate::services::scan_service::ScanError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::info;

pub struct SeaOrmLeaveService {
    store: Store,
    qr: Arc<dyn QrService>,
    validity: Duration,
    pixels_per_module: u32,
}

impl SeaOrmLeaveService {
    #[must_use]
    pub fn new(
        store: Store,
        qr: Arc<dyn QrService>,
        validity: Duration,
        pixels_per_module: u32,
    ) -> Self {
        Self {
            store,
            qr,
            validity,
            pixels_per_module,
        }
    }

    async fn company_employee(
        &self,
        company_id: i32,
        caller: &CallerIdentity,
    ) -> Result<Employee, ScanError> {
        if caller.company_id.is_some_and(|claimed| claimed != company_id) {
            return Err(ScanError::CompanyMismatch);
        }

        self.store
            .get_employee_by_user_and_company(&caller.user_id, company_id)
            .await?
            .ok_or(ScanError::EmployeeNotRecognized)
    }

    async fn active_record(&self, company_id: i32, qr_id: i32) -> Result<QrRecord, ScanError> {
        self.store
            .get_qr_record(qr_id)
            .await?
            .filter(|record| record.company_id == company_id && record.is_active)
            .ok_or(ScanError::RecordInactiveOrMissing)
    }

    pub(crate) async fn start_at(
        &self,
        company_id: i32,
        qr_id: i32,
        raw_token: &str,
        caller: &CallerIdentity,
        now: DateTime<Utc>,
    ) -> Result<LeaveStart, LeaveError> {
        let record = self.active_record(company_id, qr_id).await?;
        if !record.is_valid_at(now) {
            return Err(ScanError::RecordExpired.into());
        }

        let cleaned = clean_scanned_token(raw_token);
        if !bool::from(cleaned.as_bytes().ct_eq(record.token.as_bytes())) {
            return Err(ScanError::TokenMismatch.into());
        }

        let employee = self.company_employee(company_id, caller).await?;

        Ok(LeaveStart {
            employee_id: employee.id,
            company_id,
            qr_id,
        })
    }
}

/// Start link for a leave QR.
#[must_use]
pub fn leave_start_url(base_url: &str, record: &QrRecord) -> String {
    format!(
        "{}/leave/start?companyId={}&qrId={}&token={}",
        base_url.trim().trim_end_matches('/'),
        record.company_id,
        record.id,
        urlencoding::encode(&record.token)
    )
}

#[async_trait::async_trait]
impl LeaveService for SeaOrmLeaveService {
    async fn issue(&self, company_id: i32, base_url: &str) -> Result<LeaveQr, LeaveError> {
        let record = self.qr.create(company_id, self.validity).await?;
        let start_url = leave_start_url(base_url, &record);
        let png = render::render_content_png(&start_url, self.pixels_per_module)
            .map_err(crate::services::qr_service::QrError::from)?;

        info!(company_id, qr_id = record.id, "Issued leave QR");

        Ok(LeaveQr {
            record,
            start_url,
            png,
        })
    }

    async fn start(
        &self,
        company_id: i32,
        qr_id: i32,
        raw_token: &str,
        caller: &CallerIdentity,
    ) -> Result<LeaveStart, LeaveError> {
        self.start_at(company_id, qr_id, raw_token, caller, Utc::now())
            .await
    }

    async fn consume(
        &self,
        company_id: i32,
        qr_id: i32,
        caller: &CallerIdentity,
    ) -> Result<(), LeaveError> {
        let employee = self.company_employee(company_id, caller).await?;
        self.active_record(company_id, qr_id).await?;

        if !self.store.deactivate_active_qr(company_id, qr_id).await? {
            return Err(ScanError::RecordInactiveOrMissing.into());
        }
        info!(company_id, qr_id, employee_id = employee.id, "Leave QR consumed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::qr::signer::test_signer;
    use crate::services::qr_service::{QrError, QrSettings};
    use crate::services::qr_service_impl::SeaOrmQrService;

    async fn service() -> (SeaOrmLeaveService, Store) {
        let store = temp_store().await;
        let qr: Arc<dyn QrService> = Arc::new(SeaOrmQrService::new(
            store.clone(),
            Arc::new(test_signer()),
            QrSettings::default(),
        ));
        let leave = SeaOrmLeaveService::new(store.clone(), qr, Duration::minutes(10), 4);
        (leave, store)
    }

    #[test]
    fn start_url_escapes_token() {
        let record = QrRecord {
            id: 3,
            company_id: 5,
            token: "a b&c".to_string(),
            generated_at: Utc::now(),
            expiry_date: Utc::now(),
            is_active: true,
        };
        assert_eq!(
            leave_start_url("https://clock.example.com/", &record),
            "https://clock.example.com/leave/start?companyId=5&qrId=3&token=a%20b%26c"
        );
    }

    #[tokio::test]
    async fn issue_supersedes_standing_qr() {
        let (leave, store) = service().await;
        let company = store.add_company("Acme", true).await.unwrap();
        let standing = store
            .replace_active_qr(company.id, "standing", Utc::now(), Utc::now() + Duration::days(7))
            .await
            .unwrap();

        let issued = leave.issue(company.id, "https://clock.example.com").await.unwrap();

        assert_eq!(
            issued.record.expiry_date - issued.record.generated_at,
            Duration::minutes(10)
        );
        assert!(issued.start_url.contains(&format!("qrId={}", issued.record.id)));
        assert_eq!(&issued.png[1..4], b"PNG");
        assert!(!store.get_qr_record(standing.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn issue_for_unknown_company_fails() {
        let (leave, _store) = service().await;
        let err = leave.issue(404, "").await.unwrap_err();
        assert!(matches!(err, LeaveError::Qr(QrError::CompanyNotFound(404))));
    }

    #[tokio::test]
    async fn start_then_consume_is_one_time() {
        let (leave, store) = service().await;
        let company = store.add_company("Acme", true).await.unwrap();
        let employee = store
            .add_employee(company.id, Some("user-1"), "Ada")
            .await
            .unwrap();
        let caller = CallerIdentity::new("user-1");
        let issued = leave.issue(company.id, "https://clock.example.com").await.unwrap();
        let qr_id = issued.record.id;

        let noisy = format!("{}/?utm_source=scanner", issued.record.token);
        let started = leave
            .start(company.id, qr_id, &noisy, &caller)
            .await
            .unwrap();
        assert_eq!(started.employee_id, employee.id);

        leave.consume(company.id, qr_id, &caller).await.unwrap();

        let err = leave
            .start(company.id, qr_id, &issued.record.token, &caller)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "record_inactive_or_missing");

        let err = leave.consume(company.id, qr_id, &caller).await.unwrap_err();
        assert_eq!(err.code(), "record_inactive_or_missing");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumes_have_one_winner() {
        let (leave, store) = service().await;
        let leave = Arc::new(leave);
        let company = store.add_company("Acme", true).await.unwrap();
        store
            .add_employee(company.id, Some("user-1"), "Ada")
            .await
            .unwrap();
        let issued = leave.issue(company.id, "").await.unwrap();
        let qr_id = issued.record.id;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let leave = leave.clone();
                let company_id = company.id;
                tokio::spawn(async move {
                    leave
                        .consume(company_id, qr_id, &CallerIdentity::new("user-1"))
                        .await
                })
            })
            .collect();

        let mut consumed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => consumed += 1,
                Err(e) => assert_eq!(e.code(), "record_inactive_or_missing"),
            }
        }

        assert_eq!(consumed, 1);
        assert!(!store.get_qr_record(qr_id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn start_rejects_wrong_token_expiry_and_strangers() {
        let (leave, store) = service().await;
        let company = store.add_company("Acme", true).await.unwrap();
        let other = store.add_company("Globex", true).await.unwrap();
        store
            .add_employee(company.id, Some("user-1"), "Ada")
            .await
            .unwrap();
        store
            .add_employee(other.id, Some("user-2"), "Bob")
            .await
            .unwrap();
        let issued = leave.issue(company.id, "").await.unwrap();
        let record = issued.record;

        let err = leave
            .start(company.id, record.id, "not-the-token", &CallerIdentity::new("user-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "token_mismatch");

        let err = leave
            .start_at(
                company.id,
                record.id,
                &record.token,
                &CallerIdentity::new("user-1"),
                record.expiry_date + Duration::seconds(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "record_expired");

        let err = leave
            .start(other.id, record.id, &record.token, &CallerIdentity::new("user-2"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "record_inactive_or_missing");

        let err = leave
            .start(company.id, record.id, &record.token, &CallerIdentity::new("user-2"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "employee_not_recognized");
    }
}
