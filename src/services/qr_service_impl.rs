//! `SeaORM` implementation of the [`QrService`] trait.
//!
//! Creation runs deactivate-then-insert in one transaction. A create that
//! loses a write conflict against a concurrent create for the same company
//! is retried with a linear backoff, and then supersedes the winner.

use crate::db::{Store, is_write_conflict};
use crate::models::qr::QrRecord;
use crate::qr::{SignatureService, generate_record_token, render, token};
use crate::services::qr_service::{QrError, QrService, QrSettings};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SeaOrmQrService {
    store: Store,
    signer: Arc<SignatureService>,
    settings: QrSettings,
}

impl SeaOrmQrService {
    #[must_use]
    pub const fn new(store: Store, signer: Arc<SignatureService>, settings: QrSettings) -> Self {
        Self {
            store,
            signer,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &QrSettings {
        &self.settings
    }

    fn normalize_validity(valid_for: Option<Duration>, fallback: Duration) -> Duration {
        valid_for
            .filter(|d| *d > Duration::zero())
            .unwrap_or(fallback)
    }

    async fn require_active_company(&self, company_id: i32) -> Result<(), QrError> {
        let company = self
            .store
            .get_company(company_id)
            .await?
            .ok_or(QrError::CompanyNotFound(company_id))?;

        if !company.is_active {
            return Err(QrError::CompanyInactive(company_id));
        }

        Ok(())
    }

    pub(crate) async fn create_at(
        &self,
        company_id: i32,
        valid_for: Duration,
        now: DateTime<Utc>,
    ) -> Result<QrRecord, QrError> {
        self.require_active_company(company_id).await?;

        let valid_for =
            Self::normalize_validity(Some(valid_for), self.settings.standing_validity);
        let expiry_date = now + valid_for;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let record_token = generate_record_token();

            match self
                .store
                .replace_active_qr(company_id, &record_token, now, expiry_date)
                .await
            {
                Ok(record) => {
                    metrics::counter!("qr_created_total").increment(1);
                    info!(
                        company_id,
                        qr_id = record.id,
                        expiry = %record.expiry_date,
                        "Created QR record"
                    );
                    return Ok(record);
                }
                Err(e) if is_write_conflict(&e) && attempt < self.settings.create_retry_attempts => {
                    debug!(company_id, attempt, "QR create lost a write conflict, retrying");
                    tokio::time::sleep(self.settings.create_retry_backoff * attempt).await;
                }
                Err(e) => {
                    warn!(company_id, attempt, error = %e, "QR create failed");
                    return Err(e.into());
                }
            }
        }
    }

    pub(crate) async fn regenerate_if_expired_at(
        &self,
        company_id: i32,
        valid_for: Duration,
        now: DateTime<Utc>,
    ) -> Result<QrRecord, QrError> {
        self.require_active_company(company_id).await?;

        if let Some(current) = self.store.get_latest_active_qr(company_id).await?
            && current.is_valid_at(now)
        {
            debug!(company_id, qr_id = current.id, "Active QR still valid");
            return Ok(current);
        }

        self.create_at(company_id, valid_for, now).await
    }

    pub(crate) async fn ensure_at(
        &self,
        company_id: i32,
        valid_for: Option<Duration>,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<QrRecord, QrError> {
        let valid_for = Self::normalize_validity(valid_for, self.settings.short_validity);

        if force {
            // The create transaction deactivates the latest record with the rest.
            self.create_at(company_id, valid_for, now).await
        } else {
            self.regenerate_if_expired_at(company_id, valid_for, now)
                .await
        }
    }

    pub(crate) fn live_token_at(
        &self,
        record: &QrRecord,
        now: DateTime<Utc>,
    ) -> Result<String, QrError> {
        Ok(token::encode_live(record, now, &self.signer)?)
    }
}

#[async_trait::async_trait]
impl QrService for SeaOrmQrService {
    async fn create(&self, company_id: i32, valid_for: Duration) -> Result<QrRecord, QrError> {
        self.create_at(company_id, valid_for, Utc::now()).await
    }

    async fn regenerate_if_expired(
        &self,
        company_id: i32,
        valid_for: Duration,
    ) -> Result<QrRecord, QrError> {
        self.regenerate_if_expired_at(company_id, valid_for, Utc::now())
            .await
    }

    async fn force_regenerate(
        &self,
        company_id: i32,
        valid_for: Duration,
    ) -> Result<QrRecord, QrError> {
        self.ensure_at(company_id, Some(valid_for), true, Utc::now())
            .await
    }

    async fn ensure(
        &self,
        company_id: i32,
        valid_for: Option<Duration>,
        force: bool,
    ) -> Result<QrRecord, QrError> {
        self.ensure_at(company_id, valid_for, force, Utc::now())
            .await
    }

    async fn get(&self, id: i32) -> Result<QrRecord, QrError> {
        self.store
            .get_qr_record(id)
            .await?
            .ok_or(QrError::QrNotFound(id))
    }

    async fn list_for_company(&self, company_id: i32) -> Result<Vec<QrRecord>, QrError> {
        if self.store.get_company(company_id).await?.is_none() {
            return Err(QrError::CompanyNotFound(company_id));
        }

        Ok(self.store.list_qr_records(company_id).await?)
    }

    async fn deactivate(&self, company_id: i32, id: i32) -> Result<(), QrError> {
        if !self.store.deactivate_qr(company_id, id).await? {
            return Err(QrError::QrNotFound(id));
        }

        info!(company_id, qr_id = id, "Deactivated QR record");
        Ok(())
    }

    fn live_token(&self, record: &QrRecord) -> Result<String, QrError> {
        self.live_token_at(record, Utc::now())
    }

    fn render_image(
        &self,
        record: &QrRecord,
        base_url: Option<&str>,
        pixels_per_module: Option<u32>,
    ) -> Result<Vec<u8>, QrError> {
        let live = self.live_token(record)?;
        let ppm = pixels_per_module.unwrap_or(self.settings.pixels_per_module);
        Ok(render::render_png(&live, base_url, ppm)?)
    }
}
