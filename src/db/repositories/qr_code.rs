use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::Expr,
};
use tracing::debug;

use crate::entities::{company_qr_codes, prelude::*};
use crate::models::qr::QrRecord;

pub struct QrCodeRepository {
    conn: DatabaseConnection,
}

impl QrCodeRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<QrRecord>> {
        let record = CompanyQrCodes::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query QR record by ID")?;

        Ok(record.map(QrRecord::from))
    }

    /// Most recently generated active record for the company.
    pub async fn find_latest_active(&self, company_id: i32) -> Result<Option<QrRecord>> {
        let record = CompanyQrCodes::find()
            .filter(company_qr_codes::Column::CompanyId.eq(company_id))
            .filter(company_qr_codes::Column::IsActive.eq(true))
            .order_by_desc(company_qr_codes::Column::GeneratedAt)
            .one(&self.conn)
            .await
            .context("Failed to query latest active QR record")?;

        Ok(record.map(QrRecord::from))
    }

    pub async fn list_for_company(&self, company_id: i32) -> Result<Vec<QrRecord>> {
        let records = CompanyQrCodes::find()
            .filter(company_qr_codes::Column::CompanyId.eq(company_id))
            .order_by_desc(company_qr_codes::Column::GeneratedAt)
            .order_by_desc(company_qr_codes::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list QR records")?;

        Ok(records.into_iter().map(QrRecord::from).collect())
    }

    /// Deactivates every active record of the company and inserts a new
    /// active one, atomically.
    ///
    /// The database error is returned unwrapped so callers can tell a write
    /// conflict with a concurrent writer apart from other failures.
    pub async fn replace_active(
        &self,
        company_id: i32,
        token: &str,
        generated_at: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
    ) -> Result<QrRecord, sea_orm::DbErr> {
        let txn = self.conn.begin().await?;

        // Write first: the transaction takes the write lock before reading.
        let deactivated = CompanyQrCodes::update_many()
            .col_expr(company_qr_codes::Column::IsActive, Expr::value(false))
            .filter(company_qr_codes::Column::CompanyId.eq(company_id))
            .filter(company_qr_codes::Column::IsActive.eq(true))
            .exec(&txn)
            .await?;

        let model = company_qr_codes::ActiveModel {
            company_id: Set(company_id),
            token: Set(token.to_string()),
            generated_at: Set(generated_at),
            expiry_date: Set(expiry_date),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        debug!(
            company_id,
            qr_id = model.id,
            deactivated = deactivated.rows_affected,
            "Replaced active QR record"
        );

        Ok(QrRecord::from(model))
    }

    /// Flips `is_active` off for one record of the given company.
    /// Returns `false` when no such record exists.
    pub async fn deactivate(&self, company_id: i32, id: i32) -> Result<bool> {
        let result = CompanyQrCodes::update_many()
            .col_expr(company_qr_codes::Column::IsActive, Expr::value(false))
            .filter(company_qr_codes::Column::Id.eq(id))
            .filter(company_qr_codes::Column::CompanyId.eq(company_id))
            .exec(&self.conn)
            .await
            .context("Failed to deactivate QR record")?;

        if result.rows_affected > 0 {
            return Ok(true);
        }

        // Already-inactive rows match zero rows on some backends; check existence.
        let exists = CompanyQrCodes::find_by_id(id)
            .filter(company_qr_codes::Column::CompanyId.eq(company_id))
            .one(&self.conn)
            .await
            .context("Failed to query QR record for deactivation")?
            .is_some();

        Ok(exists)
    }

    /// Flips an active record to inactive. Only one caller can win: the
    /// update matches nothing once the row is inactive.
    pub async fn deactivate_if_active(&self, company_id: i32, id: i32) -> Result<bool> {
        let result = CompanyQrCodes::update_many()
            .col_expr(company_qr_codes::Column::IsActive, Expr::value(false))
            .filter(company_qr_codes::Column::Id.eq(id))
            .filter(company_qr_codes::Column::CompanyId.eq(company_id))
            .filter(company_qr_codes::Column::IsActive.eq(true))
            .exec(&self.conn)
            .await
            .context("Failed to consume QR record")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn count_active(&self, company_id: i32) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        CompanyQrCodes::find()
            .filter(company_qr_codes::Column::CompanyId.eq(company_id))
            .filter(company_qr_codes::Column::IsActive.eq(true))
            .count(&self.conn)
            .await
            .context("Failed to count active QR records")
    }

    pub async fn count_for_company(&self, company_id: i32) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        CompanyQrCodes::find()
            .filter(company_qr_codes::Column::CompanyId.eq(company_id))
            .count(&self.conn)
            .await
            .context("Failed to count QR records")
    }
}
