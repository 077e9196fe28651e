use crate::constants;
use crate::models::attendance::AttendanceSession;
use crate::models::company::{Company, Employee};
use crate::models::qr::QrRecord;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, SqlErr, Statement,
};
use std::path::Path;
use tracing::info;

pub mod migrator;
pub mod repositories;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(constants::db::CONNECT_TIMEOUT)
            .acquire_timeout(constants::db::ACQUIRE_TIMEOUT)
            .idle_timeout(constants::db::IDLE_TIMEOUT)
            .max_lifetime(constants::db::MAX_LIFETIME)
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn company_repo(&self) -> repositories::company::CompanyRepository {
        repositories::company::CompanyRepository::new(self.conn.clone())
    }

    fn qr_repo(&self) -> repositories::qr_code::QrCodeRepository {
        repositories::qr_code::QrCodeRepository::new(self.conn.clone())
    }

    fn attendance_repo(&self) -> repositories::attendance::AttendanceRepository {
        repositories::attendance::AttendanceRepository::new(self.conn.clone())
    }

    pub(crate) fn replay_repo(&self) -> repositories::replay::ReplayMarkRepository {
        repositories::replay::ReplayMarkRepository::new(self.conn.clone())
    }

    // Companies & employees

    pub async fn get_company(&self, id: i32) -> Result<Option<Company>> {
        self.company_repo().get(id).await
    }

    pub async fn add_company(&self, name: &str, is_active: bool) -> Result<Company> {
        self.company_repo().insert(name, is_active).await
    }

    pub async fn set_company_active(&self, id: i32, is_active: bool) -> Result<()> {
        self.company_repo().set_active(id, is_active).await
    }

    pub async fn get_employee_by_user_and_company(
        &self,
        user_id: &str,
        company_id: i32,
    ) -> Result<Option<Employee>> {
        self.company_repo()
            .employee_by_user_and_company(user_id, company_id)
            .await
    }

    pub async fn get_employee_by_user(&self, user_id: &str) -> Result<Option<Employee>> {
        self.company_repo().employee_by_user(user_id).await
    }

    pub async fn add_employee(
        &self,
        company_id: i32,
        user_id: Option<&str>,
        full_name: &str,
    ) -> Result<Employee> {
        self.company_repo()
            .insert_employee(company_id, user_id, full_name)
            .await
    }

    // QR records

    pub async fn get_qr_record(&self, id: i32) -> Result<Option<QrRecord>> {
        self.qr_repo().find_by_id(id).await
    }

    pub async fn get_latest_active_qr(&self, company_id: i32) -> Result<Option<QrRecord>> {
        self.qr_repo().find_latest_active(company_id).await
    }

    pub async fn list_qr_records(&self, company_id: i32) -> Result<Vec<QrRecord>> {
        self.qr_repo().list_for_company(company_id).await
    }

    pub async fn replace_active_qr(
        &self,
        company_id: i32,
        token: &str,
        generated_at: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
    ) -> Result<QrRecord, DbErr> {
        self.qr_repo()
            .replace_active(company_id, token, generated_at, expiry_date)
            .await
    }

    pub async fn deactivate_qr(&self, company_id: i32, id: i32) -> Result<bool> {
        self.qr_repo().deactivate(company_id, id).await
    }

    pub async fn deactivate_active_qr(&self, company_id: i32, id: i32) -> Result<bool> {
        self.qr_repo().deactivate_if_active(company_id, id).await
    }

    pub async fn count_active_qr(&self, company_id: i32) -> Result<u64> {
        self.qr_repo().count_active(company_id).await
    }

    pub async fn count_qr_records(&self, company_id: i32) -> Result<u64> {
        self.qr_repo().count_for_company(company_id).await
    }

    // Attendance

    pub async fn find_open_session(&self, employee_id: i32) -> Result<Option<AttendanceSession>> {
        self.attendance_repo().find_open_session(employee_id).await
    }

    pub async fn get_attendance(&self, id: i32) -> Result<Option<AttendanceSession>> {
        self.attendance_repo().get(id).await
    }

    pub async fn list_attendance(&self, employee_id: i32) -> Result<Vec<AttendanceSession>> {
        self.attendance_repo().list_for_employee(employee_id).await
    }

    pub async fn insert_check_in(
        &self,
        employee_id: i32,
        check_in_time: DateTime<Utc>,
        source: &str,
    ) -> Result<AttendanceSession, DbErr> {
        self.attendance_repo()
            .insert_check_in(employee_id, check_in_time, source)
            .await
    }

    pub async fn update_checkout(
        &self,
        id: i32,
        check_out_time: DateTime<Utc>,
        source: &str,
    ) -> Result<AttendanceSession> {
        self.attendance_repo()
            .update_checkout(id, check_out_time, source)
            .await
    }
}

/// A unique index rejected the row.
#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().contains("UNIQUE constraint failed")
}

/// The database refused the write lock (SQLite `BUSY`/`LOCKED`).
#[must_use]
pub fn is_lock_contention(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("database is locked") || message.contains("database table is locked")
}

/// True when another writer got there first and the write may be retried.
#[must_use]
pub fn is_write_conflict(err: &DbErr) -> bool {
    is_unique_violation(err) || is_lock_contention(err)
}
