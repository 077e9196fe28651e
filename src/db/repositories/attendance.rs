use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::{attendances, prelude::*};
use crate::models::attendance::AttendanceSession;

pub struct AttendanceRepository {
    conn: DatabaseConnection,
}

impl AttendanceRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Most recent session of the employee that has no checkout time.
    pub async fn find_open_session(&self, employee_id: i32) -> Result<Option<AttendanceSession>> {
        let session = Attendances::find()
            .filter(attendances::Column::EmployeeId.eq(employee_id))
            .filter(attendances::Column::CheckOutTime.is_null())
            .order_by_desc(attendances::Column::CheckInTime)
            .one(&self.conn)
            .await
            .context("Failed to query open attendance session")?;

        Ok(session.map(AttendanceSession::from))
    }

    pub async fn get(&self, id: i32) -> Result<Option<AttendanceSession>> {
        let session = Attendances::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query attendance by ID")?;

        Ok(session.map(AttendanceSession::from))
    }

    pub async fn list_for_employee(&self, employee_id: i32) -> Result<Vec<AttendanceSession>> {
        let sessions = Attendances::find()
            .filter(attendances::Column::EmployeeId.eq(employee_id))
            .order_by_asc(attendances::Column::CheckInTime)
            .all(&self.conn)
            .await
            .context("Failed to list attendance sessions")?;

        Ok(sessions.into_iter().map(AttendanceSession::from).collect())
    }

    /// Opens a session. A second open session for the employee is rejected by
    /// the partial unique index, so the raw `DbErr` is returned for callers
    /// to classify.
    pub async fn insert_check_in(
        &self,
        employee_id: i32,
        check_in_time: DateTime<Utc>,
        source: &str,
    ) -> Result<AttendanceSession, DbErr> {
        let model = attendances::ActiveModel {
            employee_id: Set(employee_id),
            check_in_time: Set(check_in_time),
            check_out_time: Set(None),
            source: Set(source.to_string()),
            is_excused: Set(false),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;

        Ok(AttendanceSession::from(model))
    }

    pub async fn update_checkout(
        &self,
        id: i32,
        check_out_time: DateTime<Utc>,
        source: &str,
    ) -> Result<AttendanceSession> {
        let model = Attendances::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query attendance for checkout")?
            .ok_or_else(|| anyhow::anyhow!("Attendance not found: {id}"))?;

        let mut active: attendances::ActiveModel = model.into();
        active.check_out_time = Set(Some(check_out_time));
        active.source = Set(source.to_string());
        let updated = active
            .update(&self.conn)
            .await
            .context("Failed to update attendance checkout")?;

        Ok(AttendanceSession::from(updated))
    }
}
