use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::{prelude::*, qr_replay_marks};

pub struct ReplayMarkRepository {
    conn: DatabaseConnection,
}

impl ReplayMarkRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, sea_orm::DbErr> {
        let result = QrReplayMarks::delete_many()
            .filter(qr_replay_marks::Column::ExpiresAt.lte(now))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected)
    }

    pub async fn exists(&self, key: &str, now: DateTime<Utc>) -> Result<bool, sea_orm::DbErr> {
        let mark = QrReplayMarks::find()
            .filter(qr_replay_marks::Column::MarkKey.eq(key))
            .filter(qr_replay_marks::Column::ExpiresAt.gt(now))
            .one(&self.conn)
            .await?;

        Ok(mark.is_some())
    }

    /// Plain insert; a unique violation on `mark_key` means the key is taken.
    pub async fn insert(&self, key: &str, expires_at: DateTime<Utc>) -> Result<(), sea_orm::DbErr> {
        qr_replay_marks::ActiveModel {
            mark_key: Set(key.to_string()),
            expires_at: Set(expires_at),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;

        Ok(())
    }
}
