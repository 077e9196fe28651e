use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ConnectionTrait, Schema};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Single-active invariant enforced by the database itself, so concurrent
/// writers in separate processes cannot both commit an active row.
const ONE_ACTIVE_QR_PER_COMPANY: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
     idx_company_qr_codes_one_active ON company_qr_codes (company_id) WHERE is_active = 1";

/// At most one open attendance session per employee.
const ONE_OPEN_SESSION_PER_EMPLOYEE: &str = "CREATE UNIQUE INDEX IF NOT EXISTS \
     idx_attendances_one_open ON attendances (employee_id) WHERE check_out_time IS NULL";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Companies)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Employees)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(CompanyQrCodes)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Attendances)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(QrReplayMarks)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        let indexes = [
            schema.create_index_from_entity(Employees),
            schema.create_index_from_entity(CompanyQrCodes),
            schema.create_index_from_entity(Attendances),
            schema.create_index_from_entity(QrReplayMarks),
        ];
        for mut index in indexes.into_iter().flatten() {
            manager.create_index(index.if_not_exists().to_owned()).await?;
        }

        let conn = manager.get_connection();
        conn.execute_unprepared(ONE_ACTIVE_QR_PER_COMPANY).await?;
        conn.execute_unprepared(ONE_OPEN_SESSION_PER_EMPLOYEE).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QrReplayMarks).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Attendances).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CompanyQrCodes).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Employees).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Companies).to_owned())
            .await?;

        Ok(())
    }
}
