use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "qr_replay_marks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// `used:{token}:{live}`
    #[sea_orm(unique)]
    pub mark_key: String,

    #[sea_orm(indexed)]
    pub expires_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
