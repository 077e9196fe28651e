use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "companies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,

    /// Inactive companies cannot hold QR codes.
    pub is_active: bool,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::employees::Entity")]
    Employees,

    #[sea_orm(has_many = "super::company_qr_codes::Entity")]
    CompanyQrCodes,
}

impl Related<super::employees::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Employees.def()
    }
}

impl Related<super::company_qr_codes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CompanyQrCodes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
