use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::{companies, employees, prelude::*};
use crate::models::company::{Company, Employee};

/// Read side of the company/employee directory owned by the wider
/// workforce application. Inserts exist for bootstrapping and tests.
pub struct CompanyRepository {
    conn: DatabaseConnection,
}

impl CompanyRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: i32) -> Result<Option<Company>> {
        let company = Companies::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query company by ID")?;

        Ok(company.map(Company::from))
    }

    pub async fn insert(&self, name: &str, is_active: bool) -> Result<Company> {
        let model = companies::ActiveModel {
            name: Set(name.to_string()),
            is_active: Set(is_active),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert company")?;

        Ok(Company::from(model))
    }

    pub async fn set_active(&self, id: i32, is_active: bool) -> Result<()> {
        Companies::update_many()
            .col_expr(
                companies::Column::IsActive,
                sea_orm::sea_query::Expr::value(is_active),
            )
            .filter(companies::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update company status")?;

        Ok(())
    }

    pub async fn employee_by_user_and_company(
        &self,
        user_id: &str,
        company_id: i32,
    ) -> Result<Option<Employee>> {
        let employee = Employees::find()
            .filter(employees::Column::UserId.eq(user_id))
            .filter(employees::Column::CompanyId.eq(company_id))
            .one(&self.conn)
            .await
            .context("Failed to query employee by user and company")?;

        Ok(employee.map(Employee::from))
    }

    pub async fn employee_by_user(&self, user_id: &str) -> Result<Option<Employee>> {
        let employee = Employees::find()
            .filter(employees::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query employee by user")?;

        Ok(employee.map(Employee::from))
    }

    pub async fn insert_employee(
        &self,
        company_id: i32,
        user_id: Option<&str>,
        full_name: &str,
    ) -> Result<Employee> {
        let model = employees::ActiveModel {
            company_id: Set(company_id),
            user_id: Set(user_id.map(ToString::to_string)),
            full_name: Set(full_name.to_string()),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert employee")?;

        Ok(Employee::from(model))
    }
}
