use serde::Serialize;

use crate::entities::{companies, employees};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Company {
    pub id: i32,
    pub name: String,
    pub is_active: bool,
}

impl From<companies::Model> for Company {
    fn from(model: companies::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            is_active: model.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Employee {
    pub id: i32,
    pub company_id: i32,
    pub user_id: Option<String>,
    pub full_name: String,
}

impl From<employees::Model> for Employee {
    fn from(model: employees::Model) -> Self {
        Self {
            id: model.id,
            company_id: model.company_id,
            user_id: model.user_id,
            full_name: model.full_name,
        }
    }
}
