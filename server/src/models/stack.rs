//! Stack model: a named group of packages sharing update requirements.

use diesel::prelude::*;
use serde::Serialize;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::stacks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Stack {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub requirements: Option<String>,
}
