//! Bug and CVE models.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::bugs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Bug {
    pub id: i64,
    /// Identifier in the external bug tracker.
    pub bug_id: i32,
    pub title: Option<String>,
    pub security: bool,
    /// Security tracker bugs have a parent bug that stays open until every
    /// affected release is fixed; tracker flows skip commenting on it.
    pub parent: bool,
    pub url: Option<String>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::bugs)]
pub struct NewBug {
    pub bug_id: i32,
    pub title: Option<String>,
    pub security: bool,
    pub parent: bool,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::cves)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Cve {
    pub id: i64,
    pub cve_id: String,
}
