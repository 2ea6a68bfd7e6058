//! Buildroot override model: keeps a build tagged into the override tag so
//! other pending builds can depend on it before it reaches stable.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::buildroot_overrides)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BuildrootOverride {
    pub id: i64,
    pub build_id: i64,
    pub submitter_id: i64,
    pub notes: String,
    pub submission_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub expired_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::buildroot_overrides)]
pub struct NewBuildrootOverride {
    pub build_id: i64,
    pub submitter_id: i64,
    pub notes: String,
    pub submission_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

impl BuildrootOverride {
    pub fn is_expired(&self) -> bool {
        self.expired_date.is_some()
    }

    /// Overdue once the expiration date has passed and it hasn't been
    /// expired yet.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired() && self.expiration_date <= now
    }
}
