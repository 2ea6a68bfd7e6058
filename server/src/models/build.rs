//! Build model: a single signed artifact attached to an update.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::ContentType;
use super::package::Package;
use crate::version;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::builds)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Build {
    pub id: i64,
    pub nvr: String,
    pub package_id: i64,
    pub release_id: Option<i64>,
    pub update_id: Option<i64>,
    pub signed: bool,
    pub content_type: ContentType,
    pub epoch: i32,
    pub ci_url: Option<String>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::builds)]
pub struct NewBuild {
    pub nvr: String,
    pub package_id: i64,
    pub release_id: Option<i64>,
    pub update_id: Option<i64>,
    pub signed: bool,
    pub content_type: ContentType,
    pub epoch: i32,
    pub ci_url: Option<String>,
}

/// A build joined with its package, as the engine works with it in memory.
#[derive(Debug, Clone, Serialize)]
pub struct BuildView {
    pub build: Build,
    pub package: Package,
}

impl Build {
    /// (epoch, version, release) triple for ordering comparisons.
    pub fn evr(&self) -> crate::error::Result<(String, String, String)> {
        let (_, v, r) = version::parse_nvr(&self.nvr)?;
        Ok((self.epoch.to_string(), v, r))
    }
}

impl BuildView {
    pub fn package_name(&self) -> &str {
        &self.package.name
    }
}
