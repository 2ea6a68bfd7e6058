//! Update model and the in-memory aggregate the lifecycle engine operates on.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::bug::Bug;
use super::build::BuildView;
use super::comment::CommentView;
use super::enums::{
    ContentType, TestGatingStatus, UpdateRequest, UpdateSeverity, UpdateStatus, UpdateSuggestion,
    UpdateType,
};
use super::release::Release;
use crate::error::{Result, UpdateError};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::updates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Update {
    pub id: i64,
    /// Space-joined, sorted build NVRs.
    pub title: String,
    /// Stable identifier, e.g. `FEDORA-2017-a1b2c3d4e5`.
    pub alias: String,
    pub autokarma: bool,
    pub stable_karma: Option<i32>,
    pub unstable_karma: Option<i32>,
    pub requirements: Option<String>,
    pub require_bugs: bool,
    pub require_testcases: bool,
    pub notes: String,
    pub update_type: UpdateType,
    pub status: UpdateStatus,
    pub request: Option<UpdateRequest>,
    pub severity: UpdateSeverity,
    pub suggest: UpdateSuggestion,
    pub locked: bool,
    pub pushed: bool,
    pub critpath: bool,
    pub close_bugs: bool,
    pub date_submitted: DateTime<Utc>,
    pub date_modified: Option<DateTime<Utc>>,
    pub date_approved: Option<DateTime<Utc>>,
    pub date_pushed: Option<DateTime<Utc>>,
    pub date_testing: Option<DateTime<Utc>>,
    pub date_stable: Option<DateTime<Utc>>,
    pub date_locked: Option<DateTime<Utc>>,
    pub release_id: i64,
    pub user_id: i64,
    pub test_gating_status: Option<TestGatingStatus>,
    pub test_gating_summary: Option<String>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::updates)]
pub struct NewUpdate {
    pub title: String,
    pub alias: String,
    pub autokarma: bool,
    pub stable_karma: Option<i32>,
    pub unstable_karma: Option<i32>,
    pub requirements: Option<String>,
    pub require_bugs: bool,
    pub require_testcases: bool,
    pub notes: String,
    pub update_type: UpdateType,
    pub status: UpdateStatus,
    pub request: Option<UpdateRequest>,
    pub severity: UpdateSeverity,
    pub suggest: UpdateSuggestion,
    pub locked: bool,
    pub pushed: bool,
    pub critpath: bool,
    pub close_bugs: bool,
    pub date_submitted: DateTime<Utc>,
    pub release_id: i64,
    pub user_id: i64,
    pub test_gating_status: Option<TestGatingStatus>,
}

/// A non-fatal remark produced while servicing a request, surfaced to the
/// caller alongside the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caveat {
    pub name: String,
    pub description: String,
}

impl Caveat {
    pub fn new(name: &str, description: impl Into<String>) -> Self {
        Caveat { name: name.to_string(), description: description.into() }
    }
}

/// An update with everything the engine needs loaded in memory: its release,
/// owner, builds (with packages), comment history, and associated bugs.
///
/// Lifecycle operations mutate the aggregate in place; the service layer
/// persists the result afterwards. New comments are appended with `id == 0`
/// and inserted on save.
#[derive(Debug, Clone)]
pub struct UpdateAggregate {
    pub update: Update,
    pub release: Release,
    /// Name of the submitting user.
    pub owner: String,
    /// Users with commit access to the packages in this update.
    pub committers: Vec<String>,
    pub builds: Vec<BuildView>,
    pub comments: Vec<CommentView>,
    pub bugs: Vec<Bug>,
}

impl UpdateAggregate {
    /// Canonical title: sorted NVRs joined with spaces.
    pub fn title(&self) -> String {
        let mut nvrs: Vec<&str> = self.builds.iter().map(|b| b.build.nvr.as_str()).collect();
        nvrs.sort_unstable();
        nvrs.join(" ")
    }

    /// Human-friendly title: NVRs joined with commas and a final "and".
    pub fn beautify_title(&self) -> String {
        let mut nvrs: Vec<&str> = self.builds.iter().map(|b| b.build.nvr.as_str()).collect();
        nvrs.sort_unstable();
        match nvrs.len() {
            0 => String::new(),
            1 => nvrs[0].to_string(),
            2 => format!("{} and {}", nvrs[0], nvrs[1]),
            n => format!("{}, and {}", nvrs[..n - 1].join(", "), nvrs[n - 1]),
        }
    }

    /// Content type shared by all builds, or `None` when there are no builds.
    /// Mixing content types within one update is a validation error.
    pub fn content_type(&self) -> Result<Option<ContentType>> {
        let types: BTreeSet<&str> =
            self.builds.iter().map(|b| b.build.content_type.as_str()).collect();
        match types.len() {
            0 => Ok(None),
            1 => Ok(Some(self.builds[0].build.content_type)),
            _ => Err(UpdateError::Validation(format!(
                "update {} mixes content types: {:?}",
                self.update.alias, types
            ))),
        }
    }

    /// True when every build has been signed.
    pub fn signed(&self) -> bool {
        self.builds.iter().all(|b| b.build.signed)
    }

    pub fn package_names(&self) -> BTreeSet<String> {
        self.builds.iter().map(|b| b.package.name.clone()).collect()
    }

    pub fn num_builds(&self) -> usize {
        self.builds.len()
    }
}
