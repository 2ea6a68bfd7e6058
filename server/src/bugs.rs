//! Bug-tracker client abstraction and the comment flows driven off update
//! state changes.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::PolicyConfig;
use crate::models::{Bug, UpdateAggregate};

/// Operations against the external bug tracker. All calls are best-effort:
/// callers log failures and continue.
#[async_trait]
pub trait BugTracker: Send + Sync {
    /// Refresh a bug's title and security flags from the tracker.
    async fn update_details(&self, bug_id: i32) -> anyhow::Result<Bug>;

    async fn comment(&self, bug_id: i32, text: &str) -> anyhow::Result<()>;

    /// Move the bug to ON_QA with a comment.
    async fn on_qa(&self, bug_id: i32, text: &str) -> anyhow::Result<()>;

    /// Close the bug, recording the fixed-in versions per release.
    async fn close(
        &self,
        bug_id: i32,
        fixed_in: &HashMap<String, String>,
        text: &str,
    ) -> anyhow::Result<()>;

    /// Move the bug to MODIFIED.
    async fn modified(&self, bug_id: i32) -> anyhow::Result<()>;
}

/// Bug tracker that logs and does nothing, for development and tests.
#[derive(Debug, Default)]
pub struct DryRunBugTracker;

#[async_trait]
impl BugTracker for DryRunBugTracker {
    async fn update_details(&self, bug_id: i32) -> anyhow::Result<Bug> {
        info!(bug_id, "dry-run: update_details");
        Ok(Bug { id: 0, bug_id, title: None, security: false, parent: false, url: None })
    }

    async fn comment(&self, bug_id: i32, text: &str) -> anyhow::Result<()> {
        info!(bug_id, text, "dry-run: bug comment");
        Ok(())
    }

    async fn on_qa(&self, bug_id: i32, text: &str) -> anyhow::Result<()> {
        info!(bug_id, text, "dry-run: bug on_qa");
        Ok(())
    }

    async fn close(
        &self,
        bug_id: i32,
        fixed_in: &HashMap<String, String>,
        text: &str,
    ) -> anyhow::Result<()> {
        info!(bug_id, ?fixed_in, text, "dry-run: bug close");
        Ok(())
    }

    async fn modified(&self, bug_id: i32) -> anyhow::Result<()> {
        info!(bug_id, "dry-run: bug modified");
        Ok(())
    }
}

/// Message posted to bugs when the update lands in testing.
pub fn testing_message(aggregate: &UpdateAggregate, config: &PolicyConfig) -> String {
    format!(
        "{title} has been pushed to the {release} testing repository. If problems still persist, \
         please make note of it in this bug report.\nSee {base}updates/{alias} for more \
         information on how to test this update.",
        title = aggregate.beautify_title(),
        release = aggregate.release.long_name,
        base = config.base_address,
        alias = aggregate.update.alias,
    )
}

/// Message posted to bugs when the update is closed out in stable.
pub fn stable_message(aggregate: &UpdateAggregate) -> String {
    format!(
        "{title} has been pushed to the {release} stable repository. If problems still persist, \
         please make note of it in this bug report.",
        title = aggregate.beautify_title(),
        release = aggregate.release.long_name,
    )
}

/// True when tracker flows should skip this bug: parents of security trackers
/// stay open until every affected release is fixed.
fn skip_bug(bug: &Bug) -> bool {
    bug.parent && bug.security
}

/// Move all of an update's bugs to ON_QA as it reaches testing.
pub async fn notify_testing(
    tracker: &dyn BugTracker,
    aggregate: &UpdateAggregate,
    config: &PolicyConfig,
) {
    let text = testing_message(aggregate, config);
    for bug in &aggregate.bugs {
        if skip_bug(bug) {
            continue;
        }
        if let Err(e) = tracker.on_qa(bug.bug_id, &text).await {
            warn!(bug_id = bug.bug_id, error = %e, "failed to move bug to ON_QA");
        }
    }
}

/// Close or comment on an update's bugs as it reaches stable. Bugs are only
/// closed when the update asked for it; otherwise they just get the comment.
pub async fn notify_stable(tracker: &dyn BugTracker, aggregate: &UpdateAggregate) {
    let text = stable_message(aggregate);
    let mut fixed_in = HashMap::new();
    fixed_in.insert(aggregate.release.name.clone(), aggregate.title());
    for bug in &aggregate.bugs {
        if skip_bug(bug) {
            continue;
        }
        let result = if aggregate.update.close_bugs {
            tracker.close(bug.bug_id, &fixed_in, &text).await
        } else {
            tracker.comment(bug.bug_id, &text).await
        };
        if let Err(e) = result {
            warn!(bug_id = bug.bug_id, error = %e, "failed to update bug for stable push");
        }
    }
}

/// Move an update's bugs to MODIFIED when the update is first submitted.
pub async fn notify_modified(tracker: &dyn BugTracker, aggregate: &UpdateAggregate) {
    for bug in &aggregate.bugs {
        if skip_bug(bug) {
            continue;
        }
        if let Err(e) = tracker.modified(bug.bug_id).await {
            warn!(bug_id = bug.bug_id, error = %e, "failed to move bug to MODIFIED");
        }
    }
}
