//! The update transition engine: request changes, karma thresholds, and the
//! tag choreography that backs them.
//!
//! All operations here mutate the in-memory aggregate and drive the build
//! system; persisting the result is the caller's job. Engine-generated
//! comments are appended with `id == 0` and written out on save.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{karma, policy, release_service::TagCache};
use crate::bugs::{self, BugTracker};
use crate::buildsys::BuildSystem;
use crate::config::{self, PolicyConfig};
use crate::error::{Result, UpdateError};
use crate::events::update as events;
use crate::events::Publisher;
use crate::mail::{self, Mailer};
use crate::metrics;
use crate::models::{
    Caveat, Comment, CommentView, UpdateAggregate, UpdateRequest, UpdateSeverity, UpdateStatus,
    UpdateType,
};

/// Everything a transition needs besides the aggregate itself.
pub struct EngineContext<'a> {
    pub config: &'a PolicyConfig,
    pub buildsys: &'a dyn BuildSystem,
    pub bugtracker: &'a dyn BugTracker,
    pub publisher: &'a dyn Publisher,
    pub mailer: &'a dyn Mailer,
    pub tags: &'a TagCache,
}

/// Input for a user comment.
#[derive(Debug, Clone, Default)]
pub struct CommentParams {
    pub author: String,
    pub author_groups: Vec<String>,
    pub text: String,
    pub karma: i32,
    pub karma_critpath: i32,
    pub anonymous: bool,
    pub bug_feedback: Vec<crate::models::BugFeedback>,
    pub testcase_feedback: Vec<crate::models::TestCaseFeedback>,
    /// When false, skip threshold evaluation (used for engine-internal
    /// comments that must never recurse into `set_request`).
    pub check_karma: bool,
}

fn payload<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

impl UpdateAggregate {
    /// Request an action for this update.
    ///
    /// Requests that repeat the current status or pending request are
    /// no-ops. Unpush, obsolete, and revoke are serviced unconditionally;
    /// stable and batched requests pass through the critpath and
    /// minimum-testing gates and may be downgraded to testing.
    pub async fn set_request(
        &mut self,
        ctx: &EngineContext<'_>,
        action: UpdateRequest,
        agent: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        debug!(alias = %self.update.alias, %action, "attempting to set request");
        let mut notes: Vec<String> = Vec::new();

        if self.update.locked {
            return Err(UpdateError::Locked);
        }
        if action.description() == self.update.status.description() {
            info!(alias = %self.update.alias, %action, "update already in requested state");
            return Ok(());
        }
        if self.update.request == Some(action) {
            debug!(alias = %self.update.alias, %action, "request already submitted");
            return Ok(());
        }

        match action {
            UpdateRequest::Unpush => {
                self.unpush(ctx).await?;
                self.append_comment(agent, "This update has been unpushed.", now);
                self.publish_request(ctx, action, agent).await;
                info!(alias = %self.update.alias, "update unpushed");
                return Ok(());
            }
            UpdateRequest::Obsolete => {
                self.obsolete(ctx, None, now).await?;
                self.publish_request(ctx, action, agent).await;
                info!(alias = %self.update.alias, "update obsoleted");
                return Ok(());
            }
            UpdateRequest::Revoke => {
                if self.update.status == UpdateStatus::Pending
                    && self.update.request == Some(UpdateRequest::Testing)
                {
                    // Never pushed anywhere: drop it back to unpushed.
                    self.update.status = UpdateStatus::Unpushed;
                    self.revoke_request(ctx).await?;
                } else if self.update.status == UpdateStatus::Testing
                    && matches!(
                        self.update.request,
                        Some(UpdateRequest::Stable) | Some(UpdateRequest::Batched)
                    )
                {
                    // Already in testing: cancel the stable push, stay put.
                    self.update.status = UpdateStatus::Testing;
                    self.revoke_request(ctx).await?;
                } else {
                    self.revoke_request(ctx).await?;
                }
                self.publish_request(ctx, action, agent).await;
                info!(alias = %self.update.alias, "request revoked");
                return Ok(());
            }
            _ => {}
        }

        let mut action = action;

        // Critical path updates cannot go straight to stable without
        // approval.
        if matches!(action, UpdateRequest::Stable | UpdateRequest::Batched)
            && self.update.critpath
            && ctx.config.admin_approvals_for(&self.release.name).is_some()
            && !policy::critpath_approved(self, ctx.config, now)
        {
            let mut stern_note = config::not_yet_tested_msg(
                ctx.config.min_karma_for(&self.release.name),
                ctx.config.admin_approvals_for(&self.release.name).unwrap_or(0),
                ctx.config.critpath_stable_after_days_without_negative_karma,
            );
            if ctx.config.test_gating_required {
                stern_note.push_str(" Additionally, it must pass automated tests.");
            }
            notes.push(stern_note);

            if self.update.status == UpdateStatus::Testing {
                self.update.request = None;
                return Err(UpdateError::Policy(notes.join(". ")));
            }
            info!(alias = %self.update.alias, "forcing critical path update into testing");
            action = UpdateRequest::Testing;
        }

        // Non-critpath stable pushes must satisfy karma or time in testing.
        if matches!(action, UpdateRequest::Stable | UpdateRequest::Batched)
            && !self.update.critpath
        {
            let karma_met = match self.update.stable_karma {
                Some(threshold) if threshold != 0 => {
                    karma::total_karma(&self.comments, ctx.config) >= threshold
                }
                _ => false,
            };
            if karma_met || policy::critpath_approved(self, ctx.config, now) {
                debug!(alias = %self.update.alias, "meets stable karma requirements");
            } else if policy::mandatory_days_in_testing(self, ctx.config) != 0
                && !policy::met_testing_requirements(self, ctx.config, now)
                && !policy::meets_testing_requirements(self, ctx.config, now)
            {
                let message = if self.release.id_prefix == "FEDORA-EPEL" {
                    config::NOT_YET_TESTED_EPEL_MSG
                } else {
                    config::NOT_YET_TESTED_MSG
                };
                if self.update.status == UpdateStatus::Testing {
                    self.update.request = None;
                    return Err(UpdateError::Policy(message.to_string()));
                } else if self.update.request == Some(UpdateRequest::Testing) {
                    return Err(UpdateError::Policy(message.to_string()));
                }
                action = UpdateRequest::Testing;
            }
        }

        // Pending tags let the pipeline pick the builds up before the push.
        match action {
            UpdateRequest::Testing => {
                self.add_tag(ctx, &self.release.pending_signing_tag.clone()).await?;
            }
            UpdateRequest::Stable => {
                self.add_tag(ctx, &self.release.pending_stable_tag.clone()).await?;
            }
            _ => {}
        }

        // A resubmitted obsolete or unpushed update becomes a candidate
        // again.
        if matches!(self.update.status, UpdateStatus::Obsolete | UpdateStatus::Unpushed) {
            self.update.status = UpdateStatus::Pending;
            let candidate = self.release.candidate_tag.clone();
            if !self.build_tags(ctx).await?.contains(&candidate) {
                self.add_tag(ctx, &candidate).await?;
            }
        }

        self.update.request = Some(action);

        let notes = if notes.is_empty() { String::new() } else { format!("{}.", notes.join(". ")) };
        let text = format!(
            "This update has been submitted for {} by {}. {}",
            action.description(),
            agent,
            notes
        );
        self.append_system_comment(ctx.config, &text, now);
        self.publish_request(ctx, action, agent).await;
        metrics::request_submitted(action.as_str());
        info!(alias = %self.update.alias, %action, agent, "request submitted");
        Ok(())
    }

    /// Add a comment, folding in karma and feedback, and evaluate the karma
    /// thresholds it may have tipped.
    pub async fn comment(
        &mut self,
        ctx: &EngineContext<'_>,
        params: CommentParams,
        now: DateTime<Utc>,
    ) -> Result<Vec<Caveat>> {
        let mut caveats = Vec::new();
        let mut karma_value = params.karma;

        if self.owner == params.author && karma_value != 0 {
            karma_value = 0;
            caveats.push(Caveat::new("karma", "You may not give karma to your own updates."));
        }

        let author =
            if params.anonymous { "anonymous".to_string() } else { params.author.clone() };

        self.comments.push(CommentView {
            comment: Comment {
                id: 0,
                update_id: self.update.id,
                user_id: 0,
                karma: karma_value,
                karma_critpath: params.karma_critpath,
                text: params.text.clone(),
                anonymous: params.anonymous,
                timestamp: now,
            },
            author: author.clone(),
            author_groups: params.author_groups.clone(),
            bug_feedback: params.bug_feedback.clone(),
            testcase_feedback: params.testcase_feedback.clone(),
        });

        if !params.anonymous && karma_value != 0 {
            let previous_karma = self.comments[..self.comments.len() - 1]
                .iter()
                .rev()
                .find(|c| c.author == author && c.comment.karma != 0)
                .map(|c| c.comment.karma);
            match previous_karma {
                Some(previous) if previous != karma_value => {
                    caveats.push(Caveat::new("karma", "Your karma standing was reversed."));
                }
                Some(_) => {
                    debug!(author = %author, alias = %self.update.alias, "ignoring duplicate karma");
                }
                None => {}
            }
            info!(
                alias = %self.update.alias,
                karma = karma::total_karma(&self.comments, ctx.config),
                "karma updated"
            );

            if params.check_karma && !ctx.config.is_system_user(&author) {
                let system_user = ctx.config.system_user.clone();
                match self.check_karma_thresholds(ctx, &system_user, now).await {
                    Ok(()) => {}
                    Err(UpdateError::Locked) => {}
                    Err(UpdateError::Policy(message)) => {
                        warn!(alias = %self.update.alias, %message, "karma threshold check rejected");
                        caveats.push(Caveat::new("karma", message));
                    }
                    Err(e) => return Err(e),
                }
            }

            self.obsolete_if_unstable(ctx, now).await?;
        }

        // Automation comments stay off the bus and out of inboxes.
        if !ctx.config.is_system_user(&params.author) {
            let event = events::CommentAdded::new(
                self,
                &params.author,
                params.anonymous,
                karma_value,
                &params.text,
            );
            if let Err(e) = ctx.publisher.publish("update.comment", payload(&event)).await {
                warn!(error = %e, "failed to publish comment event");
            }
            metrics::comment_added();
            mail::notify_commenters(ctx.mailer, self, &author, &params.text, ctx.config).await;
        }

        Ok(caveats)
    }

    /// Evaluate stable and unstable karma thresholds and act on them.
    pub async fn check_karma_thresholds(
        &mut self,
        ctx: &EngineContext<'_>,
        agent: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.update.locked {
            debug!(alias = %self.update.alias, "locked, ignoring karma thresholds");
            return Err(UpdateError::Locked);
        }
        if !matches!(self.update.status, UpdateStatus::Testing | UpdateStatus::Pending) {
            return Ok(());
        }

        let (_, negative) = karma::composite_karma(&self.comments, ctx.config);
        let total = karma::total_karma(&self.comments, ctx.config);

        if self.update.autokarma
            && negative != 0
            && self.update.status == UpdateStatus::Testing
            && self.update.request != Some(UpdateRequest::Stable)
        {
            info!(alias = %self.update.alias, "disabling autopush after negative karma");
            self.update.autokarma = false;
            self.append_system_comment(ctx.config, config::DISABLE_AUTOPUSH_MSG, now);
        } else if matches!(self.update.stable_karma, Some(t) if t != 0 && total >= t) {
            if self.update.autokarma {
                let action = if self.update.severity == UpdateSeverity::Urgent
                    || self.update.update_type == UpdateType::NewPackage
                {
                    info!(alias = %self.update.alias, "automatically marking as stable");
                    UpdateRequest::Stable
                } else {
                    info!(alias = %self.update.alias, "adding to the next stable batch");
                    UpdateRequest::Batched
                };
                self.set_request(ctx, action, agent, now).await?;
                self.update.date_pushed = None;
                let event = events::KarmaThresholdReached {
                    update: events::UpdateSummary::from_aggregate(self),
                    status: "stable".to_string(),
                };
                if let Err(e) =
                    ctx.publisher.publish("update.karma.threshold.reach", payload(&event)).await
                {
                    warn!(error = %e, "failed to publish karma threshold event");
                }
                metrics::karma_threshold_reached("stable");
            } else {
                info!(
                    alias = %self.update.alias,
                    "reached the stable karma threshold and can be pushed to stable by the maintainer"
                );
            }
        } else if matches!(self.update.unstable_karma, Some(t) if t != 0 && total <= t) {
            if self.update.status == UpdateStatus::Pending && !self.update.autokarma {
                // Manual pending updates ride out bad karma.
            } else {
                info!(alias = %self.update.alias, "automatically unpushing after unstable karma");
                self.obsolete(ctx, None, now).await?;
                let event = events::KarmaThresholdReached {
                    update: events::UpdateSummary::from_aggregate(self),
                    status: "unstable".to_string(),
                };
                if let Err(e) =
                    ctx.publisher.publish("update.karma.threshold.reach", payload(&event)).await
                {
                    warn!(error = %e, "failed to publish karma threshold event");
                }
                metrics::karma_threshold_reached("unstable");
            }
        }
        Ok(())
    }

    /// Obsolete a pending autopush update that hit its unstable threshold.
    pub async fn obsolete_if_unstable(
        &mut self,
        ctx: &EngineContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let unstable_hit = matches!(
            self.update.unstable_karma,
            Some(t) if t != 0 && karma::total_karma(&self.comments, ctx.config) <= t
        );
        if self.update.autokarma
            && self.update.status == UpdateStatus::Pending
            && self.update.request == Some(UpdateRequest::Testing)
            && unstable_hit
        {
            info!(alias = %self.update.alias, "reached unstable karma threshold");
            self.obsolete(ctx, None, now).await?;
        }
        Ok(())
    }

    /// Move the update's builds back to the candidate tag and mark it
    /// unpushed. Only valid from testing.
    pub async fn unpush(&mut self, ctx: &EngineContext<'_>) -> Result<()> {
        debug!(alias = %self.update.alias, "unpushing");
        if self.update.status == UpdateStatus::Unpushed {
            debug!(alias = %self.update.alias, "already unpushed");
            return Ok(());
        }
        if self.update.status != UpdateStatus::Testing {
            return Err(UpdateError::Policy(format!(
                "can't unpush a {} update",
                self.update.status.description()
            )));
        }

        self.untag_all(ctx).await?;
        for build in &self.builds {
            ctx.buildsys.tag_build(&self.release.candidate_tag, &build.build.nvr, true).await?;
        }

        self.update.pushed = false;
        self.update.status = UpdateStatus::Unpushed;
        self.update.request = None;
        metrics::status_changed(UpdateStatus::Unpushed.as_str());
        Ok(())
    }

    /// Clear the pending request, dropping any pending tags it had applied.
    pub async fn revoke_request(&mut self, ctx: &EngineContext<'_>) -> Result<()> {
        debug!(alias = %self.update.alias, "revoking");
        let Some(request) = self.update.request else {
            return Err(UpdateError::Policy(
                "can only revoke an update with an existing request".to_string(),
            ));
        };
        if !matches!(
            self.update.status,
            UpdateStatus::Pending
                | UpdateStatus::Testing
                | UpdateStatus::Obsolete
                | UpdateStatus::Unpushed
        ) {
            return Err(UpdateError::Policy(format!(
                "can only revoke a pending, testing, unpushed, or obsolete update, not one that \
                 is {}",
                self.update.status.description()
            )));
        }

        match request {
            UpdateRequest::Testing => {
                self.remove_tag(ctx, &self.release.pending_signing_tag.clone()).await?;
                self.remove_tag(ctx, &self.release.pending_testing_tag.clone()).await?;
            }
            UpdateRequest::Stable => {
                self.remove_tag(ctx, &self.release.pending_stable_tag.clone()).await?;
            }
            _ => {}
        }

        self.update.request = None;
        Ok(())
    }

    /// Obsolete this update, optionally recording which newer build
    /// superseded it.
    pub async fn obsolete(
        &mut self,
        ctx: &EngineContext<'_>,
        newer: Option<(&str, &str)>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        debug!(alias = %self.update.alias, "obsoleting");
        self.untag_all(ctx).await?;
        self.update.status = UpdateStatus::Obsolete;
        self.update.request = None;
        let text = match newer {
            Some((nvr, url)) => format!("This update has been obsoleted by [{nvr}]({url})."),
            None => "This update has been obsoleted.".to_string(),
        };
        self.append_system_comment(ctx.config, &text, now);
        metrics::status_changed(UpdateStatus::Obsolete.as_str());
        Ok(())
    }

    /// Remove every known release tag from every build.
    pub async fn untag_all(&mut self, ctx: &EngineContext<'_>) -> Result<()> {
        info!(alias = %self.update.alias, "untagging");
        for build in &self.builds {
            for tag in ctx.buildsys.list_tags(&build.build.nvr).await? {
                if ctx.tags.known(&tag) {
                    ctx.buildsys.untag_build(&tag, &build.build.nvr, true, false).await?;
                } else {
                    info!(tag, nvr = %build.build.nvr, "skipping unknown tag");
                }
            }
        }
        self.update.pushed = false;
        Ok(())
    }

    /// Apply a tag to every build. Empty tags are skipped with a warning.
    pub async fn add_tag(&self, ctx: &EngineContext<'_>, tag: &str) -> Result<()> {
        if tag.is_empty() {
            warn!(alias = %self.update.alias, "not adding builds to empty tag");
            return Ok(());
        }
        debug!(alias = %self.update.alias, tag, "adding tag");
        for build in &self.builds {
            ctx.buildsys.tag_build(tag, &build.build.nvr, true).await?;
        }
        Ok(())
    }

    /// Remove a tag from every build. Empty tags are skipped with a warning.
    pub async fn remove_tag(&self, ctx: &EngineContext<'_>, tag: &str) -> Result<()> {
        if tag.is_empty() {
            warn!(alias = %self.update.alias, "not removing builds from empty tag");
            return Ok(());
        }
        debug!(alias = %self.update.alias, tag, "removing tag");
        for build in &self.builds {
            ctx.buildsys.untag_build(tag, &build.build.nvr, true, false).await?;
        }
        Ok(())
    }

    /// All build-system tags currently on this update's builds.
    pub async fn build_tags(&self, ctx: &EngineContext<'_>) -> Result<BTreeSet<String>> {
        let mut tags = BTreeSet::new();
        for build in &self.builds {
            tags.extend(ctx.buildsys.list_tags(&build.build.nvr).await?);
        }
        Ok(tags)
    }

    /// Finalize a completed push: the pending request becomes the status,
    /// the bug tracker and announce list are notified, and the errata event
    /// goes out on the bus.
    pub async fn request_complete(&mut self, ctx: &EngineContext<'_>, now: DateTime<Utc>) {
        let pushed_to = match self.update.request {
            Some(UpdateRequest::Testing) => {
                self.update.status = UpdateStatus::Testing;
                self.update.date_testing = Some(now);
                metrics::status_changed(UpdateStatus::Testing.as_str());
                Some(UpdateStatus::Testing)
            }
            Some(UpdateRequest::Stable) => {
                self.update.status = UpdateStatus::Stable;
                self.update.date_stable = Some(now);
                metrics::status_changed(UpdateStatus::Stable.as_str());
                Some(UpdateStatus::Stable)
            }
            _ => None,
        };
        self.update.request = None;
        self.update.date_pushed = Some(now);
        self.update.pushed = true;

        let Some(status) = pushed_to else { return };
        self.append_system_comment(
            ctx.config,
            &format!("This update has been pushed to {}.", status.description()),
            now,
        );
        match status {
            UpdateStatus::Testing => {
                bugs::notify_testing(ctx.bugtracker, self, ctx.config).await;
            }
            UpdateStatus::Stable => {
                bugs::notify_stable(ctx.bugtracker, self).await;
            }
            _ => {}
        }
        mail::send_update_notice(ctx.mailer, self, ctx.config).await;
        let (subject, body) = mail::render_notice(self, ctx.config);
        let event = events::ErrataPublished {
            update: events::UpdateSummary::from_aggregate(self),
            subject,
            body,
        };
        if let Err(e) = ctx.publisher.publish("errata.publish", payload(&event)).await {
            warn!(error = %e, "failed to publish errata event");
        }
        info!(alias = %self.update.alias, status = status.as_str(), "push completed");
    }

    /// The destination tag implied by the pending request.
    pub fn requested_tag(&self) -> Option<&str> {
        let tag = match self.update.request {
            Some(UpdateRequest::Stable) => {
                // Stable pushes to a still-pending release land in the dist
                // tag directly.
                if self.release.state == crate::models::ReleaseState::Pending {
                    self.release.dist_tag.as_str()
                } else {
                    self.release.stable_tag.as_str()
                }
            }
            Some(UpdateRequest::Testing) | Some(UpdateRequest::Batched) => {
                self.release.testing_tag.as_str()
            }
            Some(UpdateRequest::Obsolete) => self.release.candidate_tag.as_str(),
            _ => "",
        };
        if tag.is_empty() {
            tracing::error!(alias = %self.update.alias, "unable to determine requested tag");
            return None;
        }
        Some(tag)
    }

    /// Append an engine-generated comment. Never re-enters threshold checks.
    pub fn append_system_comment(&mut self, config: &PolicyConfig, text: &str, now: DateTime<Utc>) {
        let author = config.system_user.clone();
        self.append_comment(&author, text, now);
    }

    fn append_comment(&mut self, author: &str, text: &str, now: DateTime<Utc>) {
        self.comments.push(CommentView {
            comment: Comment {
                id: 0,
                update_id: self.update.id,
                user_id: 0,
                karma: 0,
                karma_critpath: 0,
                text: text.to_string(),
                anonymous: false,
                timestamp: now,
            },
            author: author.to_string(),
            author_groups: Vec::new(),
            bug_feedback: Vec::new(),
            testcase_feedback: Vec::new(),
        });
    }

    async fn publish_request(&self, ctx: &EngineContext<'_>, action: UpdateRequest, agent: &str) {
        let event = events::RequestChanged {
            update: events::UpdateSummary::from_aggregate(self),
            agent: agent.to_string(),
        };
        if let Err(e) = ctx.publisher.publish(&events::request_topic(action), payload(&event)).await
        {
            warn!(error = %e, "failed to publish request event");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::ReleaseState;
    use crate::test_util::{self, comment, Harness};

    fn testing_aggregate() -> UpdateAggregate {
        test_util::aggregate_with_builds(&["bash-4.4.12-5.fc26"])
    }

    fn params(author: &str, karma: i32, text: &str) -> CommentParams {
        CommentParams {
            author: author.to_string(),
            text: text.to_string(),
            karma,
            check_karma: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn locked_update_refuses_requests() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.locked = true;
        let err = agg
            .set_request(&harness.ctx(), UpdateRequest::Stable, "maintainer", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Locked));
        assert!(harness.buildsys.recorded().is_empty());
    }

    #[tokio::test]
    async fn request_matching_status_is_a_noop() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.set_request(&harness.ctx(), UpdateRequest::Testing, "maintainer", Utc::now())
            .await
            .unwrap();
        assert_eq!(agg.update.request, None);
        assert!(agg.comments.is_empty());
        assert!(harness.buildsys.recorded().is_empty());
    }

    #[tokio::test]
    async fn repeated_request_is_a_noop() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.request = Some(UpdateRequest::Stable);
        agg.comments = vec![comment("a", 1, "+1"), comment("b", 1, "+1"), comment("c", 1, "+1")];
        agg.set_request(&harness.ctx(), UpdateRequest::Stable, "maintainer", Utc::now())
            .await
            .unwrap();
        assert!(harness.buildsys.recorded().is_empty());
        assert!(harness.publisher.topics().is_empty());
    }

    #[tokio::test]
    async fn premature_stable_push_is_rejected_and_request_cleared() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.request = Some(UpdateRequest::Batched);
        let err = agg
            .set_request(&harness.ctx(), UpdateRequest::Stable, "maintainer", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Policy(_)));
        assert_eq!(agg.update.request, None);
    }

    #[tokio::test]
    async fn stable_push_allowed_once_karma_threshold_met() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.comments = vec![comment("a", 1, "+1"), comment("b", 1, "+1"), comment("c", 1, "+1")];
        agg.set_request(&harness.ctx(), UpdateRequest::Stable, "maintainer", Utc::now())
            .await
            .unwrap();
        assert_eq!(agg.update.request, Some(UpdateRequest::Stable));
        assert!(harness
            .buildsys
            .recorded()
            .contains(&"tag f26-updates-pending bash-4.4.12-5.fc26".to_string()));
        let last = agg.comments.last().unwrap();
        assert_eq!(last.author, "updraft");
        assert!(last.comment.text.contains("submitted for stable by maintainer"));
        assert!(harness.publisher.topics().contains(&"update.request.stable".to_string()));
    }

    #[tokio::test]
    async fn stable_push_allowed_after_mandatory_days() {
        let harness = Harness::new();
        let now = Utc::now();
        let mut agg = testing_aggregate();
        agg.update.date_testing = Some(now - Duration::days(8));
        agg.set_request(&harness.ctx(), UpdateRequest::Stable, "maintainer", now).await.unwrap();
        assert_eq!(agg.update.request, Some(UpdateRequest::Stable));
    }

    #[tokio::test]
    async fn testing_request_applies_pending_signing_tag() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.status = UpdateStatus::Pending;
        agg.update.pushed = false;
        agg.update.date_testing = None;
        agg.set_request(&harness.ctx(), UpdateRequest::Testing, "maintainer", Utc::now())
            .await
            .unwrap();
        assert_eq!(agg.update.request, Some(UpdateRequest::Testing));
        assert!(harness
            .buildsys
            .recorded()
            .contains(&"tag f26-signing-pending bash-4.4.12-5.fc26".to_string()));
    }

    #[tokio::test]
    async fn unapproved_critpath_pending_update_is_forced_into_testing() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.status = UpdateStatus::Pending;
        agg.update.critpath = true;
        agg.update.date_testing = None;
        agg.set_request(&harness.ctx(), UpdateRequest::Stable, "maintainer", Utc::now())
            .await
            .unwrap();
        assert_eq!(agg.update.request, Some(UpdateRequest::Testing));
        let last = agg.comments.last().unwrap();
        assert!(last.comment.text.contains("submitted for testing"));
        assert!(last.comment.text.contains("critical path update has not yet been approved"));
    }

    #[tokio::test]
    async fn unapproved_critpath_testing_update_is_rejected() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.critpath = true;
        let err = agg
            .set_request(&harness.ctx(), UpdateRequest::Stable, "maintainer", Utc::now())
            .await
            .unwrap_err();
        match err {
            UpdateError::Policy(message) => {
                assert!(message.contains("critical path update has not yet been approved"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(agg.update.request, None);
    }

    #[tokio::test]
    async fn revoking_a_pending_testing_request_unpushes() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.status = UpdateStatus::Pending;
        agg.update.request = Some(UpdateRequest::Testing);
        agg.set_request(&harness.ctx(), UpdateRequest::Revoke, "maintainer", Utc::now())
            .await
            .unwrap();
        assert_eq!(agg.update.status, UpdateStatus::Unpushed);
        assert_eq!(agg.update.request, None);
        let recorded = harness.buildsys.recorded();
        assert!(recorded.contains(&"untag f26-signing-pending bash-4.4.12-5.fc26".to_string()));
        assert!(
            recorded.contains(&"untag f26-updates-testing-pending bash-4.4.12-5.fc26".to_string())
        );
    }

    #[tokio::test]
    async fn revoking_a_stable_request_keeps_testing_status() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.request = Some(UpdateRequest::Stable);
        agg.set_request(&harness.ctx(), UpdateRequest::Revoke, "maintainer", Utc::now())
            .await
            .unwrap();
        assert_eq!(agg.update.status, UpdateStatus::Testing);
        assert_eq!(agg.update.request, None);
        assert!(harness
            .buildsys
            .recorded()
            .contains(&"untag f26-updates-pending bash-4.4.12-5.fc26".to_string()));
    }

    #[tokio::test]
    async fn revoking_without_a_request_is_rejected() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        let err = agg
            .set_request(&harness.ctx(), UpdateRequest::Revoke, "maintainer", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Policy(_)));
    }

    #[tokio::test]
    async fn unpush_moves_builds_back_to_candidate() {
        let harness = Harness::new();
        harness.buildsys.set_tags("bash-4.4.12-5.fc26", &["f26-updates-testing", "some-other-tag"]);
        let mut agg = testing_aggregate();
        agg.set_request(&harness.ctx(), UpdateRequest::Unpush, "maintainer", Utc::now())
            .await
            .unwrap();
        assert_eq!(agg.update.status, UpdateStatus::Unpushed);
        assert!(!agg.update.pushed);
        let recorded = harness.buildsys.recorded();
        assert!(recorded.contains(&"untag f26-updates-testing bash-4.4.12-5.fc26".to_string()));
        // Unknown tags are left alone.
        assert!(!recorded.contains(&"untag some-other-tag bash-4.4.12-5.fc26".to_string()));
        assert!(recorded.contains(&"tag f26-updates-candidate bash-4.4.12-5.fc26".to_string()));
        let last = agg.comments.last().unwrap();
        assert_eq!(last.comment.text, "This update has been unpushed.");
        assert_eq!(last.author, "maintainer");
    }

    #[tokio::test]
    async fn unpush_refused_outside_testing() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.status = UpdateStatus::Stable;
        let err = agg.unpush(&harness.ctx()).await.unwrap_err();
        assert!(matches!(err, UpdateError::Policy(_)));
    }

    #[tokio::test]
    async fn obsoleting_untags_and_comments() {
        let harness = Harness::new();
        harness.buildsys.set_tags("bash-4.4.12-5.fc26", &["f26-updates-testing"]);
        let mut agg = testing_aggregate();
        agg.obsolete(&harness.ctx(), None, Utc::now()).await.unwrap();
        assert_eq!(agg.update.status, UpdateStatus::Obsolete);
        assert_eq!(agg.update.request, None);
        assert_eq!(agg.comments.last().unwrap().comment.text, "This update has been obsoleted.");
    }

    #[tokio::test]
    async fn resubmitted_unpushed_update_becomes_a_candidate_again() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.status = UpdateStatus::Unpushed;
        agg.update.pushed = false;
        agg.set_request(&harness.ctx(), UpdateRequest::Testing, "maintainer", Utc::now())
            .await
            .unwrap();
        assert_eq!(agg.update.status, UpdateStatus::Pending);
        assert_eq!(agg.update.request, Some(UpdateRequest::Testing));
        assert!(harness
            .buildsys
            .recorded()
            .contains(&"tag f26-updates-candidate bash-4.4.12-5.fc26".to_string()));
    }

    #[tokio::test]
    async fn negative_karma_disables_autopush() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        let caveats =
            agg.comment(&harness.ctx(), params("alice", -1, "crashes"), Utc::now()).await.unwrap();
        assert!(caveats.is_empty());
        assert!(!agg.update.autokarma);
        let text = &agg.comments.last().unwrap().comment.text;
        assert!(text.contains("no longer eligible for automatic pushing"));
    }

    #[tokio::test]
    async fn karma_threshold_batches_ordinary_updates() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        for author in ["a", "b", "c"] {
            agg.comment(&harness.ctx(), params(author, 1, "works"), Utc::now()).await.unwrap();
        }
        assert_eq!(agg.update.request, Some(UpdateRequest::Batched));
        assert_eq!(agg.update.date_pushed, None);
        assert!(harness.publisher.topics().contains(&"update.karma.threshold.reach".to_string()));
    }

    #[tokio::test]
    async fn karma_threshold_pushes_urgent_updates_straight_to_stable() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.severity = UpdateSeverity::Urgent;
        for author in ["a", "b", "c"] {
            agg.comment(&harness.ctx(), params(author, 1, "works"), Utc::now()).await.unwrap();
        }
        assert_eq!(agg.update.request, Some(UpdateRequest::Stable));
    }

    #[tokio::test]
    async fn unstable_karma_obsoletes_testing_update() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.autokarma = false;
        agg.update.unstable_karma = Some(-2);
        agg.comment(&harness.ctx(), params("alice", -1, "broken"), Utc::now()).await.unwrap();
        assert_eq!(agg.update.status, UpdateStatus::Testing);
        agg.comment(&harness.ctx(), params("bob", -1, "also broken"), Utc::now()).await.unwrap();
        assert_eq!(agg.update.status, UpdateStatus::Obsolete);
    }

    #[tokio::test]
    async fn manual_pending_update_survives_unstable_karma() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.status = UpdateStatus::Pending;
        agg.update.autokarma = false;
        agg.update.unstable_karma = Some(-1);
        agg.comment(&harness.ctx(), params("alice", -1, "broken"), Utc::now()).await.unwrap();
        assert_eq!(agg.update.status, UpdateStatus::Pending);
    }

    #[tokio::test]
    async fn pending_autopush_update_is_obsoleted_when_unstable() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.status = UpdateStatus::Pending;
        agg.update.request = Some(UpdateRequest::Testing);
        agg.update.unstable_karma = Some(-1);
        agg.comment(&harness.ctx(), params("alice", -1, "broken"), Utc::now()).await.unwrap();
        assert_eq!(agg.update.status, UpdateStatus::Obsolete);
    }

    #[tokio::test]
    async fn own_update_karma_is_suppressed() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        let caveats = agg
            .comment(&harness.ctx(), params("maintainer", 1, "ship it"), Utc::now())
            .await
            .unwrap();
        assert_eq!(agg.comments.last().unwrap().comment.karma, 0);
        assert!(caveats
            .iter()
            .any(|c| c.description == "You may not give karma to your own updates."));
    }

    #[tokio::test]
    async fn reversed_karma_gets_a_caveat() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.comment(&harness.ctx(), params("alice", 1, "works"), Utc::now()).await.unwrap();
        let caveats = agg
            .comment(&harness.ctx(), params("alice", -1, "broke after reboot"), Utc::now())
            .await
            .unwrap();
        assert!(caveats.iter().any(|c| c.description == "Your karma standing was reversed."));
    }

    #[tokio::test]
    async fn locked_update_swallows_threshold_errors_on_comment() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.locked = true;
        let caveats =
            agg.comment(&harness.ctx(), params("alice", 1, "works"), Utc::now()).await.unwrap();
        assert!(caveats.is_empty());
        assert_eq!(agg.comments.len(), 1);
    }

    #[tokio::test]
    async fn comment_notifies_owner_but_not_author() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.comment(&harness.ctx(), params("alice", 0, "looks fine"), Utc::now()).await.unwrap();
        let sent = harness.mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.starts_with("maintainer@"));
    }

    #[tokio::test]
    async fn completed_testing_push_moves_bugs_to_on_qa() {
        let harness = Harness::new();
        let now = Utc::now();
        let mut agg = testing_aggregate();
        agg.update.status = UpdateStatus::Pending;
        agg.update.request = Some(UpdateRequest::Testing);
        agg.update.pushed = false;
        agg.bugs.push(test_util::bug(12345));
        agg.request_complete(&harness.ctx(), now).await;
        assert_eq!(agg.update.status, UpdateStatus::Testing);
        assert_eq!(agg.update.date_testing, Some(now));
        assert_eq!(agg.update.request, None);
        assert!(agg.update.pushed);
        let last = agg.comments.last().unwrap();
        assert_eq!(last.comment.text, "This update has been pushed to testing.");
        assert_eq!(harness.bugtracker.recorded(), vec!["on_qa 12345".to_string()]);
        assert!(harness.publisher.topics().contains(&"errata.publish".to_string()));
    }

    #[tokio::test]
    async fn completed_stable_push_closes_bugs() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.request = Some(UpdateRequest::Stable);
        agg.bugs.push(test_util::bug(12345));
        agg.request_complete(&harness.ctx(), Utc::now()).await;
        assert_eq!(agg.update.status, UpdateStatus::Stable);
        assert_eq!(
            agg.comments.last().unwrap().comment.text,
            "This update has been pushed to stable."
        );
        assert_eq!(harness.bugtracker.recorded(), vec!["close 12345".to_string()]);
    }

    #[tokio::test]
    async fn completed_stable_push_only_comments_when_bugs_stay_open() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.update.request = Some(UpdateRequest::Stable);
        agg.update.close_bugs = false;
        agg.bugs.push(test_util::bug(12345));
        agg.request_complete(&harness.ctx(), Utc::now()).await;
        assert_eq!(harness.bugtracker.recorded(), vec!["comment 12345".to_string()]);
    }

    #[tokio::test]
    async fn completing_without_a_push_request_stays_quiet() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        agg.request_complete(&harness.ctx(), Utc::now()).await;
        assert_eq!(agg.update.status, UpdateStatus::Testing);
        assert!(agg.comments.is_empty());
        assert!(harness.publisher.topics().is_empty());
    }

    #[tokio::test]
    async fn system_comments_stay_off_the_bus_and_out_of_inboxes() {
        let harness = Harness::new();
        let mut agg = testing_aggregate();
        let params = CommentParams {
            author: "updraft".to_string(),
            text: "maintainer edited this update.".to_string(),
            ..Default::default()
        };
        agg.comment(&harness.ctx(), params, Utc::now()).await.unwrap();
        assert_eq!(agg.comments.len(), 1);
        assert!(harness.publisher.topics().is_empty());
        assert!(harness.mailer.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn requested_tag_follows_the_request() {
        let mut agg = testing_aggregate();
        agg.update.request = Some(UpdateRequest::Stable);
        assert_eq!(agg.requested_tag(), Some("f26-updates"));

        agg.update.request = Some(UpdateRequest::Batched);
        assert_eq!(agg.requested_tag(), Some("f26-updates-testing"));

        agg.update.request = Some(UpdateRequest::Obsolete);
        assert_eq!(agg.requested_tag(), Some("f26-updates-candidate"));

        agg.update.request = None;
        assert_eq!(agg.requested_tag(), None);

        // Stable pushes to a pending release land in the dist tag.
        agg.update.request = Some(UpdateRequest::Stable);
        agg.release.state = ReleaseState::Pending;
        assert_eq!(agg.requested_tag(), Some("f26"));
    }
}
