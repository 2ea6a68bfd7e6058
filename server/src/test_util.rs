//! Shared fixtures and recording doubles for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::bugs::BugTracker;
use crate::buildsys::BuildSystem;
use crate::config::PolicyConfig;
use crate::events::Publisher;
use crate::mail::Mailer;
use crate::models::{
    Bug, Build, BuildView, Comment, CommentView, ContentType, Package, Release, ReleaseState,
    Update, UpdateAggregate, UpdateSeverity, UpdateStatus, UpdateSuggestion, UpdateType,
};
use crate::services::release_service::TagCache;
use crate::services::transition::EngineContext;
use crate::version;

pub fn release() -> Release {
    Release {
        id: 1,
        name: "F26".to_string(),
        long_name: "Fedora 26".to_string(),
        version: "26".to_string(),
        id_prefix: "FEDORA".to_string(),
        branch: "f26".to_string(),
        dist_tag: "f26".to_string(),
        stable_tag: "f26-updates".to_string(),
        testing_tag: "f26-updates-testing".to_string(),
        candidate_tag: "f26-updates-candidate".to_string(),
        pending_signing_tag: "f26-signing-pending".to_string(),
        pending_testing_tag: "f26-updates-testing-pending".to_string(),
        pending_stable_tag: "f26-updates-pending".to_string(),
        override_tag: "f26-override".to_string(),
        state: ReleaseState::Current,
    }
}

pub fn bug(bug_id: i32) -> Bug {
    Bug { id: bug_id as i64, bug_id, title: None, security: false, parent: false, url: None }
}

pub fn build_view(id: i64, nvr: &str) -> BuildView {
    let package_name = version::package_from_nvr(nvr);
    BuildView {
        build: Build {
            id,
            nvr: nvr.to_string(),
            package_id: id,
            release_id: Some(1),
            update_id: Some(1),
            signed: true,
            content_type: ContentType::Rpm,
            epoch: 0,
            ci_url: None,
        },
        package: Package {
            id,
            name: package_name,
            requirements: None,
            content_type: ContentType::Rpm,
            stack_id: None,
        },
    }
}

/// A testing-status aggregate owned by `maintainer`, with autokarma on and
/// the usual +3/-3 thresholds.
pub fn aggregate_with_builds(nvrs: &[&str]) -> UpdateAggregate {
    let now = Utc::now();
    let builds: Vec<BuildView> =
        nvrs.iter().enumerate().map(|(i, nvr)| build_view(i as i64 + 1, nvr)).collect();
    let mut sorted: Vec<&str> = nvrs.to_vec();
    sorted.sort_unstable();
    UpdateAggregate {
        update: Update {
            id: 1,
            title: sorted.join(" "),
            alias: "FEDORA-2017-abcdef1234".to_string(),
            autokarma: true,
            stable_karma: Some(3),
            unstable_karma: Some(-3),
            requirements: None,
            require_bugs: false,
            require_testcases: false,
            notes: "Fixes things.".to_string(),
            update_type: UpdateType::Bugfix,
            status: UpdateStatus::Testing,
            request: None,
            severity: UpdateSeverity::Unspecified,
            suggest: UpdateSuggestion::Unspecified,
            locked: false,
            pushed: true,
            critpath: false,
            close_bugs: true,
            date_submitted: now,
            date_modified: None,
            date_approved: None,
            date_pushed: Some(now),
            date_testing: Some(now),
            date_stable: None,
            date_locked: None,
            release_id: 1,
            user_id: 1,
            test_gating_status: None,
            test_gating_summary: None,
        },
        release: release(),
        owner: "maintainer".to_string(),
        committers: vec!["maintainer".to_string()],
        builds,
        comments: Vec::new(),
        bugs: Vec::new(),
    }
}

pub struct CommentBuilder {
    view: CommentView,
}

impl CommentBuilder {
    pub fn new(author: &str, karma: i32, text: &str) -> Self {
        CommentBuilder {
            view: CommentView {
                comment: Comment {
                    id: 0,
                    update_id: 1,
                    user_id: 0,
                    karma,
                    karma_critpath: 0,
                    text: text.to_string(),
                    anonymous: false,
                    timestamp: Utc::now(),
                },
                author: author.to_string(),
                author_groups: Vec::new(),
                bug_feedback: Vec::new(),
                testcase_feedback: Vec::new(),
            },
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.view.comment.anonymous = true;
        self
    }

    pub fn groups(mut self, groups: &[&str]) -> Self {
        self.view.author_groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn bug_feedback(mut self, bug_id: i32, karma: i32) -> Self {
        self.view.bug_feedback.push(crate::models::BugFeedback { bug_id, karma });
        self
    }

    pub fn testcase_feedback(mut self, testcase: &str, karma: i32) -> Self {
        self.view
            .testcase_feedback
            .push(crate::models::TestCaseFeedback { testcase: testcase.to_string(), karma });
        self
    }

    pub fn build(self) -> CommentView {
        self.view
    }
}

pub fn comment(author: &str, karma: i32, text: &str) -> CommentView {
    CommentBuilder::new(author, karma, text).build()
}

/// Comment authored by the default system user.
pub fn system_comment(text: &str) -> CommentView {
    CommentBuilder::new("updraft", 0, text).build()
}

/// Build system double that records every call and serves canned tag lists.
#[derive(Default)]
pub struct RecordingBuildSystem {
    pub calls: Mutex<Vec<String>>,
    pub tags: Mutex<HashMap<String, Vec<String>>>,
}

impl RecordingBuildSystem {
    pub fn set_tags(&self, nvr: &str, tags: &[&str]) {
        self.tags
            .lock()
            .unwrap()
            .insert(nvr.to_string(), tags.iter().map(|t| t.to_string()).collect());
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildSystem for RecordingBuildSystem {
    async fn list_tags(&self, nvr: &str) -> anyhow::Result<Vec<String>> {
        self.calls.lock().unwrap().push(format!("list_tags {nvr}"));
        Ok(self.tags.lock().unwrap().get(nvr).cloned().unwrap_or_default())
    }

    async fn tag_build(&self, tag: &str, nvr: &str, _force: bool) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("tag {tag} {nvr}"));
        self.tags.lock().unwrap().entry(nvr.to_string()).or_default().push(tag.to_string());
        Ok(())
    }

    async fn untag_build(
        &self,
        tag: &str,
        nvr: &str,
        _force: bool,
        _strict: bool,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("untag {tag} {nvr}"));
        if let Some(tags) = self.tags.lock().unwrap().get_mut(nvr) {
            tags.retain(|t| t != tag);
        }
        Ok(())
    }

    async fn move_build(&self, from_tag: &str, to_tag: &str, nvr: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("move {from_tag} {to_tag} {nvr}"));
        let mut tags = self.tags.lock().unwrap();
        let entry = tags.entry(nvr.to_string()).or_default();
        entry.retain(|t| t != from_tag);
        entry.push(to_tag.to_string());
        Ok(())
    }
}

/// Bug tracker double that records every call.
#[derive(Default)]
pub struct RecordingBugTracker {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingBugTracker {
    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BugTracker for RecordingBugTracker {
    async fn update_details(&self, bug_id: i32) -> anyhow::Result<Bug> {
        self.calls.lock().unwrap().push(format!("update_details {bug_id}"));
        Ok(bug(bug_id))
    }

    async fn comment(&self, bug_id: i32, _text: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("comment {bug_id}"));
        Ok(())
    }

    async fn on_qa(&self, bug_id: i32, _text: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("on_qa {bug_id}"));
        Ok(())
    }

    async fn close(
        &self,
        bug_id: i32,
        _fixed_in: &HashMap<String, String>,
        _text: &str,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("close {bug_id}"));
        Ok(())
    }

    async fn modified(&self, bug_id: i32) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("modified {bug_id}"));
        Ok(())
    }
}

/// Publisher double that records topics and payloads.
#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingPublisher {
    pub fn topics(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        self.events.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }
}

/// Mailer double that records outgoing messages.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, _from: &str, to: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Owns everything an [`EngineContext`] borrows.
pub struct Harness {
    pub config: PolicyConfig,
    pub buildsys: RecordingBuildSystem,
    pub bugtracker: RecordingBugTracker,
    pub publisher: RecordingPublisher,
    pub mailer: RecordingMailer,
    pub tags: TagCache,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            config: PolicyConfig::default(),
            buildsys: RecordingBuildSystem::default(),
            bugtracker: RecordingBugTracker::default(),
            publisher: RecordingPublisher::default(),
            mailer: RecordingMailer::default(),
            tags: TagCache::from_releases(&[release()]),
        }
    }

    pub fn ctx(&self) -> EngineContext<'_> {
        EngineContext {
            config: &self.config,
            buildsys: &self.buildsys,
            bugtracker: &self.bugtracker,
            publisher: &self.publisher,
            mailer: &self.mailer,
            tags: &self.tags,
        }
    }
}
