//! Loading, saving, creating, editing, and commenting on updates.
//!
//! The transition engine works on an in-memory [`UpdateAggregate`]; this
//! module is the glue that hydrates aggregates from the database and writes
//! their mutations back, including any comments appended during a transition.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::obsoletion;
use super::transition::{CommentParams, EngineContext};
use crate::error::{Result, UpdateError};
use crate::events::update as events;
use crate::models::{
    Bug, BugFeedback, Build, BuildView, BuildrootOverride, Caveat, Comment, CommentView,
    ContentType, NewBug, NewBugFeedback, NewBuild, NewComment, NewPackage, NewTestCaseFeedback,
    NewUpdate, Package, Release, TestCase, TestCaseFeedback, TestGatingStatus, Update,
    UpdateAggregate, UpdateRequest, UpdateSeverity, UpdateStatus, UpdateSuggestion, UpdateType,
    User,
};
use crate::schema::{
    bugs, buildroot_overrides, builds, comment_bug_assoc, comment_testcase_assoc, comments,
    groups, packages, releases, testcases, update_bugs, updates, user_groups, user_packages, users,
};
use crate::version;

/// Input for a new update.
#[derive(Debug, Clone)]
pub struct NewUpdateParams {
    pub release: Release,
    pub user: String,
    pub builds: Vec<String>,
    pub bugs: Vec<i32>,
    pub cves: Vec<String>,
    pub notes: String,
    pub update_type: UpdateType,
    pub severity: UpdateSeverity,
    pub suggest: UpdateSuggestion,
    pub autokarma: bool,
    pub stable_karma: Option<i32>,
    pub unstable_karma: Option<i32>,
    pub requirements: Option<String>,
    pub require_bugs: bool,
    pub require_testcases: bool,
    pub close_bugs: bool,
    /// Defaults to a testing request when unset.
    pub request: Option<UpdateRequest>,
}

/// Input for editing an existing update.
#[derive(Debug, Clone)]
pub struct EditUpdateParams {
    pub alias: String,
    pub agent: String,
    pub builds: Vec<String>,
    pub bugs: Vec<i32>,
    pub cves: Vec<String>,
    pub notes: String,
    pub update_type: UpdateType,
    pub severity: UpdateSeverity,
    pub suggest: UpdateSuggestion,
    pub autokarma: bool,
    pub stable_karma: Option<i32>,
    pub unstable_karma: Option<i32>,
    pub requirements: Option<String>,
    pub require_bugs: bool,
    pub require_testcases: bool,
    pub close_bugs: bool,
    pub request: Option<UpdateRequest>,
}

/// Random, collision-resistant update identifier:
/// `<id_prefix>-<year>-<10 hex chars>`.
pub fn generate_alias(id_prefix: &str, now: DateTime<Utc>) -> String {
    let digest = Sha256::digest(Uuid::new_v4().as_bytes());
    let suffix = hex::encode(&digest[..5]);
    format!("{}-{}-{}", id_prefix, now.year(), suffix)
}

pub async fn get_update_id_by_alias(
    conn: &mut AsyncPgConnection,
    alias: &str,
) -> Result<Option<i64>> {
    let id = updates::table
        .filter(updates::alias.eq(alias))
        .select(updates::id)
        .first::<i64>(conn)
        .await
        .optional()?;
    Ok(id)
}

/// Hydrate the full aggregate for one update.
pub async fn load_aggregate(
    conn: &mut AsyncPgConnection,
    update_id: i64,
) -> Result<Option<UpdateAggregate>> {
    let Some(update) = updates::table
        .find(update_id)
        .first::<Update>(conn)
        .await
        .optional()?
    else {
        return Ok(None);
    };

    let release: Release = releases::table.find(update.release_id).first(conn).await?;
    let owner: String =
        users::table.find(update.user_id).select(users::name).first(conn).await?;

    let build_rows: Vec<(Build, Package)> = builds::table
        .inner_join(packages::table)
        .filter(builds::update_id.eq(update_id))
        .load(conn)
        .await?;
    let package_ids: Vec<i64> = build_rows.iter().map(|(_, p)| p.id).collect();
    let builds_view: Vec<BuildView> =
        build_rows.into_iter().map(|(build, package)| BuildView { build, package }).collect();

    let committers: Vec<String> = user_packages::table
        .inner_join(users::table)
        .filter(user_packages::package_id.eq_any(&package_ids))
        .select(users::name)
        .distinct()
        .load(conn)
        .await?;

    let comment_rows: Vec<(Comment, User)> = comments::table
        .inner_join(users::table)
        .filter(comments::update_id.eq(update_id))
        .order((comments::timestamp.asc(), comments::id.asc()))
        .load(conn)
        .await?;
    let comment_ids: Vec<i64> = comment_rows.iter().map(|(c, _)| c.id).collect();
    let user_ids: Vec<i64> = comment_rows.iter().map(|(_, u)| u.id).collect();

    let group_rows: Vec<(i64, String)> = user_groups::table
        .inner_join(groups::table)
        .filter(user_groups::user_id.eq_any(&user_ids))
        .select((user_groups::user_id, groups::name))
        .load(conn)
        .await?;
    let mut groups_by_user: HashMap<i64, Vec<String>> = HashMap::new();
    for (user_id, group) in group_rows {
        groups_by_user.entry(user_id).or_default().push(group);
    }

    let bug_feedback_rows: Vec<(i64, i32, i32)> = comment_bug_assoc::table
        .inner_join(bugs::table)
        .filter(comment_bug_assoc::comment_id.eq_any(&comment_ids))
        .select((comment_bug_assoc::comment_id, bugs::bug_id, comment_bug_assoc::karma))
        .load(conn)
        .await?;
    let mut bug_feedback: HashMap<i64, Vec<BugFeedback>> = HashMap::new();
    for (comment_id, bug_id, karma) in bug_feedback_rows {
        bug_feedback.entry(comment_id).or_default().push(BugFeedback { bug_id, karma });
    }

    let testcase_feedback_rows: Vec<(i64, String, i32)> = comment_testcase_assoc::table
        .inner_join(testcases::table)
        .filter(comment_testcase_assoc::comment_id.eq_any(&comment_ids))
        .select((comment_testcase_assoc::comment_id, testcases::name, comment_testcase_assoc::karma))
        .load(conn)
        .await?;
    let mut testcase_feedback: HashMap<i64, Vec<TestCaseFeedback>> = HashMap::new();
    for (comment_id, testcase, karma) in testcase_feedback_rows {
        testcase_feedback
            .entry(comment_id)
            .or_default()
            .push(TestCaseFeedback { testcase, karma });
    }

    let comments_view: Vec<CommentView> = comment_rows
        .into_iter()
        .map(|(comment, user)| CommentView {
            bug_feedback: bug_feedback.remove(&comment.id).unwrap_or_default(),
            testcase_feedback: testcase_feedback.remove(&comment.id).unwrap_or_default(),
            author_groups: groups_by_user.get(&user.id).cloned().unwrap_or_default(),
            author: user.name,
            comment,
        })
        .collect();

    let bug_list: Vec<Bug> = update_bugs::table
        .inner_join(bugs::table)
        .filter(update_bugs::update_id.eq(update_id))
        .select(Bug::as_select())
        .load(conn)
        .await?;

    Ok(Some(UpdateAggregate {
        update,
        release,
        owner,
        committers,
        builds: builds_view,
        comments: comments_view,
        bugs: bug_list,
    }))
}

/// Persist an aggregate's mutations: the update row, any new comments
/// (`id == 0`) with their feedback, and the bug associations.
pub async fn save_aggregate(
    conn: &mut AsyncPgConnection,
    aggregate: &mut UpdateAggregate,
) -> Result<()> {
    let update = &aggregate.update;
    diesel::update(updates::table.find(update.id))
        .set((
            updates::title.eq(&update.title),
            updates::autokarma.eq(update.autokarma),
            updates::stable_karma.eq(update.stable_karma),
            updates::unstable_karma.eq(update.unstable_karma),
            updates::requirements.eq(&update.requirements),
            updates::require_bugs.eq(update.require_bugs),
            updates::require_testcases.eq(update.require_testcases),
            updates::notes.eq(&update.notes),
            updates::update_type.eq(update.update_type),
            updates::status.eq(update.status),
            updates::request.eq(update.request),
            updates::severity.eq(update.severity),
            updates::suggest.eq(update.suggest),
            updates::locked.eq(update.locked),
            updates::pushed.eq(update.pushed),
            updates::critpath.eq(update.critpath),
            updates::close_bugs.eq(update.close_bugs),
            updates::date_modified.eq(update.date_modified),
            updates::date_approved.eq(update.date_approved),
            updates::date_pushed.eq(update.date_pushed),
            updates::date_testing.eq(update.date_testing),
            updates::date_stable.eq(update.date_stable),
            updates::date_locked.eq(update.date_locked),
            updates::test_gating_status.eq(update.test_gating_status),
            updates::test_gating_summary.eq(&update.test_gating_summary),
        ))
        .execute(conn)
        .await?;

    // .get(0): slice::first would collide with RunQueryDsl::first here.
    let first_package = aggregate.builds.get(0).map(|b| b.package.id);
    for view in aggregate.comments.iter_mut().filter(|c| c.comment.id == 0) {
        let user = get_or_create_user(conn, &view.author).await?;
        let inserted: Comment = diesel::insert_into(comments::table)
            .values(NewComment {
                update_id: aggregate.update.id,
                user_id: user.id,
                karma: view.comment.karma,
                karma_critpath: view.comment.karma_critpath,
                text: view.comment.text.clone(),
                anonymous: view.comment.anonymous,
                timestamp: view.comment.timestamp,
            })
            .get_result(conn)
            .await?;

        for feedback in &view.bug_feedback {
            let bug = get_or_create_bug(conn, feedback.bug_id).await?;
            diesel::insert_into(comment_bug_assoc::table)
                .values(NewBugFeedback {
                    comment_id: inserted.id,
                    bug_id: bug.id,
                    karma: feedback.karma,
                })
                .execute(conn)
                .await?;
        }
        for feedback in &view.testcase_feedback {
            let Some(package_id) = first_package else {
                warn!(testcase = %feedback.testcase, "dropping test case feedback on buildless update");
                continue;
            };
            let testcase = get_or_create_testcase(conn, &feedback.testcase, package_id).await?;
            diesel::insert_into(comment_testcase_assoc::table)
                .values(NewTestCaseFeedback {
                    comment_id: inserted.id,
                    testcase_id: testcase.id,
                    karma: feedback.karma,
                })
                .execute(conn)
                .await?;
        }
        view.comment = inserted;
    }

    for bug in &aggregate.bugs {
        diesel::insert_into(update_bugs::table)
            .values((
                update_bugs::update_id.eq(aggregate.update.id),
                update_bugs::bug_id.eq(bug.id),
            ))
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;
    }

    Ok(())
}

/// Create a new update: build and package rows, critpath detection, default
/// requirements, alias assignment, the initial request, and obsoletion of
/// anything it supersedes.
pub async fn create(
    conn: &mut AsyncPgConnection,
    ctx: &EngineContext<'_>,
    params: NewUpdateParams,
    now: DateTime<Utc>,
) -> Result<(UpdateAggregate, Vec<Caveat>)> {
    let user = get_or_create_user(conn, &params.user).await?;

    let mut build_views = Vec::new();
    for nvr in &params.builds {
        let view = get_or_create_build(conn, nvr, Some(params.release.id)).await?;
        build_views.push(view);
    }

    let critpath = contains_critpath_component(&build_views, &params.release, ctx);

    let requirements = match &params.requirements {
        Some(r) if !r.trim().is_empty() => Some(r.clone()),
        _ => {
            let tokens: HashSet<String> = build_views
                .iter()
                .flat_map(|b| b.package.requirement_tokens())
                .collect();
            if tokens.is_empty() {
                None
            } else {
                let mut sorted: Vec<String> = tokens.into_iter().collect();
                sorted.sort();
                Some(sorted.join(" "))
            }
        }
    };

    let mut nvrs: Vec<&str> = params.builds.iter().map(String::as_str).collect();
    nvrs.sort_unstable();
    let title = nvrs.join(" ");
    let alias = generate_alias(&params.release.id_prefix, now);
    debug!(%alias, %title, "assigning alias for new update");

    let test_gating_status =
        if ctx.config.test_gating_required { Some(TestGatingStatus::Waiting) } else { None };

    let inserted: Update = diesel::insert_into(updates::table)
        .values(NewUpdate {
            title,
            alias,
            autokarma: params.autokarma,
            stable_karma: params.stable_karma,
            unstable_karma: params.unstable_karma,
            requirements,
            require_bugs: params.require_bugs,
            require_testcases: params.require_testcases,
            notes: params.notes.clone(),
            update_type: params.update_type,
            status: UpdateStatus::Pending,
            request: None,
            severity: params.severity,
            suggest: params.suggest,
            locked: false,
            pushed: false,
            critpath,
            close_bugs: params.close_bugs,
            date_submitted: now,
            release_id: params.release.id,
            user_id: user.id,
            test_gating_status,
        })
        .get_result(conn)
        .await?;

    diesel::update(builds::table.filter(builds::id.eq_any(build_views.iter().map(|b| b.build.id).collect::<Vec<_>>())))
        .set(builds::update_id.eq(inserted.id))
        .execute(conn)
        .await?;
    for view in &mut build_views {
        view.build.update_id = Some(inserted.id);
    }

    let mut aggregate = UpdateAggregate {
        update: inserted,
        release: params.release,
        owner: user.name,
        committers: Vec::new(),
        builds: build_views,
        comments: Vec::new(),
        bugs: Vec::new(),
    };

    let mut caveats = Vec::new();
    update_bug_list(conn, &mut aggregate, &params.bugs).await?;
    update_cve_list(conn, aggregate.update.id, &params.cves).await?;

    let request = params.request.unwrap_or(UpdateRequest::Testing);
    let owner = aggregate.owner.clone();
    aggregate.set_request(ctx, request, &owner, now).await?;

    caveats.extend(obsoletion::obsolete_older_updates(conn, ctx, &mut aggregate, now).await?);

    save_aggregate(conn, &mut aggregate).await?;
    crate::bugs::notify_modified(ctx.bugtracker, &aggregate).await;
    info!(alias = %aggregate.update.alias, "created update");
    Ok((aggregate, caveats))
}

/// Edit an existing update. Build changes on a locked update are refused;
/// any build change resets karma and sends the update back through testing.
pub async fn edit(
    conn: &mut AsyncPgConnection,
    ctx: &EngineContext<'_>,
    params: EditUpdateParams,
    now: DateTime<Utc>,
) -> Result<(UpdateAggregate, Vec<Caveat>)> {
    let Some(update_id) = get_update_id_by_alias(conn, &params.alias).await? else {
        return Err(UpdateError::Validation(format!("no such update: {}", params.alias)));
    };
    let Some(mut aggregate) = load_aggregate(conn, update_id).await? else {
        return Err(UpdateError::Validation(format!("no such update: {}", params.alias)));
    };
    let mut caveats = Vec::new();

    let current: HashSet<String> =
        aggregate.builds.iter().map(|b| b.build.nvr.clone()).collect();
    let wanted: HashSet<String> = params.builds.iter().cloned().collect();
    let new_builds: Vec<String> = params.builds.iter().filter(|b| !current.contains(*b)).cloned().collect();
    let removed_builds: Vec<String> =
        current.iter().filter(|b| !wanted.contains(*b)).cloned().collect();

    if (!new_builds.is_empty() || !removed_builds.is_empty()) && aggregate.update.locked {
        return Err(UpdateError::Locked);
    }

    for nvr in &new_builds {
        let view = get_or_create_build(conn, nvr, Some(aggregate.release.id)).await?;
        diesel::update(builds::table.find(view.build.id))
            .set(builds::update_id.eq(aggregate.update.id))
            .execute(conn)
            .await?;
        aggregate.builds.push(view);
    }

    for nvr in &removed_builds {
        let Some(position) = aggregate.builds.iter().position(|b| &b.build.nvr == nvr) else {
            continue;
        };
        let view = aggregate.builds.remove(position);
        unpush_build(ctx, &view, &aggregate.release).await?;

        let override_row: Option<BuildrootOverride> = buildroot_overrides::table
            .filter(buildroot_overrides::build_id.eq(view.build.id))
            .first(conn)
            .await
            .optional()?;
        match override_row {
            Some(overridden) if overridden.expired_date.is_none() => {
                super::override_service::expire(conn, ctx, overridden.id).await?;
                diesel::update(builds::table.find(view.build.id))
                    .set(builds::update_id.eq(None::<i64>))
                    .execute(conn)
                    .await?;
            }
            Some(_) => {
                diesel::update(builds::table.find(view.build.id))
                    .set(builds::update_id.eq(None::<i64>))
                    .execute(conn)
                    .await?;
            }
            None => {
                diesel::delete(builds::table.find(view.build.id)).execute(conn).await?;
            }
        }
    }

    aggregate.update.critpath = contains_critpath_component(&aggregate.builds, &aggregate.release, ctx);

    let builds_changed = !new_builds.is_empty() || !removed_builds.is_empty();
    let mut comment = format!("{} edited this update.", params.agent);
    if !new_builds.is_empty() {
        comment.push_str("\n\nNew build(s):\n");
        for nvr in &new_builds {
            comment.push_str(&format!("\n- {nvr}"));
        }
    }
    if !removed_builds.is_empty() {
        comment.push_str("\n\nRemoved build(s):\n");
        for nvr in &removed_builds {
            comment.push_str(&format!("\n- {nvr}"));
        }
    }
    if builds_changed {
        comment.push_str("\n\nKarma has been reset.");
    }
    let system_user = ctx.config.system_user.clone();
    aggregate
        .comment(
            ctx,
            CommentParams { author: system_user, text: comment.clone(), ..Default::default() },
            now,
        )
        .await?;
    caveats.push(Caveat::new("builds", comment));

    aggregate.update.title = aggregate.title();

    let mut request = params.request;
    if builds_changed {
        request = Some(UpdateRequest::Testing);

        if aggregate.update.status != UpdateStatus::Pending {
            aggregate.unpush(ctx).await?;
            caveats.push(Caveat::new(
                "status",
                "Builds changed. Your update is being sent back to testing.",
            ));
        }

        let pending_signing = aggregate.release.pending_signing_tag.clone();
        for nvr in &new_builds {
            if pending_signing.is_empty() {
                warn!(release = %aggregate.release.name, "release has no pending signing tag");
            } else {
                ctx.buildsys.tag_build(&pending_signing, nvr, false).await?;
            }
        }
    }

    update_bug_list(conn, &mut aggregate, &params.bugs).await?;
    update_cve_list(conn, aggregate.update.id, &params.cves).await?;

    if let Some(request) = request {
        aggregate.set_request(ctx, request, &params.agent, now).await?;
    }

    aggregate.update.notes = params.notes;
    aggregate.update.update_type = params.update_type;
    aggregate.update.severity = params.severity;
    aggregate.update.suggest = params.suggest;
    aggregate.update.autokarma = params.autokarma;
    aggregate.update.stable_karma = params.stable_karma;
    aggregate.update.unstable_karma = params.unstable_karma;
    aggregate.update.requirements = params.requirements;
    aggregate.update.require_bugs = params.require_bugs;
    aggregate.update.require_testcases = params.require_testcases;
    aggregate.update.close_bugs = params.close_bugs;
    aggregate.update.date_modified = Some(now);

    save_aggregate(conn, &mut aggregate).await?;

    let event = events::UpdateEdited {
        update: events::UpdateSummary::from_aggregate(&aggregate),
        agent: params.agent.clone(),
        new_builds,
        removed_builds,
    };
    if let Err(e) = ctx
        .publisher
        .publish("update.edit", serde_json::to_value(&event).unwrap_or(serde_json::Value::Null))
        .await
    {
        warn!(error = %e, "failed to publish edit event");
    }

    info!(alias = %aggregate.update.alias, agent = %params.agent, "edited update");
    Ok((aggregate, caveats))
}

/// Add a user comment to an update by alias, running the full karma flow.
pub async fn comment(
    conn: &mut AsyncPgConnection,
    ctx: &EngineContext<'_>,
    alias: &str,
    params: CommentParams,
    now: DateTime<Utc>,
) -> Result<(UpdateAggregate, Vec<Caveat>)> {
    let Some(update_id) = get_update_id_by_alias(conn, alias).await? else {
        return Err(UpdateError::Validation(format!("no such update: {alias}")));
    };
    let Some(mut aggregate) = load_aggregate(conn, update_id).await? else {
        return Err(UpdateError::Validation(format!("no such update: {alias}")));
    };
    let caveats = aggregate.comment(ctx, params, now).await?;
    save_aggregate(conn, &mut aggregate).await?;
    Ok((aggregate, caveats))
}

/// Sync the update's bug set to `bug_ids`: new bugs are created and
/// associated, missing ones are detached and destroyed if nothing else
/// references them. A security bug upgrades the update's type.
pub async fn update_bug_list(
    conn: &mut AsyncPgConnection,
    aggregate: &mut UpdateAggregate,
    bug_ids: &[i32],
) -> Result<Vec<i32>> {
    let to_remove: Vec<Bug> = aggregate
        .bugs
        .iter()
        .filter(|b| !bug_ids.contains(&b.bug_id))
        .cloned()
        .collect();
    for bug in to_remove {
        aggregate.bugs.retain(|b| b.id != bug.id);
        diesel::delete(
            update_bugs::table
                .filter(update_bugs::update_id.eq(aggregate.update.id))
                .filter(update_bugs::bug_id.eq(bug.id)),
        )
        .execute(conn)
        .await?;

        let still_referenced: i64 = update_bugs::table
            .filter(update_bugs::bug_id.eq(bug.id))
            .count()
            .get_result(conn)
            .await?;
        let has_feedback: i64 = comment_bug_assoc::table
            .filter(comment_bug_assoc::bug_id.eq(bug.id))
            .count()
            .get_result(conn)
            .await?;
        if still_referenced == 0 && has_feedback == 0 {
            debug!(bug_id = bug.bug_id, "destroying stray bug");
            diesel::delete(bugs::table.find(bug.id)).execute(conn).await?;
        }
    }

    let mut new = Vec::new();
    for bug_id in bug_ids {
        let bug = get_or_create_bug(conn, *bug_id).await?;
        if !aggregate.bugs.iter().any(|b| b.id == bug.id) {
            diesel::insert_into(update_bugs::table)
                .values((
                    update_bugs::update_id.eq(aggregate.update.id),
                    update_bugs::bug_id.eq(bug.id),
                ))
                .on_conflict_do_nothing()
                .execute(conn)
                .await?;
            new.push(bug.bug_id);
            if bug.security && aggregate.update.update_type != UpdateType::Security {
                aggregate.update.update_type = UpdateType::Security;
            }
            aggregate.bugs.push(bug);
        }
    }
    Ok(new)
}

/// Sync the update's CVE set: associate each id once, and destroy CVEs no
/// update references anymore.
pub async fn update_cve_list(
    conn: &mut AsyncPgConnection,
    update_id: i64,
    cve_ids: &[String],
) -> Result<()> {
    use crate::schema::{cves, update_cves};

    let current: Vec<(i64, String)> = update_cves::table
        .inner_join(cves::table)
        .filter(update_cves::update_id.eq(update_id))
        .select((cves::id, cves::cve_id))
        .load(conn)
        .await?;

    for (id, cve_id) in &current {
        if cve_ids.contains(cve_id) {
            continue;
        }
        diesel::delete(
            update_cves::table
                .filter(update_cves::update_id.eq(update_id))
                .filter(update_cves::cve_id.eq(id)),
        )
        .execute(conn)
        .await?;
        let still_referenced: i64 = update_cves::table
            .filter(update_cves::cve_id.eq(id))
            .count()
            .get_result(conn)
            .await?;
        if still_referenced == 0 {
            debug!(cve = %cve_id, "destroying stray CVE");
            diesel::delete(cves::table.find(id)).execute(conn).await?;
        }
    }

    for cve_id in cve_ids {
        let existing: Option<i64> = cves::table
            .filter(cves::cve_id.eq(cve_id))
            .select(cves::id)
            .first(conn)
            .await
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                debug!(cve = %cve_id, "creating new CVE");
                diesel::insert_into(cves::table)
                    .values(cves::cve_id.eq(cve_id))
                    .returning(cves::id)
                    .get_result(conn)
                    .await?
            }
        };
        diesel::insert_into(update_cves::table)
            .values((update_cves::update_id.eq(update_id), update_cves::cve_id.eq(id)))
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;
    }
    Ok(())
}

/// Move a removed build back to the candidate tag, dropping pending tags.
pub async fn unpush_build(
    ctx: &EngineContext<'_>,
    view: &BuildView,
    release: &Release,
) -> Result<()> {
    info!(nvr = %view.build.nvr, "unpushing build");
    for tag in ctx.buildsys.list_tags(&view.build.nvr).await? {
        if tag == release.pending_signing_tag
            || tag == release.pending_testing_tag
            || tag == release.pending_stable_tag
        {
            ctx.buildsys.untag_build(&tag, &view.build.nvr, false, false).await?;
        } else if tag == release.testing_tag {
            ctx.buildsys.move_build(&tag, &release.candidate_tag, &view.build.nvr).await?;
        }
    }
    Ok(())
}

fn contains_critpath_component(
    builds: &[BuildView],
    release: &Release,
    ctx: &EngineContext<'_>,
) -> bool {
    let Some(critpath) = ctx.config.critpath_packages.get(&release.branch.to_lowercase()) else {
        return false;
    };
    builds.iter().any(|b| critpath.contains(&b.package.name))
}

async fn get_or_create_user(conn: &mut AsyncPgConnection, name: &str) -> Result<User> {
    let existing: Option<User> = users::table
        .filter(users::name.eq(name))
        .first(conn)
        .await
        .optional()?;
    match existing {
        Some(user) => Ok(user),
        None => Ok(diesel::insert_into(users::table)
            .values(users::name.eq(name))
            .get_result(conn)
            .await?),
    }
}

async fn get_or_create_bug(conn: &mut AsyncPgConnection, bug_id: i32) -> Result<Bug> {
    let existing: Option<Bug> = bugs::table
        .filter(bugs::bug_id.eq(bug_id))
        .first(conn)
        .await
        .optional()?;
    match existing {
        Some(bug) => Ok(bug),
        None => Ok(diesel::insert_into(bugs::table)
            .values(NewBug { bug_id, title: None, security: false, parent: false, url: None })
            .get_result(conn)
            .await?),
    }
}

async fn get_or_create_testcase(
    conn: &mut AsyncPgConnection,
    name: &str,
    package_id: i64,
) -> Result<TestCase> {
    let existing: Option<TestCase> = testcases::table
        .filter(testcases::name.eq(name))
        .first(conn)
        .await
        .optional()?;
    match existing {
        Some(testcase) => Ok(testcase),
        None => Ok(diesel::insert_into(testcases::table)
            .values((testcases::name.eq(name), testcases::package_id.eq(package_id)))
            .get_result(conn)
            .await?),
    }
}

async fn get_or_create_build(
    conn: &mut AsyncPgConnection,
    nvr: &str,
    release_id: Option<i64>,
) -> Result<BuildView> {
    let (package_name, _, _) = version::parse_nvr(nvr)?;

    let package: Package = {
        let existing: Option<Package> = packages::table
            .filter(packages::name.eq(&package_name))
            .first(conn)
            .await
            .optional()?;
        match existing {
            Some(package) => package,
            None => {
                diesel::insert_into(packages::table)
                    .values(NewPackage {
                        name: package_name.clone(),
                        requirements: None,
                        content_type: ContentType::Rpm,
                        stack_id: None,
                    })
                    .get_result(conn)
                    .await?
            }
        }
    };

    let build: Build = {
        let existing: Option<Build> = builds::table
            .filter(builds::nvr.eq(nvr))
            .first(conn)
            .await
            .optional()?;
        match existing {
            Some(build) => build,
            None => {
                diesel::insert_into(builds::table)
                    .values(NewBuild {
                        nvr: nvr.to_string(),
                        package_id: package.id,
                        release_id,
                        update_id: None,
                        signed: false,
                        content_type: package.content_type,
                        epoch: 0,
                        ci_url: None,
                    })
                    .get_result(conn)
                    .await?
            }
        }
    };

    Ok(BuildView { build, package })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_format() {
        let now = Utc::now();
        let alias = generate_alias("FEDORA", now);
        let parts: Vec<&str> = alias.splitn(3, '-').collect();
        assert_eq!(parts[0], "FEDORA");
        assert_eq!(parts[1], now.year().to_string());
        assert_eq!(parts[2].len(), 10);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));

        // Collision resistance in miniature.
        assert_ne!(generate_alias("FEDORA", now), generate_alias("FEDORA", now));
    }

    #[test]
    fn epel_alias_keeps_prefix_dashes() {
        let alias = generate_alias("FEDORA-EPEL", Utc::now());
        assert!(alias.starts_with("FEDORA-EPEL-"));
    }
}
