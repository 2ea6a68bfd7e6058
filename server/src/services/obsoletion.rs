//! Obsoleting superseded updates when a newer one shows up.
//!
//! A newer update obsoletes an older pending/testing one when the matched
//! build is strictly older and every package in the old update is also
//! carried by the new one. Partial overlaps only produce a warning.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::{debug, info};

use super::transition::EngineContext;
use super::update_service;
use crate::error::Result;
use crate::models::{Caveat, UpdateAggregate, UpdateRequest, UpdateStatus};
use crate::schema::{builds, updates};
use crate::version;

/// Whether `old` is superseded by `new`: some old build has a strictly newer
/// counterpart in `new`, and no old package is missing from `new`. One
/// strictly older matched build is enough, even if another build in the old
/// update is newer.
pub fn is_superseded(new: &UpdateAggregate, old: &UpdateAggregate) -> bool {
    let new_packages = new.package_names();
    if !old.package_names().is_subset(&new_packages) {
        return false;
    }
    old.builds.iter().any(|old_build| {
        new.builds.iter().any(|new_build| {
            new_build.package.name == old_build.package.name
                && version::nvr_older(
                    &old_build.build.nvr,
                    &new_build.build.nvr,
                    old_build.build.epoch,
                    new_build.build.epoch,
                )
        })
    })
}

/// Warning for stepping on someone else's in-flight update without fully
/// superseding it.
pub fn ownership_caveat(new: &UpdateAggregate, old: &UpdateAggregate) -> Option<Caveat> {
    if old.builds.len() != new.builds.len() && old.owner != new.owner {
        let nvrs = old.title();
        return Some(Caveat::new(
            "update",
            format!(
                "Please be aware that there is another update in flight owned by {}, containing \
                 {}. Are you coordinating with them?",
                old.owner, nvrs
            ),
        ));
    }
    None
}

/// Find and obsolete older pending/testing updates superseded by this one.
///
/// The newer update inherits the bugs and notes of everything it obsoletes;
/// the mutations to `aggregate` are in memory and the caller persists them.
pub async fn obsolete_older_updates(
    conn: &mut AsyncPgConnection,
    ctx: &EngineContext<'_>,
    aggregate: &mut UpdateAggregate,
    now: DateTime<Utc>,
) -> Result<Vec<Caveat>> {
    let mut caveats = Vec::new();

    let package_ids: Vec<i64> = aggregate.builds.iter().map(|b| b.package.id).collect();
    let own_nvrs: Vec<String> = aggregate.builds.iter().map(|b| b.build.nvr.clone()).collect();

    let candidate_ids: Vec<i64> = builds::table
        .inner_join(updates::table)
        .filter(builds::package_id.eq_any(&package_ids))
        .filter(builds::nvr.ne_all(&own_nvrs))
        .filter(updates::id.ne(aggregate.update.id))
        .filter(updates::locked.eq(false))
        .filter(updates::release_id.eq(aggregate.release.id))
        .filter(
            updates::request
                .eq(UpdateRequest::Testing.as_str())
                .or(updates::request.is_null()),
        )
        .filter(
            updates::status
                .eq(UpdateStatus::Testing.as_str())
                .or(updates::status.eq(UpdateStatus::Pending.as_str())),
        )
        .select(updates::id)
        .distinct()
        .load(conn)
        .await?;

    for old_id in candidate_ids {
        let Some(mut old) = update_service::load_aggregate(conn, old_id).await? else {
            continue;
        };

        if let Some(caveat) = ownership_caveat(aggregate, &old) {
            caveats.push(caveat);
        }

        if !is_superseded(aggregate, &old) {
            debug!(old = %old.update.alias, new = %aggregate.update.alias, "not obsoletable");
            continue;
        }
        info!(old = %old.update.alias, new = %aggregate.update.alias, "obsoleting superseded update");

        // Inherit the old update's bugs and notes.
        for bug in &old.bugs {
            if !aggregate.bugs.iter().any(|b| b.bug_id == bug.bug_id) {
                aggregate.bugs.push(bug.clone());
            }
        }
        aggregate.update.notes =
            format!("{}\n\n----\n\n{}", aggregate.update.notes, old.update.notes);

        let newer_nvr = aggregate.title();
        let newer_url =
            format!("{}updates/{}", ctx.config.base_address, aggregate.update.alias);
        old.obsolete(ctx, Some((&newer_nvr, &newer_url)), now).await?;
        update_service::save_aggregate(conn, &mut old).await?;

        let old_link = format!("[{}]({}updates/{})", old.title(), ctx.config.base_address, old.update.alias);
        aggregate.append_system_comment(
            ctx.config,
            &format!("This update has obsoleted {old_link}, and has inherited its bugs and notes."),
            now,
        );
        caveats.push(Caveat::new(
            "update",
            format!(
                "This update has obsoleted {}, and has inherited its bugs and notes.",
                old.title()
            ),
        ));
    }

    Ok(caveats)
}
