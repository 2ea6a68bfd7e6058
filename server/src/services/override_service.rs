//! Buildroot override lifecycle: create, edit, enable, expire.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::{error, info, warn};

use super::transition::EngineContext;
use crate::error::{Result, UpdateError};
use crate::events::update::OverrideChanged;
use crate::metrics;
use crate::models::{Build, BuildrootOverride, NewBuildrootOverride, Release};
use crate::schema::{buildroot_overrides, builds, releases, users};

#[derive(Debug, Clone)]
pub struct OverrideParams {
    pub nvr: String,
    pub submitter: String,
    pub notes: String,
    pub expiration_date: DateTime<Utc>,
}

async fn load_build_and_release(
    conn: &mut AsyncPgConnection,
    build_id: i64,
) -> Result<(Build, Release)> {
    let build: Build = builds::table.find(build_id).first(conn).await?;
    let Some(release_id) = build.release_id else {
        return Err(UpdateError::Validation(format!(
            "build {} has no release, can't manage its override",
            build.nvr
        )));
    };
    let release: Release = releases::table.find(release_id).first(conn).await?;
    Ok((build, release))
}

async fn publish_override_event(
    ctx: &EngineContext<'_>,
    topic: &str,
    overridden: &BuildrootOverride,
    nvr: &str,
    submitter: &str,
) {
    let payload = OverrideChanged {
        nvr: nvr.to_string(),
        submitter: submitter.to_string(),
        expiration_date: overridden.expiration_date.to_rfc3339(),
        expired: overridden.expired_date.is_some(),
    };
    let value = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
    if let Err(e) = ctx.publisher.publish(topic, value).await {
        warn!(error = %e, topic, "failed to publish override event");
    }
}

/// Create an override for a build, expiring any existing override for an
/// older build of the same package in the same release.
pub async fn create(
    conn: &mut AsyncPgConnection,
    ctx: &EngineContext<'_>,
    params: OverrideParams,
    now: DateTime<Utc>,
) -> Result<BuildrootOverride> {
    let build: Option<Build> = builds::table
        .filter(builds::nvr.eq(&params.nvr))
        .first(conn)
        .await
        .optional()?;
    let Some(build) = build else {
        return Err(UpdateError::Validation(format!("no such build: {}", params.nvr)));
    };

    let existing: Option<BuildrootOverride> = buildroot_overrides::table
        .filter(buildroot_overrides::build_id.eq(build.id))
        .first(conn)
        .await
        .optional()?;
    if existing.is_some() {
        return Err(UpdateError::Validation(format!(
            "{} is already in an override",
            params.nvr
        )));
    }

    // At most one active override per package per release.
    let sibling_ids: Vec<i64> = builds::table
        .filter(builds::package_id.eq(build.package_id))
        .filter(builds::release_id.eq(build.release_id))
        .filter(builds::id.ne(build.id))
        .select(builds::id)
        .load(conn)
        .await?;
    let old_override: Option<BuildrootOverride> = buildroot_overrides::table
        .filter(buildroot_overrides::build_id.eq_any(&sibling_ids))
        .filter(buildroot_overrides::expired_date.is_null())
        .first(conn)
        .await
        .optional()?;
    if let Some(old) = old_override {
        info!(nvr = %params.nvr, "expiring older override for the same package");
        expire(conn, ctx, old.id).await?;
    }

    let submitter = get_or_create_user_id(conn, &params.submitter).await?;
    let overridden: BuildrootOverride = diesel::insert_into(buildroot_overrides::table)
        .values(NewBuildrootOverride {
            build_id: build.id,
            submitter_id: submitter,
            notes: params.notes.clone(),
            submission_date: now,
            expiration_date: params.expiration_date,
        })
        .get_result(conn)
        .await?;

    enable(conn, ctx, overridden.id).await?;
    info!(nvr = %params.nvr, "created buildroot override");
    buildroot_overrides::table
        .find(overridden.id)
        .first(conn)
        .await
        .map_err(Into::into)
}

/// Edit an override's notes and expiration; re-enable an expired one whose
/// new expiration lies in the future, or expire it on request.
pub async fn edit(
    conn: &mut AsyncPgConnection,
    ctx: &EngineContext<'_>,
    nvr: &str,
    notes: &str,
    expiration_date: DateTime<Utc>,
    expire_now: bool,
    now: DateTime<Utc>,
) -> Result<BuildrootOverride> {
    let row: Option<(BuildrootOverride, Build)> = buildroot_overrides::table
        .inner_join(builds::table)
        .filter(builds::nvr.eq(nvr))
        .first(conn)
        .await
        .optional()?;
    let Some((overridden, _)) = row else {
        return Err(UpdateError::Validation(format!("no buildroot override for {nvr}")));
    };

    diesel::update(buildroot_overrides::table.find(overridden.id))
        .set((
            buildroot_overrides::notes.eq(notes),
            buildroot_overrides::expiration_date.eq(expiration_date),
        ))
        .execute(conn)
        .await?;

    if overridden.expired_date.is_some() && expiration_date > now {
        enable(conn, ctx, overridden.id).await?;
    } else if expire_now {
        expire(conn, ctx, overridden.id).await?;
    }

    buildroot_overrides::table
        .find(overridden.id)
        .first(conn)
        .await
        .map_err(Into::into)
}

/// Tag the build into the release's override tag and clear the expiry.
pub async fn enable(
    conn: &mut AsyncPgConnection,
    ctx: &EngineContext<'_>,
    override_id: i64,
) -> Result<()> {
    let overridden: BuildrootOverride =
        buildroot_overrides::table.find(override_id).first(conn).await?;
    let (build, release) = load_build_and_release(conn, overridden.build_id).await?;

    ctx.buildsys.tag_build(&release.override_tag, &build.nvr, false).await?;

    diesel::update(buildroot_overrides::table.find(override_id))
        .set(buildroot_overrides::expired_date.eq(None::<DateTime<Utc>>))
        .execute(conn)
        .await?;

    let submitter: String =
        users::table.find(overridden.submitter_id).select(users::name).first(conn).await?;
    publish_override_event(ctx, "buildroot_override.tag", &overridden, &build.nvr, &submitter)
        .await;
    Ok(())
}

/// Untag the build and stamp the expiry. Untagging is best-effort: a build
/// someone already untagged by hand only produces an error log.
pub async fn expire(
    conn: &mut AsyncPgConnection,
    ctx: &EngineContext<'_>,
    override_id: i64,
) -> Result<()> {
    let overridden: BuildrootOverride =
        buildroot_overrides::table.find(override_id).first(conn).await?;
    if overridden.expired_date.is_some() {
        return Ok(());
    }
    let (build, release) = load_build_and_release(conn, overridden.build_id).await?;

    if let Err(e) = ctx.buildsys.untag_build(&release.override_tag, &build.nvr, false, true).await
    {
        error!(nvr = %build.nvr, error = %e, "unable to untag override");
    }

    let expired: BuildrootOverride =
        diesel::update(buildroot_overrides::table.find(override_id))
            .set(buildroot_overrides::expired_date.eq(Some(Utc::now())))
            .get_result(conn)
            .await?;
    metrics::override_expired();

    let submitter: String =
        users::table.find(overridden.submitter_id).select(users::name).first(conn).await?;
    publish_override_event(ctx, "buildroot_override.untag", &expired, &build.nvr, &submitter)
        .await;
    info!(nvr = %build.nvr, "expired buildroot override");
    Ok(())
}

/// Expire every override whose expiration date has passed.
pub async fn expire_overdue(
    conn: &mut AsyncPgConnection,
    ctx: &EngineContext<'_>,
    now: DateTime<Utc>,
) -> Result<usize> {
    let overdue: Vec<i64> = buildroot_overrides::table
        .filter(buildroot_overrides::expired_date.is_null())
        .filter(buildroot_overrides::expiration_date.le(now))
        .select(buildroot_overrides::id)
        .load(conn)
        .await?;
    let count = overdue.len();
    for id in overdue {
        expire(conn, ctx, id).await?;
    }
    Ok(count)
}

async fn get_or_create_user_id(conn: &mut AsyncPgConnection, name: &str) -> Result<i64> {
    let existing: Option<i64> = users::table
        .filter(users::name.eq(name))
        .select(users::id)
        .first(conn)
        .await
        .optional()?;
    match existing {
        Some(id) => Ok(id),
        None => Ok(diesel::insert_into(users::table)
            .values(users::name.eq(name))
            .returning(users::id)
            .get_result(conn)
            .await?),
    }
}
