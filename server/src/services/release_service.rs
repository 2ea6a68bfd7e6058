//! Release lookup and the tag-to-release cache.
//!
//! The cache maps every build-system tag a release owns back to that release.
//! It is rebuilt on demand and invalidated explicitly whenever a release is
//! created or edited.

use std::collections::HashMap;
use std::sync::Arc;

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::Result;
use crate::models::{NewRelease, Release, TagKind};
use crate::schema::releases;

/// Immutable snapshot of all release tags.
#[derive(Debug, Default)]
pub struct TagCache {
    by_kind: HashMap<TagKind, Vec<String>>,
    tag_release: HashMap<String, String>,
}

impl TagCache {
    pub fn from_releases(all: &[Release]) -> Self {
        let mut by_kind: HashMap<TagKind, Vec<String>> = HashMap::new();
        let mut tag_release = HashMap::new();
        for release in all {
            for (kind, tag) in release.tags() {
                by_kind.entry(kind).or_default().push(tag.to_string());
                tag_release.insert(tag.to_string(), release.name.clone());
            }
        }
        TagCache { by_kind, tag_release }
    }

    /// Whether this tag belongs to any release. Tag removal only touches
    /// known tags.
    pub fn known(&self, tag: &str) -> bool {
        self.tag_release.contains_key(tag)
    }

    /// Short name of the release owning this tag.
    pub fn release_for(&self, tag: &str) -> Option<&str> {
        self.tag_release.get(tag).map(String::as_str)
    }

    pub fn tags_of_kind(&self, kind: TagKind) -> &[String] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Shared cache handle with explicit invalidation.
#[derive(Default)]
pub struct CachedTags {
    inner: RwLock<Option<Arc<TagCache>>>,
}

impl CachedTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, loading from the database on a cold cache.
    pub async fn get(&self, conn: &mut AsyncPgConnection) -> Result<Arc<TagCache>> {
        if let Some(cache) = self.inner.read().await.as_ref() {
            return Ok(Arc::clone(cache));
        }
        let mut slot = self.inner.write().await;
        // Another task may have filled it while we waited for the lock.
        if let Some(cache) = slot.as_ref() {
            return Ok(Arc::clone(cache));
        }
        let all: Vec<Release> = releases::table.load(conn).await?;
        let cache = Arc::new(TagCache::from_releases(&all));
        *slot = Some(Arc::clone(&cache));
        Ok(cache)
    }

    pub async fn invalidate(&self) {
        *self.inner.write().await = None;
    }
}

pub async fn get_release_by_name(
    conn: &mut AsyncPgConnection,
    name: &str,
) -> Result<Option<Release>> {
    let release = releases::table
        .filter(releases::name.eq(name))
        .first::<Release>(conn)
        .await
        .optional()?;
    Ok(release)
}

/// Resolve the release a set of build tags belongs to, taking the first
/// known tag.
pub async fn release_from_tags(
    conn: &mut AsyncPgConnection,
    cache: &TagCache,
    tags: &[String],
) -> Result<Option<Release>> {
    for tag in tags {
        if let Some(name) = cache.release_for(tag) {
            if let Some(release) = get_release_by_name(conn, name).await? {
                return Ok(Some(release));
            }
        }
    }
    Ok(None)
}

/// Insert or update a release by short name, invalidating the tag cache.
pub async fn upsert_release(
    conn: &mut AsyncPgConnection,
    cache: &CachedTags,
    release: NewRelease,
) -> Result<Release> {
    let existing = get_release_by_name(conn, &release.name).await?;
    let saved = match existing {
        Some(current) => {
            diesel::update(releases::table.find(current.id))
                .set((
                    releases::long_name.eq(&release.long_name),
                    releases::version.eq(&release.version),
                    releases::id_prefix.eq(&release.id_prefix),
                    releases::branch.eq(&release.branch),
                    releases::dist_tag.eq(&release.dist_tag),
                    releases::stable_tag.eq(&release.stable_tag),
                    releases::testing_tag.eq(&release.testing_tag),
                    releases::candidate_tag.eq(&release.candidate_tag),
                    releases::pending_signing_tag.eq(&release.pending_signing_tag),
                    releases::pending_testing_tag.eq(&release.pending_testing_tag),
                    releases::pending_stable_tag.eq(&release.pending_stable_tag),
                    releases::override_tag.eq(&release.override_tag),
                    releases::state.eq(release.state),
                ))
                .get_result::<Release>(conn)
                .await?
        }
        None => {
            diesel::insert_into(releases::table)
                .values(&release)
                .get_result::<Release>(conn)
                .await?
        }
    };
    cache.invalidate().await;
    info!(release = %saved.name, "release saved, tag cache invalidated");
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn cache_maps_tags_to_releases() {
        let release = test_util::release();
        let cache = TagCache::from_releases(std::slice::from_ref(&release));
        assert!(cache.known("f26-updates-testing"));
        assert_eq!(cache.release_for("f26-updates-testing"), Some("F26"));
        assert!(!cache.known("epel7-testing"));
        assert_eq!(cache.tags_of_kind(TagKind::Candidate), ["f26-updates-candidate"]);
    }

    #[test]
    fn empty_tags_not_cached() {
        let mut release = test_util::release();
        release.override_tag = String::new();
        let cache = TagCache::from_releases(std::slice::from_ref(&release));
        assert!(!cache.known(""));
        assert!(cache.tags_of_kind(TagKind::Override).is_empty());
    }
}
