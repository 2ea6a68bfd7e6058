//! Build-system client abstraction.
//!
//! Lifecycle transitions drive the build system through tag operations only;
//! the engine never talks to the build system directly for anything else.

use async_trait::async_trait;
use tracing::info;

/// Tag operations against the build system.
#[async_trait]
pub trait BuildSystem: Send + Sync {
    /// Tags currently applied to a build, by NVR.
    async fn list_tags(&self, nvr: &str) -> anyhow::Result<Vec<String>>;

    async fn tag_build(&self, tag: &str, nvr: &str, force: bool) -> anyhow::Result<()>;

    /// Remove `tag` from `nvr`. With `strict` false a missing tag is not an
    /// error.
    async fn untag_build(&self, tag: &str, nvr: &str, force: bool, strict: bool)
        -> anyhow::Result<()>;

    /// Atomically move a build between tags.
    async fn move_build(&self, from_tag: &str, to_tag: &str, nvr: &str) -> anyhow::Result<()>;
}

/// Build system that logs every call and performs nothing, for local
/// development and dry runs.
#[derive(Debug, Default)]
pub struct DryRunBuildSystem;

#[async_trait]
impl BuildSystem for DryRunBuildSystem {
    async fn list_tags(&self, nvr: &str) -> anyhow::Result<Vec<String>> {
        info!(nvr, "dry-run: list_tags");
        Ok(Vec::new())
    }

    async fn tag_build(&self, tag: &str, nvr: &str, force: bool) -> anyhow::Result<()> {
        info!(tag, nvr, force, "dry-run: tag_build");
        Ok(())
    }

    async fn untag_build(
        &self,
        tag: &str,
        nvr: &str,
        force: bool,
        strict: bool,
    ) -> anyhow::Result<()> {
        info!(tag, nvr, force, strict, "dry-run: untag_build");
        Ok(())
    }

    async fn move_build(&self, from_tag: &str, to_tag: &str, nvr: &str) -> anyhow::Result<()> {
        info!(from_tag, to_tag, nvr, "dry-run: move_build");
        Ok(())
    }
}
