//! Error taxonomy for the update-lifecycle engine.

use thiserror::Error;

/// Failures surfaced by lifecycle operations.
///
/// `Locked` and `Policy` are recoverable and surfaced to the caller as
/// user-visible rejections. `Validation` marks an invariant violation at the
/// point it was detected. `External` wraps a collaborator failure that was
/// integral to a transition; best-effort collaborator calls are logged and
/// swallowed instead.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// A release process owns this update; mutation is refused.
    #[error("can't modify a locked update")]
    Locked,

    /// A policy gate (karma, testing time, critpath approval) blocked the
    /// requested transition.
    #[error("{0}")]
    Policy(String),

    /// An entity invariant was violated (e.g. mixed build content types).
    #[error("validation error: {0}")]
    Validation(String),

    /// A collaborator (build system, database) failed mid-transition.
    #[error("external dependency failure: {0}")]
    External(#[from] anyhow::Error),

    /// Required configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<diesel::result::Error> for UpdateError {
    fn from(e: diesel::result::Error) -> Self {
        UpdateError::External(e.into())
    }
}

/// Specialized result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
