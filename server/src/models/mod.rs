//! Database models and in-memory aggregates.

pub mod bug;
pub mod build;
pub mod comment;
pub mod enums;
pub mod overrides;
pub mod package;
pub mod release;
pub mod stack;
pub mod update;
pub mod user;

pub use bug::{Bug, Cve, NewBug};
pub use build::{Build, BuildView, NewBuild};
pub use comment::{
    BugFeedback, Comment, CommentView, NewBugFeedback, NewComment, NewTestCaseFeedback, TestCase,
    TestCaseFeedback,
};
pub use enums::{
    ContentType, ReleaseState, TestGatingStatus, UpdateRequest, UpdateSeverity, UpdateStatus,
    UpdateSuggestion, UpdateType,
};
pub use overrides::{BuildrootOverride, NewBuildrootOverride};
pub use package::{NewPackage, Package};
pub use release::{NewRelease, Release, TagKind};
pub use stack::Stack;
pub use update::{Caveat, NewUpdate, Update, UpdateAggregate};
pub use user::{Group, User};
