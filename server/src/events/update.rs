//! Event payloads for update lifecycle changes.
//!
//! Comment events are anonymized: author names of anonymous comments are
//! replaced before serialization, and email addresses never appear.

use serde::Serialize;

use crate::models::{UpdateAggregate, UpdateRequest};

/// Topic for a request-change event, e.g. `update.request.testing`.
pub fn request_topic(action: UpdateRequest) -> String {
    format!("update.request.{action}")
}

/// Serialized view of an update carried in event payloads.
#[derive(Debug, Serialize)]
pub struct UpdateSummary {
    pub alias: String,
    pub title: String,
    pub status: String,
    pub request: Option<String>,
    pub release: String,
    pub user: String,
    pub critpath: bool,
}

impl UpdateSummary {
    pub fn from_aggregate(aggregate: &UpdateAggregate) -> Self {
        UpdateSummary {
            alias: aggregate.update.alias.clone(),
            title: aggregate.title(),
            status: aggregate.update.status.to_string(),
            request: aggregate.update.request.map(|r| r.to_string()),
            release: aggregate.release.name.clone(),
            user: aggregate.owner.clone(),
            critpath: aggregate.update.critpath,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestChanged {
    pub update: UpdateSummary,
    pub agent: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateEdited {
    pub update: UpdateSummary,
    pub agent: String,
    pub new_builds: Vec<String>,
    pub removed_builds: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentAdded {
    pub update: UpdateSummary,
    /// `"anonymous"` when the comment was posted anonymously.
    pub author: String,
    pub karma: i32,
    pub text: String,
}

impl CommentAdded {
    pub fn new(aggregate: &UpdateAggregate, author: &str, anonymous: bool, karma: i32, text: &str) -> Self {
        CommentAdded {
            update: UpdateSummary::from_aggregate(aggregate),
            author: if anonymous { "anonymous".to_string() } else { author.to_string() },
            karma,
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KarmaThresholdReached {
    pub update: UpdateSummary,
    /// Which threshold fired: `"stable"` or `"unstable"`.
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrataPublished {
    pub update: UpdateSummary,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct OverrideChanged {
    pub nvr: String,
    pub submitter: String,
    pub expiration_date: String,
    pub expired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_topic_names() {
        assert_eq!(request_topic(UpdateRequest::Testing), "update.request.testing");
        assert_eq!(request_topic(UpdateRequest::Revoke), "update.request.revoke");
    }
}
