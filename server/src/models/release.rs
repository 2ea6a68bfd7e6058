//! Release model: a distribution version updates are targeted at.

use std::sync::LazyLock;

use diesel::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::enums::ReleaseState;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\D+(\d+)$").expect("invalid version regex"));

/// Which of a release's tag slots a given build-system tag occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Candidate,
    PendingSigning,
    PendingTesting,
    PendingStable,
    Testing,
    Stable,
    Override,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::releases)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Release {
    pub id: i64,
    /// Short name, e.g. `F26` or `EPEL-7`.
    pub name: String,
    pub long_name: String,
    pub version: String,
    /// Update alias prefix, e.g. `FEDORA` or `FEDORA-EPEL`.
    pub id_prefix: String,
    pub branch: String,
    pub dist_tag: String,
    pub stable_tag: String,
    pub testing_tag: String,
    pub candidate_tag: String,
    pub pending_signing_tag: String,
    pub pending_testing_tag: String,
    pub pending_stable_tag: String,
    pub override_tag: String,
    pub state: ReleaseState,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::releases)]
pub struct NewRelease {
    pub name: String,
    pub long_name: String,
    pub version: String,
    pub id_prefix: String,
    pub branch: String,
    pub dist_tag: String,
    pub stable_tag: String,
    pub testing_tag: String,
    pub candidate_tag: String,
    pub pending_signing_tag: String,
    pub pending_testing_tag: String,
    pub pending_stable_tag: String,
    pub override_tag: String,
    pub state: ReleaseState,
}

impl Release {
    /// Numeric version extracted from the short name (`F26` -> 26).
    pub fn version_int(&self) -> Option<u32> {
        VERSION_RE
            .captures(&self.name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Collection name is the id_prefix with dashes spelled out,
    /// e.g. `FEDORA-EPEL` -> `Fedora EPEL`.
    pub fn collection_name(&self) -> String {
        self.long_name
            .rsplit_once(' ')
            .map(|(head, _)| head.to_string())
            .unwrap_or_else(|| self.long_name.clone())
    }

    /// All non-empty build-system tags this release owns, with their kind.
    pub fn tags(&self) -> Vec<(TagKind, &str)> {
        [
            (TagKind::Candidate, self.candidate_tag.as_str()),
            (TagKind::PendingSigning, self.pending_signing_tag.as_str()),
            (TagKind::PendingTesting, self.pending_testing_tag.as_str()),
            (TagKind::PendingStable, self.pending_stable_tag.as_str()),
            (TagKind::Testing, self.testing_tag.as_str()),
            (TagKind::Stable, self.stable_tag.as_str()),
            (TagKind::Override, self.override_tag.as_str()),
        ]
        .into_iter()
        .filter(|(_, t)| !t.is_empty())
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, long_name: &str) -> Release {
        Release {
            id: 1,
            name: name.to_string(),
            long_name: long_name.to_string(),
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

    #[test]
    fn version_int_from_name() {
        assert_eq!(release("F26", "Fedora 26").version_int(), Some(26));
        assert_eq!(release("EPEL-7", "Fedora EPEL 7").version_int(), Some(7));
    }

    #[test]
    fn collection_name_drops_version() {
        assert_eq!(release("F26", "Fedora 26").collection_name(), "Fedora");
        assert_eq!(
            release("EPEL-7", "Fedora EPEL 7").collection_name(),
            "Fedora EPEL"
        );
    }

    #[test]
    fn tags_skip_empty_slots() {
        let mut r = release("F26", "Fedora 26");
        r.pending_testing_tag = String::new();
        let tags = r.tags();
        assert_eq!(tags.len(), 6);
        assert!(!tags.iter().any(|(k, _)| *k == TagKind::PendingTesting));
    }
}
