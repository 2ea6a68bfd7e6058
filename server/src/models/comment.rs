//! Comment model with per-bug and per-testcase feedback.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::comments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Comment {
    pub id: i64,
    pub update_id: i64,
    pub user_id: i64,
    pub karma: i32,
    pub karma_critpath: i32,
    pub text: String,
    pub anonymous: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = crate::schema::comments)]
pub struct NewComment {
    pub update_id: i64,
    pub user_id: i64,
    pub karma: i32,
    pub karma_critpath: i32,
    pub text: String,
    pub anonymous: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = crate::schema::testcases)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TestCase {
    pub id: i64,
    pub name: String,
    pub package_id: i64,
}

/// Thumbs up/down on a specific bug, attached to a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugFeedback {
    pub bug_id: i32,
    pub karma: i32,
}

/// Thumbs up/down on a specific test case, attached to a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseFeedback {
    pub testcase: String,
    pub karma: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::comment_bug_assoc)]
pub struct NewBugFeedback {
    pub comment_id: i64,
    pub bug_id: i64,
    pub karma: i32,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::comment_testcase_assoc)]
pub struct NewTestCaseFeedback {
    pub comment_id: i64,
    pub testcase_id: i64,
    pub karma: i32,
}

/// A comment joined with its author and feedback, as the engine sees it.
///
/// A `CommentView` with `comment.id == 0` has not been persisted yet; the
/// save path inserts those along with their feedback rows.
#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub comment: Comment,
    pub author: String,
    pub author_groups: Vec<String>,
    pub bug_feedback: Vec<BugFeedback>,
    pub testcase_feedback: Vec<TestCaseFeedback>,
}

impl CommentView {
    /// Feedback entries deduplicated by test case, keeping the first entry.
    pub fn unique_testcase_feedback(&self) -> Vec<&TestCaseFeedback> {
        let mut seen = std::collections::HashSet::new();
        self.testcase_feedback
            .iter()
            .filter(|f| seen.insert(f.testcase.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_testcase_feedback_keeps_first() {
        let view = CommentView {
            comment: Comment {
                id: 1,
                update_id: 1,
                user_id: 1,
                karma: 0,
                karma_critpath: 0,
                text: String::new(),
                anonymous: false,
                timestamp: Utc::now(),
            },
            author: "alice".to_string(),
            author_groups: vec![],
            bug_feedback: vec![],
            testcase_feedback: vec![
                TestCaseFeedback { testcase: "rpmlint".to_string(), karma: 1 },
                TestCaseFeedback { testcase: "rpmlint".to_string(), karma: -1 },
                TestCaseFeedback { testcase: "depcheck".to_string(), karma: -1 },
            ],
        };
        let unique = view.unique_testcase_feedback();
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].karma, 1);
    }
}
