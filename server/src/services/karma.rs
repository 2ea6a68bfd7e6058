//! Karma accounting over an update's comment history.
//!
//! Editing an update's build list resets its karma: the engine leaves a
//! system comment announcing the build change, and all vote counting starts
//! over from that boundary. Feedback on individual bugs and test cases is
//! counted over the full history.

use std::collections::HashSet;

use crate::config::PolicyConfig;
use crate::models::CommentView;

/// True when this comment marks a karma-reset boundary: a system-user
/// comment announcing a build change.
pub fn is_karma_reset(view: &CommentView, config: &PolicyConfig) -> bool {
    view.author == config.system_user
        && (view.comment.text.contains("New build") || view.comment.text.contains("Removed build"))
}

/// Comments in the current karma epoch, oldest first. The scan walks
/// backwards from the newest comment and stops at the first reset marker.
pub fn comments_since_karma_reset<'a>(
    comments: &'a [CommentView],
    config: &PolicyConfig,
) -> Vec<&'a CommentView> {
    let mut epoch: Vec<&CommentView> = comments
        .iter()
        .rev()
        .take_while(|c| !is_karma_reset(c, config))
        .collect();
    epoch.reverse();
    epoch
}

/// Positive and negative vote totals for the current epoch.
///
/// Each non-anonymous author gets one vote: their most recent comment with
/// nonzero karma. A later zero-karma comment does not withdraw an earlier
/// vote. Returns `(positive, negative)` where `negative <= 0`.
pub fn composite_karma(comments: &[CommentView], config: &PolicyConfig) -> (i32, i32) {
    let mut voted: HashSet<&str> = HashSet::new();
    let mut positive = 0;
    let mut negative = 0;
    for view in comments_since_karma_reset(comments, config).into_iter().rev() {
        if view.comment.anonymous || view.comment.karma == 0 {
            continue;
        }
        if !voted.insert(view.author.as_str()) {
            continue;
        }
        if view.comment.karma > 0 {
            positive += view.comment.karma;
        } else {
            negative += view.comment.karma;
        }
    }
    (positive, negative)
}

/// Net karma for the current epoch.
pub fn total_karma(comments: &[CommentView], config: &PolicyConfig) -> i32 {
    let (positive, negative) = composite_karma(comments, config);
    positive + negative
}

/// `(bad, good)` vote counts for one bug over the full comment history,
/// taking each author's most recent feedback entry. `bad <= 0`.
pub fn bug_karma(comments: &[CommentView], bug_id: i32) -> (i32, i32) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut bad = 0;
    let mut good = 0;
    for view in comments.iter().rev() {
        let Some(feedback) = view.bug_feedback.iter().find(|f| f.bug_id == bug_id) else {
            continue;
        };
        if !seen.insert(view.author.as_str()) {
            continue;
        }
        if feedback.karma > 0 {
            good += 1;
        } else if feedback.karma < 0 {
            bad -= 1;
        }
    }
    (bad, good)
}

/// `(bad, good)` vote counts for one test case over the full comment
/// history, taking each author's most recent feedback entry. `bad <= 0`.
pub fn testcase_karma(comments: &[CommentView], testcase: &str) -> (i32, i32) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut bad = 0;
    let mut good = 0;
    for view in comments.iter().rev() {
        let Some(feedback) = view
            .unique_testcase_feedback()
            .into_iter()
            .find(|f| f.testcase == testcase)
        else {
            continue;
        };
        if !seen.insert(view.author.as_str()) {
            continue;
        }
        if feedback.karma > 0 {
            good += 1;
        } else if feedback.karma < 0 {
            bad -= 1;
        }
    }
    (bad, good)
}

/// Number of +1 comments from members of the admin groups, over the full
/// history.
pub fn num_admin_approvals(comments: &[CommentView], config: &PolicyConfig) -> i32 {
    comments
        .iter()
        .filter(|view| view.comment.karma == 1)
        .filter(|view| view.author_groups.iter().any(|g| config.admin_groups.contains(g)))
        .count() as i32
}
