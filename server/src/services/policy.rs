//! Stable-push policy gates: testing time, gating status, and critpath
//! approval.

use chrono::{DateTime, Utc};

use super::karma;
use crate::config::PolicyConfig;
use crate::models::{TestGatingStatus, UpdateAggregate};

/// Days this update must spend in testing before a stable push. Critpath
/// updates use the dedicated critpath window instead of the release's table.
pub fn mandatory_days_in_testing(aggregate: &UpdateAggregate, config: &PolicyConfig) -> i64 {
    if aggregate.update.critpath {
        return config.critpath_stable_after_days_without_negative_karma;
    }
    config.mandatory_days_for(&aggregate.release.name, &aggregate.release.id_prefix)
}

/// Whole days since the update entered testing, zero if it never has.
pub fn days_in_testing(aggregate: &UpdateAggregate, now: DateTime<Utc>) -> i64 {
    match aggregate.update.date_testing {
        Some(date_testing) => (now - date_testing).num_days(),
        None => 0,
    }
}

/// Days remaining until the time gate opens, zero once it has (or when the
/// update never entered testing).
pub fn days_to_stable(aggregate: &UpdateAggregate, config: &PolicyConfig, now: DateTime<Utc>) -> i64 {
    if !meets_testing_requirements(aggregate, config, now) && aggregate.update.date_testing.is_some()
    {
        let remaining =
            mandatory_days_in_testing(aggregate, config) - days_in_testing(aggregate, now);
        if remaining > 0 {
            return remaining;
        }
    }
    0
}

/// Whether the gating oracle permits a stable push. Absent status means the
/// update predates gating and passes.
pub fn test_gating_passed(aggregate: &UpdateAggregate) -> bool {
    matches!(
        aggregate.update.test_gating_status,
        None | Some(TestGatingStatus::Ignored) | Some(TestGatingStatus::Passed)
    )
}

/// Whether the update currently satisfies the testing requirements for a
/// stable push.
pub fn meets_testing_requirements(
    aggregate: &UpdateAggregate,
    config: &PolicyConfig,
    now: DateTime<Utc>,
) -> bool {
    let num_days = mandatory_days_in_testing(aggregate, config);

    if config.test_gating_required && !test_gating_passed(aggregate) {
        return false;
    }

    if aggregate.update.critpath {
        // Any standing negative vote blocks the time-based path.
        let (_, negative) = karma::composite_karma(&aggregate.comments, config);
        if negative < 0 {
            return false;
        }
        return days_in_testing(aggregate, now) >= num_days;
    }

    if num_days == 0 {
        return true;
    }

    // Manual-push updates that already reached their stable karma threshold
    // have proven themselves regardless of elapsed time.
    if !aggregate.update.autokarma {
        if let Some(stable_karma) = aggregate.update.stable_karma {
            if stable_karma != 0 && karma::total_karma(&aggregate.comments, config) >= stable_karma
            {
                return true;
            }
        }
    }

    days_in_testing(aggregate, now) >= num_days
}

/// Whether the engine has already posted the "can be pushed to stable"
/// eligibility comment in the current karma epoch. Releases with no time
/// gate never need the comment.
pub fn met_testing_requirements(
    aggregate: &UpdateAggregate,
    config: &PolicyConfig,
    now: DateTime<Utc>,
) -> bool {
    if mandatory_days_in_testing(aggregate, config) == 0 {
        return true;
    }
    if !meets_testing_requirements(aggregate, config, now) {
        return false;
    }
    karma::comments_since_karma_reset(&aggregate.comments, config)
        .iter()
        .any(|view| {
            view.author == config.system_user
                && view.comment.text.starts_with("This update has reached")
                && view
                    .comment
                    .text
                    .contains("and can be pushed to stable now if the maintainer wishes")
        })
}

/// Whether a critpath update is approved for stable: either the testing
/// requirements are met, or it has gathered enough admin approvals and karma.
pub fn critpath_approved(
    aggregate: &UpdateAggregate,
    config: &PolicyConfig,
    now: DateTime<Utc>,
) -> bool {
    if meets_testing_requirements(aggregate, config, now) {
        return true;
    }
    let release_name = &aggregate.release.name;
    let required_approvals = config.admin_approvals_for(release_name).unwrap_or(0);
    let min_karma = config.min_karma_for(release_name);
    karma::num_admin_approvals(&aggregate.comments, config) >= required_approvals
        && karma::total_karma(&aggregate.comments, config) >= min_karma
}
