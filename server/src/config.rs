//! Policy and deployment configuration, loaded from the environment.
//!
//! Every knob has a default matching a stock deployment; `from_env` overlays
//! `UPDRAFT_*` variables on top and warns when a JSON-valued variable fails
//! to parse rather than aborting startup.

use std::collections::HashMap;
use std::env;

use serde::Deserialize;
use tracing::warn;

/// Per-status policy overrides for one release, keyed off the release's
/// current state. Lets a pending (pre-beta) release run with softer critpath
/// gates than a final one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusPolicy {
    pub mandatory_days_in_testing: Option<i64>,
    pub critpath_num_admin_approvals: Option<i32>,
    pub critpath_min_karma: Option<i32>,
}

/// Policy for a single release, resolved by release short name.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleasePolicy {
    /// The phase this release is in, e.g. `"pre_beta"`.
    pub status: String,
    /// Overrides keyed by phase name.
    #[serde(default)]
    pub overrides: HashMap<String, StatusPolicy>,
}

impl ReleasePolicy {
    pub fn current_overrides(&self) -> Option<&StatusPolicy> {
        self.overrides.get(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Account that authors engine-generated comments; its comments mark
    /// karma-reset boundaries and are excluded from threshold checks.
    pub system_user: String,
    /// Additional accounts treated as automation.
    pub system_users: Vec<String>,
    /// Groups whose members' +1 comments count as admin approvals.
    pub admin_groups: Vec<String>,
    pub critpath_num_admin_approvals: Option<i32>,
    pub critpath_min_karma: i32,
    pub critpath_stable_after_days_without_negative_karma: i64,
    pub test_gating_required: bool,
    /// Days in testing required before stable, keyed by lowercased id_prefix.
    pub mandatory_days_in_testing: HashMap<String, i64>,
    /// Per-release policy overrides, keyed by release short name.
    pub release_policies: HashMap<String, ReleasePolicy>,
    /// Critpath package names, keyed by release branch.
    pub critpath_packages: HashMap<String, Vec<String>>,
    /// Announce mailing lists, keyed by lowercased `<id_prefix>_<status>`.
    pub announce_lists: HashMap<String, String>,
    pub mail_from: String,
    pub base_address: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let mut mandatory = HashMap::new();
        mandatory.insert("fedora".to_string(), 7);
        mandatory.insert("fedora-epel".to_string(), 14);
        PolicyConfig {
            system_user: "updraft".to_string(),
            system_users: vec!["updraft".to_string(), "autoqa".to_string(), "taskotron".to_string()],
            admin_groups: vec!["proventesters".to_string(), "security_respons".to_string()],
            critpath_num_admin_approvals: Some(0),
            critpath_min_karma: 2,
            critpath_stable_after_days_without_negative_karma: 14,
            test_gating_required: false,
            mandatory_days_in_testing: mandatory,
            release_policies: HashMap::new(),
            critpath_packages: HashMap::new(),
            announce_lists: HashMap::new(),
            mail_from: "updates@updraft.example.com".to_string(),
            base_address: "https://updraft.example.com/".to_string(),
        }
    }
}

impl PolicyConfig {
    pub fn from_env() -> Self {
        let mut config = PolicyConfig::default();

        if let Ok(v) = env::var("UPDRAFT_SYSTEM_USER") {
            config.system_user = v.clone();
            if !config.system_users.contains(&v) {
                config.system_users.push(v);
            }
        }
        if let Ok(v) = env::var("UPDRAFT_ADMIN_GROUPS") {
            config.admin_groups = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("UPDRAFT_CRITPATH_MIN_KARMA") {
            match v.parse() {
                Ok(n) => config.critpath_min_karma = n,
                Err(_) => warn!(value = %v, "ignoring invalid UPDRAFT_CRITPATH_MIN_KARMA"),
            }
        }
        if let Ok(v) = env::var("UPDRAFT_CRITPATH_NUM_ADMIN_APPROVALS") {
            match v.parse() {
                Ok(n) => config.critpath_num_admin_approvals = Some(n),
                Err(_) => {
                    warn!(value = %v, "ignoring invalid UPDRAFT_CRITPATH_NUM_ADMIN_APPROVALS")
                }
            }
        }
        if let Ok(v) = env::var("UPDRAFT_CRITPATH_STABLE_AFTER_DAYS") {
            match v.parse() {
                Ok(n) => config.critpath_stable_after_days_without_negative_karma = n,
                Err(_) => warn!(value = %v, "ignoring invalid UPDRAFT_CRITPATH_STABLE_AFTER_DAYS"),
            }
        }
        if let Ok(v) = env::var("UPDRAFT_TEST_GATING_REQUIRED") {
            config.test_gating_required = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("UPDRAFT_MANDATORY_DAYS_IN_TESTING") {
            match serde_json::from_str(&v) {
                Ok(map) => config.mandatory_days_in_testing = map,
                Err(e) => warn!(error = %e, "ignoring invalid UPDRAFT_MANDATORY_DAYS_IN_TESTING"),
            }
        }
        if let Ok(v) = env::var("UPDRAFT_RELEASE_POLICY") {
            match serde_json::from_str(&v) {
                Ok(map) => config.release_policies = map,
                Err(e) => warn!(error = %e, "ignoring invalid UPDRAFT_RELEASE_POLICY"),
            }
        }
        if let Ok(v) = env::var("UPDRAFT_CRITPATH_PACKAGES") {
            match serde_json::from_str(&v) {
                Ok(map) => config.critpath_packages = map,
                Err(e) => warn!(error = %e, "ignoring invalid UPDRAFT_CRITPATH_PACKAGES"),
            }
        }
        if let Ok(v) = env::var("UPDRAFT_ANNOUNCE_LISTS") {
            match serde_json::from_str(&v) {
                Ok(map) => config.announce_lists = map,
                Err(e) => warn!(error = %e, "ignoring invalid UPDRAFT_ANNOUNCE_LISTS"),
            }
        }
        if let Ok(v) = env::var("UPDRAFT_MAIL_FROM") {
            config.mail_from = v;
        }
        if let Ok(v) = env::var("UPDRAFT_BASE_ADDRESS") {
            config.base_address = v;
        }

        config
    }

    pub fn is_system_user(&self, name: &str) -> bool {
        self.system_users.iter().any(|u| u == name)
    }

    /// Admin approvals requirement for a release, honoring phase overrides.
    pub fn admin_approvals_for(&self, release_name: &str) -> Option<i32> {
        self.release_policies
            .get(release_name)
            .and_then(ReleasePolicy::current_overrides)
            .and_then(|o| o.critpath_num_admin_approvals)
            .or(self.critpath_num_admin_approvals)
    }

    /// Minimum critpath karma for a release, honoring phase overrides.
    pub fn min_karma_for(&self, release_name: &str) -> i32 {
        self.release_policies
            .get(release_name)
            .and_then(ReleasePolicy::current_overrides)
            .and_then(|o| o.critpath_min_karma)
            .unwrap_or(self.critpath_min_karma)
    }

    /// Mandatory days in testing, honoring phase overrides, then the
    /// per-prefix table, defaulting to zero (no time gate).
    pub fn mandatory_days_for(&self, release_name: &str, id_prefix: &str) -> i64 {
        if let Some(days) = self
            .release_policies
            .get(release_name)
            .and_then(ReleasePolicy::current_overrides)
            .and_then(|o| o.mandatory_days_in_testing)
        {
            return days;
        }
        self.mandatory_days_in_testing
            .get(&id_prefix.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    pub fn announce_list(&self, id_prefix: &str, status: &str) -> Option<&str> {
        let key = format!("{}_{}", id_prefix.to_lowercase().replace('-', "_"), status);
        self.announce_lists.get(&key).map(String::as_str)
    }
}

/// Message appended when a critpath update is submitted for stable before
/// meeting minimum testing requirements.
pub fn not_yet_tested_msg(min_karma: i32, admin_approvals: i32, stable_days: i64) -> String {
    format!(
        "This critical path update has not yet been approved for pushing to the stable \
         repository. It must first reach a karma of {min_karma}, consisting of {admin_approvals} \
         positive karma from proventesters, along with {community} additional karma from the \
         community. Or, it must spend {stable_days} days in testing without any negative feedback",
        community = (min_karma - admin_approvals).max(0),
    )
}

/// Rejection shown when a non-critpath update is pushed for stable before
/// its testing window has elapsed.
pub const NOT_YET_TESTED_MSG: &str = "This update has not yet met the minimum testing \
    requirements defined in the Package Update Acceptance Criteria";

/// EPEL variant of the minimum-testing rejection.
pub const NOT_YET_TESTED_EPEL_MSG: &str = "This update has not yet met the minimum testing \
    requirements defined in the EPEL Update Policy";

/// Comment left when karma dips negative and automatic stable pushes are
/// disabled as a result.
pub const DISABLE_AUTOPUSH_MSG: &str = "This update has received negative karma and is no longer \
    eligible for automatic pushing to stable. The maintainer may still push it manually.";
