//! Outbound mail: update notices to announce lists and direct notifications
//! to maintainers and commenters.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::PolicyConfig;
use crate::models::UpdateAggregate;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Mailer that logs instead of sending, for development and tests.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(from, to, subject, body_len = body.len(), "mail (log only)");
        Ok(())
    }
}

/// Render the update notice body for announce lists.
pub fn render_notice(aggregate: &UpdateAggregate, config: &PolicyConfig) -> (String, String) {
    let update = &aggregate.update;
    let subject = if update.update_type == crate::models::UpdateType::Security {
        format!("[SECURITY] {}", aggregate.beautify_title())
    } else {
        aggregate.beautify_title()
    };
    let body = format!(
        "{long_name} Update: {alias}\n\
         Type: {update_type}\n\
         Severity: {severity}\n\
         Karma requirements: stable={stable:?} unstable={unstable:?}\n\n\
         {notes}\n\n\
         More information: {base}updates/{alias}\n",
        long_name = aggregate.release.long_name,
        alias = update.alias,
        update_type = update.update_type,
        severity = update.severity,
        stable = update.stable_karma,
        unstable = update.unstable_karma,
        notes = update.notes,
        base = config.base_address,
    );
    (subject, body)
}

/// Send the update notice for a status change to the matching announce list.
/// A missing list for the release/status pair is logged and skipped.
pub async fn send_update_notice(
    mailer: &dyn Mailer,
    aggregate: &UpdateAggregate,
    config: &PolicyConfig,
) {
    let status = aggregate.update.status.as_str();
    let Some(list) = config.announce_list(&aggregate.release.id_prefix, status) else {
        error!(
            release = %aggregate.release.name,
            status,
            "no announce list configured; skipping update notice"
        );
        return;
    };
    let (subject, body) = render_notice(aggregate, config);
    if let Err(e) = mailer.send(&config.mail_from, list, &subject, &body).await {
        error!(to = list, error = %e, "failed to send update notice");
    }
}

/// Mail everyone with a stake in the update about a new comment: the owner
/// and every prior commenter, minus automation and the comment's author.
pub async fn notify_commenters(
    mailer: &dyn Mailer,
    aggregate: &UpdateAggregate,
    comment_author: &str,
    comment_text: &str,
    config: &PolicyConfig,
) {
    let mut recipients: BTreeSet<&str> = BTreeSet::new();
    recipients.insert(aggregate.owner.as_str());
    for view in &aggregate.comments {
        if !view.comment.anonymous {
            recipients.insert(view.author.as_str());
        }
    }
    recipients.retain(|name| *name != comment_author && !config.is_system_user(name));

    let subject = format!("[{}] new comment from {}", aggregate.update.alias, comment_author);
    for name in recipients {
        let to = format!("{name}@{}", mail_domain(&config.mail_from));
        if let Err(e) = mailer.send(&config.mail_from, &to, &subject, comment_text).await {
            error!(to = %to, error = %e, "failed to send comment notification");
        }
    }
}

fn mail_domain(from: &str) -> &str {
    from.rsplit_once('@').map(|(_, d)| d).unwrap_or("localhost")
}
