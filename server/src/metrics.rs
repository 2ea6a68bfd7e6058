//! Prometheus metrics.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;

pub fn init_metrics() -> anyhow::Result<()> {
    let builder = PrometheusBuilder::new();
    builder.install()?;

    describe_counter!("updraft_requests_submitted_total", "Update requests accepted, by action");
    describe_counter!("updraft_status_changes_total", "Update status transitions, by status");
    describe_counter!("updraft_comments_total", "Comments added to updates");
    describe_counter!(
        "updraft_karma_thresholds_total",
        "Karma thresholds reached, by direction"
    );
    describe_counter!("updraft_overrides_expired_total", "Buildroot overrides expired");

    Ok(())
}

pub fn request_submitted(action: &str) {
    counter!("updraft_requests_submitted_total", "action" => action.to_string()).increment(1);
}

pub fn status_changed(status: &str) {
    counter!("updraft_status_changes_total", "status" => status.to_string()).increment(1);
}

pub fn comment_added() {
    counter!("updraft_comments_total").increment(1);
}

pub fn karma_threshold_reached(direction: &str) {
    counter!("updraft_karma_thresholds_total", "direction" => direction.to_string()).increment(1);
}

pub fn override_expired() {
    counter!("updraft_overrides_expired_total").increment(1);
}
