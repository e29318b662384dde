pub(crate) const METRIC_SHUTDOWN_INITIATED: &str = "lifecycle_shutdown_initiated_total";
pub(crate) const METRIC_SHUTDOWN_COMPLETED: &str = "lifecycle_shutdown_completed_total";
pub(crate) const METRIC_CONNECTIONS_ACCEPTED: &str = "lifecycle_connections_accepted_total";

pub(crate) fn emit_shutdown_initiated(trigger_reason: &str) {
    metrics::counter!(
        METRIC_SHUTDOWN_INITIATED,
        "trigger_reason" => trigger_reason.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_shutdown_completed(clean: bool) {
    metrics::counter!(
        METRIC_SHUTDOWN_COMPLETED,
        "clean" => clean.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_connection_accepted(tls: bool) {
    metrics::counter!(
        METRIC_CONNECTIONS_ACCEPTED,
        "tls" => tls.to_string()
    )
    .increment(1);
}
