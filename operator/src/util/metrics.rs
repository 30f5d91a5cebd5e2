use metrics::{counter, histogram};

/// Thin wrapper around the process-wide `metrics` facade (the same
/// recorder `theatre_common::metrics` installs and serves at `/metrics`),
/// scoped to a single controller name so call sites don't repeat it.
#[derive(Clone)]
pub struct ControllerMetrics {
    controller: &'static str,
}

impl ControllerMetrics {
    pub fn new(controller: &'static str) -> Self {
        Self { controller }
    }

    pub fn record_reconcile(&self, outcome: &str, duration: std::time::Duration) {
        counter!(
            "theatre_operator_reconcile_total",
            "controller" => self.controller.to_string(),
            "outcome" => outcome.to_string(),
        )
        .increment(1);
        histogram!(
            "theatre_operator_reconcile_duration_seconds",
            "controller" => self.controller.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    pub fn record_action(&self, action: &str) {
        counter!(
            "theatre_operator_action_total",
            "controller" => self.controller.to_string(),
            "action" => action.to_string(),
        )
        .increment(1);
    }
}
