use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_timeout_seconds() -> i64 {
    3600
}

fn default_ttl_before_running() -> i64 {
    60
}

fn default_ttl_after_finished() -> i64 {
    600
}

/// A request for a one-shot interactive pod, gated by an optional
/// authorisation rule and garbage collected on a phase-specific TTL.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "workloads.theatre.io",
    version = "v1alpha1",
    kind = "Console",
    plural = "consoles",
    derive = "PartialEq",
    status = "ConsoleStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".status.podName\", \"name\": \"POD\", \"type\": \"string\" }")]
#[kube(printcolumn = "{\"jsonPath\": \".spec.user\", \"name\": \"USER\", \"type\": \"string\" }")]
pub struct ConsoleSpec {
    pub template_ref: String,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub reason: Option<String>,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i64,

    #[serde(default = "default_ttl_before_running")]
    pub ttl_seconds_before_running: i64,

    #[serde(default = "default_ttl_after_finished")]
    pub ttl_seconds_after_finished: i64,

    #[serde(default)]
    pub noninteractive: bool,

    /// Stamped by the authenticator webhook on create. Never client-set;
    /// the webhook overwrites whatever value a client supplies.
    #[serde(default)]
    pub user: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum ConsolePhase {
    #[default]
    Pending,
    PendingAuthorisation,
    Running,
    Stopped,
    Destroyed,
}

impl fmt::Display for ConsolePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsolePhase::Pending => "Pending",
            ConsolePhase::PendingAuthorisation => "PendingAuthorisation",
            ConsolePhase::Running => "Running",
            ConsolePhase::Stopped => "Stopped",
            ConsolePhase::Destroyed => "Destroyed",
        };
        write!(f, "{s}")
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ConsoleStatus {
    pub phase: ConsolePhase,

    /// Monotonic once set: never changes except to "" on abort, immediately
    /// followed by a terminal `Stopped` phase.
    #[serde(default)]
    pub pod_name: String,

    /// Fixed once at Job creation: `jobCreationTime + timeoutSeconds`.
    pub expiry_time: Option<Time>,

    pub completion_time: Option<Time>,

    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_phase_is_pending() {
        assert_eq!(ConsolePhase::default(), ConsolePhase::Pending);
    }

    #[test]
    fn defaults_match_spec() {
        assert_eq!(default_timeout_seconds(), 3600);
        assert_eq!(default_ttl_before_running(), 60);
        assert_eq!(default_ttl_after_finished(), 600);
    }
}
