use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Drives a rollback of `releaseRef` to `toReleaseRef` (auto-selected by
/// the `/mutate-rollbacks` webhook when left empty) through the external
/// CI/CD deployer.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "deploy.theatre.io",
    version = "v1alpha1",
    kind = "Rollback",
    plural = "rollbacks",
    derive = "PartialEq",
    status = "RollbackStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.phase\", \"name\": \"PHASE\", \"type\": \"string\" }")]
pub struct RollbackSpec {
    pub release_ref: String,

    #[serde(default)]
    pub to_release_ref: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, Default)]
pub enum RollbackPhase {
    #[default]
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct RollbackStatus {
    pub phase: RollbackPhase,

    #[serde(default)]
    pub attempt_count: u32,

    pub deployment_id: Option<String>,

    pub deployment_url: Option<String>,

    pub message: Option<String>,

    /// Bounded ring of past deployment ids for this rollback (default
    /// length 10), same rationale as [`crate::release::ReleaseStatus::history`].
    #[serde(default)]
    pub history: Vec<String>,
}
