use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One component of a Release's build, identified by name with an opaque id
/// (e.g. a git SHA or image digest) supplied by the caller.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Revision {
    pub name: String,
    pub id: String,
}

/// Back-reference to the release a Release superseded, walked defensively
/// by the rollback-target webhook with a visited set to guard against
/// cycles.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct PreviousRelease {
    pub release_ref: Option<String>,
}

/// Models an application release. At most one Release per `targetName` in
/// a namespace carries an `Active=True` condition at any time.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "deploy.theatre.io",
    version = "v1alpha1",
    kind = "Release",
    plural = "releases",
    derive = "PartialEq",
    status = "ReleaseStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(printcolumn = "{\"jsonPath\": \".status.name\", \"name\": \"NAME\", \"type\": \"string\" }")]
pub struct ReleaseSpec {
    pub target_name: String,

    #[serde(default)]
    pub revisions: Vec<Revision>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ReleaseStatus {
    /// Derived deterministically from `spec` by
    /// [`crate::naming::release_name`]; mirrored here for display.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub previous_release: PreviousRelease,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Bounded ring of past release refs for this target (default length
    /// 10, see [`crate::history`]).
    #[serde(default)]
    pub history: Vec<String>,

    /// Handle of the deployment that produced this release, if one was
    /// triggered through `theatre-deployer`. Polled by the reconciler to
    /// derive the `Healthy` condition; absent for releases recorded
    /// without a tracked deployment, which default to healthy until
    /// proven otherwise.
    #[serde(default)]
    pub deployment_id: Option<String>,
}

pub const CONDITION_ACTIVE: &str = "Active";
pub const CONDITION_HEALTHY: &str = "Healthy";

/// Reads a named condition's `status` field, if present.
pub fn condition_true(conditions: &[Condition], type_: &str) -> bool {
    conditions
        .iter()
        .find(|c| c.type_ == type_)
        .is_some_and(|c| c.status == "True")
}
