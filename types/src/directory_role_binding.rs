use k8s_openapi::api::rbac::v1::{RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An embedded RoleBinding whose subjects may include kind `"Group"`,
/// resolved at reconcile time via [`theatre_directory::Directory`].
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "rbac.theatre.io",
    version = "v1alpha1",
    kind = "DirectoryRoleBinding",
    plural = "directoryrolebindings",
    derive = "PartialEq",
    status = "DirectoryRoleBindingStatus",
    namespaced
)]
#[kube(derive = "Default")]
pub struct DirectoryRoleBindingSpec {
    pub role_ref: RoleRef,

    #[serde(default)]
    pub subjects: Vec<Subject>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct DirectoryRoleBindingStatus {
    #[serde(default)]
    pub resolved_subject_count: u32,

    pub last_refresh_time: Option<Time>,

    pub message: Option<String>,
}

/// Kind used by [`DirectoryRoleBindingSpec::subjects`] to mark a subject
/// that must be resolved via the directory rather than passed through.
pub const GROUP_SUBJECT_KIND: &str = "Group";
