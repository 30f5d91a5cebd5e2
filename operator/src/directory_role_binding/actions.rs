use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use kube::api::ObjectMeta;

/// Builds the concrete `RoleBinding` a `DirectoryRoleBinding` materialises,
/// carrying the already-resolved (group-free) subject list.
pub fn build_role_binding(meta: ObjectMeta, role_ref: RoleRef, subjects: Vec<Subject>) -> RoleBinding {
    RoleBinding {
        metadata: meta,
        role_ref,
        subjects: Some(subjects),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_role_binding_with_given_subjects() {
        let role_ref = RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: "r".to_string(),
        };
        let subjects = vec![Subject {
            kind: "User".to_string(),
            name: "alice".to_string(),
            ..Default::default()
        }];
        let rb = build_role_binding(ObjectMeta::default(), role_ref, subjects.clone());
        assert_eq!(rb.subjects, Some(subjects));
    }
}
