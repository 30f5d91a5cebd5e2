use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use kube::api::ObjectMeta;
use theatre_types::{ConsoleTemplateSpec, DirectoryRoleBinding, DirectoryRoleBindingSpec};

/// Name of the Role/RoleBinding pair granting the submitter (and any
/// co-authorisers) `exec`/`attach`/`log`/`get`/`delete` on the Console's
/// pod, scoped by `resourceNames` to the one concrete pod name. Created
/// only once `status.podName` is known (§4.1 "RBAC provisioning").
pub fn user_role_name(console_name: &str) -> String {
    format!("{console_name}-console")
}

pub fn authorisation_role_name(console_name: &str) -> String {
    format!("{console_name}-authorisation")
}

pub fn service_role_name(console_name: &str) -> String {
    format!("{console_name}-console-service")
}

/// Grants `create` on `pods/exec`/`pods/attach`, `get` on `pods/log`, and
/// `get`/`delete` on the pod itself, all scoped to `pod_name`.
pub fn build_user_role(meta: ObjectMeta, pod_name: &str) -> Role {
    Role {
        metadata: meta,
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec!["".to_string()]),
                resources: Some(vec!["pods/exec".to_string(), "pods/attach".to_string()]),
                verbs: vec!["create".to_string()],
                resource_names: Some(vec![pod_name.to_string()]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["".to_string()]),
                resources: Some(vec!["pods/log".to_string()]),
                verbs: vec!["get".to_string()],
                resource_names: Some(vec![pod_name.to_string()]),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["".to_string()]),
                resources: Some(vec!["pods".to_string()]),
                verbs: vec!["get".to_string(), "delete".to_string()],
                resource_names: Some(vec![pod_name.to_string()]),
                ..Default::default()
            },
        ]),
    }
}

/// Assembles the subject list for the user RoleBinding: the submitter,
/// the template's `additionalAttachSubjects`, and everyone who has
/// authorised. Order is preserved and duplicates (by kind/name/namespace)
/// are left to [`theatre_directory::resolve_subjects`] when a
/// [`DirectoryRoleBinding`] is used; a plain [`RoleBinding`] does not dedupe
/// since it never expands groups.
pub fn user_subjects(
    user: &str,
    template: &ConsoleTemplateSpec,
    authorisers: &[Subject],
) -> Vec<Subject> {
    let mut subjects = vec![Subject {
        kind: "User".to_string(),
        name: user.to_string(),
        ..Default::default()
    }];
    subjects.extend(template.additional_attach_subjects.iter().cloned());
    subjects.extend(authorisers.iter().cloned());
    subjects
}

pub fn build_user_role_binding(meta: ObjectMeta, role_name: &str, subjects: Vec<Subject>) -> RoleBinding {
    RoleBinding {
        metadata: meta,
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: role_name.to_string(),
        },
        subjects: Some(subjects),
    }
}

/// Builds the directory-aware variant, used iff directory integration is
/// enabled; subjects of kind `"Group"` are resolved to users at reconcile
/// time by the `DirectoryRoleBinding` reconciler rather than here.
pub fn build_user_directory_role_binding(
    meta: ObjectMeta,
    role_name: &str,
    subjects: Vec<Subject>,
) -> DirectoryRoleBinding {
    DirectoryRoleBinding {
        metadata: meta,
        spec: DirectoryRoleBindingSpec {
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: role_name.to_string(),
            },
            subjects,
        },
        status: None,
    }
}

/// Grants `get` on the specific pod to its own service account, so a
/// sidecar in the pod can observe the pod's own status (session
/// recording). Optional: only built when the template names a service
/// account on the pod template.
pub fn build_service_role(meta: ObjectMeta, pod_name: &str) -> Role {
    Role {
        metadata: meta,
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["pods".to_string()]),
            verbs: vec!["get".to_string()],
            resource_names: Some(vec![pod_name.to_string()]),
            ..Default::default()
        }]),
    }
}

pub fn build_service_role_binding(
    meta: ObjectMeta,
    role_name: &str,
    service_account: &str,
    namespace: &str,
) -> RoleBinding {
    RoleBinding {
        metadata: meta,
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: role_name.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: service_account.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Grants `get`/`update` on the one ConsoleAuthorisation this Console
/// owns, so candidate authorisers can append themselves. Not pod-name
/// bound, so it is created as soon as the Console enters
/// `PendingAuthorisation`, unlike the user/service Roles above.
pub fn build_authorisation_role(meta: ObjectMeta, authorisation_name: &str) -> Role {
    Role {
        metadata: meta,
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["workloads.theatre.io".to_string()]),
            resources: Some(vec!["consoleauthorisations".to_string()]),
            verbs: vec!["get".to_string(), "update".to_string()],
            resource_names: Some(vec![authorisation_name.to_string()]),
            ..Default::default()
        }]),
    }
}

pub fn build_authorisation_role_binding(
    meta: ObjectMeta,
    role_name: &str,
    candidate_authorisers: Vec<Subject>,
) -> RoleBinding {
    RoleBinding {
        metadata: meta,
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: role_name.to_string(),
        },
        subjects: Some(candidate_authorisers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theatre_types::AuthorisationRule;

    fn subject(name: &str) -> Subject {
        Subject {
            kind: "User".to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn user_subjects_orders_submitter_then_attach_then_authorisers() {
        let template = ConsoleTemplateSpec {
            additional_attach_subjects: vec![subject("oncall")],
            ..Default::default()
        };
        let subjects = user_subjects("alice", &template, &[subject("bob")]);
        let names: Vec<_> = subjects.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "oncall", "bob"]);
    }

    #[test]
    fn user_role_scopes_every_rule_to_the_pod_name() {
        let role = build_user_role(ObjectMeta::default(), "my-pod");
        for rule in role.rules.unwrap() {
            assert_eq!(rule.resource_names, Some(vec!["my-pod".to_string()]));
        }
    }

    #[test]
    fn authorisation_role_name_is_stable() {
        assert_eq!(
            authorisation_role_name("c1"),
            format!("{}-authorisation", "c1")
        );
        let _ = AuthorisationRule {
            matcher: theatre_types::CommandMatcher::Any,
            required: 1,
            subjects: vec![],
        };
    }
}
