use k8s_openapi::api::rbac::v1::Subject;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An append-only record of approvals for a specific Console. Enforced
/// append-only by the `/validate-consoleauthorisations` webhook, not by
/// the reconciler.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "workloads.theatre.io",
    version = "v1alpha1",
    kind = "ConsoleAuthorisation",
    plural = "consoleauthorisations",
    derive = "PartialEq",
    namespaced
)]
#[kube(derive = "Default")]
pub struct ConsoleAuthorisationSpec {
    pub console_ref: String,

    #[serde(default)]
    pub authorisations: Vec<Subject>,
}

/// Returns `Ok(())` when `new` is `old` plus exactly one appended subject,
/// mirroring the invariant the admission webhook enforces at write time.
/// Used both by the webhook and by its unit tests.
pub fn is_single_append(old: &[Subject], new: &[Subject]) -> Result<Subject, String> {
    if new.len() != old.len() + 1 {
        return Err(format!(
            "expected exactly one appended authorisation, old had {} and new has {}",
            old.len(),
            new.len()
        ));
    }
    for (a, b) in old.iter().zip(new.iter()) {
        if a.kind != b.kind || a.name != b.name || a.namespace != b.namespace {
            return Err("existing authorisations must not be modified".to_string());
        }
    }
    Ok(new[new.len() - 1].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(name: &str) -> Subject {
        Subject {
            kind: "User".to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_single_append() {
        let old = vec![subject("alice")];
        let new = vec![subject("alice"), subject("bob")];
        let appended = is_single_append(&old, &new).unwrap();
        assert_eq!(appended.name, "bob");
    }

    #[test]
    fn rejects_reorder_or_mutation() {
        let old = vec![subject("alice")];
        let new = vec![subject("mallory"), subject("bob")];
        assert!(is_single_append(&old, &new).is_err());
    }

    #[test]
    fn rejects_multiple_appends() {
        let old = vec![];
        let new = vec![subject("alice"), subject("bob")];
        assert!(is_single_append(&old, &new).is_err());
    }

    #[test]
    fn rejects_truncation() {
        let old = vec![subject("alice"), subject("bob")];
        let new = vec![subject("alice")];
        assert!(is_single_append(&old, &new).is_err());
    }
}
