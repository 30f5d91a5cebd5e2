use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::api::rbac::v1::Subject;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::command_matcher::CommandMatcher;

fn default_default_timeout_seconds() -> i64 {
    3600
}

fn default_max_timeout_seconds() -> i64 {
    21600
}

/// A `(command-matcher, required-count, subject-set)` triple selecting gate
/// policy per command.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct AuthorisationRule {
    pub matcher: CommandMatcher,

    #[serde(default)]
    pub required: u32,

    /// Subjects permitted to satisfy this rule's approvals. Informational:
    /// the reconciler counts approvals without re-validating identity,
    /// since that was already enforced once, at write time, by the
    /// authorisation webhook.
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

/// A cluster-provided recipe for Consoles: a pod template, default/max
/// timeouts, attach subjects, and the ordered authorisation rule list.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "workloads.theatre.io",
    version = "v1alpha1",
    kind = "ConsoleTemplate",
    plural = "consoletemplates",
    derive = "PartialEq",
    namespaced
)]
#[kube(derive = "Default")]
pub struct ConsoleTemplateSpec {
    pub template: PodTemplateSpec,

    #[serde(default)]
    pub default_command: Vec<String>,

    #[serde(default = "default_default_timeout_seconds")]
    pub default_timeout_seconds: i64,

    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: i64,

    #[serde(default)]
    pub additional_attach_subjects: Vec<Subject>,

    #[serde(default)]
    pub default_authorisation_rule: Option<AuthorisationRule>,

    #[serde(default)]
    pub authorisation_rules: Vec<AuthorisationRule>,
}

impl ConsoleTemplateSpec {
    /// Selects the rule governing `command` by matching in declaration
    /// order, falling back to `defaultAuthorisationRule`. Returns `None`
    /// when neither matches, meaning no approval is required.
    pub fn select_rule(&self, command: &[String]) -> Option<&AuthorisationRule> {
        self.authorisation_rules
            .iter()
            .find(|rule| rule.matcher.matches(command))
            .or(self.default_authorisation_rule.as_ref())
    }

    /// Whether `authorisationRules` contains two rules with identical
    /// matchers, which would make rule selection ambiguous. Used by the
    /// `/validate-consoletemplates` webhook.
    pub fn has_duplicate_matchers(&self) -> bool {
        let mut seen = Vec::with_capacity(self.authorisation_rules.len());
        for rule in &self.authorisation_rules {
            if seen.contains(&&rule.matcher) {
                return true;
            }
            seen.push(&rule.matcher);
        }
        false
    }

    /// Resolves `spec.timeoutSeconds` against this template's
    /// `defaultTimeoutSeconds`/`maxTimeoutSeconds`: an unset or
    /// non-positive request falls back to the default, anything above
    /// the max is clamped down to it. Used by the Console authenticator
    /// webhook so the stamped timeout always satisfies the template's
    /// bounds.
    pub fn effective_timeout_seconds(&self, requested: i64) -> i64 {
        let requested = if requested <= 0 {
            self.default_timeout_seconds
        } else {
            requested
        };
        requested.min(self.max_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(matcher: CommandMatcher, required: u32) -> AuthorisationRule {
        AuthorisationRule {
            matcher,
            required,
            subjects: vec![],
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let spec = ConsoleTemplateSpec {
            authorisation_rules: vec![
                rule(CommandMatcher::Exact("psql".to_string()), 2),
                rule(CommandMatcher::Any, 1),
            ],
            default_authorisation_rule: Some(rule(CommandMatcher::Any, 9)),
            ..Default::default()
        };
        let selected = spec
            .select_rule(&["psql".to_string()])
            .expect("a rule matches");
        assert_eq!(selected.required, 2);
    }

    #[test]
    fn falls_back_to_default_rule() {
        let spec = ConsoleTemplateSpec {
            authorisation_rules: vec![rule(CommandMatcher::Exact("psql".to_string()), 2)],
            default_authorisation_rule: Some(rule(CommandMatcher::Any, 1)),
            ..Default::default()
        };
        let selected = spec
            .select_rule(&["bash".to_string()])
            .expect("falls back to default");
        assert_eq!(selected.required, 1);
    }

    #[test]
    fn no_rule_means_no_approval_required() {
        let spec = ConsoleTemplateSpec::default();
        assert!(spec.select_rule(&["bash".to_string()]).is_none());
    }

    #[test]
    fn detects_duplicate_matchers() {
        let spec = ConsoleTemplateSpec {
            authorisation_rules: vec![
                rule(CommandMatcher::Exact("psql".to_string()), 1),
                rule(CommandMatcher::Exact("psql".to_string()), 2),
            ],
            ..Default::default()
        };
        assert!(spec.has_duplicate_matchers());
    }

    #[test]
    fn distinct_matchers_are_not_duplicates() {
        let spec = ConsoleTemplateSpec {
            authorisation_rules: vec![
                rule(CommandMatcher::Exact("psql".to_string()), 1),
                rule(CommandMatcher::Any, 2),
            ],
            ..Default::default()
        };
        assert!(!spec.has_duplicate_matchers());
    }

    fn timeouts_spec() -> ConsoleTemplateSpec {
        ConsoleTemplateSpec {
            default_timeout_seconds: 3600,
            max_timeout_seconds: 21600,
            ..Default::default()
        }
    }

    #[test]
    fn unset_timeout_falls_back_to_default() {
        let spec = timeouts_spec();
        assert_eq!(spec.effective_timeout_seconds(0), 3600);
        assert_eq!(spec.effective_timeout_seconds(-1), 3600);
    }

    #[test]
    fn in_range_timeout_passes_through() {
        let spec = timeouts_spec();
        assert_eq!(spec.effective_timeout_seconds(1800), 1800);
    }

    #[test]
    fn over_max_timeout_is_clamped() {
        let spec = timeouts_spec();
        assert_eq!(spec.effective_timeout_seconds(100_000), 21600);
    }
}
