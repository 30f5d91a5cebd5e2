use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::api::ObjectMeta;
use theatre_types::console_template::ConsoleTemplateSpec;
use theatre_types::labels::{LABEL_CONSOLE_NAME, LABEL_USER, sanitise_label_value};

use super::phase::job_name;

/// Builds the Job this Console owns. Only called once, on the
/// reconciliation that moves the Console out of `PendingAuthorisation`
/// (or straight out of creation when no authorisation is required).
pub fn build_job(
    console_name: &str,
    owner_references: Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference>,
    namespace: &str,
    template: &ConsoleTemplateSpec,
    command: &[String],
    noninteractive: bool,
    user: &str,
    timeout_seconds: i64,
) -> Job {
    let mut pod_template: PodTemplateSpec = template.template.clone();
    let mut pod_spec = pod_template.spec.clone().unwrap_or_default();

    if pod_spec.containers.len() > 1 {
        eprintln!(
            "⚠️  console {console_name}: template has {} containers, only the first is used",
            pod_spec.containers.len()
        );
    }
    pod_spec.containers.truncate(1);
    if let Some(container) = pod_spec.containers.first_mut() {
        if !command.is_empty() {
            container.command = Some(command.to_vec());
            container.args = None;
        }
        if !noninteractive {
            container.stdin = Some(true);
            container.tty = Some(true);
        }
    }
    pod_spec.restart_policy = Some("Never".to_string());

    let labels = forced_labels(&pod_template.metadata, console_name, user);
    pod_template.metadata.get_or_insert_with(Default::default).labels = Some(labels.clone());
    pod_template.spec = Some(pod_spec);

    Job {
        metadata: ObjectMeta {
            name: Some(job_name(console_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            owner_references: Some(owner_references),
            ..Default::default()
        },
        spec: Some(JobSpec {
            template: pod_template,
            backoff_limit: Some(0),
            completions: Some(1),
            parallelism: Some(1),
            active_deadline_seconds: Some(timeout_seconds),
            ..Default::default()
        }),
        status: None,
    }
}

/// Template labels overlaid with console labels, then `console-name` and
/// `user` are forced to the controller-computed, sanitised values —
/// these two keys always win regardless of what the template set.
fn forced_labels(
    template_meta: &Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta>,
    console_name: &str,
    user: &str,
) -> BTreeMap<String, String> {
    let mut labels = template_meta
        .as_ref()
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    labels.insert(
        LABEL_CONSOLE_NAME.to_string(),
        sanitise_label_value(console_name),
    );
    labels.insert(LABEL_USER.to_string(), sanitise_label_value(user));
    labels
}

/// `expiryTime` per §4.1: fixed at Job creation, `jobCreationTime +
/// timeoutSeconds`, never recomputed afterwards.
pub fn job_expiry(job_creation_time: DateTime<Utc>, timeout_seconds: i64) -> DateTime<Utc> {
    super::phase::expiry_time(job_creation_time, timeout_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};

    fn template(containers: Vec<Container>) -> ConsoleTemplateSpec {
        ConsoleTemplateSpec {
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }
    }

    #[test]
    fn truncates_to_first_container_on_multi_container_template() {
        let template = template(vec![
            Container {
                name: "main".to_string(),
                ..Default::default()
            },
            Container {
                name: "sidecar".to_string(),
                ..Default::default()
            },
        ]);
        let job = build_job(
            "c1",
            vec![],
            "ns",
            &template,
            &[],
            false,
            "alice",
            3600,
        );
        let spec = job.spec.unwrap();
        let pod_spec = spec.template.spec.unwrap();
        assert_eq!(pod_spec.containers.len(), 1);
        assert_eq!(pod_spec.containers[0].name, "main");
    }

    #[test]
    fn overrides_command_when_spec_command_set() {
        let template = template(vec![Container {
            name: "main".to_string(),
            command: Some(vec!["bash".to_string()]),
            ..Default::default()
        }]);
        let job = build_job(
            "c1",
            vec![],
            "ns",
            &template,
            &["psql".to_string()],
            true,
            "alice",
            3600,
        );
        let container = &job.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(container.command, Some(vec!["psql".to_string()]));
    }

    #[test]
    fn sets_stdin_tty_when_interactive() {
        let template = template(vec![Container {
            name: "main".to_string(),
            ..Default::default()
        }]);
        let job = build_job("c1", vec![], "ns", &template, &[], false, "alice", 3600);
        let container = &job.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(container.stdin, Some(true));
        assert_eq!(container.tty, Some(true));
    }

    #[test]
    fn forces_console_name_and_user_labels() {
        let template = template(vec![Container {
            name: "main".to_string(),
            ..Default::default()
        }]);
        let job = build_job("My Console!", vec![], "ns", &template, &[], true, "a@b.com", 3600);
        let labels = job.metadata.labels.unwrap();
        assert_eq!(labels.get(LABEL_CONSOLE_NAME).unwrap(), "My-Console-");
        assert_eq!(labels.get(LABEL_USER).unwrap(), "a-b.com");
    }

    #[test]
    fn job_spec_has_correct_constants() {
        let template = template(vec![Container {
            name: "main".to_string(),
            ..Default::default()
        }]);
        let job = build_job("c1", vec![], "ns", &template, &[], true, "alice", 60);
        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(0));
        assert_eq!(spec.completions, Some(1));
        assert_eq!(spec.parallelism, Some(1));
        assert_eq!(spec.active_deadline_seconds, Some(60));
        assert_eq!(
            spec.template.spec.unwrap().restart_policy,
            Some("Never".to_string())
        );
    }
}
