use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::rbac::v1::{RoleBinding, Subject};
use kube::api::{DeleteParams, ObjectMeta, Patch, PatchParams, PropagationPolicy};
use kube::{Api, Client, Resource, ResourceExt};
use theatre_audit::{
    AuthorisePayload, ContainerStatusSummary, EventEnvelope, LifecycleEvent, LifecycleEventSink,
    RequestPayload, StartPayload, TerminatePayload,
};
use theatre_directory::Directory;
use theatre_types::{Console, ConsoleAuthorisation, ConsoleAuthorisationSpec, ConsoleTemplate, ConsoleTemplateSpec};

use crate::util::{Error, MANAGER_NAME, patch::patch_status};

use super::job::build_job;
use super::rbac::{
    authorisation_role_name, build_authorisation_role, build_authorisation_role_binding,
    build_service_role, build_service_role_binding, build_user_directory_role_binding,
    build_user_role, build_user_role_binding, service_role_name, user_role_name, user_subjects,
};

fn namespace(console: &Console) -> Result<String, Error> {
    console
        .namespace()
        .ok_or_else(|| Error::UserInput("Console is missing metadata.namespace".to_string()))
}

/// Patches the Console's owner reference to its ConsoleTemplate, if not
/// already set, so that deleting the template cascades.
pub async fn ensure_owner_ref(
    client: Client,
    console: &Console,
    template: &ConsoleTemplate,
) -> Result<(), Error> {
    let ns = namespace(console)?;
    let name = console.name_any();
    let already_owned = console
        .owner_references()
        .iter()
        .any(|o| o.kind == "ConsoleTemplate" && o.name == template.name_any());
    if already_owned {
        return Ok(());
    }
    let owner_ref = template
        .controller_owner_ref(&())
        .ok_or_else(|| Error::UserInput("ConsoleTemplate missing uid".to_string()))?;
    let api: Api<Console> = Api::namespaced(client, &ns);
    let patch = Patch::Merge(serde_json::json!({
        "metadata": { "ownerReferences": [owner_ref] }
    }));
    api.patch(&name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await?;
    Ok(())
}

pub fn authorisation_name(console_name: &str) -> String {
    format!("{console_name}-authorisation")
}

/// Creates the ConsoleAuthorisation and its (non-pod-bound) RBAC as soon
/// as the Console enters `PendingAuthorisation`. Idempotent via
/// server-side apply, so a repeated call just converges.
pub async fn ensure_authorisation(
    client: Client,
    console: &Console,
    candidate_authorisers: Vec<Subject>,
) -> Result<(), Error> {
    let ns = namespace(console)?;
    let console_name = console.name_any();
    let auth_name = authorisation_name(&console_name);
    let owner_ref = console
        .controller_owner_ref(&())
        .ok_or_else(|| Error::UserInput("Console missing uid".to_string()))?;

    let auth = ConsoleAuthorisation {
        metadata: ObjectMeta {
            name: Some(auth_name.clone()),
            namespace: Some(ns.clone()),
            owner_references: Some(vec![owner_ref.clone()]),
            ..Default::default()
        },
        spec: ConsoleAuthorisationSpec {
            console_ref: console_name.clone(),
            authorisations: vec![],
        },
    };
    let auth_api: Api<ConsoleAuthorisation> = Api::namespaced(client.clone(), &ns);
    apply(&auth_api, &auth_name, &auth).await?;

    let role_name = authorisation_role_name(&console_name);
    let role = build_authorisation_role(
        meta(&role_name, &ns, vec![owner_ref.clone()]),
        &auth_name,
    );
    let role_api: Api<k8s_openapi::api::rbac::v1::Role> = Api::namespaced(client.clone(), &ns);
    apply(&role_api, &role_name, &role).await?;

    let binding = build_authorisation_role_binding(
        meta(&role_name, &ns, vec![owner_ref]),
        &role_name,
        candidate_authorisers,
    );
    let binding_api: Api<RoleBinding> = Api::namespaced(client, &ns);
    apply(&binding_api, &role_name, &binding).await?;
    Ok(())
}

/// Creates the Job on the transition that first requires it. Returns its
/// `creationTimestamp`, used to fix `expiryTime` once.
pub async fn create_job(
    client: Client,
    console: &Console,
    template: &ConsoleTemplateSpec,
    command: &[String],
) -> Result<DateTime<Utc>, Error> {
    let ns = namespace(console)?;
    let console_name = console.name_any();
    let owner_ref = console
        .controller_owner_ref(&())
        .ok_or_else(|| Error::UserInput("Console missing uid".to_string()))?;
    let job = build_job(
        &console_name,
        vec![owner_ref],
        &ns,
        template,
        command,
        console.spec.noninteractive,
        &console.spec.user,
        console.spec.timeout_seconds,
    );
    let name = job.name_any();
    let api: Api<Job> = Api::namespaced(client, &ns);
    let created = apply(&api, &name, &job).await?;
    created
        .creation_timestamp()
        .map(|t| t.0)
        .ok_or_else(|| Error::UserInput("Job has no creationTimestamp after create".to_string()))
}

/// Provisions the pod-name-bound user (and optional service) RBAC once a
/// Pod has been observed. Only called on the `Pending -> Running`
/// transition.
pub async fn provision_pod_rbac(
    client: Client,
    console: &Console,
    template: &ConsoleTemplateSpec,
    pod_name: &str,
    authorisers: Vec<Subject>,
    directory_enabled: bool,
    pod_service_account: Option<&str>,
) -> Result<(), Error> {
    let ns = namespace(console)?;
    let console_name = console.name_any();
    let owner_ref = console
        .controller_owner_ref(&())
        .ok_or_else(|| Error::UserInput("Console missing uid".to_string()))?;

    let role_name = user_role_name(&console_name);
    let role = build_user_role(meta(&role_name, &ns, vec![owner_ref.clone()]), pod_name);
    let role_api: Api<k8s_openapi::api::rbac::v1::Role> = Api::namespaced(client.clone(), &ns);
    apply(&role_api, &role_name, &role).await?;

    let subjects = user_subjects(&console.spec.user, template, &authorisers);
    if directory_enabled {
        let binding = build_user_directory_role_binding(
            meta(&role_name, &ns, vec![owner_ref.clone()]),
            &role_name,
            subjects,
        );
        let api: Api<theatre_types::DirectoryRoleBinding> = Api::namespaced(client.clone(), &ns);
        apply(&api, &role_name, &binding).await?;
    } else {
        let binding = build_user_role_binding(
            meta(&role_name, &ns, vec![owner_ref.clone()]),
            &role_name,
            subjects,
        );
        let api: Api<RoleBinding> = Api::namespaced(client.clone(), &ns);
        apply(&api, &role_name, &binding).await?;
    }

    if let Some(service_account) = pod_service_account {
        let svc_role_name = service_role_name(&console_name);
        let svc_role = build_service_role(meta(&svc_role_name, &ns, vec![owner_ref.clone()]), pod_name);
        let svc_role_api: Api<k8s_openapi::api::rbac::v1::Role> = Api::namespaced(client.clone(), &ns);
        apply(&svc_role_api, &svc_role_name, &svc_role).await?;

        let svc_binding = build_service_role_binding(
            meta(&svc_role_name, &ns, vec![owner_ref]),
            &svc_role_name,
            service_account,
            &ns,
        );
        let svc_binding_api: Api<RoleBinding> = Api::namespaced(client, &ns);
        apply(&svc_binding_api, &svc_role_name, &svc_binding).await?;
    }
    Ok(())
}

/// Abort path: delete the Job and best-effort delete every observed Pod,
/// then set phase to `Stopped` with `podName` cleared. Must not requeue —
/// the deletions re-trigger reconciliation.
pub async fn abort(
    client: Client,
    console: &Console,
    job_name: &str,
    pod_names: &[String],
) -> Result<(), Error> {
    let ns = namespace(console)?;
    let job_api: Api<Job> = Api::namespaced(client.clone(), &ns);
    let dp = DeleteParams {
        propagation_policy: Some(PropagationPolicy::Background),
        ..Default::default()
    };
    match job_api.delete(job_name, &dp).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(e.into()),
    }
    let pod_api: Api<Pod> = Api::namespaced(client.clone(), &ns);
    for pod_name in pod_names {
        match pod_api.delete(pod_name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
    }
    patch_status::<theatre_types::ConsoleStatus, Console>(client, console, |status| {
        status.phase = theatre_types::ConsolePhase::Stopped;
        status.pod_name = String::new();
    })
    .await?;
    Ok(())
}

pub async fn delete_console(client: Client, console: &Console) -> Result<(), Error> {
    let ns = namespace(console)?;
    let api: Api<Console> = Api::namespaced(client, &ns);
    let dp = DeleteParams {
        propagation_policy: Some(PropagationPolicy::Background),
        ..Default::default()
    };
    match api.delete(&console.name_any(), &dp).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn publish(sink: &Arc<dyn LifecycleEventSink>, envelope: EventEnvelope) {
    if let Err(e) = sink.publish(envelope).await {
        eprintln!("⚠️  lifecycle event publish failed (non-fatal): {e}");
    }
}

pub fn request_event(id: String, ns: &str, console: &Console) -> EventEnvelope {
    EventEnvelope::new(
        id,
        LifecycleEvent::Request(RequestPayload {
            namespace: ns.to_string(),
            console_name: console.name_any(),
            user: console.spec.user.clone(),
            reason: console.spec.reason.clone(),
        }),
    )
}

pub fn authorise_event(id: String, ns: &str, console_name: &str, authorised_by: Vec<String>) -> EventEnvelope {
    EventEnvelope::new(
        id,
        LifecycleEvent::Authorise(AuthorisePayload {
            namespace: ns.to_string(),
            console_name: console_name.to_string(),
            authorised_by,
        }),
    )
}

pub fn start_event(id: String, ns: &str, console_name: &str, pod_name: &str) -> EventEnvelope {
    EventEnvelope::new(
        id,
        LifecycleEvent::Start(StartPayload {
            namespace: ns.to_string(),
            console_name: console_name.to_string(),
            pod_name: pod_name.to_string(),
        }),
    )
}

pub fn terminate_event(
    id: String,
    ns: &str,
    console_name: &str,
    timed_out: bool,
    container_statuses: Vec<ContainerStatusSummary>,
) -> EventEnvelope {
    EventEnvelope::new(
        id,
        LifecycleEvent::Terminate(TerminatePayload {
            namespace: ns.to_string(),
            console_name: console_name.to_string(),
            timed_out,
            container_statuses,
        }),
    )
}

/// Resolves `subject: Group` entries against the directory, otherwise
/// returns the subjects unchanged. Used to assemble the candidate
/// authoriser list shown to the authorisation RoleBinding.
pub async fn resolve_candidate_authorisers(
    directory: Option<&Arc<dyn Directory>>,
    subjects: &[Subject],
) -> Result<Vec<Subject>, Error> {
    match directory {
        Some(directory) => Ok(theatre_directory::resolve_subjects(directory.as_ref(), subjects).await?),
        None => Ok(subjects.to_vec()),
    }
}

fn meta(name: &str, namespace: &str, owner_references: Vec<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        owner_references: Some(owner_references),
        ..Default::default()
    }
}

/// Server-side apply convenience: converges the object to the desired
/// state whether it already exists or not, matching the "recreated if
/// drifted" invariant the access-control children carry.
async fn apply<K>(api: &Api<K>, name: &str, desired: &K) -> Result<K, kube::Error>
where
    K: Clone
        + std::fmt::Debug
        + serde::Serialize
        + serde::de::DeserializeOwned
        + kube::Resource,
{
    let patch = Patch::Apply(desired);
    api.patch(name, &PatchParams::apply(MANAGER_NAME).force(), &patch)
        .await
}
