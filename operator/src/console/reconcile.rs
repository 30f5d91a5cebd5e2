use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::rbac::v1::Subject;
use kube::{
    Api, Resource, ResourceExt,
    client::Client,
    runtime::{Controller, controller::Action},
};
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use theatre_audit::{ContainerStatusSummary, LifecycleEventSink};
use theatre_directory::Directory;
use theatre_types::{Console, ConsoleAuthorisation, ConsolePhase, ConsoleStatus, ConsoleTemplate};
use tokio::{sync::Mutex, time::Duration};
use tokio_util::sync::CancellationToken;

use super::actions;
use super::phase::{self, JobObservation, PodObservation};
use crate::util::{
    Error, PROBE_INTERVAL,
    colors::{FG1, FG2},
    patch::{HasStatus, patch_status},
};

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

impl HasStatus<ConsoleStatus> for Console {
    fn mut_status(&mut self) -> &mut ConsoleStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

/// Knobs sourced from CLI flags at startup, held for the lifetime of the
/// controller rather than threaded through every call.
pub struct Config {
    pub directory_enabled: bool,
    pub cluster_context: String,
}

struct ContextData {
    client: Client,
    audit: Arc<dyn LifecycleEventSink>,
    directory: Option<Arc<dyn Directory>>,
    config: Config,
    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
    last_action: Mutex<HashMap<(String, String), (ConsoleAction, Instant)>>,
}

impl ContextData {
    fn new(
        client: Client,
        audit: Arc<dyn LifecycleEventSink>,
        directory: Option<Arc<dyn Directory>>,
        config: Config,
    ) -> Self {
        ContextData {
            client,
            audit,
            directory,
            config,
            #[cfg(feature = "metrics")]
            metrics: ControllerMetrics::new("console"),
            last_action: Mutex::new(HashMap::new()),
        }
    }
}

/// Action to take for a `Console` during one reconciliation. Produced by
/// the pure read phase ([`determine_action`]) and executed by the write
/// phase in [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
enum ConsoleAction {
    /// First observation of a freshly created Console.
    Request { required: u32 },
    /// Waiting on approvals; not yet past the GC deadline.
    AwaitAuthorisation,
    /// Enough approvals have landed; still need to create the Job.
    Authorise { authorised_by: Vec<String> },
    /// Authorisation requirement (if any) is already satisfied; Job is missing.
    Start,
    /// Job exists and is running but no Pod is running yet.
    AwaitPod,
    /// Pod is running for the first time this Console has seen.
    BecomePodRunning { pod_name: String },
    /// Already running, nothing changed.
    StillRunning,
    /// Job finished or expired.
    BecomeStopped { timed_out: bool },
    /// Job disappeared out from under a Pending/Running Console.
    BecomeDestroyed,
    /// More than one Pod observed, or the Pod's identity drifted.
    Abort { pod_names: Vec<String> },
    /// Past the finished-state TTL; delete the Console.
    GarbageCollect,
    /// Past the pending-authorisation TTL without ever being authorised.
    GarbageCollectUnauthorised,
    /// Already in a stable, non-terminal state; just requeue.
    NoOp,
}

impl ConsoleAction {
    fn to_str(&self) -> &str {
        match self {
            ConsoleAction::Request { .. } => "Request",
            ConsoleAction::AwaitAuthorisation => "AwaitAuthorisation",
            ConsoleAction::Authorise { .. } => "Authorise",
            ConsoleAction::Start => "Start",
            ConsoleAction::AwaitPod => "AwaitPod",
            ConsoleAction::BecomePodRunning { .. } => "BecomePodRunning",
            ConsoleAction::StillRunning => "StillRunning",
            ConsoleAction::BecomeStopped { .. } => "BecomeStopped",
            ConsoleAction::BecomeDestroyed => "BecomeDestroyed",
            ConsoleAction::Abort { .. } => "Abort",
            ConsoleAction::GarbageCollect => "GarbageCollect",
            ConsoleAction::GarbageCollectUnauthorised => "GarbageCollectUnauthorised",
            ConsoleAction::NoOp => "NoOp",
        }
    }
}

/// Everything the read phase needed to look up, bundled so the write
/// phase doesn't have to re-fetch it.
struct ReconcileContext {
    template: ConsoleTemplate,
    command: Vec<String>,
    granted: Vec<Subject>,
    required: u32,
    job: JobObservation,
    pod: PodObservation,
    pod_detail: Option<Pod>,
    pod_service_account: Option<String>,
    now: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

/// Entrypoint for the Console controller: acquire-or-renew leader
/// election, spawning the `kube_runtime::Controller` loop only while this
/// replica holds the lease and aborting it the instant leadership is lost.
pub async fn run(
    client: Client,
    audit: Arc<dyn LifecycleEventSink>,
    directory: Option<Arc<dyn Directory>>,
    config: Config,
) -> Result<(), Error> {
    println!("{}", "⚙️  Starting Console controller...".green());

    let context: Arc<ContextData> = Arc::new(ContextData::new(client.clone(), audit, directory, config));

    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("theatre-console-controller-{}", uuid::Uuid::new_v4()));
    let lease_ttl = Duration::from_secs(15);
    let renew_every = Duration::from_secs(5);
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "theatre-console-controller-lock".to_string(),
            lease_ttl,
        },
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        theatre_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });
    theatre_common::signal_ready();

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    task.await.ok();
                }
                break Ok(());
            }
            _ = tick.tick() => {}
        }
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("leader election renew/acquire failed: {e}");
                if let Some(task) = controller_task.take() {
                    task.abort();
                    eprintln!("aborted controller due to leader election error");
                }
                continue;
            }
        };
        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if controller_task.is_none() {
                println!("{}", "👑 Acquired leadership; starting Console controller".green());
                let client_for_controller = client.clone();
                let context_for_controller = context.clone();
                let controller_namespace = lease_namespace.clone();
                let crd_api: Api<Console> =
                    Api::namespaced(client_for_controller.clone(), &controller_namespace);
                controller_task = Some(tokio::spawn(async move {
                    Controller::new(crd_api, Default::default())
                        .owns(
                            Api::<ConsoleAuthorisation>::namespaced(
                                client_for_controller,
                                &controller_namespace,
                            ),
                            Default::default(),
                        )
                        .run(reconcile, on_error, context_for_controller)
                        .for_each(|_res| async move {})
                        .await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping Console controller");
            task.abort();
        }
    }
}

async fn reconcile(console: Arc<Console>, context: Arc<ContextData>) -> Result<Action, Error> {
    if console.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let client: Client = context.client.clone();
    let namespace = console
        .namespace()
        .ok_or_else(|| Error::UserInput("Expected Console to be namespaced".to_string()))?;
    let name = console.name_any();

    #[cfg(feature = "metrics")]
    let start = Instant::now();

    let rc = read_state(client.clone(), &namespace, &console).await?;
    let action = determine_action(&console, &rc);

    if action != ConsoleAction::NoOp {
        let value = {
            let mut la = context.last_action.lock().await;
            la.insert((namespace.clone(), name.clone()), (action.clone(), Instant::now()))
        };
        let changed = !matches!(
            &value,
            Some((last, last_instant))
                if last == &action && last_instant.elapsed() < Duration::from_secs(300)
        );
        if changed {
            println!(
                "🎭 {}{}{}{}{}",
                namespace.color(FG2),
                "/".color(FG1),
                name.color(FG2),
                " ACTION: ".color(FG1),
                format!("{action:?}").color(FG2),
            );
        }
    }

    #[cfg(feature = "metrics")]
    context.metrics.record_reconcile(action.to_str(), start.elapsed());

    let event_id = theatre_audit::derive_event_id(rc.created_at, &context.config.cluster_context, &namespace, &name);

    #[cfg(feature = "metrics")]
    context.metrics.record_action(action.to_str());

    execute(&client, &context, &console, &rc, action, event_id).await
}

/// Read phase: gathers every external observation needed to decide what
/// to do, without mutating anything.
async fn read_state(client: Client, namespace: &str, console: &Console) -> Result<ReconcileContext, Error> {
    let template_api: Api<ConsoleTemplate> = Api::namespaced(client.clone(), namespace);
    let template = template_api.get(&console.spec.template_ref).await?;

    let command = phase::resolve_command(&console.spec.command, &template.spec.default_command);
    let rule = template.spec.select_rule(&command);
    let required = rule.map(|r| r.required).unwrap_or(0);

    let granted = if required > 0 {
        let auth_api: Api<ConsoleAuthorisation> = Api::namespaced(client.clone(), namespace);
        match auth_api
            .get(&actions::authorisation_name(&console.name_any()))
            .await
        {
            Ok(auth) => auth.spec.authorisations,
            Err(kube::Error::Api(e)) if e.code == 404 => vec![],
            Err(e) => return Err(e.into()),
        }
    } else {
        vec![]
    };

    let job_name = phase::job_name(&console.name_any());
    let job_api: Api<Job> = Api::namespaced(client.clone(), namespace);
    let job = match job_api.get(&job_name).await {
        Ok(job) => {
            let terminal = job
                .status
                .as_ref()
                .and_then(|s| s.conditions.as_ref())
                .is_some_and(|conditions| {
                    conditions
                        .iter()
                        .any(|c| matches!(c.type_.as_str(), "Complete" | "Failed") && c.status == "True")
                });
            JobObservation::Exists { terminal }
        }
        Err(kube::Error::Api(e)) if e.code == 404 => JobObservation::NotFound,
        Err(e) => return Err(e.into()),
    };

    let (pod, pod_detail, pod_service_account) = match job {
        JobObservation::Exists { .. } => {
            let pod_api: Api<Pod> = Api::namespaced(client, namespace);
            let lp = kube::api::ListParams::default().labels(&format!("job-name={job_name}"));
            let pods = pod_api.list(&lp).await?;
            match pods.items.len() {
                0 => (PodObservation::None, None, None),
                1 => {
                    let pod = pods.items.into_iter().next().unwrap();
                    let running =
                        pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running");
                    let sa = pod
                        .spec
                        .as_ref()
                        .and_then(|s| s.service_account_name.clone());
                    let name = pod.name_any();
                    (PodObservation::Single { name, running }, Some(pod), sa)
                }
                _ => (
                    PodObservation::Multiple(pods.items.iter().map(|p| p.name_any()).collect()),
                    None,
                    None,
                ),
            }
        }
        JobObservation::NotFound => (PodObservation::None, None, None),
    };

    let now = Utc::now();
    let created_at = console.creation_timestamp().map(|t| t.0).unwrap_or(now);

    Ok(ReconcileContext {
        template,
        command,
        granted,
        required,
        job,
        pod,
        pod_detail,
        pod_service_account,
        now,
        created_at,
    })
}

/// Pure decision function: derives a [`ConsoleAction`] from the Console's
/// recorded status plus everything [`read_state`] observed.
fn determine_action(console: &Console, rc: &ReconcileContext) -> ConsoleAction {
    let authorised = phase::is_authorised(rc.granted.len(), rc.required);

    let Some(status) = console.status.clone() else {
        return ConsoleAction::Request { required: rc.required };
    };

    if phase::detect_abort(&rc.pod, &status.pod_name) {
        let pod_names = match &rc.pod {
            PodObservation::Multiple(names) => names.clone(),
            PodObservation::Single { name, .. } => vec![name.clone()],
            PodObservation::None => vec![],
        };
        return ConsoleAction::Abort { pod_names };
    }

    if status.phase == ConsolePhase::PendingAuthorisation && !authorised {
        let deadline =
            phase::gc_deadline_pending_authorisation(rc.created_at, console.spec.ttl_seconds_before_running);
        return if phase::is_past(rc.now, deadline) {
            ConsoleAction::GarbageCollectUnauthorised
        } else {
            ConsoleAction::AwaitAuthorisation
        };
    }

    let expiry = status.expiry_time.map(|t| t.0);
    let new_phase = phase::determine_phase(status.phase, authorised, rc.job, &rc.pod, rc.now, expiry);

    if status.phase == ConsolePhase::PendingAuthorisation && new_phase == ConsolePhase::Pending {
        return ConsoleAction::Authorise {
            authorised_by: rc.granted.iter().map(|s| s.name.clone()).collect(),
        };
    }

    if new_phase == ConsolePhase::Pending {
        return match rc.job {
            JobObservation::NotFound => ConsoleAction::Start,
            JobObservation::Exists { .. } => ConsoleAction::AwaitPod,
        };
    }

    if new_phase == ConsolePhase::Running {
        return match &rc.pod {
            PodObservation::Single { name, running: true } if status.pod_name.is_empty() => {
                ConsoleAction::BecomePodRunning { pod_name: name.clone() }
            }
            _ => ConsoleAction::StillRunning,
        };
    }

    if new_phase == ConsolePhase::Stopped {
        if status.phase == ConsolePhase::Stopped {
            let deadline = phase::gc_deadline_finished(
                status.completion_time.map(|t| t.0),
                expiry.unwrap_or(rc.now),
                console.spec.ttl_seconds_after_finished,
            );
            return if phase::is_past(rc.now, deadline) {
                ConsoleAction::GarbageCollect
            } else {
                ConsoleAction::NoOp
            };
        }
        let job_terminal = matches!(rc.job, JobObservation::Exists { terminal: true });
        let expired = expiry.is_some_and(|e| phase::is_past(rc.now, e));
        return ConsoleAction::BecomeStopped {
            timed_out: expired && !job_terminal,
        };
    }

    // Destroyed
    if status.phase != ConsolePhase::Destroyed {
        return ConsoleAction::BecomeDestroyed;
    }
    let deadline = phase::gc_deadline_finished(
        status.completion_time.map(|t| t.0),
        expiry.unwrap_or(rc.now),
        console.spec.ttl_seconds_after_finished,
    );
    if phase::is_past(rc.now, deadline) {
        ConsoleAction::GarbageCollect
    } else {
        ConsoleAction::NoOp
    }
}

/// Write phase: executes the decided [`ConsoleAction`], mutating cluster
/// state, patching status, and emitting lifecycle events as needed.
async fn execute(
    client: &Client,
    context: &ContextData,
    console: &Console,
    rc: &ReconcileContext,
    action: ConsoleAction,
    event_id: String,
) -> Result<Action, Error> {
    let client = client.clone();
    let namespace = console.namespace().expect("checked by caller");
    let name = console.name_any();

    actions::ensure_owner_ref(client.clone(), console, &rc.template).await?;

    match action {
        ConsoleAction::Request { required } => {
            actions::publish(&context.audit, actions::request_event(event_id, &namespace, console)).await;
            let initial = phase::initial_phase(required);
            patch_status::<ConsoleStatus, Console>(client.clone(), console, |s| {
                s.phase = initial;
            })
            .await?;
            if initial == ConsolePhase::PendingAuthorisation {
                let candidates = rule_subjects(&rc.template, &rc.command);
                let candidates =
                    actions::resolve_candidate_authorisers(context.directory.as_ref(), &candidates).await?;
                actions::ensure_authorisation(client, console, candidates).await?;
                let deadline = phase::gc_deadline_pending_authorisation(
                    rc.created_at,
                    console.spec.ttl_seconds_before_running,
                );
                Ok(Action::requeue(to_std(deadline - rc.now)))
            } else {
                Ok(Action::requeue(Duration::from_secs(1)))
            }
        }
        ConsoleAction::AwaitAuthorisation => {
            let deadline = phase::gc_deadline_pending_authorisation(
                rc.created_at,
                console.spec.ttl_seconds_before_running,
            );
            Ok(Action::requeue(to_std(deadline - rc.now)))
        }
        ConsoleAction::GarbageCollectUnauthorised => {
            actions::publish(
                &context.audit,
                actions::terminate_event(event_id, &namespace, &name, true, vec![]),
            )
            .await;
            actions::delete_console(client, console).await?;
            Ok(Action::await_change())
        }
        ConsoleAction::Authorise { authorised_by } => {
            actions::publish(
                &context.audit,
                actions::authorise_event(event_id, &namespace, &name, authorised_by),
            )
            .await;
            patch_status::<ConsoleStatus, Console>(client, console, |s| {
                s.phase = ConsolePhase::Pending;
            })
            .await?;
            Ok(Action::requeue(Duration::from_secs(1)))
        }
        ConsoleAction::Start => {
            let job_created_at =
                actions::create_job(client.clone(), console, &rc.template.spec, &rc.command).await?;
            let expiry_time = super::job::job_expiry(job_created_at, console.spec.timeout_seconds);
            actions::publish(
                &context.audit,
                actions::start_event(event_id, &namespace, &name, ""),
            )
            .await;
            patch_status::<ConsoleStatus, Console>(client, console, |s| {
                s.expiry_time = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(expiry_time));
            })
            .await?;
            Ok(Action::requeue(Duration::from_secs(1)))
        }
        ConsoleAction::AwaitPod => Ok(Action::requeue(Duration::from_secs(1))),
        ConsoleAction::BecomePodRunning { pod_name } => {
            let candidates = actions::resolve_candidate_authorisers(context.directory.as_ref(), &rc.granted).await?;
            actions::provision_pod_rbac(
                client.clone(),
                console,
                &rc.template.spec,
                &pod_name,
                candidates,
                context.config.directory_enabled,
                rc.pod_service_account.as_deref(),
            )
            .await?;
            patch_status::<ConsoleStatus, Console>(client, console, |s| {
                s.phase = ConsolePhase::Running;
                s.pod_name = pod_name.clone();
            })
            .await?;
            Ok(Action::requeue(PROBE_INTERVAL))
        }
        ConsoleAction::StillRunning => Ok(Action::requeue(PROBE_INTERVAL)),
        ConsoleAction::BecomeStopped { timed_out } => {
            let statuses = rc
                .pod_detail
                .as_ref()
                .map(container_statuses)
                .unwrap_or_default();
            actions::publish(
                &context.audit,
                actions::terminate_event(event_id, &namespace, &name, timed_out, statuses),
            )
            .await;
            patch_status::<ConsoleStatus, Console>(client, console, |s| {
                s.phase = ConsolePhase::Stopped;
                s.completion_time = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(rc.now));
            })
            .await?;
            Ok(Action::requeue(Duration::from_secs(1)))
        }
        ConsoleAction::BecomeDestroyed => {
            patch_status::<ConsoleStatus, Console>(client, console, |s| {
                s.phase = ConsolePhase::Destroyed;
            })
            .await?;
            Ok(Action::requeue(Duration::from_secs(1)))
        }
        ConsoleAction::Abort { pod_names } => {
            let job_name = phase::job_name(&name);
            actions::abort(client, console, &job_name, &pod_names).await?;
            actions::publish(
                &context.audit,
                actions::terminate_event(event_id, &namespace, &name, false, vec![]),
            )
            .await;
            Ok(Action::await_change())
        }
        ConsoleAction::GarbageCollect => {
            actions::delete_console(client, console).await?;
            Ok(Action::await_change())
        }
        ConsoleAction::NoOp => Ok(Action::requeue(PROBE_INTERVAL)),
    }
}

fn container_statuses(pod: &Pod) -> Vec<ContainerStatusSummary> {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|c| ContainerStatusSummary {
                    name: c.name.clone(),
                    ready: c.ready,
                    restart_count: c.restart_count,
                    state: c
                        .state
                        .as_ref()
                        .map(|s| {
                            if s.running.is_some() {
                                "running".to_string()
                            } else if s.waiting.is_some() {
                                "waiting".to_string()
                            } else if s.terminated.is_some() {
                                "terminated".to_string()
                            } else {
                                "unknown".to_string()
                            }
                        })
                        .unwrap_or_else(|| "unknown".to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn rule_subjects(template: &ConsoleTemplate, command: &[String]) -> Vec<Subject> {
    template
        .spec
        .select_rule(command)
        .map(|r| r.subjects.clone())
        .unwrap_or_default()
}

fn to_std(delta: chrono::Duration) -> Duration {
    delta.to_std().unwrap_or(Duration::from_secs(0))
}

fn on_error(console: Arc<Console>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!(
            "Console reconciliation error for {}/{}: {error:?}",
            console.namespace().unwrap_or_default(),
            console.name_any(),
        )
        .red()
    );
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_std_clamps_negative_to_zero() {
        assert_eq!(to_std(chrono::Duration::seconds(-5)), Duration::from_secs(0));
    }

    #[test]
    fn action_to_str_is_stable_for_metrics_labels() {
        assert_eq!(ConsoleAction::NoOp.to_str(), "NoOp");
        assert_eq!(ConsoleAction::Start.to_str(), "Start");
    }
}
