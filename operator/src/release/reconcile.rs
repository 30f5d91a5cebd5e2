use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::StreamExt;
use kube::{
    Api, ResourceExt,
    api::ListParams,
    client::Client,
    runtime::{Controller, controller::Action},
};
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use theatre_deployer::Deployer;
use theatre_types::release::{CONDITION_ACTIVE, CONDITION_HEALTHY, condition_true};
use theatre_types::{Release, ReleaseStatus};
use tokio::{sync::Mutex, time::Duration};
use tokio_util::sync::CancellationToken;

use super::actions::{healthy_from_deployment_status, set_condition};
#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;
use crate::util::{
    Error, PROBE_INTERVAL,
    colors::{FG1, FG2},
    patch::{HasStatus, patch_status},
};

impl HasStatus<ReleaseStatus> for Release {
    fn mut_status(&mut self) -> &mut ReleaseStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

pub struct Config {
    pub history_length: usize,
}

struct ContextData {
    client: Client,
    deployer: Option<Arc<dyn Deployer>>,
    config: Config,
    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
    last_action: Mutex<HashMap<(String, String), (ReleaseAction, Instant)>>,
}

/// Transition applied to a `Release` (or a sibling it supersedes) during one
/// reconciliation. Multiple may apply in a single pass; [`reconcile`] traces
/// the most significant one per object.
#[derive(Debug, Clone, PartialEq)]
enum ReleaseAction {
    Activate,
    BecomeHealthy,
    BecomeUnhealthy,
    RecordRevision,
    Supersede,
}

impl ReleaseAction {
    fn to_str(&self) -> &str {
        match self {
            ReleaseAction::Activate => "Activate",
            ReleaseAction::BecomeHealthy => "BecomeHealthy",
            ReleaseAction::BecomeUnhealthy => "BecomeUnhealthy",
            ReleaseAction::RecordRevision => "RecordRevision",
            ReleaseAction::Supersede => "Supersede",
        }
    }
}

/// Entrypoint for the `Release` controller.
pub async fn run(client: Client, deployer: Option<Arc<dyn Deployer>>, config: Config) -> Result<(), Error> {
    println!("{}", "⚙️  Starting Release controller...".green());

    let context = Arc::new(ContextData {
        client: client.clone(),
        deployer,
        config,
        #[cfg(feature = "metrics")]
        metrics: ControllerMetrics::new("release"),
        last_action: Mutex::new(HashMap::new()),
    });

    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("theatre-release-controller-{}", uuid::Uuid::new_v4()));
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "theatre-release-controller-lock".to_string(),
            lease_ttl: Duration::from_secs(15),
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
    let mut tick = tokio::time::interval(Duration::from_secs(5));
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
                }
                continue;
            }
        };
        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if controller_task.is_none() {
                println!("{}", "👑 Acquired leadership; starting Release controller".green());
                let client_for_controller = client.clone();
                let context_for_controller = context.clone();
                let controller_namespace = lease_namespace.clone();
                let crd_api: Api<Release> = Api::namespaced(client_for_controller, &controller_namespace);
                controller_task = Some(tokio::spawn(async move {
                    Controller::new(crd_api, Default::default())
                        .run(reconcile, on_error, context_for_controller)
                        .for_each(|_res| async move {})
                        .await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping Release controller");
            task.abort();
        }
    }
}

async fn reconcile(release: Arc<Release>, context: Arc<ContextData>) -> Result<Action, Error> {
    #[cfg(feature = "metrics")]
    let start = Instant::now();

    if release.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let client = context.client.clone();
    let namespace = release
        .namespace()
        .ok_or_else(|| Error::UserInput("Expected Release to be namespaced".to_string()))?;
    let name = release.name_any();

    let desired_name = theatre_types::naming::release_name(&release.spec.target_name, &release.spec.revisions);
    let now = Utc::now();

    let api: Api<Release> = Api::namespaced(client.clone(), &namespace);
    let siblings = api.list(&ListParams::default()).await?;
    let previously_active = siblings
        .items
        .iter()
        .find(|other| {
            other.name_any() != name
                && other.spec.target_name == release.spec.target_name
                && other
                    .status
                    .as_ref()
                    .is_some_and(|s| condition_true(&s.conditions, CONDITION_ACTIVE))
        })
        .cloned();

    let status = release.status.clone().unwrap_or_default();
    let mut conditions = status.conditions.clone();
    let already_active = condition_true(&conditions, CONDITION_ACTIVE);
    let already_healthy = condition_true(&conditions, CONDITION_HEALTHY);

    if !already_active {
        set_condition(&mut conditions, CONDITION_ACTIVE, true, "Activated", "this release is now active for its target", now);
    }

    if healthy_from_deployment_status_none(&conditions) {
        set_condition(&mut conditions, CONDITION_HEALTHY, true, "Assumed", "no tracked deployment; assumed healthy", now);
    }

    let deployment_id = status.deployment_id.clone();
    let mut healthy_update: Option<bool> = None;
    if let (Some(deployer), Some(id)) = (context.deployer.as_ref(), deployment_id.as_deref()) {
        let report = deployer.get_deployment_status(id).await?;
        healthy_update = healthy_from_deployment_status(report.status);
    }
    if let Some(healthy) = healthy_update {
        let reason = if healthy { "DeploymentSucceeded" } else { "DeploymentFailed" };
        set_condition(&mut conditions, CONDITION_HEALTHY, healthy, reason, "derived from deployer poll", now);
    }

    let mut history = status.history.clone();
    let name_changed = status.name != desired_name;
    if name_changed {
        theatre_types::history::push_bounded(&mut history, desired_name.clone(), context.config.history_length);
    }

    // Recorded only at the moment this release activates, so the chain
    // the rollback-target webhook walks reflects what this release
    // actually superseded; once set it is carried forward untouched.
    let previous_release_ref = if !already_active {
        previously_active.as_ref().map(|other| other.name_any())
    } else {
        status.previous_release.release_ref.clone()
    };

    patch_status::<ReleaseStatus, Release>(client.clone(), &release, |s| {
        s.name = desired_name.clone();
        s.conditions = conditions.clone();
        s.history = history.clone();
        s.previous_release.release_ref = previous_release_ref.clone();
    })
    .await?;

    let self_action = if !already_active {
        Some(ReleaseAction::Activate)
    } else if healthy_update == Some(true) && !already_healthy {
        Some(ReleaseAction::BecomeHealthy)
    } else if healthy_update == Some(false) && already_healthy {
        Some(ReleaseAction::BecomeUnhealthy)
    } else if name_changed {
        Some(ReleaseAction::RecordRevision)
    } else {
        None
    };
    #[cfg(feature = "metrics")]
    context.metrics.record_reconcile(self_action.as_ref().map_or("NoOp", ReleaseAction::to_str), start.elapsed());

    if let Some(action) = self_action {
        #[cfg(feature = "metrics")]
        context.metrics.record_action(action.to_str());
        trace_action(&context, &namespace, &name, action).await;
    }

    if let Some(other) = previously_active {
        let mut other_conditions = other.status.clone().unwrap_or_default().conditions;
        set_condition(&mut other_conditions, CONDITION_ACTIVE, false, "Superseded", "a newer release for this target became active", now);
        patch_status::<ReleaseStatus, Release>(client, &other, |s| {
            s.conditions = other_conditions.clone();
        })
        .await?;
        trace_action(&context, &namespace, &other.name_any(), ReleaseAction::Supersede).await;
    }

    Ok(Action::requeue(PROBE_INTERVAL))
}

/// Logs a deduplicated, colored `ACTION:` line for `(namespace, name)`,
/// suppressing repeats of the same action within a five-minute window.
async fn trace_action(context: &ContextData, namespace: &str, name: &str, action: ReleaseAction) {
    let value = {
        let mut la = context.last_action.lock().await;
        la.insert((namespace.to_string(), name.to_string()), (action.clone(), Instant::now()))
    };
    let changed = !matches!(
        &value,
        Some((last, last_instant))
            if last == &action && last_instant.elapsed() < Duration::from_secs(300)
    );
    if changed {
        println!(
            "🎬 {}{}{}{}{}",
            namespace.color(FG2),
            "/".color(FG1),
            name.color(FG2),
            " ACTION: ".color(FG1),
            format!("{action:?}").color(FG2),
        );
    }
}

fn healthy_from_deployment_status_none(conditions: &[k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition]) -> bool {
    conditions.iter().all(|c| c.type_ != CONDITION_HEALTHY)
}

fn on_error(release: Arc<Release>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!(
            "Release reconciliation error for {}/{}: {error:?}",
            release.namespace().unwrap_or_default(),
            release.name_any(),
        )
        .red()
    );
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_condition_absent_initially() {
        assert!(healthy_from_deployment_status_none(&[]));
    }
}
