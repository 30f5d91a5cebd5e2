use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::StreamExt;
use kube::{
    Api, ResourceExt,
    client::Client,
    runtime::{Controller, controller::Action},
};
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use theatre_deployer::{Deployer, TriggerOptions, TriggerRequest};
use theatre_types::{Release, Rollback, RollbackPhase, RollbackStatus};
use tokio::{sync::Mutex, time::Duration};
use tokio_util::sync::CancellationToken;

use super::actions::{phase_from_deployment_status, should_retry};
#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;
use crate::util::{
    Error,
    colors::{FG1, FG2},
    patch::{HasStatus, patch_status},
};

impl HasStatus<RollbackStatus> for Rollback {
    fn mut_status(&mut self) -> &mut RollbackStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

pub struct Config {
    pub max_attempts: u32,
    pub history_length: usize,
    pub default_environment: String,
}

struct ContextData {
    client: Client,
    deployer: Arc<dyn Deployer>,
    config: Config,
    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
    last_action: Mutex<HashMap<(String, String), (RollbackPhase, Instant)>>,
}

/// Entrypoint for the `Rollback` controller.
pub async fn run(client: Client, deployer: Arc<dyn Deployer>, config: Config) -> Result<(), Error> {
    println!("{}", "⚙️  Starting Rollback controller...".green());

    let context = Arc::new(ContextData {
        client: client.clone(),
        deployer,
        config,
        #[cfg(feature = "metrics")]
        metrics: ControllerMetrics::new("rollback"),
        last_action: Mutex::new(HashMap::new()),
    });

    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("theatre-rollback-controller-{}", uuid::Uuid::new_v4()));
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "theatre-rollback-controller-lock".to_string(),
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
                println!("{}", "👑 Acquired leadership; starting Rollback controller".green());
                let client_for_controller = client.clone();
                let context_for_controller = context.clone();
                let controller_namespace = lease_namespace.clone();
                let crd_api: Api<Rollback> = Api::namespaced(client_for_controller, &controller_namespace);
                controller_task = Some(tokio::spawn(async move {
                    Controller::new(crd_api, Default::default())
                        .run(reconcile, on_error, context_for_controller)
                        .for_each(|_res| async move {})
                        .await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping Rollback controller");
            task.abort();
        }
    }
}

async fn reconcile(rollback: Arc<Rollback>, context: Arc<ContextData>) -> Result<Action, Error> {
    #[cfg(feature = "metrics")]
    let start = Instant::now();

    if rollback.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let client = context.client.clone();
    let namespace = rollback
        .namespace()
        .ok_or_else(|| Error::UserInput("Expected Rollback to be namespaced".to_string()))?;
    let name = rollback.name_any();
    let status = rollback.status.clone().unwrap_or_default();

    let outcome = match status.phase {
        RollbackPhase::Succeeded | RollbackPhase::Failed => return Ok(Action::await_change()),
        RollbackPhase::Pending => {
            let release_api: Api<Release> = Api::namespaced(client.clone(), &namespace);
            let to_release = release_api.get(&rollback.spec.to_release_ref).await?;
            let target_release = if to_release.status.as_ref().map(|s| !s.name.is_empty()).unwrap_or(false) {
                to_release.status.as_ref().unwrap().name.clone()
            } else {
                to_release.name_any()
            };

            let request = TriggerRequest {
                rollback_name: name.clone(),
                target_release,
                options: TriggerOptions {
                    environment: context.config.default_environment.clone(),
                    source_repository: None,
                },
            };

            match context.deployer.trigger_deployment(request).await {
                Ok(handle) => {
                    let mut history = status.history.clone();
                    theatre_types::history::push_bounded(&mut history, handle.id.clone(), context.config.history_length);
                    patch_status::<RollbackStatus, Rollback>(client, &rollback, |s| {
                        s.phase = RollbackPhase::InProgress;
                        s.deployment_id = Some(handle.id.clone());
                        s.deployment_url = handle.url.clone();
                        s.history = history.clone();
                    })
                    .await?;
                    trace_action(&context, &namespace, &name, RollbackPhase::InProgress).await;
                    #[cfg(feature = "metrics")]
                    context.metrics.record_action("Trigger");
                    Ok(Action::requeue(Duration::from_secs(5)))
                }
                Err(e) => handle_deployer_error(&context, &namespace, &name, &rollback, &status, e).await,
            }
        }
        RollbackPhase::InProgress => {
            let Some(deployment_id) = status.deployment_id.clone() else {
                return Ok(Action::requeue(Duration::from_secs(5)));
            };
            match context.deployer.get_deployment_status(&deployment_id).await {
                Ok(report) => {
                    let new_phase = phase_from_deployment_status(report.status);
                    patch_status::<RollbackStatus, Rollback>(client, &rollback, |s| {
                        s.phase = new_phase;
                        s.message = report.message.clone();
                        if let Some(url) = report.url.clone() {
                            s.deployment_url = Some(url);
                        }
                    })
                    .await?;
                    if new_phase != RollbackPhase::InProgress {
                        trace_action(&context, &namespace, &name, new_phase).await;
                        #[cfg(feature = "metrics")]
                        context.metrics.record_action(&format!("{new_phase:?}"));
                    }
                    Ok(match new_phase {
                        RollbackPhase::InProgress => Action::requeue(Duration::from_secs(5)),
                        _ => Action::await_change(),
                    })
                }
                Err(e) => handle_deployer_error(&context, &namespace, &name, &rollback, &status, e).await,
            }
        }
    };

    #[cfg(feature = "metrics")]
    context.metrics.record_reconcile(&format!("{:?}", status.phase), start.elapsed());

    outcome
}

/// Records a deployer failure against the Rollback's status. Fatal errors
/// fail the rollback outright; retryable ones bump `attemptCount` and keep
/// the current phase, until `Config::max_attempts` is reached, at which
/// point the rollback is failed too so it doesn't retry forever.
async fn handle_deployer_error(
    context: &ContextData,
    namespace: &str,
    name: &str,
    rollback: &Rollback,
    status: &RollbackStatus,
    error: theatre_deployer::DeployerError,
) -> Result<Action, Error> {
    let client = context.client.clone();
    if !error.retryable {
        patch_status::<RollbackStatus, Rollback>(client, rollback, |s| {
            s.message = Some(error.message.clone());
            s.phase = RollbackPhase::Failed;
        })
        .await?;
        trace_action(context, namespace, name, RollbackPhase::Failed).await;
        return Ok(Action::await_change());
    }

    let attempt_count = status.attempt_count + 1;
    let exhausted = !should_retry(attempt_count, context.config.max_attempts);

    patch_status::<RollbackStatus, Rollback>(client, rollback, |s| {
        s.attempt_count = attempt_count;
        s.message = Some(error.message.clone());
        if exhausted {
            s.phase = RollbackPhase::Failed;
        }
    })
    .await?;

    if exhausted {
        trace_action(context, namespace, name, RollbackPhase::Failed).await;
        Ok(Action::await_change())
    } else {
        let delay = theatre_common::wait::backoff_full_jitter(
            Duration::from_millis(500),
            Duration::from_secs(60),
            attempt_count as usize,
        );
        Ok(Action::requeue(delay))
    }
}

/// Logs a deduplicated, colored `ACTION:` line for `(namespace, name)`,
/// suppressing repeats of the same phase transition within a five-minute
/// window.
async fn trace_action(context: &ContextData, namespace: &str, name: &str, phase: RollbackPhase) {
    let value = {
        let mut la = context.last_action.lock().await;
        la.insert((namespace.to_string(), name.to_string()), (phase.clone(), Instant::now()))
    };
    let changed = !matches!(
        &value,
        Some((last, last_instant))
            if last == &phase && last_instant.elapsed() < Duration::from_secs(300)
    );
    if changed {
        println!(
            "🎬 {}{}{}{}{}",
            namespace.color(FG2),
            "/".color(FG1),
            name.color(FG2),
            " ACTION: ".color(FG1),
            format!("{phase:?}").color(FG2),
        );
    }
}

fn on_error(rollback: Arc<Rollback>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!(
            "Rollback reconciliation error for {}/{}: {error:?}",
            rollback.namespace().unwrap_or_default(),
            rollback.name_any(),
        )
        .red()
    );
    Action::requeue(Duration::from_secs(5))
}
