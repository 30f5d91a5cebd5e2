use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::StreamExt;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{
    Api, Resource, ResourceExt,
    api::{ObjectMeta, Patch, PatchParams},
    client::Client,
    runtime::{Controller, controller::Action},
};
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use theatre_directory::{Directory, resolve_subjects};
use theatre_types::{DirectoryRoleBinding, DirectoryRoleBindingStatus};
use tokio::{sync::Mutex, time::Duration};
use tokio_util::sync::CancellationToken;

use super::actions::build_role_binding;
#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;
use crate::util::{
    Error, MANAGER_NAME,
    colors::{FG1, FG2},
    patch::{HasStatus, patch_status},
};

impl HasStatus<DirectoryRoleBindingStatus> for DirectoryRoleBinding {
    fn mut_status(&mut self) -> &mut DirectoryRoleBindingStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

pub struct Config {
    pub refresh_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self { refresh_interval: Duration::from_secs(300) }
    }
}

/// Outcome of resolving a `DirectoryRoleBinding`'s subjects against the
/// directory backend, traced once per distinct subject count.
#[derive(Debug, Clone, PartialEq)]
enum DirectoryRoleBindingAction {
    Resolve { subject_count: u32 },
}

struct ContextData {
    client: Client,
    directory: Arc<dyn Directory>,
    config: Config,
    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
    last_action: Mutex<HashMap<(String, String), (DirectoryRoleBindingAction, Instant)>>,
}

/// Entrypoint for the `DirectoryRoleBinding` controller.
pub async fn run(client: Client, directory: Arc<dyn Directory>, config: Config) -> Result<(), Error> {
    println!("{}", "⚙️  Starting DirectoryRoleBinding controller...".green());

    let context = Arc::new(ContextData {
        client: client.clone(),
        directory,
        config,
        #[cfg(feature = "metrics")]
        metrics: ControllerMetrics::new("directory_role_binding"),
        last_action: Mutex::new(HashMap::new()),
    });

    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("theatre-directory-role-binding-controller-{}", uuid::Uuid::new_v4()));
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "theatre-directory-role-binding-controller-lock".to_string(),
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
                println!("{}", "👑 Acquired leadership; starting DirectoryRoleBinding controller".green());
                let client_for_controller = client.clone();
                let context_for_controller = context.clone();
                let controller_namespace = lease_namespace.clone();
                let crd_api: Api<DirectoryRoleBinding> = Api::namespaced(client_for_controller.clone(), &controller_namespace);
                let owned_api: Api<RoleBinding> = Api::namespaced(client_for_controller, &controller_namespace);
                controller_task = Some(tokio::spawn(async move {
                    Controller::new(crd_api, Default::default())
                        .owns(owned_api, Default::default())
                        .run(reconcile, on_error, context_for_controller)
                        .for_each(|_res| async move {})
                        .await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping DirectoryRoleBinding controller");
            task.abort();
        }
    }
}

async fn reconcile(drb: Arc<DirectoryRoleBinding>, context: Arc<ContextData>) -> Result<Action, Error> {
    #[cfg(feature = "metrics")]
    let start = Instant::now();

    if drb.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let client = context.client.clone();
    let namespace = drb
        .namespace()
        .ok_or_else(|| Error::UserInput("Expected DirectoryRoleBinding to be namespaced".to_string()))?;
    let name = drb.name_any();

    let resolved = resolve_subjects(context.directory.as_ref(), &drb.spec.subjects).await?;

    let owner_ref = drb
        .controller_owner_ref(&())
        .ok_or_else(|| Error::UserInput("DirectoryRoleBinding missing uid".to_string()))?;
    let meta = ObjectMeta {
        name: Some(name.clone()),
        namespace: Some(namespace.clone()),
        owner_references: Some(vec![owner_ref]),
        ..Default::default()
    };
    let desired = build_role_binding(meta, drb.spec.role_ref.clone(), resolved.clone());

    let rb_api: Api<RoleBinding> = Api::namespaced(client.clone(), &namespace);
    rb_api
        .patch(&name, &PatchParams::apply(MANAGER_NAME).force(), &Patch::Apply(&desired))
        .await?;

    patch_status::<DirectoryRoleBindingStatus, DirectoryRoleBinding>(client, &drb, |s| {
        s.resolved_subject_count = resolved.len() as u32;
        s.last_refresh_time = Some(Time(Utc::now()));
        s.message = None;
    })
    .await?;

    let action = DirectoryRoleBindingAction::Resolve { subject_count: resolved.len() as u32 };
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
            "🗂  {}{}{}{}{}",
            namespace.color(FG2),
            "/".color(FG1),
            name.color(FG2),
            " ACTION: ".color(FG1),
            format!("{action:?}").color(FG2),
        );
    }

    #[cfg(feature = "metrics")]
    context.metrics.record_reconcile("Resolve", start.elapsed());
    #[cfg(feature = "metrics")]
    context.metrics.record_action("Resolve");

    Ok(Action::requeue(context.config.refresh_interval))
}

fn on_error(drb: Arc<DirectoryRoleBinding>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!(
        "{}",
        format!(
            "DirectoryRoleBinding reconciliation error for {}/{}: {error:?}",
            drb.namespace().unwrap_or_default(),
            drb.name_any(),
        )
        .red()
    );
    Action::requeue(Duration::from_secs(5))
}
