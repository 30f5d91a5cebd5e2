use std::sync::Arc;

use clap::Parser;
use owo_colors::OwoColorize;
use theatre_audit::{LifecycleEventSink, http::HttpSink, logging::LoggingSink};
use theatre_deployer::{Deployer, http::HttpDeployer};
use theatre_directory::{CachedDirectory, Directory, http::HttpDirectory};

mod args;
mod console;
mod directory_role_binding;
mod release;
mod rollback;
mod util;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    theatre_common::init();

    let cli = Cli::parse();
    let client = kube::Client::try_default().await?;

    #[cfg(feature = "metrics")]
    theatre_common::metrics::maybe_spawn_metrics_server();

    let result = match cli.command {
        Commands::Console(args) => {
            let audit: Arc<dyn LifecycleEventSink> = match args.audit_endpoint {
                Some(endpoint) => Arc::new(HttpSink::new(endpoint)),
                None => Arc::new(LoggingSink),
            };
            let directory = build_directory(args.directory_enabled.then_some(args.directory_endpoint).flatten());
            console::run(
                client,
                audit,
                directory,
                console::Config {
                    directory_enabled: args.directory_enabled,
                    cluster_context: args.cluster_context,
                },
            )
            .await
        }
        Commands::Release(args) => {
            let deployer = args.deployer_endpoint.map(|endpoint| Arc::new(HttpDeployer::new(endpoint)) as Arc<dyn Deployer>);
            release::run(client, deployer, release::Config { history_length: args.history_length }).await
        }
        Commands::Rollback(args) => {
            let deployer: Arc<dyn Deployer> = Arc::new(HttpDeployer::new(args.deployer_endpoint));
            rollback::run(
                client,
                deployer,
                rollback::Config {
                    history_length: args.history_length,
                    max_attempts: args.max_attempts,
                    default_environment: args.default_environment,
                },
            )
            .await
        }
        Commands::DirectoryRoleBinding(args) => {
            let directory: Arc<dyn Directory> =
                Arc::new(CachedDirectory::with_default_ttl(HttpDirectory::new(args.directory_endpoint)));
            directory_role_binding::run(
                client,
                directory,
                directory_role_binding::Config {
                    refresh_interval: std::time::Duration::from_secs(args.refresh_interval_secs),
                },
            )
            .await
        }
    };

    if let Err(e) = &result {
        eprintln!("{}", format!("fatal: {e}").red());
    }
    result?;
    Ok(())
}

fn build_directory(endpoint: Option<String>) -> Option<Arc<dyn Directory>> {
    endpoint.map(|endpoint| Arc::new(CachedDirectory::with_default_ttl(HttpDirectory::new(endpoint))) as Arc<dyn Directory>)
}
