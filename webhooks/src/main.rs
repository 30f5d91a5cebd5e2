use axum::Router;
use axum::middleware;
use axum::routing::post;
use clap::Parser;
use kube::Client;

mod admission;
mod args;
mod console;
mod console_authorisation;
mod console_template;
mod error;
mod release;
mod rollback;
mod tls;

use args::Cli;

#[derive(Clone)]
pub struct AppState {
    pub client: Client,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    theatre_common::init();

    let cli = Cli::parse();
    let client = Client::try_default().await?;
    let state = AppState { client };

    theatre_common::metrics::maybe_spawn_metrics_server();

    let router = Router::new()
        .route("/mutate-consoles", post(console::mutate))
        .route("/validate-consoleauthorisations", post(console_authorisation::validate))
        .route("/validate-consoletemplates", post(console_template::validate))
        .route("/mutate-releases", post(release::mutate))
        .route("/validate-releases", post(release::validate))
        .route("/mutate-rollbacks", post(rollback::mutate))
        .layer(middleware::from_fn(theatre_common::access_log::internal))
        .with_state(state);

    tls::serve(router, cli.port, &cli.tls_cert_path, &cli.tls_key_path).await?;
    Ok(())
}
