use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "theatre-operator")]
#[command(about = "Reconciles Console, Release/Rollback, and DirectoryRoleBinding resources")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the Console lifecycle controller
    Console(ConsoleArgs),
    /// Run the Release controller
    Release(ReleaseArgs),
    /// Run the Rollback controller
    Rollback(RollbackArgs),
    /// Run the DirectoryRoleBinding controller
    DirectoryRoleBinding(DirectoryRoleBindingArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ConsoleArgs {
    /// Resolve `kind: Group` subjects via the directory provider rather
    /// than passing them through to a plain RoleBinding.
    #[arg(long, env = "DIRECTORY_ENABLED", default_value_t = false)]
    pub directory_enabled: bool,

    /// Base URL of the group-membership directory provider.
    #[arg(long, env = "DIRECTORY_ENDPOINT")]
    pub directory_endpoint: Option<String>,

    /// Base URL of the audit event collector; stdout logging is used when absent.
    #[arg(long, env = "AUDIT_ENDPOINT")]
    pub audit_endpoint: Option<String>,

    /// Cluster context recorded on emitted audit events.
    #[arg(long, env = "CLUSTER_CONTEXT", default_value = "default")]
    pub cluster_context: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ReleaseArgs {
    /// Maximum number of past release names retained in `status.history`.
    #[arg(long, env = "HISTORY_LENGTH", default_value_t = 10)]
    pub history_length: usize,

    /// Base URL of the CI/CD deployer; when absent, Releases are never
    /// polled and default to `Healthy: Assumed`.
    #[arg(long, env = "DEPLOYER_ENDPOINT")]
    pub deployer_endpoint: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct RollbackArgs {
    /// Maximum number of past deployment ids retained in `status.history`.
    #[arg(long, env = "HISTORY_LENGTH", default_value_t = 10)]
    pub history_length: usize,

    /// Number of retryable deployer failures tolerated before a rollback fails.
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = 5)]
    pub max_attempts: u32,

    /// Environment name passed to the deployer on every trigger request.
    #[arg(long, env = "DEPLOY_ENVIRONMENT", default_value = "production")]
    pub default_environment: String,

    /// Base URL of the CI/CD deployer.
    #[arg(long, env = "DEPLOYER_ENDPOINT")]
    pub deployer_endpoint: String,
}

#[derive(Parser, Debug, Clone)]
pub struct DirectoryRoleBindingArgs {
    /// How often a DirectoryRoleBinding's subjects are re-resolved even
    /// absent any spec change, bounding staleness of group membership.
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value_t = 300)]
    pub refresh_interval_secs: u64,

    /// Base URL of the group-membership directory provider.
    #[arg(long, env = "DIRECTORY_ENDPOINT")]
    pub directory_endpoint: String,
}
