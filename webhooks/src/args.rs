use clap::Parser;

/// Serves the six admission webhook endpoints over HTTPS.
#[derive(Parser, Debug, Clone)]
#[command(name = "theatre-webhooks")]
#[command(about = "Admission webhook server for Console, Release, Rollback and DirectoryRoleBinding")]
pub struct Cli {
    /// HTTPS port to listen on.
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 8443)]
    pub port: u16,

    /// PEM-encoded TLS certificate chain presented to the API server.
    #[arg(long, env = "TLS_CERT_PATH", default_value = "/etc/theatre/tls/tls.crt")]
    pub tls_cert_path: String,

    /// PEM-encoded TLS private key matching `tls_cert_path`.
    #[arg(long, env = "TLS_KEY_PATH", default_value = "/etc/theatre/tls/tls.key")]
    pub tls_key_path: String,
}
