use thiserror::Error;

/// Startup-time failures for the webhook server, kept distinct from the
/// per-request admission outcomes (those are always a 200 with an
/// allow/deny body, never an `Err`).
#[derive(Error, Debug)]
pub enum Error {
    #[error("reading TLS material from {path}: {source}")]
    TlsIo { path: String, source: std::io::Error },

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("building TLS server config: {0}")]
    TlsConfig(#[from] rustls::Error),

    #[error("binding webhook server: {0}")]
    Bind(std::io::Error),

    #[error("kube client: {0}")]
    Kube(#[from] kube::Error),
}
