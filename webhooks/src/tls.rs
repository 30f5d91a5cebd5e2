//! Hand-rolled HTTPS listener for the admission webhook `axum::Router`.
//! `axum::serve` has no TLS support of its own, so the accept loop is
//! built directly on `tokio-rustls` + `hyper-util`, the way this
//! codebase's other HTTP-facing binaries reach for `hyper`/`hyper-util`
//! when they need something below `axum::serve`'s abstraction.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use owo_colors::OwoColorize;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::error::Error;

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>, Error> {
    let file = File::open(path).map_err(|source| Error::TlsIo { path: path.to_string(), source })?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| Error::TlsIo { path: path.to_string(), source })
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>, Error> {
    let file = File::open(path).map_err(|source| Error::TlsIo { path: path.to_string(), source })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| Error::TlsIo { path: path.to_string(), source })?
        .ok_or_else(|| Error::NoPrivateKey(path.to_string()))
}

/// Serves `router` over TLS on `0.0.0.0:{port}` until the process is
/// killed; the admission webhook configuration in the cluster always
/// points at an HTTPS endpoint, so there is no plaintext fallback.
pub async fn serve(router: Router, port: u16, cert_path: &str, key_path: &str) -> Result<(), Error> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;
    let mut server_config = ServerConfig::builder().with_no_client_auth().with_single_cert(certs, key)?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await.map_err(Error::Bind)?;
    println!(
        "{}{}",
        "🔒 Starting admission webhook server • port=".green(),
        format!("{port}").green().dimmed(),
    );

    loop {
        let (stream, _peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                eprintln!("{}", format!("accept failed: {e}").red());
                continue;
            }
        };
        let acceptor = acceptor.clone();
        let router = router.clone();

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    eprintln!("{}", format!("TLS handshake failed: {e}").red());
                    return;
                }
            };
            let io = TokioIo::new(tls_stream);
            let service = TowerToHyperService::new(router);
            if let Err(e) = ConnBuilder::new(TokioExecutor::new()).serve_connection(io, service).await {
                eprintln!("{}", format!("connection error: {e}").red());
            }
        });
    }
}
