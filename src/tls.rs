//! TLS endpoint construction for the encrypted leg.
//!
//! Exactly one leg of the tunnel carries TLS, and both peers authenticate
//! each other against a shared CA: the server leg requires a client
//! certificate, the client leg verifies the server certificate and presents
//! its own.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;

use crate::config::{Config, Role};
use crate::error::TunnelError;
use crate::tunnel::TunnelStream;

/// Only TLS 1.3 is negotiated on the encrypted leg.
static TLS_PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// TLS policy for one leg of the tunnel, applied to each new TCP stream.
///
/// Built once at startup, so broken certificate material fails the process
/// before it accepts anything. The plaintext leg gets `Passthrough`, which
/// lets the listener treat both legs uniformly.
pub enum TlsWrapper {
    /// No TLS on this leg; the stream is forwarded as-is.
    Passthrough,

    /// Terminate TLS: handshake as a server, require a client certificate.
    Server(TlsAcceptor),

    /// Originate TLS: handshake as a client, present our certificate.
    Client {
        connector: TlsConnector,
        server_name: ServerName<'static>,
    },
}

impl std::fmt::Debug for TlsWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsWrapper::Passthrough => f.write_str("Passthrough"),
            TlsWrapper::Server(_) => f.write_str("Server(..)"),
            TlsWrapper::Client { server_name, .. } => f
                .debug_struct("Client")
                .field("server_name", server_name)
                .finish_non_exhaustive(),
        }
    }
}

impl TlsWrapper {
    /// Build the wrapper for the accepting (frontend) leg.
    pub fn frontend(config: &Config) -> Result<Self, TunnelError> {
        match config.role {
            Role::Server => Ok(TlsWrapper::Server(build_acceptor(config)?)),
            Role::Client => Ok(TlsWrapper::Passthrough),
        }
    }

    /// Build the wrapper for the connecting (backend) leg.
    pub fn backend(config: &Config) -> Result<Self, TunnelError> {
        match config.role {
            Role::Client => build_connector(config),
            Role::Server => Ok(TlsWrapper::Passthrough),
        }
    }

    /// Apply this leg's policy to a freshly established TCP stream.
    ///
    /// Runs the TLS handshake where one is required. On handshake failure the
    /// stream has been consumed and is dropped, which closes the socket.
    pub async fn wrap(&self, stream: TcpStream) -> Result<TunnelStream, TunnelError> {
        match self {
            TlsWrapper::Passthrough => Ok(TunnelStream::plain(stream)),
            TlsWrapper::Server(acceptor) => {
                let tls = acceptor
                    .accept(stream)
                    .await
                    .map_err(TunnelError::Handshake)?;
                Ok(TunnelStream::tls(tls.into()))
            }
            TlsWrapper::Client {
                connector,
                server_name,
            } => {
                let tls = connector
                    .connect(server_name.clone(), stream)
                    .await
                    .map_err(TunnelError::Handshake)?;
                Ok(TunnelStream::tls(tls.into()))
            }
        }
    }
}

fn build_acceptor(config: &Config) -> Result<TlsAcceptor, TunnelError> {
    let certs = load_certs(&config.cert)?;
    let key = load_private_key(&config.key)?;
    let roots = load_ca_roots(&config.ca_cert)?;

    let client_verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| {
            TunnelError::Config(format!(
                "unusable client CA bundle {}: {}",
                config.ca_cert.display(),
                e
            ))
        })?;

    let tls_config = ServerConfig::builder_with_protocol_versions(TLS_PROTOCOL_VERSIONS)
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(certs, key)
        .map_err(|e| TunnelError::Config(format!("invalid server certificate/key: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

fn build_connector(config: &Config) -> Result<TlsWrapper, TunnelError> {
    let certs = load_certs(&config.cert)?;
    let key = load_private_key(&config.key)?;
    let roots = load_ca_roots(&config.ca_cert)?;

    let tls_config = ClientConfig::builder_with_protocol_versions(TLS_PROTOCOL_VERSIONS)
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .map_err(|e| TunnelError::Config(format!("invalid client certificate/key: {}", e)))?;

    // The remote host doubles as the name the server certificate must match.
    let server_name = ServerName::try_from(config.remote.host.clone()).map_err(|e| {
        TunnelError::Config(format!(
            "remote host {:?} is not a valid TLS server name: {}",
            config.remote.host, e
        ))
    })?;

    Ok(TlsWrapper::Client {
        connector: TlsConnector::from(Arc::new(tls_config)),
        server_name,
    })
}

/// Load a certificate chain from a PEM file.
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TunnelError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| {
        TunnelError::Config(format!("cannot open certificate file {}: {}", path.display(), e))
    })?);

    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            TunnelError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;

    if certs.is_empty() {
        return Err(TunnelError::Config(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    debug!(path = %path.display(), count = certs.len(), "loaded certificates");
    Ok(certs)
}

/// Load a private key from a PEM file.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TunnelError> {
    let mut reader = BufReader::new(File::open(path).map_err(|e| {
        TunnelError::Config(format!("cannot open key file {}: {}", path.display(), e))
    })?);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TunnelError::Config(format!("cannot parse {}: {}", path.display(), e)))?
        .ok_or_else(|| {
            TunnelError::Config(format!("no private key found in {}", path.display()))
        })
}

/// Load a CA bundle into a fresh root store.
fn load_ca_roots(path: &Path) -> Result<RootCertStore, TunnelError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert).map_err(|e| {
            TunnelError::Config(format!("invalid CA certificate in {}: {}", path.display(), e))
        })?;
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(role: Role, dir: &Path) -> Config {
        Config {
            role,
            local: "127.0.0.1:0".parse().unwrap(),
            remote: "127.0.0.1:9".parse().unwrap(),
            key: dir.join("endpoint.key"),
            cert: dir.join("endpoint.pem"),
            ca_cert: dir.join("ca.pem"),
        }
    }

    #[test]
    fn test_plaintext_legs_need_no_tls_material() {
        // Paths in the config do not exist; the passthrough legs never read them.
        let dir = tempfile::tempdir().unwrap();

        let frontend = TlsWrapper::frontend(&test_config(Role::Client, dir.path())).unwrap();
        assert!(matches!(frontend, TlsWrapper::Passthrough));

        let backend = TlsWrapper::backend(&test_config(Role::Server, dir.path())).unwrap();
        assert!(matches!(backend, TlsWrapper::Passthrough));
    }

    #[test]
    fn test_missing_certificate_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = TlsWrapper::frontend(&test_config(Role::Server, dir.path())).unwrap_err();
        assert!(matches!(err, TunnelError::Config(_)));
        assert!(err.to_string().contains("endpoint.pem"));
    }

    #[test]
    fn test_garbage_pem_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("endpoint.pem"), "not a certificate").unwrap();

        let err = TlsWrapper::backend(&test_config(Role::Client, dir.path())).unwrap_err();
        assert!(matches!(err, TunnelError::Config(_)));
        assert!(err.to_string().contains("no certificates found"));
    }
}
