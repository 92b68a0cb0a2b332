//! Outbound leg: dial the configured remote endpoint.

use tokio::net::TcpStream;
use tracing::debug;

use crate::config::Config;
use crate::error::TunnelError;
use crate::tls::TlsWrapper;

use super::stream::TunnelStream;

/// Connect to the configured remote endpoint and apply the backend TLS policy.
///
/// The remote host is resolved on every call, so a DNS change takes effect
/// without a restart. Failures abort the one connection being set up, never
/// the listener.
pub async fn connect(config: &Config, tls: &TlsWrapper) -> Result<TunnelStream, TunnelError> {
    let remote = &config.remote;
    debug!(remote = %remote, "Connecting to backend");

    let stream = TcpStream::connect((remote.host.as_str(), remote.port))
        .await
        .map_err(|e| TunnelError::Connect {
            host: remote.host.clone(),
            port: remote.port,
            source: e,
        })?;

    tls.wrap(stream).await
}
