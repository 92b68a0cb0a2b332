//! Frontend listener and per-connection supervision.
//!
//! The listener accepts frontend connections in a loop and hands each one to
//! its own task: wrap the frontend leg, dial and wrap the backend leg, then
//! relay until either side is done. Per-connection failures are absorbed and
//! logged; only startup errors take the process down.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tracing::{debug, error, info, warn, Instrument};

use crate::config::{Config, HostPort};
use crate::error::TunnelError;
use crate::tls::TlsWrapper;

use super::{backend, relay};

/// Listen backlog for the frontend socket.
const LISTEN_BACKLOG: u32 = 128;

/// Statistics for a running tunnel endpoint.
#[derive(Debug, Default)]
pub struct TunnelStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Connections currently being set up or relayed.
    pub connections_active: AtomicU64,
    /// Connections fully torn down.
    pub connections_closed: AtomicU64,
    /// Connections dropped during setup (handshake or backend dial).
    pub setup_failures: AtomicU64,
    /// Bytes relayed from frontend to backend.
    pub bytes_to_backend: AtomicU64,
    /// Bytes relayed from backend to frontend.
    pub bytes_from_backend: AtomicU64,
}

/// The accepting side of a tunnel endpoint.
///
/// Owns the listening socket and the TLS policy for both legs. `bind` fails
/// fast on unusable TLS material or an unbindable address; once running,
/// every per-connection failure is absorbed.
pub struct TunnelListener {
    /// Shared endpoint configuration.
    config: Arc<Config>,
    /// The frontend TCP listener.
    listener: TcpListener,
    /// TLS policy for accepted connections.
    frontend_tls: TlsWrapper,
    /// TLS policy for outbound connections.
    backend_tls: TlsWrapper,
    /// Statistics.
    stats: Arc<TunnelStats>,
}

impl TunnelListener {
    /// Bind the frontend socket and build both TLS legs.
    pub async fn bind(config: Arc<Config>) -> Result<Self, TunnelError> {
        let frontend_tls = TlsWrapper::frontend(&config)?;
        let backend_tls = TlsWrapper::backend(&config)?;

        let addr = resolve_bind_addr(&config.local).await?;
        let listener = bind_socket(addr).map_err(|e| TunnelError::Bind {
            addr: config.local.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TunnelError::Bind {
            addr: config.local.to_string(),
            source: e,
        })?;

        info!(
            bind_addr = %local_addr,
            role = %config.role,
            remote = %config.remote,
            "Listener bound"
        );

        Ok(Self {
            config,
            listener,
            frontend_tls,
            backend_tls,
            stats: Arc::new(TunnelStats::default()),
        })
    }

    /// Get the local address the frontend socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get a shared handle on the tunnel statistics.
    pub fn stats(&self) -> Arc<TunnelStats> {
        Arc::clone(&self.stats)
    }

    /// Run the accept loop, handling each connection in its own task.
    ///
    /// Does not return under normal operation.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(bind_addr = %local_addr, "Listener started");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .connections_active
                        .fetch_add(1, Ordering::Relaxed);

                    let tunnel = Arc::clone(&self);
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(
                        async move {
                            if let Err(e) = tunnel.handle_connection(stream, peer_addr).await {
                                if e.is_setup_failure() {
                                    stats.setup_failures.fetch_add(1, Ordering::Relaxed);
                                    warn!(
                                        peer_addr = %peer_addr,
                                        error = %e,
                                        "Connection setup failed"
                                    );
                                } else {
                                    debug!(
                                        peer_addr = %peer_addr,
                                        error = %e,
                                        "Relay ended with error"
                                    );
                                }
                            }

                            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            stats.connections_closed.fetch_add(1, Ordering::Relaxed);
                        }
                        .instrument(tracing::info_span!("connection", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid a tight loop on persistent errors
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Handle a single accepted connection end to end.
    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), TunnelError> {
        let mut frontend = self.frontend_tls.wrap(stream).await?;
        debug!(peer_addr = %peer_addr, "Frontend leg established");

        let backend = match backend::connect(&self.config, &self.backend_tls).await {
            Ok(backend) => backend,
            Err(e) => {
                // The frontend leg is already up and must not be left dangling.
                frontend.close().await;
                return Err(e);
            }
        };

        // The counters come back even when the relay fails, so the teardown
        // log and the totals cover error paths too.
        let (relayed, result) = relay::run(frontend, backend).await;

        self.stats
            .bytes_to_backend
            .fetch_add(relayed.bytes_to_backend, Ordering::Relaxed);
        self.stats
            .bytes_from_backend
            .fetch_add(relayed.bytes_from_backend, Ordering::Relaxed);

        debug!(
            peer_addr = %peer_addr,
            bytes_to_backend = relayed.bytes_to_backend,
            bytes_from_backend = relayed.bytes_from_backend,
            "Connection closed"
        );

        result
    }
}

/// Resolve the configured listen address to a socket address.
async fn resolve_bind_addr(local: &HostPort) -> Result<SocketAddr, TunnelError> {
    lookup_host((local.host.as_str(), local.port))
        .await
        .map_err(|e| TunnelError::Bind {
            addr: local.to_string(),
            source: e,
        })?
        .next()
        .ok_or_else(|| TunnelError::Bind {
            addr: local.to_string(),
            source: io::Error::new(io::ErrorKind::AddrNotAvailable, "host did not resolve"),
        })
}

/// Bind a listening socket with SO_REUSEADDR so a restart does not trip over
/// connections lingering in TIME_WAIT.
fn bind_socket(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tunnel_stats() {
        let stats = TunnelStats::default();
        stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.connections_active.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_bind_socket_ephemeral_port() {
        let listener = bind_socket("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_resolve_bind_addr_localhost() {
        let local: HostPort = "localhost:4000".parse().unwrap();
        let addr = resolve_bind_addr(&local).await.unwrap();
        assert_eq!(addr.port(), 4000);
    }

    #[tokio::test]
    async fn test_resolve_bind_addr_failure_is_bind_error() {
        let local: HostPort = "host.invalid:1234".parse().unwrap();
        let err = resolve_bind_addr(&local).await.unwrap_err();
        assert!(matches!(err, TunnelError::Bind { .. }));
    }
}
