//! Error types for tunnel setup and relaying.

use std::io;

use thiserror::Error;

/// Errors raised while configuring or running the tunnel.
///
/// `Config` and `Bind` are fatal at startup. `Connect`, `Handshake`, and
/// `RelayIo` abort a single connection and never take the listener down.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Malformed command-line input or unusable TLS material.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The local listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The outbound connection to the remote peer could not be established.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// TLS negotiation failed, including certificate verification failures.
    #[error("tls handshake failed: {0}")]
    Handshake(#[source] io::Error),

    /// A read or write failed while relaying between established legs.
    #[error("relay i/o failed: {0}")]
    RelayIo(#[source] io::Error),
}

impl TunnelError {
    /// True for failures before the relay started: the backend dial or a TLS
    /// handshake on either leg.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            TunnelError::Connect { .. } | TunnelError::Handshake(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_failures_cover_dial_and_handshake() {
        let connect = TunnelError::Connect {
            host: "example.net".to_string(),
            port: 4433,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let handshake = TunnelError::Handshake(io::Error::from(io::ErrorKind::InvalidData));
        assert!(connect.is_setup_failure());
        assert!(handshake.is_setup_failure());
    }

    #[test]
    fn relay_and_startup_errors_are_not_setup_failures() {
        let config = TunnelError::Config("bad port".to_string());
        let bind = TunnelError::Bind {
            addr: "127.0.0.1:80".to_string(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let relay = TunnelError::RelayIo(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(!config.is_setup_failure());
        assert!(!bind.is_setup_failure());
        assert!(!relay.is_setup_failure());
    }
}
