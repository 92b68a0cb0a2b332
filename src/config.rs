//! Runtime configuration for a tunnel endpoint.
//!
//! Configuration is assembled once at startup from command-line arguments and
//! shared read-only behind an `Arc` for the lifetime of the process.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

use crate::error::TunnelError;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "tlstun")]
#[command(about = "Mutual-TLS TCP tunnel: listen on --local, forward to --remote")]
#[command(version)]
pub struct Args {
    /// Address to listen on (HOST:PORT)
    #[arg(short, long)]
    local: String,

    /// Address to forward every accepted connection to (HOST:PORT)
    #[arg(short, long)]
    remote: String,

    /// PEM private key for this endpoint's TLS identity
    #[arg(short, long)]
    key: PathBuf,

    /// PEM certificate chain presented to the peer
    #[arg(short, long)]
    cert: PathBuf,

    /// PEM CA bundle used to verify the peer's certificate
    #[arg(long)]
    cacert: PathBuf,

    /// Terminate TLS on the listening side instead of originating it
    #[arg(long)]
    server: bool,
}

/// Which leg of the tunnel carries TLS.
///
/// A client endpoint accepts plaintext locally and originates TLS towards its
/// peer. A server endpoint terminates TLS from the network and forwards
/// plaintext to a local service. Exactly one leg is encrypted in either role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Plaintext frontend, TLS backend.
    Client,

    /// TLS frontend, plaintext backend.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// A `HOST:PORT` endpoint address.
///
/// The host part is kept as a string and resolved when the socket is opened,
/// so hostnames, IPv4 literals, or anything the resolver accepts all work.
/// The string is split on a single `:`, which rules out bare IPv6 literals;
/// use a hostname that resolves to the address family you need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    /// Hostname or address literal.
    pub host: String,

    /// TCP port.
    pub port: u16,
}

impl FromStr for HostPort {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((host, port)) = s.split_once(':') else {
            return Err(TunnelError::Config(format!(
                "expected HOST:PORT, got {:?}",
                s
            )));
        };

        if host.is_empty() {
            return Err(TunnelError::Config(format!("empty host in {:?}", s)));
        }

        if port.contains(':') {
            return Err(TunnelError::Config(format!(
                "expected a single ':' in {:?}",
                s
            )));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| TunnelError::Config(format!("invalid port {:?} in {:?}", port, s)))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Immutable endpoint configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which leg carries TLS.
    pub role: Role,

    /// Address to listen on for incoming connections.
    pub local: HostPort,

    /// Address every accepted connection is forwarded to.
    pub remote: HostPort,

    /// PEM private key for this endpoint's TLS identity.
    pub key: PathBuf,

    /// PEM certificate chain presented to the peer.
    pub cert: PathBuf,

    /// PEM CA bundle used to verify the peer's certificate.
    pub ca_cert: PathBuf,
}

impl Config {
    /// Build the runtime configuration from parsed command-line arguments.
    ///
    /// Endpoint strings are validated here, before any networking starts.
    pub fn from_args(args: Args) -> Result<Self, TunnelError> {
        Ok(Self {
            role: if args.server { Role::Server } else { Role::Client },
            local: args.local.parse()?,
            remote: args.remote.parse()?,
            key: args.key,
            cert: args.cert,
            ca_cert: args.cacert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_args(server: bool) -> Args {
        Args {
            local: "127.0.0.1:7070".to_string(),
            remote: "peer.example.net:4433".to_string(),
            key: "endpoint.key".into(),
            cert: "endpoint.pem".into(),
            cacert: "ca.pem".into(),
            server,
        }
    }

    #[test]
    fn test_host_port_parse() {
        let hp: HostPort = "127.0.0.1:1234".parse().unwrap();
        assert_eq!(hp.host, "127.0.0.1");
        assert_eq!(hp.port, 1234);

        let hp: HostPort = "tunnel.example.net:4433".parse().unwrap();
        assert_eq!(hp.host, "tunnel.example.net");
        assert_eq!(hp.port, 4433);
    }

    #[test]
    fn test_host_port_display_round_trip() {
        let hp: HostPort = "localhost:8080".parse().unwrap();
        assert_eq!(hp.to_string(), "localhost:8080");
    }

    #[test]
    fn test_host_port_rejects_missing_colon() {
        let err = "localhost".parse::<HostPort>().unwrap_err();
        assert!(matches!(err, TunnelError::Config(_)));
    }

    #[test]
    fn test_host_port_rejects_empty_host() {
        assert!(":8080".parse::<HostPort>().is_err());
    }

    #[test]
    fn test_host_port_rejects_extra_colons() {
        assert!("a:b:c".parse::<HostPort>().is_err());
        assert!("::1:8080".parse::<HostPort>().is_err());
    }

    #[test]
    fn test_host_port_rejects_bad_port() {
        assert!("localhost:".parse::<HostPort>().is_err());
        assert!("localhost:http".parse::<HostPort>().is_err());
        assert!("localhost:70000".parse::<HostPort>().is_err());
        assert!("localhost:-1".parse::<HostPort>().is_err());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Client.to_string(), "client");
        assert_eq!(Role::Server.to_string(), "server");
    }

    #[test]
    fn test_config_from_args() {
        let config = Config::from_args(test_args(false)).unwrap();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.local.port, 7070);
        assert_eq!(config.remote.host, "peer.example.net");

        let config = Config::from_args(test_args(true)).unwrap();
        assert_eq!(config.role, Role::Server);
    }

    #[test]
    fn test_config_from_args_rejects_bad_endpoint() {
        let mut args = test_args(false);
        args.remote = "no-port".to_string();
        let err = Config::from_args(args).unwrap_err();
        assert!(matches!(err, TunnelError::Config(_)));
    }
}
