//! tlstun
//!
//! Mutual-TLS TCP tunnel endpoint.
//!
//! Two instances form a tunnel. The client role listens for plaintext
//! connections and forwards each one over TLS to its server-role peer; the
//! server role terminates TLS and forwards plaintext to a local service.
//! Both sides present certificates and verify each other against a shared
//! CA, so only holders of CA-signed keys can use the tunnel from either end.
//!
//! ```text
//! app --plain--> tlstun (client) ==TLS==> tlstun --server --plain--> service
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tlstun::config::{Args, Config};
use tlstun::tunnel::TunnelListener;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args(Args::parse())?;

    // Initialize tracing (RUST_LOG overrides the default level)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize rustls crypto provider (ring) once per process
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    info!(
        role = %config.role,
        local = %config.local,
        remote = %config.remote,
        "Starting tlstun"
    );

    let listener = match TunnelListener::bind(Arc::new(config)).await {
        Ok(listener) => Arc::new(listener),
        Err(e) => {
            error!(error = %e, "Failed to start");
            return Err(e.into());
        }
    };

    tokio::select! {
        result = Arc::clone(&listener).run() => {
            if let Err(e) = result {
                error!(error = %e, "Listener error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
