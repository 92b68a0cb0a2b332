//! Tunnel core: accept, wrap, dial, relay.
//!
//! This module provides:
//! - The frontend listener and per-connection supervision
//! - The outbound backend dialer
//! - The bidirectional relay
//! - A unified stream type covering plaintext and TLS legs
//!
//! ## Architecture
//!
//! ```text
//! Peer -> TunnelListener -> TlsWrapper(frontend) -+
//!                                                 |-> relay
//!         backend::connect -> TlsWrapper(backend)-+
//! ```
//!
//! Which leg gets the TLS wrap depends on the configured role: the client
//! role listens in plaintext and dials TLS, the server role terminates TLS
//! and dials plaintext.
//!
//! ## Usage
//!
//! ```ignore
//! use tlstun::tunnel::TunnelListener;
//!
//! let listener = Arc::new(TunnelListener::bind(config).await?);
//! listener.run().await?;
//! ```

pub mod backend;
mod listener;
mod relay;
mod stream;

pub use listener::{TunnelListener, TunnelStats};
pub use relay::RelayStats;
pub use stream::TunnelStream;
