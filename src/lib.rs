pub mod config;
pub mod error;
pub mod tls;
pub mod tunnel;

pub use config::{Args, Config, HostPort, Role};
pub use error::TunnelError;
pub use tls::TlsWrapper;
pub use tunnel::{RelayStats, TunnelListener, TunnelStats, TunnelStream};
