//! Bidirectional byte relay between the two legs of a connection pair.
//!
//! Both directions are pumped from a single task. The first clean EOF on
//! either leg ends the relay, and both legs are closed before control
//! returns, so a finished peer never leaves the opposite socket dangling.
//! Read and write failures end the relay the same way and surface as
//! [`TunnelError::RelayIo`].

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::TunnelError;

use super::stream::TunnelStream;

/// Size of the relay copy buffer, one per direction.
const RELAY_BUFFER_SIZE: usize = 8192;

/// Byte counters for one relayed connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayStats {
    /// Bytes copied from the frontend to the backend.
    pub bytes_to_backend: u64,

    /// Bytes copied from the backend to the frontend.
    pub bytes_from_backend: u64,
}

/// Relay bytes between the two legs until EOF or an I/O error.
///
/// Both legs are closed on every exit path, and the byte counters are
/// returned alongside the outcome: a relay that fails still reports what it
/// moved before the failure.
pub async fn run(
    mut frontend: TunnelStream,
    mut backend: TunnelStream,
) -> (RelayStats, Result<(), TunnelError>) {
    let mut stats = RelayStats::default();
    let result = copy_until_eof(&mut frontend, &mut backend, &mut stats).await;

    frontend.close().await;
    backend.close().await;

    (stats, result)
}

async fn copy_until_eof(
    frontend: &mut TunnelStream,
    backend: &mut TunnelStream,
    stats: &mut RelayStats,
) -> Result<(), TunnelError> {
    let mut frontend_buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut backend_buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        tokio::select! {
            read_result = frontend.read(&mut frontend_buf) => {
                match read_result {
                    Ok(0) => break,
                    Ok(n) => {
                        backend
                            .write_all(&frontend_buf[..n])
                            .await
                            .map_err(TunnelError::RelayIo)?;
                        // A TLS leg can hold a partial record after write_all;
                        // push it out before parking on the next read.
                        backend.flush().await.map_err(TunnelError::RelayIo)?;
                        stats.bytes_to_backend += n as u64;
                    }
                    Err(e) => return Err(TunnelError::RelayIo(e)),
                }
            }
            read_result = backend.read(&mut backend_buf) => {
                match read_result {
                    Ok(0) => break,
                    Ok(n) => {
                        frontend
                            .write_all(&backend_buf[..n])
                            .await
                            .map_err(TunnelError::RelayIo)?;
                        frontend.flush().await.map_err(TunnelError::RelayIo)?;
                        stats.bytes_from_backend += n as u64;
                    }
                    Err(e) => return Err(TunnelError::RelayIo(e)),
                }
            }
        }
    }

    Ok(())
}
