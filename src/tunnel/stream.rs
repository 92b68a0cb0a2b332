//! Unified stream type for the two legs of a connection pair.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsStream;
use tracing::trace;

/// One leg of a tunneled connection: raw TCP or a TLS session over TCP.
///
/// The relay treats both legs through this type and never needs to know which
/// side carries the encryption.
#[derive(Debug)]
pub struct TunnelStream {
    kind: StreamKind,
    closed: bool,
}

#[derive(Debug)]
enum StreamKind {
    Plain(TcpStream),
    // Boxed: a TLS session is an order of magnitude larger than a TcpStream.
    Tls(Box<TlsStream<TcpStream>>),
}

impl TunnelStream {
    /// Wrap a plaintext TCP stream.
    pub fn plain(stream: TcpStream) -> Self {
        Self {
            kind: StreamKind::Plain(stream),
            closed: false,
        }
    }

    /// Wrap an established TLS session.
    pub fn tls(stream: TlsStream<TcpStream>) -> Self {
        Self {
            kind: StreamKind::Tls(Box::new(stream)),
            closed: false,
        }
    }

    /// Shut this leg down and mark it closed.
    ///
    /// Idempotent: the second and later calls do nothing. Shutdown errors are
    /// swallowed since the peer may already have torn the connection down.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.shutdown().await {
            trace!(error = %e, "shutdown during close");
        }
    }
}

impl AsyncRead for TunnelStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().kind {
            StreamKind::Plain(s) => Pin::new(s).poll_read(cx, buf),
            StreamKind::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TunnelStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().kind {
            StreamKind::Plain(s) => Pin::new(s).poll_write(cx, buf),
            StreamKind::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().kind {
            StreamKind::Plain(s) => Pin::new(s).poll_flush(cx),
            StreamKind::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().kind {
            StreamKind::Plain(s) => Pin::new(s).poll_shutdown(cx),
            StreamKind::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
