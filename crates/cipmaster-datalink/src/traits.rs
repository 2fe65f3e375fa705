use std::time::Duration;
use thiserror::Error;

/// Errors that can occur at the transport layer.
#[derive(Debug, Error)]
pub enum DataLinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too large")]
    FrameTooLarge,
    #[error("invalid frame")]
    InvalidFrame,
    #[error("socket not connected")]
    NotConnected,
    #[error("timed out")]
    Timeout,
}

/// Async trait for exchanging raw EtherNet/IP frames with one adapter.
///
/// The explicit channel carries whole encapsulation frames over TCP; the
/// cyclic channel carries connected-data datagrams over UDP.
/// [`EnipTransport`](crate::EnipTransport) is the socket implementation.
pub trait CipTransport: Send + Sync {
    /// Whether the explicit (TCP) channel is open.
    fn is_connected(&self) -> bool;

    async fn send_explicit(&self, frame: &[u8]) -> Result<(), DataLinkError>;

    /// Receives one complete encapsulation frame, header included.
    async fn recv_explicit(&self) -> Result<Vec<u8>, DataLinkError>;

    /// Sends one datagram. Fails with [`DataLinkError::NotConnected`] when the
    /// unicast socket is missing.
    async fn send_cyclic(&self, frame: &[u8]) -> Result<(), DataLinkError>;

    /// Waits up to `wait` for one datagram. `Ok(None)` means nothing arrived,
    /// including when the multicast socket is missing.
    async fn recv_cyclic(
        &self,
        buf: &mut [u8],
        wait: Duration,
    ) -> Result<Option<usize>, DataLinkError>;

    /// Drops every socket. Calling it again is a no-op.
    async fn close(&self);
}
