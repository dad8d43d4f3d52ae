//! The wire underneath an ADS session.

use crate::client::config::ServerConfig;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::future::Future;
use tokio::sync::mpsc;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
#[cfg(feature = "transport-tonic")]
pub mod tls;
#[cfg(feature = "transport-tonic")]
pub mod tonic;

/// Number of outbound requests buffered ahead of the stream.
pub(crate) const REQUEST_BUFFER_SIZE: usize = 16;

/// Factory for [`Transport`]s.
///
/// The client calls [`build`](Self::build) on every `connect`, so a builder
/// holds only configuration (TLS material, dialer, timeouts), never live
/// connection state.
pub trait TransportBuilder: Send + Sync + 'static {
    /// The transport type produced by this builder.
    type Transport: Transport;

    /// Dial the server and return a connected transport.
    fn build(&self, server: &ServerConfig) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// A connected channel to an xDS server.
///
/// The crate ships a gRPC implementation over `tonic` and, with the
/// `test-util` feature, an in-memory one in `transport::mock`.
pub trait Transport: Send + Sync + 'static {
    /// The receive half produced by this transport.
    type Stream: TransportStream;

    /// Opens the bidirectional ADS stream at `path`.
    ///
    /// The returned [`RequestSink`] is usable immediately, before the server
    /// has answered, so initial subscriptions can be queued right away.
    fn new_stream(
        &self,
        path: &'static str,
    ) -> impl Future<Output = Result<(RequestSink, Self::Stream)>> + Send;
}

/// The receive half of an ADS stream.
///
/// Yields each `DiscoveryResponse` still encoded; the session decodes it with
/// the client's codec.
pub trait TransportStream: Send + 'static {
    /// Waits for the next encoded response.
    ///
    /// `Ok(None)` means the server finished the stream; any failure on the
    /// wire surfaces as `Err`.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;
}

/// The send half of an ADS stream.
///
/// Dropping every clone of the sink half-closes the stream.
#[derive(Debug, Clone)]
pub struct RequestSink {
    tx: mpsc::Sender<Bytes>,
}

impl RequestSink {
    /// Creates a sink and the receiver a transport drains into the wire.
    pub fn channel() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(REQUEST_BUFFER_SIZE);
        (Self { tx }, rx)
    }

    /// Queue serialized DiscoveryRequest bytes for sending.
    pub async fn send(&self, request: Bytes) -> Result<()> {
        self.tx.send(request).await.map_err(|_| Error::StreamClosed)
    }

    /// Returns true once the transport has stopped accepting requests.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
