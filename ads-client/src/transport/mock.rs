//! In-memory transport for tests.
//!
//! [`channel`] returns a [`MockTransportBuilder`] to hand to the client and a
//! [`MockServer`] that plays the control plane: every stream the client opens
//! shows up as a [`MockConnection`] carrying the encoded requests, and
//! responses (or errors) pushed into it come out of the client's receive side.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::client::config::ServerConfig;
use crate::error::{Error, Result};
use crate::transport::{RequestSink, Transport, TransportBuilder, TransportStream};

#[derive(Debug)]
struct Shared {
    accept_tx: mpsc::UnboundedSender<MockConnection>,
    refuse: AtomicBool,
    dials: AtomicUsize,
}

/// Create a connected builder/server pair.
pub fn channel() -> (MockTransportBuilder, MockServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        accept_tx,
        refuse: AtomicBool::new(false),
        dials: AtomicUsize::new(0),
    });

    (
        MockTransportBuilder {
            shared: shared.clone(),
        },
        MockServer { shared, accept_rx },
    )
}

/// Builds [`MockTransport`]s wired to a [`MockServer`].
#[derive(Debug, Clone)]
pub struct MockTransportBuilder {
    shared: Arc<Shared>,
}

impl TransportBuilder for MockTransportBuilder {
    type Transport = MockTransport;

    async fn build(&self, server: &ServerConfig) -> Result<Self::Transport> {
        self.shared.dials.fetch_add(1, Ordering::SeqCst);
        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(Error::Connection(format!(
                "{}: connection refused",
                server.uri()
            )));
        }
        Ok(MockTransport {
            shared: self.shared.clone(),
        })
    }
}

/// An in-memory channel to a [`MockServer`].
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl Transport for MockTransport {
    type Stream = MockStream;

    async fn new_stream(&self, path: &'static str) -> Result<(RequestSink, Self::Stream)> {
        let (sink, requests) = RequestSink::channel();
        let (responses, rx) = mpsc::unbounded_channel();

        self.shared
            .accept_tx
            .send(MockConnection {
                path,
                requests,
                responses,
            })
            .map_err(|_| Error::Connection("mock server dropped".to_string()))?;

        Ok((sink, MockStream { rx }))
    }
}

/// The client's receive half of a mock stream.
#[derive(Debug)]
pub struct MockStream {
    rx: mpsc::UnboundedReceiver<Result<Bytes>>,
}

impl TransportStream for MockStream {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        match self.rx.recv().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// The control-plane side of a [`channel`].
#[derive(Debug)]
pub struct MockServer {
    shared: Arc<Shared>,
    accept_rx: mpsc::UnboundedReceiver<MockConnection>,
}

impl MockServer {
    /// Wait for the client to open its next stream.
    pub async fn accept(&mut self) -> Option<MockConnection> {
        self.accept_rx.recv().await
    }

    /// Make subsequent dials fail with [`Error::Connection`].
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of dial attempts so far.
    pub fn dials(&self) -> usize {
        self.shared.dials.load(Ordering::SeqCst)
    }
}

/// One stream opened by the client.
#[derive(Debug)]
pub struct MockConnection {
    path: &'static str,
    requests: mpsc::Receiver<Bytes>,
    responses: mpsc::UnboundedSender<Result<Bytes>>,
}

impl MockConnection {
    /// The RPC path the stream was opened on.
    pub fn path(&self) -> &'static str {
        self.path
    }

    /// The next encoded request, or `None` once the client half-closed.
    pub async fn next_request(&mut self) -> Option<Bytes> {
        self.requests.recv().await
    }

    /// A request that is already queued, without waiting.
    pub fn try_next_request(&mut self) -> Option<Bytes> {
        self.requests.try_recv().ok()
    }

    /// Stop accepting requests; the client's next send fails.
    pub fn close_requests(&mut self) {
        self.requests.close();
    }

    /// Deliver an encoded response to the client.
    pub fn respond(&self, response: Bytes) {
        let _ = self.responses.send(Ok(response));
    }

    /// Fail the client's next receive with `error`.
    pub fn fail(&self, error: Error) {
        let _ = self.responses.send(Err(error));
    }

    /// End the response stream cleanly.
    pub fn finish(self) {
        drop(self.responses);
    }
}
