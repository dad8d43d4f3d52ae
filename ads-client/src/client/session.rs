//! Session state and the receive loop.

use std::fmt;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::cascade;
use crate::client::config::{AckFailurePolicy, ClientConfig};
use crate::client::demux::ResourceBatch;
use crate::client::dispatcher::Dispatcher;
use crate::client::handler::ResourceHandler;
use crate::codec::XdsCodec;
use crate::error::{Error, Result};
use crate::resource::{Resource, ResourceKind};
use crate::transport::TransportStream;

/// Lifecycle of the client's connection.
///
/// `Disconnected → Connecting → Streaming → (Draining →) Closed`. A failed
/// connect returns to `Disconnected`; `connect` is allowed again from
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No connection has been attempted, or the last attempt failed.
    Disconnected,
    /// Dialing the server and opening the stream.
    Connecting,
    /// The stream is open.
    Streaming,
    /// The stream has ended and the connection is being torn down.
    Draining,
    /// The connection has been closed.
    Closed,
}

impl SessionState {
    /// Returns the state name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processes responses of one stream until it ends.
pub(crate) struct ReceiveLoop<'a, C: XdsCodec, H> {
    config: &'a ClientConfig,
    dispatcher: &'a Dispatcher<C>,
    handler: &'a H,
    batch: ResourceBatch<C>,
}

impl<'a, C, H> ReceiveLoop<'a, C, H>
where
    C: XdsCodec,
    H: ResourceHandler<C>,
{
    pub(crate) fn new(config: &'a ClientConfig, dispatcher: &'a Dispatcher<C>, handler: &'a H) -> Self {
        Self {
            config,
            dispatcher,
            handler,
            batch: ResourceBatch::new(),
        }
    }

    /// Receive until the stream fails or `cancel` fires.
    ///
    /// Cancellation, whether local or signalled by the transport, ends the
    /// loop with `Ok(())`. Every other ending is a
    /// [`Error::ConnectionClosed`], including the server finishing the stream.
    ///
    /// `cancel` is also observed while a response is being processed, so a
    /// handler that never returns or a send stuck on a full request buffer
    /// cannot keep the loop alive after it is cancelled.
    pub(crate) async fn run<S: TransportStream>(
        mut self,
        stream: &mut S,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("receive loop cancelled");
                    return Ok(());
                }
                received = stream.recv() => received,
            };

            match received {
                Ok(Some(bytes)) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("receive loop cancelled while processing a response");
                        return Ok(());
                    }
                    processed = self.process(bytes) => processed?,
                },
                Ok(None) => return Err(Error::ConnectionClosed(Box::new(Error::StreamClosed))),
                Err(e) if e.is_cancellation() => {
                    debug!(error = %e, "stream cancelled");
                    return Ok(());
                }
                Err(e) => return Err(Error::ConnectionClosed(Box::new(e))),
            }
        }
    }

    async fn process(&mut self, bytes: Bytes) -> Result<()> {
        let response = self
            .dispatcher
            .codec()
            .decode_response(bytes)
            .map_err(|e| Error::ConnectionClosed(Box::new(e)))?;

        debug!(
            kind = %ResourceKind::classify::<C>(&response.type_url),
            version = %response.version_info,
            nonce = %response.nonce,
            resources = response.resources.len(),
            "received response"
        );
        self.dispatcher.record_response(&response);

        self.batch.fill(&response, self.config.decode_failure)?;
        self.dispatch().await?;

        let acked = self.dispatcher.acknowledge(&response).await;
        self.check_send(acked, "acknowledgment", &response.type_url)
    }

    async fn dispatch(&self) -> Result<()> {
        let batch = &self.batch;
        let dispatcher = self.dispatcher;

        if !batch.clusters.is_empty() {
            self.handler.on_clusters(dispatcher, &batch.clusters).await;
            if self.config.cascade {
                let names = cascade::endpoint_names(&batch.clusters);
                self.cascade(<C::Endpoint as Resource>::TYPE_URL, &names)
                    .await?;
            }
        }
        if !batch.endpoints.is_empty() {
            self.handler.on_endpoints(dispatcher, &batch.endpoints).await;
        }
        if !batch.listeners.is_empty() {
            self.handler.on_listeners(dispatcher, &batch.listeners).await;
            if self.config.cascade {
                let names = cascade::route_names(&batch.listeners);
                self.cascade(<C::Route as Resource>::TYPE_URL, &names).await?;
            }
        }
        if !batch.routes.is_empty() {
            self.handler.on_routes(dispatcher, &batch.routes).await;
        }
        if !batch.secrets.is_empty() {
            self.handler.on_secrets(dispatcher, &batch.secrets).await;
        }
        if !batch.unrecognized.is_empty() {
            self.handler
                .on_unrecognized(dispatcher, &batch.unrecognized)
                .await;
        }
        Ok(())
    }

    async fn cascade(&self, type_url: &str, names: &[String]) -> Result<()> {
        info!(
            kind = %ResourceKind::classify::<C>(type_url),
            count = names.len(),
            "cascading subscription"
        );
        let sent = self.dispatcher.send_subscription(type_url, names).await;
        self.check_send(sent, "cascade subscription", type_url)
    }

    fn check_send(&self, result: Result<()>, what: &str, type_url: &str) -> Result<()> {
        match (result, self.config.ack_failure) {
            (Ok(()), _) => Ok(()),
            (Err(error), AckFailurePolicy::Log) => {
                warn!(%error, type_url, "failed to send {what}");
                Ok(())
            }
            (Err(error), AckFailurePolicy::Fail) => Err(error),
        }
    }
}
