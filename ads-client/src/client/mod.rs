//! The ADS client: connection lifecycle and the receive loop.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};

use crate::client::config::ClientConfig;
use crate::client::dispatcher::Dispatcher;
use crate::client::handler::ResourceHandler;
use crate::client::session::{ReceiveLoop, SessionState};
use crate::codec::XdsCodec;
use crate::error::{Error, Result};
use crate::message::Node;
use crate::runtime::Runtime;
use crate::transport::{Transport, TransportBuilder};

pub mod cascade;
pub mod config;
pub mod demux;
pub mod dispatcher;
pub mod handler;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

/// Live state of one connection. Replaced wholesale on every `connect`.
struct Connection<T: Transport> {
    transport: Option<T>,
    stream: Option<T::Stream>,
    cancel: Option<CancellationToken>,
    /// Bumped on every `connect`, so a receive loop that outlives its
    /// connection does not tear down the next one.
    generation: u64,
}

impl<T: Transport> Connection<T> {
    fn is_open(&self) -> bool {
        self.cancel.is_some()
    }
}

struct Shared<C: XdsCodec, B: TransportBuilder, H, R> {
    config: ClientConfig,
    builder: B,
    handler: H,
    runtime: R,
    dispatcher: Dispatcher<C>,
    connection: Mutex<Connection<B::Transport>>,
    state: watch::Sender<SessionState>,
    /// True while a receive loop runs. Only claimed under the connection lock.
    receiving: watch::Sender<bool>,
}

impl<C, B, H, R> Shared<C, B, H, R>
where
    C: XdsCodec,
    B: TransportBuilder,
{
    fn lock(&self) -> MutexGuard<'_, Connection<B::Transport>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "session state changed");
        }
    }

    /// Cancel the receive loop, half-close the stream and drop the channel.
    fn teardown(&self, conn: &mut Connection<B::Transport>) {
        if let Some(cancel) = conn.cancel.take() {
            cancel.cancel();
        }
        self.dispatcher.close_send();
        conn.stream = None;
        conn.transport = None;
    }
}

/// A client for the xDS Aggregated Discovery Service.
///
/// The client owns one bidirectional `StreamAggregatedResources` call at a
/// time. [`connect`](Self::connect) dials the server, opens the stream and
/// runs the handler's on-connect hook; [`receive`](Self::receive) then
/// processes responses until the stream ends. [`run`](Self::run) does both on
/// the calling task and [`start`](Self::start) moves the receive loop onto a
/// background task.
///
/// Cloning an `AdsClient` yields another handle to the same session, so one
/// clone can [`close`](Self::close) while another is receiving. Use
/// [`fresh`](Self::fresh) for an independent client with the same
/// configuration.
///
/// Reconnection is never automatic: after the receive loop ends, call
/// `connect` again.
pub struct AdsClient<C: XdsCodec, B: TransportBuilder, H, R> {
    shared: Arc<Shared<C, B, H, R>>,
}

impl<C: XdsCodec, B: TransportBuilder, H, R> Clone for AdsClient<C, B, H, R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: XdsCodec, B: TransportBuilder, H, R> fmt::Debug for AdsClient<C, B, H, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdsClient")
            .field("server", &self.shared.config.server.uri())
            .field("node", &self.shared.config.node.id)
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

/// An [`AdsClient`] speaking gRPC through tonic on the tokio runtime.
#[cfg(feature = "transport-tonic")]
pub type TonicAdsClient<C, H> = AdsClient<
    C,
    crate::transport::tonic::TonicTransportBuilder,
    H,
    crate::runtime::tokio::TokioRuntime,
>;

impl<C, B, H, R> AdsClient<C, B, H, R>
where
    C: XdsCodec,
    B: TransportBuilder,
    H: ResourceHandler<C>,
    R: Runtime,
{
    /// Create a disconnected client.
    ///
    /// The node identity in `config` is fixed for the lifetime of the client.
    pub fn new(config: ClientConfig, codec: C, builder: B, handler: H, runtime: R) -> Self {
        let dispatcher = Dispatcher::new(codec, config.node.clone());
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (receiving, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                config,
                builder,
                handler,
                runtime,
                dispatcher,
                connection: Mutex::new(Connection {
                    transport: None,
                    stream: None,
                    cancel: None,
                    generation: 0,
                }),
                state,
                receiving,
            }),
        }
    }

    /// A new, disconnected client with the same configuration, codec,
    /// transport builder, handler and runtime. No connection state is shared.
    pub fn fresh(&self) -> Self
    where
        C: Clone,
        B: Clone,
        H: Clone,
    {
        Self::new(
            self.shared.config.clone(),
            self.shared.dispatcher.codec().clone(),
            self.shared.builder.clone(),
            self.shared.handler.clone(),
            self.shared.runtime.clone(),
        )
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// The node identity sent with every request.
    pub fn node(&self) -> &Node {
        self.shared.dispatcher.node()
    }

    /// The request dispatcher of this client.
    pub fn dispatcher(&self) -> &Dispatcher<C> {
        &self.shared.dispatcher
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Subscribe to session state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Dial the server, open the ADS stream and run the handler's on-connect
    /// hook.
    ///
    /// Any previous connection is closed first, and a receive loop still
    /// running on it is waited for. On failure the client is left
    /// `Disconnected` and the error is returned; nothing is retried.
    pub async fn connect(&self) -> Result<()> {
        self.connect_generation().await.map(drop)
    }

    async fn connect_generation(&self) -> Result<u64> {
        let shared = &*self.shared;
        let generation = {
            let mut conn = shared.lock();
            shared.teardown(&mut conn);
            conn.generation += 1;
            conn.generation
        };
        // The old loop is cancelled; it must let go of the session before the
        // new stream is published. Loops started later see the new generation.
        let _ = shared.receiving.subscribe().wait_for(|running| !running).await;

        shared.set_state(SessionState::Connecting);
        info!(
            server = shared.config.server.uri(),
            node = %shared.config.node.id,
            "connecting to ADS server"
        );

        match self.open(generation).await {
            Ok(()) => Ok(generation),
            Err(e) => {
                warn!(error = %e, server = shared.config.server.uri(), "failed to connect");
                {
                    let mut conn = shared.lock();
                    if conn.generation == generation {
                        shared.teardown(&mut conn);
                    }
                }
                shared.set_state(SessionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn open(&self, generation: u64) -> Result<()> {
        let shared = &*self.shared;
        let transport = shared.builder.build(&shared.config.server).await?;
        let (sink, stream) = transport.new_stream(C::ADS_PATH).await?;

        {
            let mut conn = shared.lock();
            if conn.generation != generation {
                return Err(Error::Connection("superseded by a newer connect".to_string()));
            }
            shared.dispatcher.attach(sink);
            conn.transport = Some(transport);
            conn.stream = Some(stream);
            conn.cancel = Some(CancellationToken::new());
        }
        shared.set_state(SessionState::Streaming);
        info!(server = shared.config.server.uri(), "ADS stream open");

        shared.handler.on_connect(&shared.dispatcher).await
    }

    /// Process responses until the stream ends.
    ///
    /// Returns `Ok(())` when the stream is cancelled, locally through
    /// [`close`](Self::close) or by the transport. Any other ending, including
    /// the server finishing the stream, is returned as
    /// [`Error::ConnectionClosed`]. Either way the session ends up `Closed`.
    ///
    /// Only one receive loop may run per client; a second concurrent call
    /// fails with [`Error::AlreadyReceiving`].
    pub async fn receive(&self) -> Result<()> {
        self.receive_generation(None).await
    }

    /// Receive on the current connection, or only on connection `expected`
    /// when given. A loop bound to a connection that has since been closed or
    /// replaced has nothing to do and returns `Ok(())`.
    async fn receive_generation(&self, expected: Option<u64>) -> Result<()> {
        let shared = &*self.shared;

        let (mut stream, cancel, generation, _receiving) = {
            let mut conn = shared.lock();
            if expected.is_some_and(|g| g != conn.generation || !conn.is_open()) {
                debug!(?expected, "connection gone before receiving");
                return Ok(());
            }
            if *shared.receiving.borrow() {
                return Err(Error::AlreadyReceiving);
            }
            let Some(cancel) = conn.cancel.clone() else {
                return Err(Error::NotConnected);
            };
            let Some(stream) = conn.stream.take() else {
                return Err(Error::NotConnected);
            };
            shared.receiving.send_replace(true);
            (
                stream,
                cancel,
                conn.generation,
                ReceivingGuard(&shared.receiving),
            )
        };

        let result = ReceiveLoop::new(&shared.config, &shared.dispatcher, &shared.handler)
            .run(&mut stream, &cancel)
            .await;
        drop(stream);

        match &result {
            Ok(()) => info!("ADS stream finished"),
            Err(e) => warn!(error = %e, "ADS stream failed"),
        }

        let mut conn = shared.lock();
        if conn.generation == generation && conn.is_open() {
            shared.set_state(SessionState::Draining);
            shared.teardown(&mut conn);
            shared.set_state(SessionState::Closed);
        }
        drop(conn);

        result
    }

    /// Connect, then receive on the calling task until the stream ends.
    pub async fn run(&self) -> Result<()> {
        let generation = self.connect_generation().await?;
        self.receive_generation(Some(generation)).await
    }

    /// Connect, then receive on a background task spawned through the
    /// runtime.
    ///
    /// Connection errors are returned directly. The receiver yields the
    /// result of the receive loop once it ends; it may be dropped if the
    /// caller does not care. The loop is bound to the connection opened here:
    /// if that connection is closed or replaced before the loop starts, the
    /// receiver yields `Ok(())`.
    pub async fn start(&self) -> Result<oneshot::Receiver<Result<()>>> {
        let generation = self.connect_generation().await?;

        let (tx, rx) = oneshot::channel();
        let client = self.clone();
        let span = info_span!(
            "ads_receive",
            server = self.shared.config.server.uri(),
            node = %self.shared.config.node.id
        );
        self.shared.runtime.spawn(span, async move {
            let result = client.receive_generation(Some(generation)).await;
            if let Err(e) = &result {
                error!(error = %e, "ADS receive loop terminated");
            }
            let _ = tx.send(result);
        });
        Ok(rx)
    }

    /// Send an ad hoc subscription for `type_url` on the current stream.
    ///
    /// See [`Dispatcher::send_subscription`].
    pub async fn send_subscription(&self, type_url: &str, resource_names: &[String]) -> Result<()> {
        self.shared
            .dispatcher
            .send_subscription(type_url, resource_names)
            .await
    }

    /// Close the connection.
    ///
    /// Cancels a running receive loop (which then returns `Ok(())`),
    /// half-closes the stream and drops the channel. Safe to call repeatedly
    /// and from any thread.
    pub fn close(&self) {
        let shared = &*self.shared;
        let mut conn = shared.lock();
        if conn.is_open() {
            info!(server = shared.config.server.uri(), "closing ADS connection");
        }
        shared.teardown(&mut conn);
        shared.set_state(SessionState::Closed);
    }
}

struct ReceivingGuard<'a>(&'a watch::Sender<bool>);

impl Drop for ReceivingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}
