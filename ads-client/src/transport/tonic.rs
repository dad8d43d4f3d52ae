//! `tonic` based transport implementation.
//!
//! The ADS call is driven through tonic's low-level `Grpc` client and carries
//! raw bytes; encoding is left to the client's codec so one transport serves
//! both the v2 and v3 schemas.
//!
//! TLS is layered in through a custom connector rather than tonic's own TLS
//! features, so the same path also serves user supplied dialers.

use crate::client::config::ServerConfig;
use crate::error::{Error, Result};
use crate::transport::tls::TlsConfig;
use crate::transport::{RequestSink, Transport, TransportBuilder, TransportStream};
use bytes::{Buf, BufMut, Bytes};
use http::Uri;
use http::uri::PathAndQuery;
use hyper_util::rt::TokioIo;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::transport::{Channel, Endpoint};
use tonic::{Status, Streaming};
use tower::service_fn;

/// Moves already serialized messages on and off the wire untouched. The
/// [`XdsCodec`](crate::codec::XdsCodec) picked by the client owns the schema.
#[derive(Debug, Clone, Copy, Default)]
struct PassThrough;

impl Codec for PassThrough {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = Self;
    type Decoder = Self;

    fn encoder(&mut self) -> Self {
        *self
    }

    fn decoder(&mut self) -> Self {
        *self
    }
}

impl Encoder for PassThrough {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, request: Bytes, dst: &mut EncodeBuf<'_>) -> std::result::Result<(), Status> {
        dst.put(request);
        Ok(())
    }
}

impl Decoder for PassThrough {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> std::result::Result<Option<Bytes>, Status> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

/// A byte stream a [`Dialer`] can hand to the channel.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A custom dial function, called with the server URI for every connection.
pub type Dialer = Arc<dyn Fn(Uri) -> BoxFuture<io::Result<Box<dyn Io>>> + Send + Sync>;

/// Builder for [`TonicTransport`] instances.
///
/// With neither TLS nor a dialer configured the channel dials plain TCP
/// through tonic's default connector.
///
/// # Example
///
/// ```ignore
/// use ads_client::{TlsConfig, TonicTransportBuilder};
///
/// let builder = TonicTransportBuilder::new()
///     .with_tls(TlsConfig::from_dir("/etc/certs")?)
///     .with_connect_timeout(Duration::from_secs(5));
/// ```
#[derive(Clone, Default)]
pub struct TonicTransportBuilder {
    tls: Option<TlsConfig>,
    dialer: Option<Dialer>,
    connect_timeout: Option<Duration>,
}

impl TonicTransportBuilder {
    /// Create a new transport builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Secure the channel with mutual TLS.
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Replace the TCP dial with a custom function. When TLS is also set, the
    /// handshake runs on top of the dialed stream.
    pub fn with_dialer<F, Fut, I>(mut self, dial: F) -> Self
    where
        F: Fn(Uri) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<I>> + Send + 'static,
        I: Io,
    {
        self.dialer = Some(Arc::new(move |uri| {
            let dialing = dial(uri);
            Box::pin(async move { Ok(Box::new(dialing.await?) as Box<dyn Io>) })
        }));
        self
    }

    /// Bound the time spent establishing the connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// The configured TLS material, if any.
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }
}

impl fmt::Debug for TonicTransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicTransportBuilder")
            .field("tls", &self.tls)
            .field("dialer", &self.dialer.as_ref().map(|_| "custom"))
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl TransportBuilder for TonicTransportBuilder {
    type Transport = TonicTransport;

    async fn build(&self, server: &ServerConfig) -> Result<Self::Transport> {
        let uri = endpoint_uri(server.uri(), self.tls.is_some())?;
        let mut endpoint = Endpoint::from(uri);
        if let Some(timeout) = self.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        let channel = if self.tls.is_none() && self.dialer.is_none() {
            endpoint.connect().await
        } else {
            let tls = match &self.tls {
                Some(tls) => Some((tls.connector()?, tls.clone())),
                None => None,
            };
            let dialer = self.dialer.clone();
            endpoint
                .connect_with_connector(service_fn(move |uri: Uri| {
                    let tls = tls.clone();
                    let dialer = dialer.clone();
                    async move { dial(uri, dialer, tls).await.map(TokioIo::new) }
                }))
                .await
        }
        .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(TonicTransport::from_channel(channel))
    }
}

/// Normalize `host:port` into a URI; the scheme follows the TLS setting.
fn endpoint_uri(raw: &str, tls: bool) -> Result<Uri> {
    let raw = if raw.contains("://") {
        raw.to_string()
    } else if tls {
        format!("https://{raw}")
    } else {
        format!("http://{raw}")
    };

    let uri: Uri = raw
        .parse()
        .map_err(|e: http::uri::InvalidUri| Error::InvalidUri(format!("{raw}: {e}")))?;
    if uri.host().is_none() {
        return Err(Error::InvalidUri(format!("{raw}: missing host")));
    }
    Ok(uri)
}

async fn dial(
    uri: Uri,
    dialer: Option<Dialer>,
    tls: Option<(TlsConnector, TlsConfig)>,
) -> io::Result<Box<dyn Io>> {
    let host = uri.host().unwrap_or_default().to_string();

    let io: Box<dyn Io> = match dialer {
        Some(dialer) => dialer(uri.clone()).await?,
        None => {
            let default_port = if uri.scheme_str() == Some("https") {
                443
            } else {
                80
            };
            let port = uri.port_u16().unwrap_or(default_port);
            let stream = TcpStream::connect((host.trim_matches(['[', ']']), port)).await?;
            stream.set_nodelay(true)?;
            Box::new(stream)
        }
    };

    let Some((connector, config)) = tls else {
        return Ok(io);
    };
    let server_name = config.server_name(&host).map_err(io::Error::other)?;
    let stream = connector.connect(server_name, io).await?;
    Ok(Box::new(stream))
}

/// Factory for ADS streams over a connected tonic [`Channel`].
#[derive(Clone, Debug)]
pub struct TonicTransport {
    channel: Channel,
}

impl TonicTransport {
    /// Create a transport from an existing tonic [`Channel`].
    ///
    /// Use this when you need channel configuration the builder does not
    /// expose.
    pub fn from_channel(channel: Channel) -> Self {
        Self { channel }
    }
}

impl Transport for TonicTransport {
    type Stream = TonicAdsStream;

    async fn new_stream(&self, path: &'static str) -> Result<(RequestSink, Self::Stream)> {
        let mut grpc = Grpc::new(self.channel.clone());

        grpc.ready()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let (sink, rx) = RequestSink::channel();
        let request_stream = ReceiverStream::new(rx);
        let path = PathAndQuery::from_static(path);

        // Some servers hold the response headers until the first request
        // arrives, so the call runs in the background while the caller queues
        // its initial subscriptions on the sink.
        let call = tokio::spawn(async move {
            grpc.streaming(tonic::Request::new(request_stream), path, PassThrough)
                .await
        });

        Ok((
            sink,
            TonicAdsStream {
                response: ResponseState::Pending(call),
            },
        ))
    }
}

type StreamingCall = JoinHandle<std::result::Result<tonic::Response<Streaming<Bytes>>, Status>>;

#[derive(Debug)]
enum ResponseState {
    Pending(StreamingCall),
    Ready(Streaming<Bytes>),
}

/// The receive half of an ADS stream backed by tonic.
#[derive(Debug)]
pub struct TonicAdsStream {
    response: ResponseState,
}

impl TransportStream for TonicAdsStream {
    async fn recv(&mut self) -> Result<Option<Bytes>> {
        loop {
            match &mut self.response {
                ResponseState::Ready(streaming) => return Ok(streaming.message().await?),
                ResponseState::Pending(call) => {
                    let response = call
                        .await
                        .map_err(|e| Error::Connection(format!("stream task failed: {e}")))??;
                    self.response = ResponseState::Ready(response.into_inner());
                }
            }
        }
    }
}

impl Drop for TonicAdsStream {
    fn drop(&mut self) {
        if let ResponseState::Pending(call) = &self.response {
            call.abort();
        }
    }
}
