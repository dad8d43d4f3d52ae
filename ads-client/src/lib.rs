//! A Rust client for the xDS [Aggregated Discovery Service](https://www.envoyproxy.io/docs/envoy/latest/api-docs/xds_protocol#aggregated-discovery-service).
//!
//! The client opens one bidirectional `StreamAggregatedResources` call to a
//! control plane and drives it:
//! - subscribes to clusters and listeners on connect (overridable),
//! - decodes every response into per-kind batches sorted by name,
//! - cascades EDS subscriptions from clusters and RDS subscriptions from
//!   listeners,
//! - acknowledges every response with its version and nonce.
//!
//! The session engine is written once against [`XdsCodec`]; [`V2Codec`] and
//! [`V3Codec`] adapt it to the `envoy.api.v2` and envoy v3 schemas.
//!
//! It does NOT contain:
//! - automatic reconnection or backoff
//! - NACKs or per-resource validation
//! - a resource cache
//!
//! # Example
//!
//! ```ignore
//! use ads_client::{
//!     ClientConfig, Dispatcher, NodeConfig, ResourceHandler, ServerConfig, TlsConfig,
//!     TokioRuntime, TonicAdsClient, TonicTransportBuilder, V3Codec,
//! };
//! use envoy_types::pb::envoy::config::cluster::v3::Cluster;
//!
//! struct Printer;
//!
//! impl ResourceHandler<V3Codec> for Printer {
//!     async fn on_clusters(&self, _: &Dispatcher<V3Codec>, clusters: &[Cluster]) {
//!         for cluster in clusters {
//!             println!("{}", cluster.name);
//!         }
//!     }
//! }
//!
//! let config = ClientConfig::new(
//!     ServerConfig::new("istiod.istio-system:15012"),
//!     NodeConfig::new().with_namespace("shop").build(),
//! );
//! let builder = TonicTransportBuilder::new().with_tls(TlsConfig::from_dir("/etc/certs")?);
//! let client = TonicAdsClient::new(config, V3Codec, builder, Printer, TokioRuntime);
//!
//! // Connect and receive until the stream ends.
//! client.run().await?;
//! ```
//!
//! # Feature Flags
//!
//! - `transport-tonic`: Enables the `tonic` transport with rustls-based mutual TLS. This enables the `rt-tokio` feature. Enabled by default.
//! - `rt-tokio`: Enables the use of the `tokio` runtime. Enabled by default.
//! - `test-util`: Exposes the in-memory transport in [`transport::mock`].

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod node;
pub mod resource;
pub mod runtime;
pub mod transport;

pub use client::AdsClient;
pub use client::config::{AckFailurePolicy, ClientConfig, DecodeFailurePolicy, ServerConfig};
pub use client::demux::ResourceBatch;
pub use client::dispatcher::{AckState, Dispatcher};
pub use client::handler::{NoopHandler, ResourceHandler};
pub use client::session::SessionState;
pub use codec::{V2Codec, V3Codec, XdsCodec};
pub use error::{Error, Result};
pub use message::{DiscoveryRequest, DiscoveryResponse, Node, ResourceAny};
pub use node::NodeConfig;
pub use resource::{ClusterResource, ListenerResource, Resource, ResourceKind};
pub use runtime::Runtime;
pub use transport::{RequestSink, Transport, TransportBuilder, TransportStream};

// Tokio runtime
#[cfg(feature = "rt-tokio")]
pub use runtime::tokio::TokioRuntime;

// Tonic transport
#[cfg(feature = "transport-tonic")]
pub use client::TonicAdsClient;
#[cfg(feature = "transport-tonic")]
pub use transport::tls::TlsConfig;
#[cfg(feature = "transport-tonic")]
pub use transport::tonic::{TonicTransport, TonicTransportBuilder};
