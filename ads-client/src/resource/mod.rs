//! Provides abstraction for xDS resources.

use bytes::Bytes;

use crate::codec::XdsCodec;
use crate::error::Result;

/// Trait for decodable xDS resources.
///
/// Implemented by the concrete message types of each schema revision, so the
/// session logic can be written once against this trait.
///
/// # Example
///
/// ```ignore
/// impl Resource for RouteConfiguration {
///     const TYPE_URL: &'static str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
///
///     fn decode(bytes: Bytes) -> Result<Self> {
///         Ok(<Self as prost::Message>::decode(bytes)?)
///     }
///
///     fn name(&self) -> &str {
///         &self.name
///     }
/// }
/// ```
pub trait Resource: Send + Sync + Clone + std::fmt::Debug + 'static {
    /// The xDS type URL for this resource type.
    const TYPE_URL: &'static str;

    /// Decode a resource from its serialized bytes.
    fn decode(bytes: Bytes) -> Result<Self>;

    /// Returns the resource name.
    ///
    /// The resource name combined with the type URL uniquely identifies a resource.
    fn name(&self) -> &str;
}

/// A cluster resource, inspected to derive endpoint subscriptions.
pub trait ClusterResource: Resource {
    /// The endpoint (ClusterLoadAssignment) name to request for this cluster.
    ///
    /// Only clusters discovered through EDS yield a name: the configured EDS
    /// service name when set, otherwise the cluster's own name. Static and
    /// DNS clusters return `None`.
    fn endpoint_name(&self) -> Option<&str>;
}

/// A listener resource, inspected to derive route subscriptions.
pub trait ListenerResource: Resource {
    /// Route configuration names fetched dynamically (RDS) by the HTTP
    /// connection managers in this listener's filter chains.
    ///
    /// Inline route tables contribute nothing.
    fn route_config_names(&self) -> Vec<String>;
}

/// The resource kinds an ADS stream can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Cluster (CDS).
    Cluster,
    /// ClusterLoadAssignment (EDS).
    Endpoint,
    /// Listener (LDS).
    Listener,
    /// RouteConfiguration (RDS).
    Route,
    /// Secret (SDS).
    Secret,
    /// Runtime (RTDS).
    Runtime,
    /// Anything else.
    Unknown,
}

impl ResourceKind {
    /// Classify a type URL against the type table of codec `C`.
    pub fn classify<C: XdsCodec>(type_url: &str) -> Self {
        match type_url {
            url if url == <C::Cluster as Resource>::TYPE_URL => Self::Cluster,
            url if url == <C::Endpoint as Resource>::TYPE_URL => Self::Endpoint,
            url if url == <C::Listener as Resource>::TYPE_URL => Self::Listener,
            url if url == <C::Route as Resource>::TYPE_URL => Self::Route,
            url if url == <C::Secret as Resource>::TYPE_URL => Self::Secret,
            url if url == C::RUNTIME_TYPE_URL => Self::Runtime,
            _ => Self::Unknown,
        }
    }

    /// Returns the type URL of this kind under codec `C`, if the kind has one.
    pub fn type_url<C: XdsCodec>(self) -> Option<&'static str> {
        match self {
            Self::Cluster => Some(<C::Cluster as Resource>::TYPE_URL),
            Self::Endpoint => Some(<C::Endpoint as Resource>::TYPE_URL),
            Self::Listener => Some(<C::Listener as Resource>::TYPE_URL),
            Self::Route => Some(<C::Route as Resource>::TYPE_URL),
            Self::Secret => Some(<C::Secret as Resource>::TYPE_URL),
            Self::Runtime => Some(C::RUNTIME_TYPE_URL),
            Self::Unknown => None,
        }
    }

    /// The short discovery-service name, e.g. `CDS`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cluster => "CDS",
            Self::Endpoint => "EDS",
            Self::Listener => "LDS",
            Self::Route => "RDS",
            Self::Secret => "SDS",
            Self::Runtime => "RTDS",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
