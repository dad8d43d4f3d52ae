//! Crate-owned ADS message types.
//!
//! These types are schema-agnostic and serve as the interface between the
//! session logic and the codec layer. Each codec converts them to and from
//! one revision of the envoy wire schema.

use bytes::Bytes;
use serde_json::{Map, Value};

/// A discovery request to send to the control plane.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryRequest<'a> {
    /// The version_info of the most recent response of this type, or empty.
    pub version_info: &'a str,
    /// The node making the request.
    pub node: &'a Node,
    /// Resource names to subscribe to. Empty means wildcard.
    pub resource_names: &'a [String],
    /// Type URL of the resource being requested.
    pub type_url: &'a str,
    /// The nonce of the most recent response of this type, or empty for the
    /// first request of the type.
    pub response_nonce: &'a str,
}

/// A discovery response from the control plane.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResponse {
    /// The version of the response data.
    pub version_info: String,
    /// The response resources wrapped as Any envelopes.
    pub resources: Vec<ResourceAny>,
    /// Type URL of the response.
    pub type_url: String,
    /// Nonce for this response, echoed back in the acknowledgment.
    pub nonce: String,
}

/// A resource wrapped as google.protobuf.Any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAny {
    /// Type URL of the resource.
    pub type_url: String,
    /// Serialized resource bytes.
    pub value: Bytes,
}

/// Node identification sent with every request.
///
/// A `Node` is immutable once built; the control plane keys its per-client
/// state on `id`, so it never changes during a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    /// An opaque node identifier.
    pub id: String,
    /// Free-form metadata, encoded as a protobuf `Struct`.
    pub metadata: Map<String, Value>,
}

impl Node {
    /// Create a node with the given id and no metadata.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: Map::new(),
        }
    }

    /// Set the node metadata.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
