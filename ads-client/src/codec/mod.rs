//! Codec for encoding/decoding ADS messages.
//!
//! The codec layer converts between crate-owned message types
//! ([`DiscoveryRequest`], [`DiscoveryResponse`]) and serialized bytes, and
//! names the concrete resource types of one schema revision. The session
//! engine is written once against [`XdsCodec`]; [`V2Codec`] and [`V3Codec`]
//! are thin adapters for the `envoy.api.v2` and envoy v3 schemas.

use bytes::Bytes;
use envoy_types::pb::google::protobuf::{ListValue, Struct, Value, value::Kind};
use serde_json::{Map, Value as JsonValue};

use crate::error::Result;
use crate::message::{DiscoveryRequest, DiscoveryResponse};
use crate::resource::{ClusterResource, ListenerResource, Resource};

pub mod v2;
pub mod v3;

pub use v2::V2Codec;
pub use v3::V3Codec;

/// Well-known name of the HTTP connection manager network filter.
pub(crate) const HTTP_CONNECTION_MANAGER: &str = "envoy.filters.network.http_connection_manager";

/// Trait for one revision of the ADS wire schema.
///
/// Implementations convert between the crate-owned message types and their
/// serialized wire format, and provide the typed resources the response
/// demultiplexer decodes into.
pub trait XdsCodec: Send + Sync + 'static {
    /// Cluster resource (CDS).
    type Cluster: ClusterResource;
    /// ClusterLoadAssignment resource (EDS).
    type Endpoint: Resource;
    /// Listener resource (LDS).
    type Listener: ListenerResource;
    /// RouteConfiguration resource (RDS).
    type Route: Resource;
    /// Secret resource (SDS).
    type Secret: Resource;

    /// The gRPC path of the `StreamAggregatedResources` method.
    const ADS_PATH: &'static str;

    /// The type URL of runtime resources. Runtime has no typed decoder; it is
    /// recognized so that it can be reported, and is delivered as a raw envelope.
    const RUNTIME_TYPE_URL: &'static str;

    /// Encode a [`DiscoveryRequest`] to bytes.
    fn encode_request(&self, request: &DiscoveryRequest<'_>) -> Result<Bytes>;

    /// Decode bytes into a [`DiscoveryResponse`].
    fn decode_response(&self, bytes: Bytes) -> Result<DiscoveryResponse>;
}

/// Convert JSON-shaped node metadata into a protobuf `Struct`.
pub(crate) fn metadata_struct(metadata: &Map<String, JsonValue>) -> Struct {
    Struct {
        fields: metadata
            .iter()
            .map(|(key, value)| (key.clone(), struct_value(value)))
            .collect(),
    }
}

fn struct_value(value: &JsonValue) -> Value {
    let kind = match value {
        // NullValue has a single variant, NULL_VALUE = 0.
        JsonValue::Null => Kind::NullValue(0),
        JsonValue::Bool(b) => Kind::BoolValue(*b),
        JsonValue::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        JsonValue::String(s) => Kind::StringValue(s.clone()),
        JsonValue::Array(values) => Kind::ListValue(ListValue {
            values: values.iter().map(struct_value).collect(),
        }),
        JsonValue::Object(map) => Kind::StructValue(metadata_struct(map)),
    };
    Value { kind: Some(kind) }
}
