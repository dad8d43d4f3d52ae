//! `envoy.api.v2` schema.
//!
//! envoy-types only ships the v3 API, so the handful of v2 messages the
//! client needs are declared in [`proto`].

use bytes::Bytes;
use envoy_types::pb::google::protobuf::{Struct, value::Kind};
use prost::Message;

use crate::codec::{HTTP_CONNECTION_MANAGER, XdsCodec, metadata_struct};
use crate::error::Result;
use crate::message::{DiscoveryRequest, DiscoveryResponse, ResourceAny};
use crate::resource::{ClusterResource, ListenerResource, Resource};

pub mod proto;

use proto::cluster::{ClusterDiscoveryType, DiscoveryType};
use proto::filter::ConfigType;
use proto::http_connection_manager::RouteSpecifier;
use proto::{
    Cluster, ClusterLoadAssignment, HttpConnectionManager, Listener, RouteConfiguration, Secret,
};

/// Filter name used by v2 control planes before the `envoy.filters.*` rename.
const LEGACY_HTTP_CONNECTION_MANAGER: &str = "envoy.http_connection_manager";

const HTTP_CONNECTION_MANAGER_TYPE_URL: &str = "type.googleapis.com/envoy.config.filter.network.http_connection_manager.v2.HttpConnectionManager";

/// A codec for the `envoy.api.v2` ADS schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2Codec;

impl XdsCodec for V2Codec {
    type Cluster = Cluster;
    type Endpoint = ClusterLoadAssignment;
    type Listener = Listener;
    type Route = RouteConfiguration;
    type Secret = Secret;

    const ADS_PATH: &'static str =
        "/envoy.service.discovery.v2.AggregatedDiscoveryService/StreamAggregatedResources";

    const RUNTIME_TYPE_URL: &'static str =
        "type.googleapis.com/envoy.service.discovery.v2.Runtime";

    fn encode_request(&self, request: &DiscoveryRequest<'_>) -> Result<Bytes> {
        let proto_request = proto::DiscoveryRequest {
            version_info: request.version_info.to_owned(),
            node: Some(proto::Node {
                id: request.node.id.clone(),
                metadata: Some(metadata_struct(&request.node.metadata)),
                ..Default::default()
            }),
            resource_names: request.resource_names.to_vec(),
            type_url: request.type_url.to_owned(),
            response_nonce: request.response_nonce.to_owned(),
        };

        Ok(proto_request.encode_to_vec().into())
    }

    fn decode_response(&self, bytes: Bytes) -> Result<DiscoveryResponse> {
        let proto_response = proto::DiscoveryResponse::decode(bytes)?;

        Ok(DiscoveryResponse {
            version_info: proto_response.version_info,
            resources: proto_response
                .resources
                .into_iter()
                .map(|any| ResourceAny {
                    type_url: any.type_url,
                    value: any.value.into(),
                })
                .collect(),
            type_url: proto_response.type_url,
            nonce: proto_response.nonce,
        })
    }
}

impl Resource for Cluster {
    const TYPE_URL: &'static str = "type.googleapis.com/envoy.api.v2.Cluster";

    fn decode(bytes: Bytes) -> Result<Self> {
        Ok(<Self as Message>::decode(bytes)?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ClusterResource for Cluster {
    fn endpoint_name(&self) -> Option<&str> {
        match self.cluster_discovery_type {
            Some(ClusterDiscoveryType::Type(t)) if t == DiscoveryType::Eds as i32 => {}
            _ => return None,
        }

        let service_name = self
            .eds_cluster_config
            .as_ref()
            .map(|eds| eds.service_name.as_str())
            .filter(|name| !name.is_empty());
        Some(service_name.unwrap_or(&self.name))
    }
}

impl Resource for ClusterLoadAssignment {
    const TYPE_URL: &'static str = "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment";

    fn decode(bytes: Bytes) -> Result<Self> {
        Ok(<Self as Message>::decode(bytes)?)
    }

    fn name(&self) -> &str {
        &self.cluster_name
    }
}

impl Resource for Listener {
    const TYPE_URL: &'static str = "type.googleapis.com/envoy.api.v2.Listener";

    fn decode(bytes: Bytes) -> Result<Self> {
        Ok(<Self as Message>::decode(bytes)?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ListenerResource for Listener {
    fn route_config_names(&self) -> Vec<String> {
        self.filter_chains
            .iter()
            .flat_map(|chain| &chain.filters)
            .filter(|filter| {
                filter.name == HTTP_CONNECTION_MANAGER
                    || filter.name == LEGACY_HTTP_CONNECTION_MANAGER
            })
            .filter_map(|filter| match &filter.config_type {
                Some(ConfigType::TypedConfig(any))
                    if any.type_url == HTTP_CONNECTION_MANAGER_TYPE_URL =>
                {
                    HttpConnectionManager::decode(any.value.as_slice())
                        .ok()
                        .and_then(|hcm| match hcm.route_specifier {
                            Some(RouteSpecifier::Rds(rds)) => Some(rds.route_config_name),
                            _ => None,
                        })
                }
                Some(ConfigType::Config(config)) => untyped_rds_name(config),
                _ => None,
            })
            .collect()
    }
}

/// Reads `rds.route_config_name` out of a deprecated untyped filter config.
fn untyped_rds_name(config: &Struct) -> Option<String> {
    let Some(Kind::StructValue(rds)) = config.fields.get("rds")?.kind.as_ref() else {
        return None;
    };
    let name = rds
        .fields
        .get("route_config_name")
        .or_else(|| rds.fields.get("routeConfigName"))?;
    match &name.kind {
        Some(Kind::StringValue(name)) => Some(name.clone()),
        _ => None,
    }
}

impl Resource for RouteConfiguration {
    const TYPE_URL: &'static str = "type.googleapis.com/envoy.api.v2.RouteConfiguration";

    fn decode(bytes: Bytes) -> Result<Self> {
        Ok(<Self as Message>::decode(bytes)?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Resource for Secret {
    const TYPE_URL: &'static str = "type.googleapis.com/envoy.api.v2.auth.Secret";

    fn decode(bytes: Bytes) -> Result<Self> {
        Ok(<Self as Message>::decode(bytes)?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
