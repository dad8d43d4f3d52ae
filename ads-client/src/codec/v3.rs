//! Envoy v3 schema, backed by prost/envoy-types.

use bytes::Bytes;
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::cluster::v3::cluster::{ClusterDiscoveryType, DiscoveryType};
use envoy_types::pb::envoy::config::core::v3 as core;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::listener::v3::filter::ConfigType;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    HttpConnectionManager, http_connection_manager::RouteSpecifier,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::Secret;
use envoy_types::pb::envoy::service::discovery::v3 as discovery;
use prost::Message;

use crate::codec::{HTTP_CONNECTION_MANAGER, XdsCodec, metadata_struct};
use crate::error::Result;
use crate::message::{DiscoveryRequest, DiscoveryResponse, ResourceAny};
use crate::resource::{ClusterResource, ListenerResource, Resource};

const HTTP_CONNECTION_MANAGER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";

/// A codec for the envoy v3 ADS schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct V3Codec;

impl XdsCodec for V3Codec {
    type Cluster = Cluster;
    type Endpoint = ClusterLoadAssignment;
    type Listener = Listener;
    type Route = RouteConfiguration;
    type Secret = Secret;

    const ADS_PATH: &'static str =
        "/envoy.service.discovery.v3.AggregatedDiscoveryService/StreamAggregatedResources";

    const RUNTIME_TYPE_URL: &'static str = "type.googleapis.com/envoy.service.runtime.v3.Runtime";

    fn encode_request(&self, request: &DiscoveryRequest<'_>) -> Result<Bytes> {
        let proto_request = discovery::DiscoveryRequest {
            version_info: request.version_info.to_owned(),
            node: Some(core::Node {
                id: request.node.id.clone(),
                metadata: Some(metadata_struct(&request.node.metadata)),
                ..Default::default()
            }),
            resource_names: request.resource_names.to_vec(),
            type_url: request.type_url.to_owned(),
            response_nonce: request.response_nonce.to_owned(),
            ..Default::default()
        };

        Ok(proto_request.encode_to_vec().into())
    }

    fn decode_response(&self, bytes: Bytes) -> Result<DiscoveryResponse> {
        let proto_response = discovery::DiscoveryResponse::decode(bytes)?;

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
    const TYPE_URL: &'static str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";

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
    const TYPE_URL: &'static str =
        "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

    fn decode(bytes: Bytes) -> Result<Self> {
        Ok(<Self as Message>::decode(bytes)?)
    }

    fn name(&self) -> &str {
        &self.cluster_name
    }
}

impl Resource for Listener {
    const TYPE_URL: &'static str = "type.googleapis.com/envoy.config.listener.v3.Listener";

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
            .filter(|filter| filter.name == HTTP_CONNECTION_MANAGER)
            .filter_map(|filter| match &filter.config_type {
                Some(ConfigType::TypedConfig(any))
                    if any.type_url == HTTP_CONNECTION_MANAGER_TYPE_URL =>
                {
                    HttpConnectionManager::decode(any.value.as_slice()).ok()
                }
                _ => None,
            })
            .filter_map(|hcm| match hcm.route_specifier {
                Some(RouteSpecifier::Rds(rds)) => Some(rds.route_config_name),
                _ => None,
            })
            .collect()
    }
}

impl Resource for RouteConfiguration {
    const TYPE_URL: &'static str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";

    fn decode(bytes: Bytes) -> Result<Self> {
        Ok(<Self as Message>::decode(bytes)?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Resource for Secret {
    const TYPE_URL: &'static str =
        "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.Secret";

    fn decode(bytes: Bytes) -> Result<Self> {
        Ok(<Self as Message>::decode(bytes)?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::message::Node;
    use envoy_types::pb::envoy::config::listener::v3::Filter;
    use envoy_types::pb::google::protobuf::Any;
    use serde_json::json;

    #[test]
    fn encode_request_carries_node_and_nonce() {
        let node = Node::new("sidecar~10.0.0.1~test.default~default.svc.cluster.local")
            .with_metadata(json!({"CLUSTER_ID": "Kubernetes"}).as_object().unwrap().clone());
        let names = vec!["a".to_string(), "b".to_string()];
        let request = DiscoveryRequest {
            version_info: "v1",
            node: &node,
            resource_names: &names,
            type_url: <Cluster as Resource>::TYPE_URL,
            response_nonce: "n1",
        };

        let bytes = V3Codec.encode_request(&request).unwrap();
        let decoded = discovery::DiscoveryRequest::decode(bytes).unwrap();

        assert_eq!(decoded.version_info, "v1");
        assert_eq!(decoded.response_nonce, "n1");
        assert_eq!(decoded.resource_names, names);
        assert_eq!(decoded.type_url, "type.googleapis.com/envoy.config.cluster.v3.Cluster");
        let proto_node = decoded.node.unwrap();
        assert_eq!(proto_node.id, node.id);
        assert!(proto_node.metadata.unwrap().fields.contains_key("CLUSTER_ID"));
    }

    #[test]
    fn decode_response_keeps_envelopes() {
        let proto_response = discovery::DiscoveryResponse {
            version_info: "7".to_string(),
            type_url: <Listener as Resource>::TYPE_URL.to_string(),
            nonce: "nonce-7".to_string(),
            resources: vec![Any {
                type_url: <Listener as Resource>::TYPE_URL.to_string(),
                value: b"opaque".to_vec(),
            }],
            ..Default::default()
        };

        let response = V3Codec
            .decode_response(proto_response.encode_to_vec().into())
            .unwrap();
        assert_eq!(response.version_info, "7");
        assert_eq!(response.nonce, "nonce-7");
        assert_eq!(response.resources.len(), 1);
        assert_eq!(response.resources[0].value.as_ref(), b"opaque");
    }

    #[test]
    fn decode_response_rejects_garbage() {
        assert!(V3Codec.decode_response(Bytes::from_static(&[0xff, 0xff])).is_err());
    }

    #[test]
    fn eds_cluster_prefers_service_name() {
        let cluster = eds_cluster("outbound|80||cart", Some("cart-eds"));
        assert_eq!(cluster.endpoint_name(), Some("cart-eds"));
    }

    #[test]
    fn eds_cluster_falls_back_to_name() {
        assert_eq!(eds_cluster("cart", None).endpoint_name(), Some("cart"));
        assert_eq!(eds_cluster("cart", Some("")).endpoint_name(), Some("cart"));
    }

    #[test]
    fn non_eds_clusters_have_no_endpoint_name() {
        for discovery in [
            DiscoveryType::Static,
            DiscoveryType::StrictDns,
            DiscoveryType::LogicalDns,
            DiscoveryType::OriginalDst,
        ] {
            assert_eq!(typed_cluster("c", discovery).endpoint_name(), None);
        }
        assert_eq!(Cluster::default().endpoint_name(), None);
    }

    #[test]
    fn listener_rds_names() {
        let listener = listener(
            "0.0.0.0_80",
            vec![hcm_filter(rds("http.80")), hcm_filter(inline_routes("inline"))],
        );
        assert_eq!(listener.route_config_names(), vec!["http.80".to_string()]);
    }

    #[test]
    fn listener_ignores_other_filters() {
        let mut tcp_proxy = hcm_filter(rds("not-an-hcm"));
        tcp_proxy.name = "envoy.filters.network.tcp_proxy".to_string();
        let untyped = Filter {
            name: HTTP_CONNECTION_MANAGER.to_string(),
            config_type: None,
        };

        let listener = listener("tcp", vec![tcp_proxy, untyped]);
        assert!(listener.route_config_names().is_empty());
    }

    #[test]
    fn resource_decode_roundtrip() {
        let cluster = eds_cluster("cart", None);
        let decoded = <Cluster as Resource>::decode(cluster.encode_to_vec().into()).unwrap();
        assert_eq!(Resource::name(&decoded), "cart");
    }
}
