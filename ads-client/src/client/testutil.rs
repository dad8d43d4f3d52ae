//! Helpers shared by the client tests.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::Secret;
use envoy_types::pb::envoy::service::discovery::v3 as discovery;
use envoy_types::pb::google::protobuf::Any;
use prost::Message;

use crate::client::dispatcher::Dispatcher;
use crate::client::handler::ResourceHandler;
use crate::codec::V3Codec;
use crate::codec::v3::testutil::envelope;
use crate::message::ResourceAny;
use crate::resource::Resource;

/// Records every callback as `"<kind>:<comma separated names>"`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record<R: Resource>(&self, kind: &str, resources: &[R]) {
        let names: Vec<&str> = resources.iter().map(Resource::name).collect();
        self.events
            .lock()
            .unwrap()
            .push(format!("{kind}:{}", names.join(",")));
    }
}

impl ResourceHandler<V3Codec> for Recorder {
    async fn on_clusters(&self, _: &Dispatcher<V3Codec>, clusters: &[Cluster]) {
        self.record("clusters", clusters);
    }

    async fn on_endpoints(&self, _: &Dispatcher<V3Codec>, endpoints: &[ClusterLoadAssignment]) {
        self.record("endpoints", endpoints);
    }

    async fn on_listeners(&self, _: &Dispatcher<V3Codec>, listeners: &[Listener]) {
        self.record("listeners", listeners);
    }

    async fn on_routes(&self, _: &Dispatcher<V3Codec>, routes: &[RouteConfiguration]) {
        self.record("routes", routes);
    }

    async fn on_secrets(&self, _: &Dispatcher<V3Codec>, secrets: &[Secret]) {
        self.record("secrets", secrets);
    }

    async fn on_unrecognized(&self, _: &Dispatcher<V3Codec>, resources: &[ResourceAny]) {
        let urls: Vec<&str> = resources.iter().map(|r| r.type_url.as_str()).collect();
        self.events
            .lock()
            .unwrap()
            .push(format!("unrecognized:{}", urls.join(",")));
    }
}

/// An encoded v3 response of `type_url`.
pub(crate) fn response(type_url: &str, version: &str, nonce: &str, resources: Vec<Any>) -> Bytes {
    discovery::DiscoveryResponse {
        version_info: version.to_string(),
        resources,
        type_url: type_url.to_string(),
        nonce: nonce.to_string(),
        ..Default::default()
    }
    .encode_to_vec()
    .into()
}

/// An encoded v3 cluster response.
pub(crate) fn cluster_response(version: &str, nonce: &str, clusters: &[Cluster]) -> Bytes {
    let url = <Cluster as Resource>::TYPE_URL;
    response(
        url,
        version,
        nonce,
        clusters.iter().map(|c| envelope(url, c)).collect(),
    )
}

/// Decode a request written by the client.
pub(crate) fn decode_request(bytes: Bytes) -> discovery::DiscoveryRequest {
    discovery::DiscoveryRequest::decode(bytes).unwrap()
}
