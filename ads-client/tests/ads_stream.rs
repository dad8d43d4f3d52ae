//! End-to-end tests against a tonic ADS server over TCP.

#![cfg(feature = "transport-tonic")]

use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use ads_client::{
    ClientConfig, Dispatcher, Error, Node, Resource, ResourceHandler, ServerConfig, SessionState,
    TokioRuntime, TonicAdsClient, TonicTransportBuilder, V3Codec,
};
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::cluster::v3::cluster::{
    ClusterDiscoveryType, DiscoveryType, EdsClusterConfig,
};
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::filter::ConfigType;
use envoy_types::pb::envoy::config::listener::v3::{Filter, FilterChain, Listener};
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    HttpConnectionManager, Rds, http_connection_manager::RouteSpecifier,
};
use envoy_types::pb::envoy::service::discovery::v3::{
    DeltaDiscoveryRequest, DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
    aggregated_discovery_service_server::{
        AggregatedDiscoveryService, AggregatedDiscoveryServiceServer,
    },
};
use envoy_types::pb::google::protobuf::Any;
use prost::Message;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::{Stream, StreamExt as _};
use tonic::{Code, Request, Response, Status};

const CLUSTER: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
const ENDPOINT: &str = "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
const LISTENER: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
const ROUTE: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
const HCM: &str = "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";

const WAIT: Duration = Duration::from_secs(5);

type ResponseStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send>>;

/// Answers every subscription with canned resources and records all requests.
///
/// With `fail` set, the stream ends with that status instead.
struct ControlPlane {
    requests: mpsc::UnboundedSender<DiscoveryRequest>,
    fail: Option<Code>,
}

fn any<M: Message>(type_url: &str, message: &M) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: message.encode_to_vec(),
    }
}

fn eds_cluster(name: &str, service_name: Option<&str>) -> Cluster {
    Cluster {
        name: name.to_string(),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        eds_cluster_config: service_name.map(|service_name| EdsClusterConfig {
            service_name: service_name.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn rds_listener(name: &str, route_config_name: &str) -> Listener {
    let hcm = HttpConnectionManager {
        stat_prefix: name.to_string(),
        route_specifier: Some(RouteSpecifier::Rds(Rds {
            route_config_name: route_config_name.to_string(),
            ..Default::default()
        })),
        ..Default::default()
    };
    Listener {
        name: name.to_string(),
        filter_chains: vec![FilterChain {
            filters: vec![Filter {
                name: "envoy.filters.network.http_connection_manager".to_string(),
                config_type: Some(ConfigType::TypedConfig(any(HCM, &hcm))),
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn resources_for(request: &DiscoveryRequest) -> Vec<Any> {
    match request.type_url.as_str() {
        CLUSTER => {
            let static_cluster = Cluster {
                name: "static".to_string(),
                cluster_discovery_type: Some(ClusterDiscoveryType::Type(
                    DiscoveryType::Static as i32,
                )),
                ..Default::default()
            };
            vec![
                any(CLUSTER, &eds_cluster("b", None)),
                any(CLUSTER, &static_cluster),
                any(CLUSTER, &eds_cluster("a", Some("svc-a"))),
            ]
        }
        LISTENER => vec![any(LISTENER, &rds_listener("ingress", "r1"))],
        ENDPOINT => request
            .resource_names
            .iter()
            .map(|name| {
                let cla = ClusterLoadAssignment {
                    cluster_name: name.clone(),
                    ..Default::default()
                };
                any(ENDPOINT, &cla)
            })
            .collect(),
        ROUTE => request
            .resource_names
            .iter()
            .map(|name| {
                let route = RouteConfiguration {
                    name: name.clone(),
                    ..Default::default()
                };
                any(ROUTE, &route)
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for ControlPlane {
    type StreamAggregatedResourcesStream = ResponseStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        if let Some(code) = self.fail {
            let failed = tokio_stream::once(Err::<DiscoveryResponse, _>(Status::new(
                code,
                "control plane going away",
            )));
            return Ok(Response::new(Box::pin(failed)));
        }

        let mut inbound = request.into_inner();
        let requests = self.requests.clone();

        let outbound = async_stream::try_stream! {
            let mut sent = 0;
            while let Some(request) = inbound.next().await {
                let request = request?;
                let _ = requests.send(request.clone());

                // Acknowledgments carry the nonce of the response they ack.
                if !request.response_nonce.is_empty() {
                    continue;
                }
                sent += 1;
                yield DiscoveryResponse {
                    version_info: "1".to_string(),
                    resources: resources_for(&request),
                    type_url: request.type_url.clone(),
                    nonce: format!("n{sent}"),
                    ..Default::default()
                };
            }
        };

        Ok(Response::new(Box::pin(outbound)))
    }

    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send>>;

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented("delta xDS"))
    }
}

async fn start_control_plane(
    fail: Option<Code>,
) -> (SocketAddr, mpsc::UnboundedReceiver<DiscoveryRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (requests, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(AggregatedDiscoveryServiceServer::new(ControlPlane {
                requests,
                fail,
            }))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    (addr, rx)
}

/// Reports each callback as `"<kind>:<names>"`.
struct Collector {
    events: mpsc::UnboundedSender<String>,
}

impl Collector {
    fn report<R: Resource>(&self, kind: &str, resources: &[R]) {
        let names: Vec<&str> = resources.iter().map(Resource::name).collect();
        let _ = self.events.send(format!("{kind}:{}", names.join(",")));
    }
}

impl ResourceHandler<V3Codec> for Collector {
    async fn on_clusters(&self, _: &Dispatcher<V3Codec>, clusters: &[Cluster]) {
        self.report("clusters", clusters);
    }

    async fn on_endpoints(&self, _: &Dispatcher<V3Codec>, endpoints: &[ClusterLoadAssignment]) {
        self.report("endpoints", endpoints);
    }

    async fn on_listeners(&self, _: &Dispatcher<V3Codec>, listeners: &[Listener]) {
        self.report("listeners", listeners);
    }

    async fn on_routes(&self, _: &Dispatcher<V3Codec>, routes: &[RouteConfiguration]) {
        self.report("routes", routes);
    }
}

fn client(
    addr: SocketAddr,
) -> (
    TonicAdsClient<V3Codec, Collector>,
    mpsc::UnboundedReceiver<String>,
) {
    let (events, rx) = mpsc::unbounded_channel();
    let config = ClientConfig::new(
        ServerConfig::new(addr.to_string()),
        Node::new("sidecar~127.0.0.1~test.default~default.svc.cluster.local"),
    );
    let client = TonicAdsClient::new(
        config,
        V3Codec,
        TonicTransportBuilder::new().with_connect_timeout(WAIT),
        Collector { events },
        TokioRuntime,
    );
    (client, rx)
}

#[tokio::test]
async fn discovers_and_cascades_over_grpc() {
    let (addr, mut requests) = start_control_plane(None).await;
    let (client, mut events) = client(addr);
    let done = client.start().await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 4 {
        seen.push(timeout(WAIT, events.recv()).await.unwrap().unwrap());
    }
    seen.sort();
    assert_eq!(
        seen,
        [
            "clusters:a,b,static",
            "endpoints:b,svc-a",
            "listeners:ingress",
            "routes:r1",
        ]
    );

    // Four subscriptions and four acknowledgments.
    let mut received = Vec::new();
    while received.len() < 8 {
        received.push(timeout(WAIT, requests.recv()).await.unwrap().unwrap());
    }

    client.close();
    timeout(WAIT, done).await.unwrap().unwrap().unwrap();
    assert_eq!(client.state(), SessionState::Closed);

    assert_eq!(received[0].type_url, CLUSTER);
    assert_eq!(received[0].response_nonce, "");
    assert_eq!(
        received[0].node.as_ref().unwrap().id,
        "sidecar~127.0.0.1~test.default~default.svc.cluster.local"
    );
    assert_eq!(received[1].type_url, LISTENER);

    let position = |type_url: &str, ack: bool| {
        received
            .iter()
            .position(|r| r.type_url == type_url && r.response_nonce.is_empty() != ack)
            .unwrap()
    };

    let eds = &received[position(ENDPOINT, false)];
    assert_eq!(eds.resource_names, ["b", "svc-a"]);
    let rds = &received[position(ROUTE, false)];
    assert_eq!(rds.resource_names, ["r1"]);

    // Cascades go out before the acknowledgment of the response that caused them.
    assert!(position(ENDPOINT, false) < position(CLUSTER, true));
    assert!(position(ROUTE, false) < position(LISTENER, true));

    for ack in received.iter().filter(|r| !r.response_nonce.is_empty()) {
        assert_eq!(ack.version_info, "1");
        assert!(ack.resource_names.is_empty());
    }
}

#[tokio::test]
async fn cancelled_status_ends_cleanly() {
    let (addr, _requests) = start_control_plane(Some(Code::Cancelled)).await;
    let (client, _events) = client(addr);

    timeout(WAIT, client.run()).await.unwrap().unwrap();
    assert_eq!(client.state(), SessionState::Closed);
}

#[tokio::test]
async fn unavailable_status_is_fatal() {
    let (addr, _requests) = start_control_plane(Some(Code::Unavailable)).await;
    let (client, _events) = client(addr);

    let err = timeout(WAIT, client.run()).await.unwrap().unwrap_err();
    match err {
        Error::ConnectionClosed(inner) => match *inner {
            Error::Stream(status) => assert_eq!(status.code(), Code::Unavailable),
            other => panic!("unexpected cause: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.state(), SessionState::Closed);
}

#[tokio::test]
async fn unreachable_server_leaves_client_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, _events) = client(addr);
    let err = timeout(WAIT, client.connect()).await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "{err:?}");
    assert_eq!(client.state(), SessionState::Disconnected);
}
