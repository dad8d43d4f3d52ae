//! Outbound request path: subscriptions and acknowledgments.
//!
//! All requests of a session go through one [`Dispatcher`], whether they come
//! from the on-connect hook, a consumer callback, the cascade step, or the
//! acknowledgment at the end of each response. Encoding and sending happen
//! under a single async write lock, so requests reach the stream in the order
//! their sends were started.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tracing::debug;

use crate::codec::XdsCodec;
use crate::error::{Error, Result};
use crate::message::{DiscoveryRequest, DiscoveryResponse, Node};
use crate::transport::RequestSink;

/// Version and nonce of the last response received for a type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckState {
    /// The `version_info` of the response.
    pub version_info: String,
    /// The `nonce` of the response.
    pub nonce: String,
}

/// Serializes requests onto the ADS stream and tracks acknowledgment state.
#[derive(Debug)]
pub struct Dispatcher<C> {
    codec: C,
    node: Node,
    sink: ArcSwapOption<RequestSink>,
    write_lock: tokio::sync::Mutex<()>,
    /// Keyed by type URL; reset on every new stream.
    acks: DashMap<String, AckState>,
}

impl<C: XdsCodec> Dispatcher<C> {
    pub(crate) fn new(codec: C, node: Node) -> Self {
        Self {
            codec,
            node,
            sink: ArcSwapOption::empty(),
            write_lock: tokio::sync::Mutex::new(()),
            acks: DashMap::new(),
        }
    }

    /// The codec requests are encoded with.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The node identity sent with every request.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Returns true while a stream is attached and accepting requests.
    pub fn is_connected(&self) -> bool {
        self.sink
            .load_full()
            .is_some_and(|sink| !sink.is_closed())
    }

    /// Version and nonce of the last response received for `type_url` on the
    /// current stream.
    pub fn last_response(&self, type_url: &str) -> Option<AckState> {
        self.acks.get(type_url).map(|ack| ack.clone())
    }

    /// Start sending on a new stream. Acknowledgment state of any previous
    /// stream is discarded.
    pub(crate) fn attach(&self, sink: RequestSink) {
        self.acks.clear();
        self.sink.store(Some(Arc::new(sink)));
    }

    /// Half-close the stream. Returns false if it was not open.
    pub(crate) fn close_send(&self) -> bool {
        self.sink.swap(None).is_some()
    }

    pub(crate) fn record_response(&self, response: &DiscoveryResponse) {
        self.acks.insert(
            response.type_url.clone(),
            AckState {
                version_info: response.version_info.clone(),
                nonce: response.nonce.clone(),
            },
        );
    }

    /// Subscribe to `resource_names` of `type_url`, replacing the previous
    /// subscription for the type. An empty list subscribes to every resource
    /// of the type.
    ///
    /// Once a response of the type has been received on this stream, the
    /// request carries that response's nonce and version; before that both
    /// are empty.
    pub async fn send_subscription(&self, type_url: &str, resource_names: &[String]) -> Result<()> {
        let ack = self.last_response(type_url).unwrap_or_default();
        self.send(&DiscoveryRequest {
            version_info: &ack.version_info,
            node: &self.node,
            resource_names,
            type_url,
            response_nonce: &ack.nonce,
        })
        .await
    }

    /// Acknowledge `response`, echoing its version and nonce.
    pub async fn acknowledge(&self, response: &DiscoveryResponse) -> Result<()> {
        self.send(&DiscoveryRequest {
            version_info: &response.version_info,
            node: &self.node,
            resource_names: &[],
            type_url: &response.type_url,
            response_nonce: &response.nonce,
        })
        .await
    }

    async fn send(&self, request: &DiscoveryRequest<'_>) -> Result<()> {
        let bytes = self.codec.encode_request(request)?;

        let _guard = self.write_lock.lock().await;
        let sink = self.sink.load_full().ok_or(Error::NotConnected)?;

        debug!(
            type_url = request.type_url,
            names = request.resource_names.len(),
            version = request.version_info,
            nonce = request.response_nonce,
            "sending request"
        );
        sink.send(bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::V3Codec;
    use envoy_types::pb::envoy::service::discovery::v3::DiscoveryRequest as ProtoRequest;
    use prost::Message;
    use tokio::sync::mpsc;

    const CLUSTER: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
    const ENDPOINT: &str = "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

    fn attached() -> (Dispatcher<V3Codec>, mpsc::Receiver<bytes::Bytes>) {
        let dispatcher = Dispatcher::new(V3Codec, Node::new("node-1"));
        let (sink, rx) = RequestSink::channel();
        dispatcher.attach(sink);
        (dispatcher, rx)
    }

    async fn next(rx: &mut mpsc::Receiver<bytes::Bytes>) -> ProtoRequest {
        ProtoRequest::decode(rx.recv().await.unwrap()).unwrap()
    }

    fn response(type_url: &str, version: &str, nonce: &str) -> DiscoveryResponse {
        DiscoveryResponse {
            version_info: version.to_string(),
            resources: vec![],
            type_url: type_url.to_string(),
            nonce: nonce.to_string(),
        }
    }

    #[tokio::test]
    async fn first_subscription_has_empty_nonce() {
        let (dispatcher, mut rx) = attached();
        let names = vec!["a".to_string()];
        dispatcher.send_subscription(ENDPOINT, &names).await.unwrap();

        let request = next(&mut rx).await;
        assert_eq!(request.type_url, ENDPOINT);
        assert_eq!(request.resource_names, names);
        assert_eq!(request.response_nonce, "");
        assert_eq!(request.version_info, "");
        assert_eq!(request.node.unwrap().id, "node-1");
    }

    #[tokio::test]
    async fn acknowledge_echoes_response() {
        let (dispatcher, mut rx) = attached();
        dispatcher
            .acknowledge(&response(CLUSTER, "v1", "n1"))
            .await
            .unwrap();

        let request = next(&mut rx).await;
        assert_eq!(request.type_url, CLUSTER);
        assert_eq!(request.response_nonce, "n1");
        assert_eq!(request.version_info, "v1");
        assert!(request.resource_names.is_empty());
    }

    #[tokio::test]
    async fn subscription_after_response_carries_nonce() {
        let (dispatcher, mut rx) = attached();
        dispatcher.record_response(&response(CLUSTER, "v3", "n3"));

        dispatcher.send_subscription(CLUSTER, &[]).await.unwrap();
        let request = next(&mut rx).await;
        assert_eq!(request.response_nonce, "n3");
        assert_eq!(request.version_info, "v3");

        // Other types are unaffected.
        dispatcher.send_subscription(ENDPOINT, &[]).await.unwrap();
        assert_eq!(next(&mut rx).await.response_nonce, "");
    }

    #[tokio::test]
    async fn attach_resets_ack_state() {
        let (dispatcher, _rx) = attached();
        dispatcher.record_response(&response(CLUSTER, "v1", "n1"));
        assert!(dispatcher.last_response(CLUSTER).is_some());

        let (sink, _rx2) = RequestSink::channel();
        dispatcher.attach(sink);
        assert_eq!(dispatcher.last_response(CLUSTER), None);
    }

    #[tokio::test]
    async fn close_send_half_closes() {
        let (dispatcher, mut rx) = attached();
        assert!(dispatcher.is_connected());

        assert!(dispatcher.close_send());
        assert!(!dispatcher.close_send());
        assert!(!dispatcher.is_connected());
        assert!(rx.recv().await.is_none());

        let err = dispatcher.send_subscription(CLUSTER, &[]).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn send_fails_when_stream_gone() {
        let (dispatcher, rx) = attached();
        drop(rx);
        assert!(!dispatcher.is_connected());

        let err = dispatcher.send_subscription(CLUSTER, &[]).await.unwrap_err();
        assert!(matches!(err, Error::StreamClosed));
    }

    #[tokio::test]
    async fn concurrent_sends_are_all_delivered() {
        let (dispatcher, mut rx) = attached();
        let dispatcher = Arc::new(dispatcher);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let dispatcher = dispatcher.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher
                    .send_subscription(ENDPOINT, &[format!("c{i}")])
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(next(&mut rx).await.resource_names[0].clone());
        }
        seen.sort();
        assert_eq!(seen.len(), 8);
        assert_eq!(seen[0], "c0");
    }
}
