//! Configuration for the ADS client.

use crate::message::Node;
use crate::node::NodeConfig;

/// Configuration for an xDS server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    uri: String,
}

impl ServerConfig {
    /// Create a server configuration.
    ///
    /// `uri` is either a full URI (`http://istiod:15010`) or a bare
    /// `host:port`, in which case the transport picks the scheme.
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// Returns the server URI as configured.
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// What to do with a resource whose payload fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeFailurePolicy {
    /// Drop the resource and keep processing the rest of the response.
    #[default]
    Drop,
    /// End the receive loop with the decode error.
    Reject,
}

/// What to do when an acknowledgment or cascade request cannot be sent from
/// inside the receive loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckFailurePolicy {
    /// Log a warning and keep receiving.
    #[default]
    Log,
    /// End the receive loop with the send error.
    Fail,
}

/// Configuration for the ADS client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The control plane to connect to.
    pub server: ServerConfig,

    /// Node identification sent with every request.
    pub node: Node,

    /// Derive endpoint and route subscriptions from received clusters and
    /// listeners.
    pub cascade: bool,

    /// Handling of resources that fail to decode.
    pub decode_failure: DecodeFailurePolicy,

    /// Handling of acknowledgment and cascade send failures.
    pub ack_failure: AckFailurePolicy,
}

impl ClientConfig {
    /// Create a new configuration for `server` with the given node.
    ///
    /// # Example
    ///
    /// ```
    /// use ads_client::{ClientConfig, NodeConfig, ServerConfig};
    ///
    /// let node = NodeConfig::new()
    ///     .with_node_id("sidecar~10.0.0.1~cart.shop~shop.svc.cluster.local")
    ///     .build();
    /// let config = ClientConfig::new(ServerConfig::new("istiod:15010"), node);
    /// assert!(config.cascade);
    /// ```
    pub fn new(server: ServerConfig, node: Node) -> Self {
        Self {
            server,
            node,
            cascade: true,
            decode_failure: DecodeFailurePolicy::default(),
            ack_failure: AckFailurePolicy::default(),
        }
    }

    /// Create a configuration whose node is built from `node`.
    pub fn from_node_config(server: ServerConfig, node: &NodeConfig) -> Self {
        Self::new(server, node.build())
    }

    /// Enable or disable cascading subscriptions.
    pub fn with_cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    /// Set the decode failure policy.
    pub fn with_decode_failure(mut self, policy: DecodeFailurePolicy) -> Self {
        self.decode_failure = policy;
        self
    }

    /// Set the acknowledgment failure policy.
    pub fn with_ack_failure(mut self, policy: AckFailurePolicy) -> Self {
        self.ack_failure = policy;
        self
    }
}
