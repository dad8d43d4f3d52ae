//! Node identity for the ADS client.
//!
//! The identity is built once, eagerly, when the client configuration is
//! assembled. When no explicit id is configured one is synthesized from the
//! node type, the host's private address, the workload, the namespace and
//! the cluster domain, in the form
//! `sidecar~10.0.0.1~test.default~default.svc.cluster.local`.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::message::Node;

const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_WORKLOAD: &str = "test";
const DEFAULT_NODE_TYPE: &str = "sidecar";
const DEFAULT_CLUSTER: &str = "svc.cluster.local";

/// Inputs for building a [`Node`].
///
/// Every field is optional; unset fields fall back to the defaults used by
/// istio-style control planes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    /// Explicit node id. Overrides id synthesis entirely.
    pub node_id: Option<String>,
    /// Namespace, defaults to `default`.
    pub namespace: Option<String>,
    /// Workload name, defaults to `test`.
    pub workload: Option<String>,
    /// Node type, defaults to `sidecar`. `router` and `ingress` are also understood
    /// by most control planes.
    pub node_type: Option<String>,
    /// The address the control plane uses to locate this proxy's inbound config.
    /// Defaults to the host's private address, or `0.0.0.0` when none is found.
    pub ip: Option<IpAddr>,
    /// Cluster domain, defaults to `svc.cluster.local`.
    pub cluster: Option<String>,
    /// Additional metadata, passed through verbatim.
    pub metadata: Map<String, Value>,
}

impl NodeConfig {
    /// Create an empty configuration that uses every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit node id.
    pub fn with_node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the workload name.
    pub fn with_workload(mut self, workload: impl Into<String>) -> Self {
        self.workload = Some(workload.into());
        self
    }

    /// Set the node type.
    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    /// Set the node address.
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Set the cluster domain.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Set the node metadata.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Resolve the node id, synthesizing one if none was configured.
    pub fn id(&self) -> String {
        if let Some(id) = self.node_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_owned();
        }

        let namespace = self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        let workload = self.workload.as_deref().unwrap_or(DEFAULT_WORKLOAD);
        let node_type = self.node_type.as_deref().unwrap_or(DEFAULT_NODE_TYPE);
        let cluster = self.cluster.as_deref().unwrap_or(DEFAULT_CLUSTER);
        let ip = self.ip.unwrap_or_else(private_ip);

        format!("{node_type}~{ip}~{workload}.{namespace}~{namespace}.{cluster}")
    }

    /// Build the immutable [`Node`] sent with every request.
    pub fn build(&self) -> Node {
        Node {
            id: self.id(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Returns the address the host would use for outbound traffic, or the
/// unspecified address when it has no non-loopback route.
///
/// The address is picked by routing toward `10.255.255.255`, not by listing
/// interfaces. A host whose only non-loopback interfaces have no route into
/// `10.0.0.0/8` (and no default route) therefore gets `0.0.0.0`, even though
/// it does own an address; pass one through [`NodeConfig::with_ip`] there.
/// Hosts with several interfaces get the one the kernel routes through
/// rather than whichever is listed first.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
pub fn private_ip() -> IpAddr {
    let unspecified = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => ip,
        _ => unspecified,
    }
}
