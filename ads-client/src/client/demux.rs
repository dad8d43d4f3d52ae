//! Response demultiplexing: classify each envelope by type URL and decode it
//! into the matching typed bucket.

use tracing::debug;

use crate::client::config::DecodeFailurePolicy;
use crate::codec::XdsCodec;
use crate::error::Result;
use crate::message::{DiscoveryResponse, ResourceAny};
use crate::resource::{Resource, ResourceKind};

/// The decoded resources of one response, grouped by kind.
///
/// A batch is reused across responses; [`fill`](Self::fill) clears it first.
#[derive(Debug)]
pub struct ResourceBatch<C: XdsCodec> {
    /// Decoded clusters.
    pub clusters: Vec<C::Cluster>,
    /// Decoded cluster load assignments.
    pub endpoints: Vec<C::Endpoint>,
    /// Decoded listeners.
    pub listeners: Vec<C::Listener>,
    /// Decoded route configurations.
    pub routes: Vec<C::Route>,
    /// Decoded secrets.
    pub secrets: Vec<C::Secret>,
    /// Envelopes with no typed decoder, runtime resources included.
    pub unrecognized: Vec<ResourceAny>,
}

impl<C: XdsCodec> Default for ResourceBatch<C> {
    fn default() -> Self {
        Self {
            clusters: Vec::new(),
            endpoints: Vec::new(),
            listeners: Vec::new(),
            routes: Vec::new(),
            secrets: Vec::new(),
            unrecognized: Vec::new(),
        }
    }
}

impl<C: XdsCodec> ResourceBatch<C> {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty every bucket, keeping allocations.
    pub fn clear(&mut self) {
        self.clusters.clear();
        self.endpoints.clear();
        self.listeners.clear();
        self.routes.clear();
        self.secrets.clear();
        self.unrecognized.clear();
    }

    /// Returns true if no bucket holds anything.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
            && self.endpoints.is_empty()
            && self.listeners.is_empty()
            && self.routes.is_empty()
            && self.secrets.is_empty()
            && self.unrecognized.is_empty()
    }

    /// Replace the batch contents with the resources of `response`, each
    /// typed bucket sorted by resource name.
    ///
    /// Envelopes are classified by their own type URL, not the response's.
    /// A payload that fails to decode is dropped under
    /// [`DecodeFailurePolicy::Drop`] and returned as an error under
    /// [`DecodeFailurePolicy::Reject`].
    pub fn fill(&mut self, response: &DiscoveryResponse, policy: DecodeFailurePolicy) -> Result<()> {
        self.clear();

        for envelope in &response.resources {
            let kind = ResourceKind::classify::<C>(&envelope.type_url);
            let decoded = match kind {
                ResourceKind::Cluster => decode_into(&mut self.clusters, envelope),
                ResourceKind::Endpoint => decode_into(&mut self.endpoints, envelope),
                ResourceKind::Listener => decode_into(&mut self.listeners, envelope),
                ResourceKind::Route => decode_into(&mut self.routes, envelope),
                ResourceKind::Secret => decode_into(&mut self.secrets, envelope),
                ResourceKind::Runtime | ResourceKind::Unknown => {
                    self.unrecognized.push(envelope.clone());
                    Ok(())
                }
            };

            if let Err(error) = decoded {
                match policy {
                    DecodeFailurePolicy::Drop => {
                        debug!(%kind, type_url = %envelope.type_url, %error, "dropping undecodable resource");
                    }
                    DecodeFailurePolicy::Reject => return Err(error),
                }
            }
        }

        self.sort_by_name();
        Ok(())
    }

    fn sort_by_name(&mut self) {
        sort(&mut self.clusters);
        sort(&mut self.endpoints);
        sort(&mut self.listeners);
        sort(&mut self.routes);
        sort(&mut self.secrets);
    }
}

fn decode_into<R: Resource>(bucket: &mut Vec<R>, envelope: &ResourceAny) -> Result<()> {
    bucket.push(R::decode(envelope.value.clone())?);
    Ok(())
}

fn sort<R: Resource>(bucket: &mut [R]) {
    bucket.sort_by(|a, b| a.name().cmp(b.name()));
}
