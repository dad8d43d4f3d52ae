//! Derives the next tier of subscriptions from received resources.
//!
//! Clusters discovered through EDS name the endpoints to fetch; HTTP
//! connection managers using RDS name the route configurations to fetch.
//! Names are deduplicated and sorted so requests are reproducible.

use std::collections::BTreeSet;

use crate::resource::{ClusterResource, ListenerResource};

/// Endpoint names to request for `clusters`.
pub fn endpoint_names<R: ClusterResource>(clusters: &[R]) -> Vec<String> {
    clusters
        .iter()
        .filter_map(ClusterResource::endpoint_name)
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Route configuration names to request for `listeners`.
pub fn route_names<R: ListenerResource>(listeners: &[R]) -> Vec<String> {
    listeners
        .iter()
        .flat_map(ListenerResource::route_config_names)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
