//! Consumer callbacks for received resources.

use std::future::Future;

use crate::client::dispatcher::Dispatcher;
use crate::codec::XdsCodec;
use crate::error::Result;
use crate::message::ResourceAny;
use crate::resource::Resource;

/// Receives the resources of each response, one batch per kind.
///
/// Every method has a default, so an implementation only overrides the kinds
/// it cares about; a missing override silently discards that kind. Batches
/// are sorted by resource name. Each callback gets the [`Dispatcher`] so it
/// can issue its own subscriptions.
///
/// Within one response the callbacks run in the order clusters, endpoints,
/// listeners, routes, secrets, unrecognized, and only for non-empty batches.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// impl ResourceHandler<V3Codec> for Printer {
///     async fn on_clusters(&self, _: &Dispatcher<V3Codec>, clusters: &[Cluster]) {
///         for cluster in clusters {
///             println!("{}", cluster.name);
///         }
///     }
/// }
/// ```
pub trait ResourceHandler<C: XdsCodec>: Send + Sync + 'static {
    /// Called once the stream is open, before any response is received.
    ///
    /// The default subscribes to every cluster and then every listener.
    fn on_connect(&self, dispatcher: &Dispatcher<C>) -> impl Future<Output = Result<()>> + Send {
        async move {
            dispatcher
                .send_subscription(<C::Cluster as Resource>::TYPE_URL, &[])
                .await?;
            dispatcher
                .send_subscription(<C::Listener as Resource>::TYPE_URL, &[])
                .await
        }
    }

    /// Called with the clusters of a response.
    fn on_clusters(
        &self,
        _dispatcher: &Dispatcher<C>,
        _clusters: &[C::Cluster],
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called with the cluster load assignments of a response.
    fn on_endpoints(
        &self,
        _dispatcher: &Dispatcher<C>,
        _endpoints: &[C::Endpoint],
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called with the listeners of a response.
    fn on_listeners(
        &self,
        _dispatcher: &Dispatcher<C>,
        _listeners: &[C::Listener],
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called with the route configurations of a response.
    fn on_routes(
        &self,
        _dispatcher: &Dispatcher<C>,
        _routes: &[C::Route],
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called with the secrets of a response.
    fn on_secrets(
        &self,
        _dispatcher: &Dispatcher<C>,
        _secrets: &[C::Secret],
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called with envelopes that have no typed decoder, such as runtime
    /// resources or types this client does not know.
    fn on_unrecognized(
        &self,
        _dispatcher: &Dispatcher<C>,
        _resources: &[ResourceAny],
    ) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// A handler that subscribes to all clusters and listeners and discards
/// everything it receives.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl<C: XdsCodec> ResourceHandler<C> for NoopHandler {}
