//! Connects to an ADS server and prints every resource it sends.
//!
//! Configured through the environment:
//! - `ADS_SERVER`: server address, default `127.0.0.1:15010`
//! - `ADS_CERTS`: directory holding `cert-chain.pem`, `key.pem` and `root-cert.pem`;
//!   the connection is plaintext when unset
//! - `ADS_NODE_ID`: explicit node id
//! - `ADS_VERSION`: xDS API version, `2` or `3`, default `2`
//! - `ADS_METADATA`: node metadata as a JSON object
//!
//! ```sh
//! RUST_LOG=info ADS_VERSION=3 cargo run --example dump
//! ```

use std::env;

use ads_client::{
    ClientConfig, Dispatcher, NodeConfig, Resource, ResourceAny, ResourceHandler, ServerConfig,
    TlsConfig, TokioRuntime, TonicAdsClient, TonicTransportBuilder, V2Codec, V3Codec, XdsCodec,
};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

struct Dump;

fn show<R: Resource>(kind: &str, resources: &[R]) {
    tracing::info!("Response {kind} {}", resources.len());
    for resource in resources {
        println!("{resource:#?}");
    }
}

impl<C: XdsCodec> ResourceHandler<C> for Dump {
    async fn on_clusters(&self, _: &Dispatcher<C>, clusters: &[C::Cluster]) {
        show("CDS", clusters);
    }

    async fn on_endpoints(&self, _: &Dispatcher<C>, endpoints: &[C::Endpoint]) {
        show("EDS", endpoints);
    }

    async fn on_listeners(&self, _: &Dispatcher<C>, listeners: &[C::Listener]) {
        show("LDS", listeners);
    }

    async fn on_routes(&self, _: &Dispatcher<C>, routes: &[C::Route]) {
        show("RDS", routes);
    }

    async fn on_secrets(&self, _: &Dispatcher<C>, secrets: &[C::Secret]) {
        show("SDS", secrets);
    }

    async fn on_unrecognized(&self, _: &Dispatcher<C>, resources: &[ResourceAny]) {
        for resource in resources {
            tracing::info!(
                type_url = %resource.type_url,
                bytes = resource.value.len(),
                "Response unrecognized"
            );
        }
    }
}

async fn dump<C: XdsCodec>(
    codec: C,
    config: ClientConfig,
    builder: TonicTransportBuilder,
) -> ads_client::Result<()> {
    TonicAdsClient::new(config, codec, builder, Dump, TokioRuntime)
        .run()
        .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let server = env::var("ADS_SERVER").unwrap_or_else(|_| "127.0.0.1:15010".to_string());
    let metadata: Map<String, Value> = match env::var("ADS_METADATA") {
        Ok(json) => serde_json::from_str(&json)?,
        Err(_) => Map::new(),
    };

    let mut node = NodeConfig::new().with_metadata(metadata);
    if let Ok(id) = env::var("ADS_NODE_ID") {
        node = node.with_node_id(id);
    }
    let config = ClientConfig::from_node_config(ServerConfig::new(server), &node);
    tracing::info!(node = %config.node.id, server = config.server.uri(), "starting");

    let mut builder = TonicTransportBuilder::new();
    if let Ok(dir) = env::var("ADS_CERTS") {
        builder = builder.with_tls(TlsConfig::from_dir(dir)?);
    }

    match env::var("ADS_VERSION").as_deref().unwrap_or("2") {
        "2" => dump(V2Codec, config, builder).await?,
        "3" => dump(V3Codec, config, builder).await?,
        other => return Err(format!("unsupported xds version {other:?}, expected 2 or 3").into()),
    }
    Ok(())
}
