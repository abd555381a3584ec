//! Ternion Node binary
//!
//! Serves the member registry and payment flows over HTTP.

use ternion_node::{Node, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ternion_node=info,ternion_resolver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ternion Node");

    let config = NodeConfig::from_env()?;

    // Create and run node
    let node = Node::new(config).await?;
    node.run().await?;

    Ok(())
}
