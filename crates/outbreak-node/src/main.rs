//! Outbreak Node binary

use outbreak_node::{Node, NodeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outbreak_node=info,outbreak=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Outbreak Node");

    let config = NodeConfig::from_env();

    let node = Node::new(config).await?;
    node.run().await?;

    Ok(())
}
