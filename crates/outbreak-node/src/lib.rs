//! Outbreak Node - propagation engine service
//!
//! Runs the propagation engine over RocksDB and exposes it through an HTTP
//! API and a notification intake for at-least-once event sources.
//!
//! # Architecture
//!
//! - **Storage**: RocksDB-backed [`SeedStore`](outbreak_engine::SeedStore)
//! - **API**: HTTP endpoints for seeds, infections, interactions and levels
//! - **Node**: config from environment, dispatcher and expiry sweep tasks
//!
//! # Example
//!
//! ```no_run
//! use outbreak_node::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = Node::new(NodeConfig::from_env()).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
pub mod node;
pub mod storage;

pub use error::{Error, Result};
pub use node::{Node, NodeConfig, NodeState};
pub use storage::RocksStore;
