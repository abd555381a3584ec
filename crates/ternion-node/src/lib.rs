//! Ternion Node - Member Registry Service
//!
//! Runs the placement tree as a service: registration, tier payments and
//! restarts, backed by RocksDB and exposed over HTTP.
//!
//! # Architecture
//!
//! - **Models**: Payment records
//! - **Storage**: RocksDB-backed members and payments; implements the
//!   resolvers' `Directory` and enforces capacity on write
//! - **Registry**: Registration, payment and suspension flows
//! - **API**: HTTP endpoints for clients
//! - **Admin Socket**: Unix socket for local admin commands (ternion-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use ternion_node::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = Node::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod models;
pub mod node;
pub mod registry;
pub mod storage;

pub use error::{Error, Result};
pub use models::{PaymentKind, PaymentRecord, PaymentStatus};
pub use node::{Node, NodeConfig};
pub use registry::{NewMember, Registration, Registry};
pub use storage::Storage;

/// Current unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
