//! Ternion Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - HTTP API for clients (registration, payments, resolver queries)
//! - Unix admin socket for local admin ops (ternion-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::storage::Storage;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use ternion_resolver::ResolverConfig;
use ternion_tree::MemberId;

/// Configuration for a Ternion node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for ternion-admin CLI)
    pub admin_socket: PathBuf,

    /// Id of the tree root, created on first start
    pub root_id: MemberId,

    /// Email of the tree root
    pub root_email: String,

    /// Placement search cap
    pub max_visited: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./ternion-data");
        Self {
            admin_socket: data_dir.join("admin.sock"),
            data_dir,
            api_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            root_id: MemberId::from("root"),
            root_email: "root@ternion.local".to_string(),
            max_visited: ResolverConfig::DEFAULT_MAX_VISITED,
        }
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let data_dir = var("TERNION_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let api_addr = match var("TERNION_API_ADDR") {
            Some(addr) => addr
                .parse()
                .map_err(|_| Error::InvalidInput(format!("Invalid TERNION_API_ADDR: {}", addr)))?,
            None => defaults.api_addr,
        };

        let admin_socket = var("TERNION_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let root_id = var("TERNION_ROOT_ID")
            .map(MemberId::from)
            .unwrap_or(defaults.root_id);

        let root_email = var("TERNION_ROOT_EMAIL").unwrap_or(defaults.root_email);

        let max_visited = match var("TERNION_MAX_VISITED") {
            Some(max) => max
                .parse()
                .ok()
                .filter(|&n: &usize| n > 0)
                .ok_or_else(|| Error::InvalidInput(format!("Invalid TERNION_MAX_VISITED: {}", max)))?,
            None => defaults.max_visited,
        };

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            root_id,
            root_email,
            max_visited,
        })
    }

    /// Resolver settings derived from this config.
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::new(self.root_id.clone()).with_max_visited(self.max_visited)
    }
}

/// A Ternion node instance.
pub struct Node {
    registry: Arc<Registry>,
    config: NodeConfig,
}

impl Node {
    /// Open storage, bootstrap the root and build the registry.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        // Open single shared storage instance
        let storage = Arc::new(Storage::open(&config.data_dir)?);
        storage.ensure_root(&config.root_id, &config.root_email)?;

        let registry = Arc::new(Registry::new(storage, config.resolver_config()));
        Ok(Self { registry, config })
    }

    /// Get the shared registry.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Run the node (starts HTTP server and admin socket).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Ternion node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);
        tracing::info!("  Root: {}", self.config.root_id);

        // Start admin socket server in background
        let admin_socket = AdminSocket::new(self.registry(), self.config.admin_socket.clone());
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        // Build HTTP API
        let app = api::build_router(self.registry());

        // Start HTTP server
        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use ternion_tree::{MemberKey, Tier};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = NodeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_addr.port(), 8080);
        assert_eq!(config.root_id.as_str(), "root");
        assert_eq!(config.admin_socket, config.data_dir.join("admin.sock"));
        assert_eq!(config.max_visited, 1000);
    }

    #[test]
    fn environment_overrides() {
        let config = NodeConfig::from_lookup(lookup(&[
            ("TERNION_DATA_DIR", "/var/lib/ternion"),
            ("TERNION_API_ADDR", "127.0.0.1:9090"),
            ("TERNION_ROOT_ID", "origin"),
            ("TERNION_MAX_VISITED", "50"),
        ]))
        .unwrap();
        assert_eq!(config.admin_socket, PathBuf::from("/var/lib/ternion/admin.sock"));
        assert_eq!(config.api_addr.to_string(), "127.0.0.1:9090");
        let resolver = config.resolver_config();
        assert_eq!(resolver.root_id.as_str(), "origin");
        assert_eq!(resolver.max_visited, 50);
    }

    #[test]
    fn invalid_values_are_errors() {
        let bad_addr = NodeConfig::from_lookup(lookup(&[("TERNION_API_ADDR", "nowhere")]));
        assert!(matches!(bad_addr, Err(Error::InvalidInput(_))));
        let bad_cap = NodeConfig::from_lookup(lookup(&[("TERNION_MAX_VISITED", "0")]));
        assert!(matches!(bad_cap, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn new_node_bootstraps_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().join("data"),
            ..NodeConfig::default()
        };
        let node = Node::new(config).await.unwrap();
        let root = node.registry().member(&MemberKey::Id("root".into())).unwrap();
        assert_eq!(root.level, Tier::Tier3);
        assert!(root.parent_id.is_none());

        // Reopening keeps the same root.
        drop(node);
        let config = NodeConfig {
            data_dir: dir.path().join("data"),
            ..NodeConfig::default()
        };
        let node = Node::new(config).await.unwrap();
        assert_eq!(node.registry().storage().child_count(&"root".into()).unwrap(), 0);
    }
}
