//! Ternion Resolver
//!
//! Placement and commission resolution over a capacity-3 ternary tree.
//!
//! # Resolvers
//!
//! - [`resolve_placement`]: breadth-first spillover. Finds the node a new
//!   registrant attaches under, filling the sponsor's downline left to right.
//! - [`resolve_active_sponsor`]: nearest ACTIVE member at or above a sponsor
//!   reference (id or email).
//! - [`resolve_beneficiary`]: who receives a tier payment. Ascends the tier's
//!   hop count, then compresses past disqualified ancestors.
//!
//! All three are read-only and stateless. They see the tree only through the
//! [`Directory`] trait, and their results are advisory: the caller applies the
//! single write, and the store enforces capacity at write time.
//!
//! # Example
//!
//! ```
//! use ternion_resolver::{MemoryDirectory, Placement, Resolver, ResolverConfig};
//! use ternion_tree::{Member, MemberId};
//!
//! # tokio_test_block(async {
//! let directory = MemoryDirectory::with_members([Member::new("root".into(), "root@example.com")]);
//! let resolver = Resolver::new(directory, ResolverConfig::new("root"));
//! let placement = resolver.placement(&MemberId::from("root")).await.unwrap();
//! assert_eq!(placement, Placement::Slot("root".into()));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod beneficiary;
mod config;
mod directory;
mod error;
mod memory;
mod placement;
mod sponsor;

pub use beneficiary::{resolve_beneficiary, Beneficiary};
pub use config::ResolverConfig;
pub use directory::Directory;
pub use error::{Error, Result, StoreError};
pub use memory::MemoryDirectory;
pub use placement::{resolve_placement, Placement};
pub use sponsor::resolve_active_sponsor;

use ternion_tree::{MemberId, MemberKey, Tier};

/// A directory paired with the config every resolution needs.
pub struct Resolver<D> {
    directory: D,
    config: ResolverConfig,
}

impl<D: Directory> Resolver<D> {
    /// Create a resolver.
    pub fn new(directory: D, config: ResolverConfig) -> Self {
        Self { directory, config }
    }

    /// The underlying directory.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// The resolver config.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// See [`resolve_placement`].
    pub async fn placement(&self, sponsor: &MemberId) -> Result<Placement> {
        resolve_placement(&self.directory, &self.config, sponsor).await
    }

    /// See [`resolve_active_sponsor`].
    pub async fn active_sponsor(&self, key: &MemberKey) -> Result<Option<MemberId>> {
        resolve_active_sponsor(&self.directory, &self.config, key).await
    }

    /// See [`resolve_beneficiary`].
    pub async fn beneficiary(&self, payer: &MemberId, target: Tier) -> Result<Beneficiary> {
        resolve_beneficiary(&self.directory, &self.config, payer, target).await
    }
}
