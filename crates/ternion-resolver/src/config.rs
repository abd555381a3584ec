//! Resolver configuration.

use ternion_tree::MemberId;

/// Settings passed into every resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// The single tree root. Always usable as a sponsor, and qualified to
    /// receive any tier unless suspended.
    pub root_id: MemberId,

    /// Cap on nodes visited by the placement search before it falls back to
    /// the sponsor.
    pub max_visited: usize,
}

impl ResolverConfig {
    /// Default placement search cap.
    pub const DEFAULT_MAX_VISITED: usize = 1000;

    /// Config for the given root with default limits.
    pub fn new(root_id: impl Into<MemberId>) -> Self {
        Self {
            root_id: root_id.into(),
            max_visited: Self::DEFAULT_MAX_VISITED,
        }
    }

    /// Override the placement search cap.
    pub fn with_max_visited(mut self, max_visited: usize) -> Self {
        self.max_visited = max_visited;
        self
    }
}
