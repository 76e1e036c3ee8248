//! Identity and attribute types for loopback connections

use serde::{Deserialize, Serialize};
use std::fmt;

const ID_PREFIX: &str = "loopback-";

/// Opaque identifier for a source→sink connection
///
/// Minted from the index of the routing module backing the connection and
/// rendered as a stable string token (`loopback-<index>`). Ids are never
/// reused after the module is unloaded; the server hands out fresh indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Mint an id from the routing-module index backing the connection
    pub fn from_module_index(index: u32) -> Self {
        Self(format!("{ID_PREFIX}{index}"))
    }

    /// Parse an id back from its rendered token form
    ///
    /// Returns `None` for tokens this store never minted.
    pub fn parse(token: &str) -> Option<Self> {
        let index: u32 = token.strip_prefix(ID_PREFIX)?.parse().ok()?;
        Some(Self::from_module_index(index))
    }

    /// The routing-module index this id was minted from
    pub fn module_index(&self) -> u32 {
        // Only `from_module_index` constructs the inner string, so the
        // suffix is always a valid u32.
        self.0
            .strip_prefix(ID_PREFIX)
            .and_then(|s| s.parse().ok())
            .unwrap_or(u32::MAX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A source→sink loopback route as tracked in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Name of the source audio is copied from
    pub source: String,

    /// Name of the sink audio is copied to
    pub sink: String,
}

impl Connection {
    pub fn new(source: impl Into<String>, sink: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            sink: sink.into(),
        }
    }
}
