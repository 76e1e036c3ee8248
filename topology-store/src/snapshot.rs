//! Topology snapshots with diff-on-replace change detection
//!
//! A `Topology` records what the audio server last reported: the set of
//! source names, the set of sink names, and the loopback connections keyed
//! by id. The server is ground truth; each refresh replaces a collection
//! wholesale and the replace operations report exactly which names appeared
//! or vanished so the caller can emit one event per actual change.

use std::collections::{BTreeMap, BTreeSet};

use crate::connection::{Connection, ConnectionId};

/// Additions and removals produced by replacing a name set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDelta {
    /// Names present in the fresh set but not the previous one
    pub added: Vec<String>,

    /// Names present in the previous set but not the fresh one
    pub removed: Vec<String>,
}

impl SetDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Last-observed routing topology of the audio server
///
/// Owned per engine instance and mutated only while the engine's
/// exclusivity guard is held. After a refresh the snapshot exactly mirrors
/// the server's reported state: no phantom entries, no missed removals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    sources: BTreeSet<String>,
    sinks: BTreeSet<String>,
    connections: BTreeMap<ConnectionId, Connection>,
}

impl Topology {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all last-observed sources
    pub fn sources(&self) -> &BTreeSet<String> {
        &self.sources
    }

    /// Names of all last-observed sinks
    pub fn sinks(&self) -> &BTreeSet<String> {
        &self.sinks
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains(name)
    }

    pub fn has_sink(&self, name: &str) -> bool {
        self.sinks.contains(name)
    }

    /// Replace the source set with what the server reported this tick
    ///
    /// Returns the exact additions and removals relative to the previous
    /// snapshot. Replaying an identical set yields an empty delta.
    pub fn replace_sources(&mut self, fresh: impl IntoIterator<Item = String>) -> SetDelta {
        let fresh: BTreeSet<String> = fresh.into_iter().collect();
        let delta = Self::diff(&self.sources, &fresh);
        self.sources = fresh;
        delta
    }

    /// Replace the sink set with what the server reported this tick
    pub fn replace_sinks(&mut self, fresh: impl IntoIterator<Item = String>) -> SetDelta {
        let fresh: BTreeSet<String> = fresh.into_iter().collect();
        let delta = Self::diff(&self.sinks, &fresh);
        self.sinks = fresh;
        delta
    }

    /// Connections keyed by id, as last observed
    pub fn connections(&self) -> &BTreeMap<ConnectionId, Connection> {
        &self.connections
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Find the id of the connection joining `source` to `sink`, if any
    pub fn connection_id_for(&self, source: &str, sink: &str) -> Option<ConnectionId> {
        self.connections
            .iter()
            .find(|(_, c)| c.source == source && c.sink == sink)
            .map(|(id, _)| id.clone())
    }

    /// All (source, sink) pairs currently connected
    pub fn connected_pairs(&self) -> BTreeSet<(String, String)> {
        self.connections
            .values()
            .map(|c| (c.source.clone(), c.sink.clone()))
            .collect()
    }

    pub fn insert_connection(&mut self, id: ConnectionId, connection: Connection) {
        self.connections.insert(id, connection);
    }

    pub fn remove_connection(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id)
    }

    /// Replace the connection map wholesale (authoritative resync)
    pub fn replace_connections(&mut self, fresh: BTreeMap<ConnectionId, Connection>) {
        self.connections = fresh;
    }

    /// Forget everything; used when the engine stops
    pub fn clear(&mut self) {
        self.sources.clear();
        self.sinks.clear();
        self.connections.clear();
    }

    fn diff(previous: &BTreeSet<String>, fresh: &BTreeSet<String>) -> SetDelta {
        SetDelta {
            added: fresh.difference(previous).cloned().collect(),
            removed: previous.difference(fresh).cloned().collect(),
        }
    }
}
