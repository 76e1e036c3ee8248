//! Loopback connection management
//!
//! Owns the load/unload/dedup logic for loopback routes. Connections are
//! recorded in the topology snapshot; the server's module list is the
//! authority and the snapshot is rebuilt from it every tick. All methods
//! run while the caller holds the engine's exclusivity guard - the
//! manager is a borrow of the guarded state, so it cannot exist outside
//! of it.

use std::collections::BTreeMap;

use pulse_gateway::{Gateway, GatewayError, ModuleInfo};
use topology_store::{Connection, ConnectionId, EventBus, Topology, TopologyEvent};

pub(crate) const LOOPBACK_MODULE: &str = "module-loopback";

/// Gateway-coupled view over the guarded connection state
pub(crate) struct ConnectionManager<'a> {
    pub gateway: &'a dyn Gateway,
    pub topology: &'a mut Topology,
    pub bus: &'a EventBus,
}

impl ConnectionManager<'_> {
    /// Create a loopback route, or return the existing id for the pair
    ///
    /// Idempotent: at most one connection per (source, sink) pair is ever
    /// loaded by this engine.
    pub fn create(&mut self, source: &str, sink: &str) -> Result<ConnectionId, GatewayError> {
        if let Some(id) = self.topology.connection_id_for(source, sink) {
            return Ok(id);
        }

        let index = self
            .gateway
            .load_module(LOOPBACK_MODULE, &[("source", source), ("sink", sink)])?;
        let id = ConnectionId::from_module_index(index);
        self.topology
            .insert_connection(id.clone(), Connection::new(source, sink));

        tracing::info!(%id, source, sink, "connection established");
        self.bus.emit(TopologyEvent::ConnectionEstablished {
            id: id.clone(),
            source: source.to_string(),
            sink: sink.to_string(),
        });
        Ok(id)
    }

    /// Remove a connection by id
    ///
    /// An unknown id is a no-op: no server call is issued and no error is
    /// raised. The connection may simply have been unloaded externally.
    pub fn remove(&mut self, id: &ConnectionId) -> Result<(), GatewayError> {
        let Some(connection) = self.topology.remove_connection(id) else {
            tracing::debug!(%id, "ignoring removal of untracked connection");
            return Ok(());
        };

        self.gateway.unload_module(id.module_index())?;
        tracing::info!(
            %id,
            source = %connection.source,
            sink = %connection.sink,
            "connection removed"
        );
        Ok(())
    }

    /// Remove every tracked connection; used when the engine stops
    ///
    /// Teardown is best-effort: every connection is attempted and the
    /// first server error is reported after the sweep.
    pub fn remove_all(&mut self) -> Result<(), GatewayError> {
        let ids: Vec<ConnectionId> = self.topology.connections().keys().cloned().collect();
        let mut first_error = None;
        for id in ids {
            if let Err(e) = self.remove(&id) {
                tracing::warn!(%id, error = %e, "failed to remove connection during teardown");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Rebuild the connection map from the server's module list
    ///
    /// Authoritative resync: whatever loopbacks the server reports are
    /// the connections, whoever loaded them. Loopbacks whose argument
    /// string does not name both a source and a sink are skipped.
    pub fn resync(&mut self, modules: &[ModuleInfo]) {
        let mut fresh = BTreeMap::new();
        for module in modules.iter().filter(|m| m.name == LOOPBACK_MODULE) {
            let Some(connection) = module.argument.as_deref().and_then(parse_loopback_argument)
            else {
                tracing::warn!(
                    index = module.index,
                    argument = module.argument.as_deref().unwrap_or(""),
                    "skipping loopback with unparseable arguments"
                );
                continue;
            };
            fresh.insert(ConnectionId::from_module_index(module.index), connection);
        }
        self.topology.replace_connections(fresh);
    }
}

/// Parse a loopback module's `source=… sink=…` argument string
fn parse_loopback_argument(argument: &str) -> Option<Connection> {
    let mut source = None;
    let mut sink = None;
    for token in argument.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            let value = value.trim_matches('"');
            match key {
                "source" => source = Some(value),
                "sink" => sink = Some(value),
                _ => {}
            }
        }
    }
    Some(Connection::new(source?, sink?))
}
