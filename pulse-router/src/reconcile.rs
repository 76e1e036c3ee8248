//! One reconciliation tick
//!
//! Refreshes the topology snapshot from the server, emits change events,
//! activates eligible Bluetooth profiles, and converges the server's
//! loopback routes toward the auto-connect policy. Runs with the
//! exclusivity guard held; any server error aborts the tick and
//! propagates to the caller's failure boundary.

use pulse_gateway::Gateway;
use topology_store::{EventBus, Topology, TopologyEvent};

use crate::config::RouterConfig;
use crate::connections::ConnectionManager;
use crate::error::RouterError;
use crate::policy::{self, Defaults};

const A2DP_PROFILE: &str = "a2dp";

/// Run one full tick in the order the contract fixes:
/// sources, sinks, connections, Bluetooth, policy convergence.
pub(crate) fn run_tick(
    gateway: &dyn Gateway,
    topology: &mut Topology,
    config: &RouterConfig,
    bus: &EventBus,
) -> Result<(), RouterError> {
    refresh_sources(gateway, topology, bus)?;
    refresh_sinks(gateway, topology, bus)?;
    refresh_connections(gateway, topology, bus)?;
    activate_bluetooth_a2dp(gateway)?;
    converge_connections(gateway, topology, config, bus)?;
    Ok(())
}

fn refresh_sources(
    gateway: &dyn Gateway,
    topology: &mut Topology,
    bus: &EventBus,
) -> Result<(), RouterError> {
    let fresh = gateway.source_info_list()?;
    let delta = topology.replace_sources(fresh.into_iter().map(|s| s.name));
    for source in delta.added {
        tracing::debug!(source = %source, "source added");
        bus.emit(TopologyEvent::SourceAdded { source });
    }
    for source in delta.removed {
        tracing::debug!(source = %source, "source removed");
        bus.emit(TopologyEvent::SourceRemoved { source });
    }
    Ok(())
}

fn refresh_sinks(
    gateway: &dyn Gateway,
    topology: &mut Topology,
    bus: &EventBus,
) -> Result<(), RouterError> {
    let fresh = gateway.sink_info_list()?;
    let delta = topology.replace_sinks(fresh.into_iter().map(|s| s.name));
    for sink in delta.added {
        tracing::debug!(sink = %sink, "sink added");
        bus.emit(TopologyEvent::SinkAdded { sink });
    }
    for sink in delta.removed {
        tracing::debug!(sink = %sink, "sink removed");
        bus.emit(TopologyEvent::SinkRemoved { sink });
    }
    Ok(())
}

fn refresh_connections(
    gateway: &dyn Gateway,
    topology: &mut Topology,
    bus: &EventBus,
) -> Result<(), RouterError> {
    let modules = gateway.module_info_list()?;
    ConnectionManager {
        gateway,
        topology,
        bus,
    }
    .resync(&modules);
    Ok(())
}

/// Switch every card that offers A2DP but is not using it
///
/// Newly paired Bluetooth devices tend to come up in a telephony profile;
/// A2DP is the one that can actually stream stereo audio.
fn activate_bluetooth_a2dp(gateway: &dyn Gateway) -> Result<(), RouterError> {
    for card in gateway.card_info_list()? {
        if card.has_profile(A2DP_PROFILE) && card.active_profile.as_deref() != Some(A2DP_PROFILE) {
            tracing::info!(card = %card.name, "activating a2dp profile");
            gateway.set_card_profile(&card.name, A2DP_PROFILE)?;
        }
    }
    Ok(())
}

/// Drop connections whose endpoints vanished, then create missing
/// desired pairs
fn converge_connections(
    gateway: &dyn Gateway,
    topology: &mut Topology,
    config: &RouterConfig,
    bus: &EventBus,
) -> Result<(), RouterError> {
    let info = gateway.server_info()?;
    let defaults = Defaults {
        source: info.default_source_name,
        sink: info.default_sink_name,
    };
    let desired = policy::desired_connections(config, topology, &defaults);

    // Stale removal happens before creation so a route whose endpoint
    // vanished never survives into the desired evaluation.
    let stale: Vec<_> = topology
        .connections()
        .iter()
        .filter(|(_, c)| !topology.has_source(&c.source) || !topology.has_sink(&c.sink))
        .map(|(id, _)| id.clone())
        .collect();

    let mut manager = ConnectionManager {
        gateway,
        topology,
        bus,
    };
    for id in stale {
        tracing::info!(%id, "removing stale connection");
        manager.remove(&id)?;
    }

    for (source, sink) in desired {
        manager.create(&source, &sink)?;
    }
    Ok(())
}
