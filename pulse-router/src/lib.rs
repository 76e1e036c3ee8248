//! # pulse-router - Self-Reconciling PulseAudio Routing
//!
//! A background service that manages the routing topology of a local
//! PulseAudio server for a media-playback host:
//!
//! ```rust,ignore
//! use pulse_router::{PulseRouter, RouterConfig};
//!
//! fn main() -> Result<(), pulse_router::RouterError> {
//!     let router = PulseRouter::new(RouterConfig::new("mopidy"));
//!     router.start()?;
//!
//!     // Manual routing next to the auto-connect policy
//!     let id = router.connect(Some("mic"), Some("hdmi"))?;
//!     router.disconnect(&id)?;
//!
//!     // React to topology changes
//!     for event in router.subscribe() {
//!         println!("{}", event.name());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## What it does
//!
//! - **Virtual sink**: creates a null sink for the host application and
//!   makes its monitor the default source
//! - **Discovery**: keeps Bluetooth and zeroconf discovery modules loaded,
//!   and switches freshly paired cards to their A2DP profile
//! - **Reconciliation**: on a fixed period, mirrors the server's sources,
//!   sinks and loopback routes into a snapshot, emits change events, and
//!   converges the server toward the configured auto-connect policy
//! - **Manual routing**: idempotent connect/disconnect of arbitrary
//!   source→sink pairs
//!
//! ## Architecture
//!
//! ```text
//! pulse-router (engine, policy, scheduling)
//!     ↓
//! topology-store (snapshots, change events)
//!     ↓
//! pulse-gateway (synchronous server boundary)
//! ```
//!
//! One exclusivity guard serializes every gateway touch: manual calls
//! block on it, the periodic tick skips its turn when the guard is busy.
//! All state is rebuilt from the server on each start; nothing persists.

// Main exports
pub use config::{RouterConfig, Selector};
pub use engine::{PulseRouter, ServiceState};
pub use error::RouterError;
pub use policy::{desired_connections, is_monitor, Defaults};

// Re-export the vocabulary types crossing our API boundary
pub use pulse_gateway::{Gateway, GatewayError};
pub use topology_store::{Connection, ConnectionId, EventIterator, Topology, TopologyEvent};

// Internal modules
pub mod config;
mod connections;
mod engine;
mod error;
pub mod logging;
pub mod policy;
mod reconcile;
mod scheduler;
