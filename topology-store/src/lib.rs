//! Audio Topology State Library
//!
//! In-memory snapshots of an audio server's routing topology (source names,
//! sink names, loopback connections) with change detection and blocking
//! event iteration.
//!
//! # Features
//!
//! - **Snapshot semantics**: `Topology` mirrors whatever the server last
//!   reported; replacing a set yields the exact additions and removals
//! - **Change detection**: one event per actual change, never for no-ops
//! - **Blocking iteration**: consume events via blocking iterators
//! - **Multi-subscriber fan-out**: every subscriber sees every event
//!
//! # Quick Start
//!
//! ```rust
//! use topology_store::{EventBus, Topology, TopologyEvent};
//!
//! let mut topology = Topology::new();
//! let bus = EventBus::new();
//! let events = bus.subscribe();
//!
//! // Replace the source set with what the server reported this tick
//! let delta = topology.replace_sources(["mic".to_string(), "line-in".to_string()]);
//! for source in delta.added {
//!     bus.emit(TopologyEvent::SourceAdded { source });
//! }
//!
//! // Both additions were observed
//! assert_eq!(events.try_iter().count(), 2);
//! ```
//!
//! # Architecture
//!
//! ```text
//! Topology
//!     ├── sources: BTreeSet<String>
//!     ├── sinks: BTreeSet<String>
//!     └── connections: BTreeMap<ConnectionId, Connection>
//!
//! EventBus ── mpsc::channel per subscriber ──> EventIterator
//! ```

// Modules
pub mod connection;
pub mod event;
pub mod iter;
pub mod snapshot;

// Re-exports - Public API
pub use connection::{Connection, ConnectionId};
pub use event::{EventBus, TopologyEvent};
pub use iter::{EventIterator, TimeoutIter, TryIter};
pub use snapshot::{SetDelta, Topology};
