//! PulseRouter - the engine's lifecycle and public API
//!
//! A cheaply-cloneable handle around shared state. One mutex (the
//! exclusivity guard) serializes everything that touches the gateway or
//! the topology snapshot: manual API calls acquire it blocking, the
//! periodic tick acquires it non-blocking and defers on contention so a
//! slow manual operation can never stall the timer thread.

use std::sync::Arc;

use parking_lot::Mutex;

use pulse_gateway::{Gateway, GatewayError};
use topology_store::{Connection, ConnectionId, EventBus, EventIterator, Topology, TopologyEvent};

use crate::config::RouterConfig;
use crate::connections::ConnectionManager;
use crate::error::RouterError;
use crate::reconcile;
use crate::scheduler::Scheduler;

const NULL_SINK_MODULE: &str = "module-null-sink";
const BLUETOOTH_MODULE: &str = "module-bluetooth-discover";
const ZEROCONF_DISCOVER_MODULE: &str = "module-zeroconf-discover";
const ZEROCONF_PUBLISH_MODULE: &str = "module-zeroconf-publish";

/// Lifecycle state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

type GatewayFactory = dyn Fn(&RouterConfig) -> Result<Box<dyn Gateway>, GatewayError> + Send + Sync;
type FailureHandler = dyn Fn(&RouterError) + Send + Sync;

/// State behind the exclusivity guard
pub(crate) struct RouterInner {
    state: ServiceState,
    gateway: Option<Box<dyn Gateway>>,
    topology: Topology,
}

/// State shared between handles and the scheduler thread
pub(crate) struct Shared {
    inner: Mutex<RouterInner>,
    config: Mutex<RouterConfig>,
    bus: EventBus,
    factory: Box<GatewayFactory>,
    on_failure: Mutex<Option<Arc<FailureHandler>>>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl Shared {
    /// One scheduler-driven tick: skip outright if the guard is taken
    pub(crate) fn try_tick(&self) {
        let Some(mut inner) = self.inner.try_lock() else {
            tracing::trace!("refresh tick skipped; guard is busy");
            return;
        };
        if inner.state != ServiceState::Started {
            return;
        }

        let config = self.config.lock().clone();
        let RouterInner {
            gateway, topology, ..
        } = &mut *inner;
        let Some(gateway) = gateway.as_deref() else {
            return;
        };

        if let Err(err) = reconcile::run_tick(gateway, topology, &config, &self.bus) {
            tracing::error!(error = %err, "refresh tick failed");
            // Release the guard before handing control to the host's
            // failure hook; the hook may call back into the engine.
            drop(inner);
            self.report_failure(&err);
        }
    }

    fn report_failure(&self, err: &RouterError) {
        let handler = self.on_failure.lock().clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.shutdown();
        }
    }
}

/// Routing engine handle
///
/// Clones share all state, like the rest of the host service surface.
///
/// # Example
///
/// ```rust,ignore
/// use pulse_router::{PulseRouter, RouterConfig};
///
/// let router = PulseRouter::new(RouterConfig::new("mopidy"));
/// router.start()?;
///
/// for event in router.subscribe() {
///     println!("{}", event.name());
/// }
/// ```
pub struct PulseRouter {
    shared: Arc<Shared>,
}

impl Clone for PulseRouter {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl PulseRouter {
    /// Create an engine backed by the local PulseAudio server
    ///
    /// The connection is established by `start`, not here.
    #[cfg(feature = "pulse")]
    pub fn new(config: RouterConfig) -> Self {
        Self::with_gateway_factory(config, |cfg: &RouterConfig| {
            let client = pulse_gateway::PulseClient::connect(&cfg.sink_name)?;
            Ok(Box::new(client) as Box<dyn Gateway>)
        })
    }

    /// Create an engine with a custom gateway factory
    ///
    /// The factory runs on every start, including the restarts a
    /// property change triggers.
    pub fn with_gateway_factory<F>(config: RouterConfig, factory: F) -> Self
    where
        F: Fn(&RouterConfig) -> Result<Box<dyn Gateway>, GatewayError> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(RouterInner {
                    state: ServiceState::Stopped,
                    gateway: None,
                    topology: Topology::new(),
                }),
                config: Mutex::new(config),
                bus: EventBus::new(),
                factory: Box::new(factory),
                on_failure: Mutex::new(None),
                scheduler: Mutex::new(None),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Bring the service up; no-op if already started
    ///
    /// Connects the gateway, ensures the virtual sink and discovery
    /// modules, runs one synchronous reconciliation tick, wires the
    /// default connection and hands over to the refresh scheduler. Any
    /// failure unwinds to the stopped state and propagates.
    pub fn start(&self) -> Result<(), RouterError> {
        let mut scheduler_slot = self.shared.scheduler.lock();
        let config = self.shared.config.lock().clone();
        config.validate()?;

        {
            let mut inner = self.shared.inner.lock();
            if inner.state == ServiceState::Started {
                return Ok(());
            }
            inner.state = ServiceState::Starting;
            if let Err(err) = Self::start_locked(&mut inner, &config, &self.shared) {
                inner.gateway = None;
                inner.topology.clear();
                inner.state = ServiceState::Stopped;
                return Err(err);
            }
        }

        match Scheduler::spawn(Arc::downgrade(&self.shared), config.refresh_period()) {
            Ok(scheduler) => {
                *scheduler_slot = Some(scheduler);
            }
            Err(err) => {
                let mut inner = self.shared.inner.lock();
                let _ = Self::teardown(&mut inner, &self.shared.bus);
                self.shared.bus.emit(TopologyEvent::ServiceStopped);
                return Err(err);
            }
        }

        tracing::info!(sink = %config.sink_name, "pulse router started");
        Ok(())
    }

    /// Take the service down; no-op if already stopped
    ///
    /// Joins the scheduler first, so an in-flight tick completes before
    /// teardown; then removes every tracked connection and disconnects.
    pub fn stop(&self) -> Result<(), RouterError> {
        let mut scheduler_slot = self.shared.scheduler.lock();
        if let Some(scheduler) = scheduler_slot.take() {
            scheduler.shutdown();
        }

        let mut inner = self.shared.inner.lock();
        if inner.state == ServiceState::Stopped {
            return Ok(());
        }
        inner.state = ServiceState::Stopping;
        let result = Self::teardown(&mut inner, &self.shared.bus);
        self.shared.bus.emit(TopologyEvent::ServiceStopped);
        tracing::info!("pulse router stopped");
        result
    }

    /// Enable the service (host-facing alias for `start`)
    pub fn enable(&self) -> Result<(), RouterError> {
        self.start()
    }

    /// Disable the service (host-facing alias for `stop`)
    pub fn disable(&self) -> Result<(), RouterError> {
        self.stop()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServiceState {
        self.shared.inner.lock().state
    }

    // ------------------------------------------------------------------
    // Topology API
    // ------------------------------------------------------------------

    /// Names of all sources, queried fresh from the server
    pub fn sources(&self) -> Result<Vec<String>, RouterError> {
        let inner = self.shared.inner.lock();
        let gateway = inner.gateway.as_deref().ok_or(RouterError::NotStarted)?;
        Ok(gateway
            .source_info_list()?
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    /// Names of all sinks, queried fresh from the server
    pub fn sinks(&self) -> Result<Vec<String>, RouterError> {
        let inner = self.shared.inner.lock();
        let gateway = inner.gateway.as_deref().ok_or(RouterError::NotStarted)?;
        Ok(gateway
            .sink_info_list()?
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    /// Establish a connection
    ///
    /// Without a source the virtual sink's monitor is used; without a
    /// sink the server's default sink is. Idempotent per pair.
    ///
    /// A connection the auto-connect policy also selects will be
    /// recreated by the next tick if removed; manual connections outside
    /// the policy stick until disconnected or their endpoints vanish.
    pub fn connect(
        &self,
        source: Option<&str>,
        sink: Option<&str>,
    ) -> Result<ConnectionId, RouterError> {
        let config = self.shared.config.lock().clone();
        let mut inner = self.shared.inner.lock();
        Self::connect_locked(&mut inner, &config, &self.shared.bus, source, sink)
    }

    /// Remove a connection; unknown ids are silently ignored
    pub fn disconnect(&self, id: &ConnectionId) -> Result<(), RouterError> {
        let mut inner = self.shared.inner.lock();
        let RouterInner {
            gateway, topology, ..
        } = &mut *inner;
        let Some(gateway) = gateway.as_deref() else {
            // Stopped engines track no connections; removal of anything
            // is the documented no-op.
            return Ok(());
        };
        let mut manager = ConnectionManager {
            gateway,
            topology,
            bus: &self.shared.bus,
        };
        manager.remove(id).map_err(Into::into)
    }

    /// Current connections as last observed
    pub fn connections(&self) -> std::collections::BTreeMap<ConnectionId, Connection> {
        self.shared.inner.lock().topology.connections().clone()
    }

    /// Run one reconciliation tick synchronously
    ///
    /// Blocks on the guard like any other manual call.
    pub fn refresh(&self) -> Result<(), RouterError> {
        let config = self.shared.config.lock().clone();
        let mut inner = self.shared.inner.lock();
        if inner.state != ServiceState::Started {
            return Err(RouterError::NotStarted);
        }
        let RouterInner {
            gateway, topology, ..
        } = &mut *inner;
        let gateway = gateway.as_deref().ok_or(RouterError::NotStarted)?;
        reconcile::run_tick(gateway, topology, &config, &self.shared.bus)
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Read one property, or all of them when `name` is `None`
    ///
    /// Unknown names yield `None` rather than an error.
    pub fn get_property(&self, name: Option<&str>) -> Option<serde_json::Value> {
        let config = self.shared.config.lock();
        match name {
            Some(name) => config.property(name),
            None => Some(serde_json::Value::Object(config.properties())),
        }
    }

    /// Update one property and rebuild the engine around it
    ///
    /// Notifies listeners, then performs a full stop followed by a full
    /// start; the scheduler join inside `stop` guarantees no tick is in
    /// flight while the engine is rebuilt.
    pub fn set_property(&self, name: &str, value: serde_json::Value) -> Result<(), RouterError> {
        let rendered = value.to_string();
        self.shared.config.lock().set_property(name, value)?;

        tracing::info!(property = name, value = %rendered, "property changed");
        self.shared.bus.emit(TopologyEvent::ServicePropertyChanged {
            name: name.to_string(),
            value: rendered,
        });

        self.stop()?;
        self.start()
    }

    // ------------------------------------------------------------------
    // Host integration
    // ------------------------------------------------------------------

    /// Subscribe to topology and service events
    pub fn subscribe(&self) -> EventIterator {
        self.shared.bus.subscribe()
    }

    /// Register the host's failure hook
    ///
    /// Called with every error a scheduled tick produces; the engine
    /// itself does not retry beyond the next tick. The hook must not
    /// call `stop` or `set_property` synchronously - it runs on the
    /// scheduler thread those calls would need to join.
    pub fn set_failure_handler<F>(&self, handler: F)
    where
        F: Fn(&RouterError) + Send + Sync + 'static,
    {
        *self.shared.on_failure.lock() = Some(Arc::new(handler));
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn start_locked(
        inner: &mut RouterInner,
        config: &RouterConfig,
        shared: &Shared,
    ) -> Result<(), RouterError> {
        let gateway = (shared.factory)(config)?;
        bootstrap(gateway.as_ref(), config)?;
        inner.gateway = Some(gateway);
        inner.state = ServiceState::Started;
        shared.bus.emit(TopologyEvent::ServiceStarted);

        // One synchronous tick before the timer regime takes over
        {
            let RouterInner {
                gateway, topology, ..
            } = &mut *inner;
            let gateway = gateway.as_deref().ok_or(RouterError::NotStarted)?;
            reconcile::run_tick(gateway, topology, config, &shared.bus)?;
        }

        // Wire the virtual sink's monitor into the default sink so the
        // host is audible immediately.
        Self::connect_locked(inner, config, &shared.bus, None, None)?;
        Ok(())
    }

    fn connect_locked(
        inner: &mut RouterInner,
        config: &RouterConfig,
        bus: &EventBus,
        source: Option<&str>,
        sink: Option<&str>,
    ) -> Result<ConnectionId, RouterError> {
        let RouterInner {
            gateway, topology, ..
        } = &mut *inner;
        let gateway = gateway.as_deref().ok_or(RouterError::NotStarted)?;

        let source = match source {
            Some(source) => source.to_string(),
            None => config.monitor_source(),
        };
        let sink = match sink {
            Some(sink) => sink.to_string(),
            None => gateway
                .server_info()?
                .default_sink_name
                .ok_or(RouterError::NoDefaultSink)?,
        };

        let mut manager = ConnectionManager {
            gateway,
            topology,
            bus,
        };
        Ok(manager.create(&source, &sink)?)
    }

    /// Release everything the engine holds on the server; best-effort
    fn teardown(inner: &mut RouterInner, bus: &EventBus) -> Result<(), RouterError> {
        let RouterInner {
            gateway, topology, ..
        } = &mut *inner;
        let result = match gateway.as_deref() {
            Some(gateway) => ConnectionManager {
                gateway,
                topology,
                bus,
            }
            .remove_all()
            .map_err(RouterError::from),
            None => Ok(()),
        };

        // Dropping the gateway disconnects from the server
        inner.gateway = None;
        inner.topology.clear();
        inner.state = ServiceState::Stopped;
        result
    }
}

/// Load the modules the service depends on
///
/// The virtual sink is created only if no sink of that name exists, and
/// its monitor becomes the default source so recording hosts follow the
/// engine. Bluetooth discovery is reloaded to pick up configuration
/// changes; zeroconf makes devices visible across hosts.
fn bootstrap(gateway: &dyn Gateway, config: &RouterConfig) -> Result<(), RouterError> {
    let sinks = gateway.sink_info_list()?;
    if !sinks.iter().any(|s| s.name == config.sink_name) {
        tracing::info!(sink = %config.sink_name, "creating virtual sink");
        gateway.load_module(NULL_SINK_MODULE, &[("sink_name", config.sink_name.as_str())])?;
        gateway.set_default_source(&config.monitor_source())?;
    }

    if let Some(stale) = gateway
        .module_info_list()?
        .into_iter()
        .find(|m| m.name == BLUETOOTH_MODULE)
    {
        tracing::debug!(index = stale.index, "reloading bluetooth discovery");
        gateway.unload_module(stale.index)?;
    }
    gateway.load_module(BLUETOOTH_MODULE, &[])?;

    gateway.load_module(ZEROCONF_DISCOVER_MODULE, &[])?;
    gateway.load_module(ZEROCONF_PUBLISH_MODULE, &[])?;
    Ok(())
}
