//! End-to-end engine tests against the in-memory gateway
//!
//! Drives the full lifecycle - start, reconcile, manual routing,
//! property changes, stop - and asserts both the engine's view and the
//! mock server's state stay in lockstep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pulse_gateway::MockGateway;
use pulse_router::{Gateway, PulseRouter, RouterConfig, RouterError, Selector, ServiceState};

const LOOPBACK: &str = "module-loopback";

fn router_with(config: RouterConfig, mock: &MockGateway) -> PulseRouter {
    let gateway = mock.clone();
    PulseRouter::with_gateway_factory(config, move |_| {
        Ok(Box::new(gateway.clone()) as Box<dyn Gateway>)
    })
}

/// A server with one hardware sink, as a fresh host usually finds it
fn basic_mock() -> MockGateway {
    let mock = MockGateway::new();
    mock.add_sink("hdmi");
    mock.set_defaults(None, Some("hdmi"));
    mock
}

fn quiet_config() -> RouterConfig {
    let mut config = RouterConfig::new("mopidy");
    config.auto_sources = vec![Selector::None];
    config.auto_sinks = vec![Selector::None];
    config
}

#[test]
fn start_bootstraps_the_server() {
    let mock = basic_mock();
    let router = router_with(quiet_config(), &mock);
    let events = router.subscribe();

    router.start().unwrap();
    assert_eq!(router.state(), ServiceState::Started);

    // Virtual sink and its monitor exist, monitor is the default source
    assert!(router.sinks().unwrap().contains(&"mopidy".to_string()));
    assert!(router
        .sources()
        .unwrap()
        .contains(&"mopidy.monitor".to_string()));
    assert_eq!(mock.default_source(), Some("mopidy.monitor".to_string()));

    // Discovery modules are loaded exactly once
    assert_eq!(mock.modules_named("module-bluetooth-discover").len(), 1);
    assert_eq!(mock.modules_named("module-zeroconf-discover").len(), 1);
    assert_eq!(mock.modules_named("module-zeroconf-publish").len(), 1);

    // The default connection wires the monitor into the default sink
    let connections = router.connections();
    assert_eq!(connections.len(), 1);
    let connection = connections.values().next().unwrap();
    assert_eq!(connection.source, "mopidy.monitor");
    assert_eq!(connection.sink, "hdmi");

    let names: Vec<_> = events.try_iter().map(|e| e.name()).collect();
    assert!(names.contains(&"service_started"));
    assert!(names.contains(&"connection_established"));
}

#[test]
fn start_is_idempotent() {
    let mock = basic_mock();
    let router = router_with(quiet_config(), &mock);

    router.start().unwrap();
    router.start().unwrap();

    assert_eq!(mock.modules_named("module-null-sink").len(), 1);
}

#[test]
fn start_reloads_stale_bluetooth_discovery() {
    let mock = basic_mock();
    mock.load_module("module-bluetooth-discover", &[]).unwrap();

    let router = router_with(quiet_config(), &mock);
    router.start().unwrap();

    assert_eq!(mock.modules_named("module-bluetooth-discover").len(), 1);
    assert_eq!(mock.calls_named("unload_module"), 1);
}

#[test]
fn start_failure_leaves_the_engine_stopped() {
    let mock = basic_mock();
    mock.fail_on("sink_info_list");

    let router = router_with(quiet_config(), &mock);
    let err = router.start().unwrap_err();
    assert!(matches!(err, RouterError::Gateway(_)));
    assert_eq!(router.state(), ServiceState::Stopped);
}

#[test]
fn start_requires_a_sink_name() {
    let mock = basic_mock();
    let router = router_with(RouterConfig::new(""), &mock);

    let err = router.start().unwrap_err();
    assert!(matches!(err, RouterError::MissingSinkName));
    assert_eq!(router.state(), ServiceState::Stopped);
}

#[test]
fn api_calls_require_a_started_engine() {
    let mock = basic_mock();
    let router = router_with(quiet_config(), &mock);

    assert!(matches!(router.sources(), Err(RouterError::NotStarted)));
    assert!(matches!(router.sinks(), Err(RouterError::NotStarted)));
    assert!(matches!(
        router.connect(None, None),
        Err(RouterError::NotStarted)
    ));
}

#[test]
fn connect_is_idempotent() {
    let mock = basic_mock();
    mock.add_source("mic");
    let router = router_with(quiet_config(), &mock);
    router.start().unwrap();

    let first = router.connect(Some("mic"), Some("hdmi")).unwrap();
    let second = router.connect(Some("mic"), Some("hdmi")).unwrap();

    assert_eq!(first, second);
    let loopbacks = mock.modules_named(LOOPBACK);
    let matching: Vec<_> = loopbacks
        .iter()
        .filter(|m| m.argument.as_deref() == Some("source=mic sink=hdmi"))
        .collect();
    assert_eq!(matching.len(), 1);
}

#[test]
fn disconnect_unknown_id_is_a_silent_noop() {
    let mock = basic_mock();
    let router = router_with(quiet_config(), &mock);
    router.start().unwrap();

    let unloads_before = mock.calls_named("unload_module");
    let ghost = pulse_router::ConnectionId::from_module_index(4096);
    router.disconnect(&ghost).unwrap();
    assert_eq!(mock.calls_named("unload_module"), unloads_before);
}

#[test]
fn auto_connections_recreate_after_manual_disconnect() {
    let mock = basic_mock();
    let mut config = RouterConfig::new("mopidy");
    config.auto_sources = vec![Selector::Default];
    config.auto_sinks = vec![Selector::All];
    let router = router_with(config, &mock);
    router.start().unwrap();

    // The policy selects (mopidy.monitor, hdmi), same as the default
    // connection established at start
    let connections = router.connections();
    assert_eq!(connections.len(), 1);
    let id = connections.keys().next().unwrap().clone();

    // Manual disconnect wins immediately...
    router.disconnect(&id).unwrap();
    assert!(router.connections().is_empty());

    // ...but the next tick converges back; that is the documented
    // behavior, not a bug
    router.refresh().unwrap();
    let connections = router.connections();
    assert_eq!(connections.len(), 1);
    let connection = connections.values().next().unwrap();
    assert_eq!(connection.source, "mopidy.monitor");
    assert_eq!(connection.sink, "hdmi");
}

#[test]
fn monitor_default_with_all_sinks_routes_to_hardware() {
    let mock = MockGateway::new();
    mock.add_source("mic.monitor");
    mock.add_sink("hdmi");
    // The virtual sink already exists; its monitor is the default source
    mock.load_module("module-null-sink", &[("sink_name", "mopidy")])
        .unwrap();
    mock.set_defaults(Some("mopidy.monitor"), Some("hdmi"));

    let mut config = RouterConfig::new("mopidy");
    config.auto_sources = vec![Selector::Default];
    config.auto_sinks = vec![Selector::All];
    let router = router_with(config, &mock);
    router.start().unwrap();

    // Desired set is exactly {(mopidy.monitor, hdmi)}: the virtual sink
    // is excluded from `all` and the monitor default survives
    let pairs: Vec<_> = router
        .connections()
        .values()
        .map(|c| (c.source.clone(), c.sink.clone()))
        .collect();
    assert_eq!(
        pairs,
        vec![("mopidy.monitor".to_string(), "hdmi".to_string())]
    );
}

#[test]
fn stop_removes_connections_and_notifies() {
    let mock = basic_mock();
    let router = router_with(quiet_config(), &mock);
    router.start().unwrap();
    assert_eq!(router.connections().len(), 1);

    let events = router.subscribe();
    router.stop().unwrap();

    assert_eq!(router.state(), ServiceState::Stopped);
    assert!(router.connections().is_empty());
    assert!(mock.modules_named(LOOPBACK).is_empty());

    let names: Vec<_> = events.try_iter().map(|e| e.name()).collect();
    assert!(names.contains(&"service_stopped"));

    // Stopping again is a no-op
    router.stop().unwrap();
}

#[test]
fn refresh_emits_one_event_per_change() {
    let mock = basic_mock();
    let router = router_with(quiet_config(), &mock);
    router.start().unwrap();

    let events = router.subscribe();
    mock.add_source("bt_source");
    router.refresh().unwrap();

    let added: Vec<_> = events
        .try_iter()
        .filter(|e| e.name() == "source_added")
        .collect();
    assert_eq!(added.len(), 1);

    // Nothing changed; nothing fires
    router.refresh().unwrap();
    assert_eq!(events.try_iter().count(), 0);

    mock.remove_source("bt_source");
    router.refresh().unwrap();
    let removed: Vec<_> = events
        .try_iter()
        .filter(|e| e.name() == "source_removed")
        .collect();
    assert_eq!(removed.len(), 1);
}

#[test]
fn property_change_restarts_the_engine() {
    let mock = basic_mock();
    let router = router_with(quiet_config(), &mock);
    router.start().unwrap();

    let events = router.subscribe();
    router
        .set_property("refresh", serde_json::json!(2.0))
        .unwrap();

    assert_eq!(router.state(), ServiceState::Started);
    assert_eq!(
        router.get_property(Some("refresh")),
        Some(serde_json::json!(2.0))
    );

    let names: Vec<_> = events.try_iter().map(|e| e.name()).collect();
    assert_eq!(
        names
            .iter()
            .filter(|n| **n == "service_property_changed")
            .count(),
        1
    );
    assert!(names.contains(&"service_stopped"));
    assert!(names.contains(&"service_started"));
}

#[test]
fn property_surface_distinguishes_unknown_names() {
    let mock = basic_mock();
    let router = router_with(quiet_config(), &mock);

    assert_eq!(router.get_property(Some("no_such_property")), None);
    assert!(router.get_property(Some("name")).is_some());
    assert!(router.get_property(None).is_some());

    let err = router
        .set_property("no_such_property", serde_json::json!(1))
        .unwrap_err();
    assert!(matches!(err, RouterError::UnknownProperty(_)));
    // A rejected set does not restart anything
    assert_eq!(router.state(), ServiceState::Stopped);
}

#[test]
fn scheduler_drives_reconciliation() {
    let mock = basic_mock();
    let mut config = quiet_config();
    config.refresh = 0.05;
    let router = router_with(config, &mock);
    router.start().unwrap();

    let events = router.subscribe();
    mock.add_source("bt_source");

    // The background loop must pick the new source up on its own
    let event = events
        .timeout_iter(Duration::from_secs(2))
        .find(|e| e.name() == "source_added");
    assert!(event.is_some(), "scheduler never refreshed the snapshot");

    router.stop().unwrap();
}

#[test]
fn tick_failures_reach_the_failure_handler() {
    let mock = basic_mock();
    let mut config = quiet_config();
    config.refresh = 0.05;
    let router = router_with(config, &mock);
    router.start().unwrap();

    let failed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&failed);
    router.set_failure_handler(move |_| {
        flag.store(true, Ordering::SeqCst);
    });

    mock.fail_on("source_info_list");

    let deadline = Instant::now() + Duration::from_secs(2);
    while !failed.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(failed.load(Ordering::SeqCst), "failure handler never ran");

    mock.clear_failures();
    router.stop().unwrap();
}

#[test]
fn manual_calls_and_ticks_never_interleave() {
    let mock = basic_mock();
    mock.add_source("mic");
    let mut config = quiet_config();
    config.refresh = 0.01;
    let router = router_with(config, &mock);
    router.start().unwrap();

    // Hammer the guard from a second handle while the scheduler runs
    let worker = {
        let router = router.clone();
        std::thread::spawn(move || {
            for _ in 0..50 {
                router.connect(Some("mic"), Some("hdmi")).unwrap();
                let _ = router.connections();
            }
        })
    };
    for _ in 0..50 {
        router.refresh().unwrap();
    }
    worker.join().unwrap();

    // Serialization held: the pair deduplicated to exactly one route
    let loopbacks = mock.modules_named(LOOPBACK);
    let matching: Vec<_> = loopbacks
        .iter()
        .filter(|m| m.argument.as_deref() == Some("source=mic sink=hdmi"))
        .collect();
    assert_eq!(matching.len(), 1);

    router.stop().unwrap();
}
