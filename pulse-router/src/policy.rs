//! Auto-connect policy evaluation
//!
//! A pure function from (configuration, topology snapshot, server
//! defaults) to the desired set of source→sink pairs. Runs against the
//! snapshot captured earlier in the same tick, so `all` expands over the
//! just-refreshed device sets.

use std::collections::BTreeSet;

use topology_store::Topology;

use crate::config::{RouterConfig, Selector};

/// Substring marking a source as a sink monitor
pub const MONITOR_MARKER: &str = "monitor";

/// Default source and sink names as reported by the server this tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    pub source: Option<String>,
    pub sink: Option<String>,
}

/// Whether a source name denotes a monitor-type source
pub fn is_monitor(name: &str) -> bool {
    name.contains(MONITOR_MARKER)
}

/// Compute the full desired connection set
///
/// Set semantics throughout: duplicates collapse, order is irrelevant.
pub fn desired_connections(
    config: &RouterConfig,
    topology: &Topology,
    defaults: &Defaults,
) -> BTreeSet<(String, String)> {
    let sources = resolve_sources(&config.auto_sources, topology, defaults);
    let sinks = resolve_sinks(&config.auto_sinks, config, topology, defaults);

    let mut desired = BTreeSet::new();
    for source in &sources {
        for sink in &sinks {
            desired.insert((source.clone(), sink.clone()));
        }
    }
    desired
}

/// Resolve the source selector list against the current snapshot
///
/// `all` expands to every non-monitor source plus the default source; the
/// default stays in even when it is itself a monitor (the virtual sink's
/// monitor is the usual default here).
fn resolve_sources(
    selectors: &[Selector],
    topology: &Topology,
    defaults: &Defaults,
) -> BTreeSet<String> {
    let mut resolved = BTreeSet::new();
    for selector in selectors {
        match selector {
            Selector::None => return BTreeSet::new(),
            Selector::Default => {
                if let Some(default) = &defaults.source {
                    resolved.insert(default.clone());
                }
            }
            Selector::All => {
                resolved.extend(
                    topology
                        .sources()
                        .iter()
                        .filter(|name| !is_monitor(name))
                        .cloned(),
                );
                if let Some(default) = &defaults.source {
                    resolved.insert(default.clone());
                }
            }
            Selector::Name(name) => {
                resolved.insert(name.clone());
            }
        }
    }
    resolved
}

/// Resolve the sink selector list against the current snapshot
///
/// `all` expands to every known sink except the engine's own virtual
/// sink; routing the virtual sink into itself would loop audio back.
fn resolve_sinks(
    selectors: &[Selector],
    config: &RouterConfig,
    topology: &Topology,
    defaults: &Defaults,
) -> BTreeSet<String> {
    let mut resolved = BTreeSet::new();
    for selector in selectors {
        match selector {
            Selector::None => return BTreeSet::new(),
            Selector::Default => {
                if let Some(default) = &defaults.sink {
                    resolved.insert(default.clone());
                }
            }
            Selector::All => {
                resolved.extend(
                    topology
                        .sinks()
                        .iter()
                        .filter(|name| **name != config.sink_name)
                        .cloned(),
                );
            }
            Selector::Name(name) => {
                resolved.insert(name.clone());
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(sources: &[&str], sinks: &[&str]) -> Topology {
        let mut t = Topology::new();
        t.replace_sources(sources.iter().map(|s| s.to_string()));
        t.replace_sinks(sinks.iter().map(|s| s.to_string()));
        t
    }

    fn defaults(source: &str, sink: &str) -> Defaults {
        Defaults {
            source: Some(source.to_string()),
            sink: Some(sink.to_string()),
        }
    }

    fn config(sources: &[&str], sinks: &[&str]) -> RouterConfig {
        let mut c = RouterConfig::new("mopidy");
        c.auto_sources = sources.iter().map(|s| Selector::from(*s)).collect();
        c.auto_sinks = sinks.iter().map(|s| Selector::from(*s)).collect();
        c
    }

    fn pair(source: &str, sink: &str) -> (String, String) {
        (source.to_string(), sink.to_string())
    }

    #[test]
    fn test_default_source_all_sinks() {
        // The usual deployment: the default source is the virtual
        // sink's monitor, and `all` must not route back into the
        // virtual sink itself.
        let topology = topology(&["mic.monitor", "mopidy.monitor"], &["mopidy", "hdmi"]);
        let defaults = defaults("mopidy.monitor", "mopidy");
        let config = config(&["default"], &["all"]);

        let desired = desired_connections(&config, &topology, &defaults);
        assert_eq!(
            desired,
            BTreeSet::from([pair("mopidy.monitor", "hdmi")])
        );
    }

    #[test]
    fn test_none_short_circuits_sources() {
        let topology = topology(&["mic", "line-in"], &["hdmi"]);
        let defaults = defaults("mic", "hdmi");
        // Entries after `none` are ignored entirely
        let config = config(&["none", "mic", "all"], &["all"]);

        assert!(desired_connections(&config, &topology, &defaults).is_empty());
    }

    #[test]
    fn test_none_clears_earlier_entries() {
        let topology = topology(&["mic"], &["hdmi"]);
        let defaults = defaults("mic", "hdmi");
        let config = config(&["mic", "none"], &["all"]);

        assert!(desired_connections(&config, &topology, &defaults).is_empty());
    }

    #[test]
    fn test_none_short_circuits_sinks() {
        let topology = topology(&["mic"], &["hdmi", "usb"]);
        let defaults = defaults("mic", "hdmi");
        let config = config(&["all"], &["none", "hdmi"]);

        assert!(desired_connections(&config, &topology, &defaults).is_empty());
    }

    #[test]
    fn test_all_sources_excludes_monitors_but_keeps_default() {
        let topology = topology(
            &["mic", "hdmi.monitor", "mopidy.monitor"],
            &["hdmi"],
        );
        // The default source is a monitor and must survive the filter
        let defaults = defaults("mopidy.monitor", "hdmi");
        let config = config(&["all"], &["default"]);

        let desired = desired_connections(&config, &topology, &defaults);
        assert_eq!(
            desired,
            BTreeSet::from([pair("mic", "hdmi"), pair("mopidy.monitor", "hdmi")])
        );
    }

    #[test]
    fn test_literal_sink_lands_in_sink_list() {
        // Literal sink selectors join the sink list; routing them into
        // the source list would cross-wire the cartesian product.
        let topology = topology(&["mic"], &["hdmi", "usb"]);
        let defaults = defaults("mic", "hdmi");
        let config = config(&["mic"], &["usb"]);

        let desired = desired_connections(&config, &topology, &defaults);
        assert_eq!(desired, BTreeSet::from([pair("mic", "usb")]));
    }

    #[test]
    fn test_cartesian_product_with_dedup() {
        let topology = topology(&["mic", "line-in"], &["hdmi", "usb"]);
        let defaults = defaults("mic", "hdmi");
        // `default` repeats a literal; set semantics collapse it
        let config = config(&["mic", "default", "line-in"], &["hdmi", "usb"]);

        let desired = desired_connections(&config, &topology, &defaults);
        assert_eq!(desired.len(), 4);
        assert!(desired.contains(&pair("line-in", "usb")));
    }

    #[test]
    fn test_missing_defaults_resolve_to_nothing() {
        let topology = topology(&["mic"], &["hdmi"]);
        let config = config(&["default"], &["default"]);

        let desired = desired_connections(&config, &topology, &Defaults::default());
        assert!(desired.is_empty());
    }

    #[test]
    fn test_literal_selector_passes_through_unknown_names() {
        // Literals are not checked against the snapshot; the server
        // decides whether the load succeeds.
        let topology = topology(&[], &[]);
        let defaults = Defaults::default();
        let config = config(&["ghost-source"], &["ghost-sink"]);

        let desired = desired_connections(&config, &topology, &defaults);
        assert_eq!(desired, BTreeSet::from([pair("ghost-source", "ghost-sink")]));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// With `["all"]` selectors, no monitor source other than
            /// the default and no virtual sink ever reaches the
            /// desired set.
            #[test]
            fn all_expansion_respects_exclusions(
                sources in prop::collection::btree_set("[a-z.]{1,12}", 0..12),
                sinks in prop::collection::btree_set("[a-z.]{1,12}", 0..12),
                default_source in "[a-z.]{1,12}",
                default_sink in "[a-z.]{1,12}",
            ) {
                let mut t = Topology::new();
                t.replace_sources(sources.iter().cloned());
                t.replace_sinks(sinks.iter().cloned());
                let d = Defaults {
                    source: Some(default_source.clone()),
                    sink: Some(default_sink.clone()),
                };
                let cfg = config(&["all"], &["all"]);

                let desired = desired_connections(&cfg, &t, &d);
                for (source, sink) in &desired {
                    prop_assert!(!is_monitor(source) || *source == default_source);
                    prop_assert_ne!(sink.as_str(), cfg.sink_name.as_str());
                }
            }
        }
    }
}
