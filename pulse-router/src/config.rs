//! Engine configuration and the runtime property surface
//!
//! The host hands the engine a typed configuration record; at runtime the
//! same record doubles as the mutable property store. Unknown property
//! names are a distinguishable outcome (`None` on get, a typed error on
//! set), never a silently swallowed lookup failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RouterError;

/// One entry of an auto-connect selector list
///
/// Parsed from configuration strings: `"default"`, `"all"` and `"none"`
/// are keywords, anything else is a literal device name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Selector {
    /// The server's current default device
    Default,
    /// Every known device, with the engine's standard exclusions
    All,
    /// Clear the list and ignore remaining selectors
    None,
    /// A device name, passed through unresolved
    Name(String),
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        match s.as_str() {
            "default" => Selector::Default,
            "all" => Selector::All,
            "none" => Selector::None,
            _ => Selector::Name(s),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Selector::from(s.to_string())
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        match selector {
            Selector::Default => "default".to_string(),
            Selector::All => "all".to_string(),
            Selector::None => "none".to_string(),
            Selector::Name(name) => name,
        }
    }
}

/// Configuration of the routing engine
///
/// Mutable at runtime through the property surface; any mutation restarts
/// the whole engine (stop, then start).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Name of the virtual sink the engine maintains for the host.
    /// Required; an empty name is fatal at start.
    #[serde(rename = "name")]
    pub sink_name: String,

    /// Source selectors for the auto-connect policy.
    /// Default: `["default"]`
    pub auto_sources: Vec<Selector>,

    /// Sink selectors for the auto-connect policy.
    /// Default: `["default"]`
    pub auto_sinks: Vec<Selector>,

    /// Refresh period in seconds; fractional values allowed.
    /// Default: 1.0
    pub refresh: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            sink_name: "mopidy".to_string(),
            auto_sources: vec![Selector::Default],
            auto_sinks: vec![Selector::Default],
            refresh: 1.0,
        }
    }
}

impl RouterConfig {
    pub fn new(sink_name: impl Into<String>) -> Self {
        Self {
            sink_name: sink_name.into(),
            ..Self::default()
        }
    }

    /// Check the invariants that are fatal at start
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.sink_name.is_empty() {
            return Err(RouterError::MissingSinkName);
        }
        if !self.refresh.is_finite() || self.refresh <= 0.0 {
            return Err(RouterError::InvalidRefresh);
        }
        Ok(())
    }

    /// Name of the virtual sink's monitor source
    pub fn monitor_source(&self) -> String {
        format!("{}.monitor", self.sink_name)
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs_f64(self.refresh)
    }

    /// Read a single property by its configuration key
    ///
    /// Returns `None` for unknown names.
    pub fn property(&self, name: &str) -> Option<serde_json::Value> {
        match self.as_map() {
            Some(map) => map.get(name).cloned(),
            None => None,
        }
    }

    /// All properties as a key/value map
    pub fn properties(&self) -> serde_json::Map<String, serde_json::Value> {
        self.as_map().unwrap_or_default()
    }

    /// Update a single property by its configuration key
    ///
    /// Unknown names and values that do not fit the field's type are
    /// typed errors; nothing is changed in either case.
    pub fn set_property(
        &mut self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), RouterError> {
        let mut map = self.as_map().ok_or_else(|| RouterError::InvalidPropertyValue {
            name: name.to_string(),
            reason: "configuration is not serializable".to_string(),
        })?;

        if !map.contains_key(name) {
            return Err(RouterError::UnknownProperty(name.to_string()));
        }
        map.insert(name.to_string(), value);

        let candidate: RouterConfig = serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| RouterError::InvalidPropertyValue {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    fn as_map(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}
