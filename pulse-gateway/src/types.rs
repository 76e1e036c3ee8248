//! Info records returned by the gateway
//!
//! Thin, owned mirrors of the server's introspection data, carrying only
//! the fields the routing engine consumes.

use serde::{Deserialize, Serialize};

/// A source (audio producer) as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub index: u32,
    pub name: String,
    pub description: Option<String>,
}

/// A sink (audio consumer) as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkInfo {
    pub index: u32,
    pub name: String,
    pub description: Option<String>,
}

/// A loaded server module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub index: u32,
    pub name: String,
    /// Raw argument string the module was loaded with, if any
    pub argument: Option<String>,
}

/// One switchable profile of a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardProfile {
    pub name: String,
    pub description: Option<String>,
}

/// A card (physical or virtual device) with its profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInfo {
    pub index: u32,
    pub name: String,
    pub profiles: Vec<CardProfile>,
    /// Name of the currently active profile, if the server reports one
    pub active_profile: Option<String>,
}

impl CardInfo {
    /// Whether this card exposes a profile with the given name
    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.iter().any(|p| p.name == name)
    }
}

/// Server-wide state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_name: Option<String>,
    pub server_version: Option<String>,
    pub default_source_name: Option<String>,
    pub default_sink_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_has_profile() {
        let card = CardInfo {
            index: 0,
            name: "bluez_card.AA_BB".to_string(),
            profiles: vec![
                CardProfile {
                    name: "a2dp".to_string(),
                    description: None,
                },
                CardProfile {
                    name: "hsp".to_string(),
                    description: None,
                },
            ],
            active_profile: Some("hsp".to_string()),
        };

        assert!(card.has_profile("a2dp"));
        assert!(!card.has_profile("off"));
    }

    #[test]
    fn test_module_info_serialization() {
        let module = ModuleInfo {
            index: 17,
            name: "module-loopback".to_string(),
            argument: Some("source=mic sink=hdmi".to_string()),
        };

        let json = serde_json::to_value(&module).unwrap();
        assert_eq!(json["index"], 17);
        assert_eq!(json["argument"], "source=mic sink=hdmi");
    }
}
