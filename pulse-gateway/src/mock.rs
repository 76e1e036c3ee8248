//! Scriptable in-memory gateway for tests
//!
//! Emulates just enough of the audio server for the routing engine's
//! integration tests: device listings, module load/unload bookkeeping
//! (including the sink and monitor source a null-sink load produces),
//! card profiles, and default devices. Every call is recorded so tests
//! can assert which server operations were (or were not) issued, and any
//! operation can be made to fail by name.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::GatewayError;
use crate::types::{CardInfo, ModuleInfo, ServerInfo, SinkInfo, SourceInfo};
use crate::{render_module_args, Gateway};

#[derive(Debug, Default)]
struct MockState {
    sources: Vec<SourceInfo>,
    sinks: Vec<SinkInfo>,
    cards: Vec<CardInfo>,
    modules: Vec<ModuleInfo>,
    default_source: Option<String>,
    default_sink: Option<String>,
    next_index: u32,
}

impl MockState {
    fn mint_index(&mut self) -> u32 {
        self.next_index += 1;
        self.next_index
    }
}

/// In-memory stand-in for a PulseAudio server
///
/// Clones share the same server state, so a test can keep a handle for
/// scripting and inspection while the engine owns another.
#[derive(Debug, Default, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
    calls: Arc<Mutex<Vec<String>>>,
    fail_ops: Arc<Mutex<HashSet<String>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Test scripting
    // ------------------------------------------------------------------

    pub fn add_source(&self, name: &str) {
        let mut state = self.state.lock().expect("mock state");
        let index = state.mint_index();
        state.sources.push(SourceInfo {
            index,
            name: name.to_string(),
            description: None,
        });
    }

    pub fn remove_source(&self, name: &str) {
        let mut state = self.state.lock().expect("mock state");
        state.sources.retain(|s| s.name != name);
    }

    pub fn add_sink(&self, name: &str) {
        let mut state = self.state.lock().expect("mock state");
        let index = state.mint_index();
        state.sinks.push(SinkInfo {
            index,
            name: name.to_string(),
            description: None,
        });
    }

    pub fn remove_sink(&self, name: &str) {
        let mut state = self.state.lock().expect("mock state");
        state.sinks.retain(|s| s.name != name);
    }

    pub fn add_card(&self, card: CardInfo) {
        self.state.lock().expect("mock state").cards.push(card);
    }

    pub fn set_defaults(&self, source: Option<&str>, sink: Option<&str>) {
        let mut state = self.state.lock().expect("mock state");
        state.default_source = source.map(str::to_string);
        state.default_sink = sink.map(str::to_string);
    }

    /// Make every future call to `op` fail until `clear_failures`
    pub fn fail_on(&self, op: &str) {
        self.fail_ops
            .lock()
            .expect("mock failures")
            .insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_ops.lock().expect("mock failures").clear();
    }

    // ------------------------------------------------------------------
    // Test inspection
    // ------------------------------------------------------------------

    /// All recorded calls, in order, as `"op(detail)"` strings
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock calls").clone()
    }

    pub fn calls_named(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(op))
            .count()
    }

    /// Currently loaded modules with the given name
    pub fn modules_named(&self, name: &str) -> Vec<ModuleInfo> {
        self.state
            .lock()
            .expect("mock state")
            .modules
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    pub fn card(&self, name: &str) -> Option<CardInfo> {
        self.state
            .lock()
            .expect("mock state")
            .cards
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn default_source(&self) -> Option<String> {
        self.state.lock().expect("mock state").default_source.clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn record(&self, call: String) {
        self.calls.lock().expect("mock calls").push(call);
    }

    fn check_fail(&self, op: &str) -> Result<(), GatewayError> {
        if self.fail_ops.lock().expect("mock failures").contains(op) {
            Err(GatewayError::Call(format!("injected failure in {op}")))
        } else {
            Ok(())
        }
    }
}

fn arg_value<'a>(argument: &'a str, key: &str) -> Option<&'a str> {
    argument
        .split_whitespace()
        .filter_map(|token| token.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

impl Gateway for MockGateway {
    fn source_info_list(&self) -> Result<Vec<SourceInfo>, GatewayError> {
        self.record("source_info_list".to_string());
        self.check_fail("source_info_list")?;
        Ok(self.state.lock().expect("mock state").sources.clone())
    }

    fn sink_info_list(&self) -> Result<Vec<SinkInfo>, GatewayError> {
        self.record("sink_info_list".to_string());
        self.check_fail("sink_info_list")?;
        Ok(self.state.lock().expect("mock state").sinks.clone())
    }

    fn module_info_list(&self) -> Result<Vec<ModuleInfo>, GatewayError> {
        self.record("module_info_list".to_string());
        self.check_fail("module_info_list")?;
        Ok(self.state.lock().expect("mock state").modules.clone())
    }

    fn card_info_list(&self) -> Result<Vec<CardInfo>, GatewayError> {
        self.record("card_info_list".to_string());
        self.check_fail("card_info_list")?;
        Ok(self.state.lock().expect("mock state").cards.clone())
    }

    fn server_info(&self) -> Result<ServerInfo, GatewayError> {
        self.record("server_info".to_string());
        self.check_fail("server_info")?;
        let state = self.state.lock().expect("mock state");
        Ok(ServerInfo {
            server_name: Some("mock".to_string()),
            server_version: Some("0.0".to_string()),
            default_source_name: state.default_source.clone(),
            default_sink_name: state.default_sink.clone(),
        })
    }

    fn load_module(&self, name: &str, args: &[(&str, &str)]) -> Result<u32, GatewayError> {
        self.record(format!("load_module({name})"));
        self.check_fail("load_module")?;

        let argument = render_module_args(args);
        let mut state = self.state.lock().expect("mock state");
        let index = state.mint_index();
        state.modules.push(ModuleInfo {
            index,
            name: name.to_string(),
            argument: (!argument.is_empty()).then(|| argument.clone()),
        });

        // A null sink brings a sink and its monitor source into existence.
        if name == "module-null-sink" {
            if let Some(sink_name) = arg_value(&argument, "sink_name") {
                let sink_name = sink_name.to_string();
                let sink_index = state.mint_index();
                state.sinks.push(SinkInfo {
                    index: sink_index,
                    name: sink_name.clone(),
                    description: None,
                });
                let monitor_index = state.mint_index();
                state.sources.push(SourceInfo {
                    index: monitor_index,
                    name: format!("{sink_name}.monitor"),
                    description: None,
                });
            }
        }

        Ok(index)
    }

    fn unload_module(&self, index: u32) -> Result<(), GatewayError> {
        self.record(format!("unload_module({index})"));
        self.check_fail("unload_module")?;

        let mut state = self.state.lock().expect("mock state");
        let position = state
            .modules
            .iter()
            .position(|m| m.index == index)
            .ok_or_else(|| GatewayError::Call(format!("no module with index {index}")))?;
        let module = state.modules.remove(position);

        if module.name == "module-null-sink" {
            if let Some(sink_name) = module
                .argument
                .as_deref()
                .and_then(|a| arg_value(a, "sink_name"))
            {
                let monitor = format!("{sink_name}.monitor");
                state.sinks.retain(|s| s.name != sink_name);
                state.sources.retain(|s| s.name != monitor);
            }
        }

        Ok(())
    }

    fn set_default_source(&self, name: &str) -> Result<(), GatewayError> {
        self.record(format!("set_default_source({name})"));
        self.check_fail("set_default_source")?;
        self.state.lock().expect("mock state").default_source = Some(name.to_string());
        Ok(())
    }

    fn set_card_profile(&self, card: &str, profile: &str) -> Result<(), GatewayError> {
        self.record(format!("set_card_profile({card}, {profile})"));
        self.check_fail("set_card_profile")?;
        let mut state = self.state.lock().expect("mock state");
        let card = state
            .cards
            .iter_mut()
            .find(|c| c.name == card)
            .ok_or_else(|| GatewayError::Call(format!("no card named {card}")))?;
        if !card.has_profile(profile) {
            return Err(GatewayError::Call(format!(
                "card {} has no profile {profile}",
                card.name
            )));
        }
        card.active_profile = Some(profile.to_string());
        Ok(())
    }
}
