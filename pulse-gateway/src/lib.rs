//! Private PulseAudio gateway for audio-routing services
//!
//! This crate provides a minimal synchronous client boundary over a local
//! PulseAudio server: listing sources, sinks, modules and cards, loading
//! and unloading routing modules, and switching default devices and card
//! profiles.
//!
//! The `Gateway` trait is the seam everything else programs against. The
//! real `PulseClient` implementation (behind the default `pulse` feature)
//! wraps libpulse's threaded mainloop in a dedicated worker thread so the
//! handle is `Send + Sync` even though libpulse itself is not. Calls are
//! still not meant to be issued concurrently; callers serialize access
//! with their own guard.

mod error;
mod types;

#[cfg(feature = "test-support")]
pub mod mock;
#[cfg(feature = "pulse")]
mod pulse;

pub use error::GatewayError;
#[cfg(feature = "test-support")]
pub use mock::MockGateway;
#[cfg(feature = "pulse")]
pub use pulse::PulseClient;
pub use types::{CardInfo, CardProfile, ModuleInfo, ServerInfo, SinkInfo, SourceInfo};

/// Synchronous RPC-style surface of the audio server
///
/// One method per server operation the routing engine needs. Every call
/// either completes or returns a `GatewayError`; there is no cancellation
/// and no retry at this layer.
pub trait Gateway: Send {
    /// List all sources the server currently reports
    fn source_info_list(&self) -> Result<Vec<SourceInfo>, GatewayError>;

    /// List all sinks the server currently reports
    fn sink_info_list(&self) -> Result<Vec<SinkInfo>, GatewayError>;

    /// List all loaded modules
    fn module_info_list(&self) -> Result<Vec<ModuleInfo>, GatewayError>;

    /// List all cards with their profiles
    fn card_info_list(&self) -> Result<Vec<CardInfo>, GatewayError>;

    /// Server-wide state, including default source and sink names
    fn server_info(&self) -> Result<ServerInfo, GatewayError>;

    /// Load a module, returning the index the server assigned it
    fn load_module(&self, name: &str, args: &[(&str, &str)]) -> Result<u32, GatewayError>;

    /// Unload the module with the given index
    fn unload_module(&self, index: u32) -> Result<(), GatewayError>;

    /// Make `name` the server's default source
    fn set_default_source(&self, name: &str) -> Result<(), GatewayError>;

    /// Switch a card's active profile
    fn set_card_profile(&self, card: &str, profile: &str) -> Result<(), GatewayError>;
}

/// Render module arguments into the server's `key=value` argument string
///
/// The same rendering is used by every `Gateway` implementation so that
/// argument strings written by one can be parsed back against another.
pub fn render_module_args(args: &[(&str, &str)]) -> String {
    args.iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_module_args() {
        let rendered = render_module_args(&[("source", "mic"), ("sink", "hdmi")]);
        assert_eq!(rendered, "source=mic sink=hdmi");
    }

    #[test]
    fn test_render_empty_args() {
        assert_eq!(render_module_args(&[]), "");
    }
}
