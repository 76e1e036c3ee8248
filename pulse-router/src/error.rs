use thiserror::Error;

pub use pulse_gateway::GatewayError;

/// Errors surfaced by the routing engine
///
/// Gateway failures are passed through unmodified; everything else is a
/// configuration or lifecycle problem detected before any server call.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("audio server error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("configuration is missing the virtual sink name")]
    MissingSinkName,

    #[error("refresh period must be a positive number of seconds")]
    InvalidRefresh,

    #[error("unknown property: {0}")]
    UnknownProperty(String),

    #[error("invalid value for property {name}: {reason}")]
    InvalidPropertyValue { name: String, reason: String },

    #[error("service is not started")]
    NotStarted,

    #[error("the audio server reports no default sink")]
    NoDefaultSink,

    #[error("failed to spawn the refresh scheduler: {0}")]
    Scheduler(String),
}
