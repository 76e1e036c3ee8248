//! Error types for the PulseAudio gateway

use thiserror::Error;

/// Errors that can occur while talking to the audio server
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Could not establish or keep a connection to the server
    #[error("failed to connect to the audio server: {0}")]
    Connect(String),

    /// A server operation failed or was refused
    #[error("audio server call failed: {0}")]
    Call(String),

    /// The backend worker thread is gone; the client must be rebuilt
    #[error("audio server worker disconnected")]
    Disconnected,
}
