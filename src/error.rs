use thiserror::Error;

/// All errors generated in `market-stream`.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum StreamError {
    /// A single malformed inbound frame. Logged and skipped by the session
    /// loop; never affects connection state.
    #[error("failed to parse inbound frame: {0}")]
    Parse(String),

    /// Socket-level failure. Drives the session reconnection policy.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Automatic recovery gave up. The session parks in `SessionState::Error`
    /// until an explicit `reconnect()` resets the attempt counter.
    #[error("reconnection attempts exhausted after {attempts} consecutive failures")]
    ExhaustedRetries { attempts: u32 },

    /// Invalid symbol, interval, or symbol set at subscribe time. Rejected
    /// synchronously; no session is created.
    #[error("invalid subscription configuration: {0}")]
    Configuration(String),
}

impl StreamError {
    /// Determine if an error ends automatic recovery and requires an explicit
    /// `reconnect()` call.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamError::ExhaustedRetries { .. })
    }
}
