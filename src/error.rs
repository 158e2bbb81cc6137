use thiserror::Error;

/// Errors that can occur while running a bus endpoint.
///
/// The variants mirror the failure boundaries of the endpoint:
/// connect and subscribe failures are fatal to startup, decode failures
/// affect a single message and are recovered by the request-reply layer,
/// and drain/close failures are surfaced from [`stop()`](crate::Endpoint::stop)
/// so callers can produce a correct process exit code.
#[derive(Error, Debug)]
pub enum Error {
    /// Connecting to the broker failed after exhausting the retry budget
    #[error("connect failed after {attempts} attempt(s): {reason}")]
    Connect { attempts: u32, reason: String },

    /// A single connect attempt exceeded the configured timeout
    #[error("connect attempt timed out")]
    ConnectTimeout,

    /// Registering a subscription failed during startup
    #[error("subscribe failed for pattern \"{pattern}\": {reason}")]
    Subscribe { pattern: String, reason: String },

    /// Message payload is not valid text
    #[error("payload is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// Operation attempted on a connection that is draining or closed
    #[error("connection is closed")]
    ConnectionClosed,

    /// Broker client error surfaced by a connection backend
    #[error("transport error: {0}")]
    Transport(String),

    /// Draining in-flight work during shutdown failed
    #[error("drain failed: {0}")]
    Drain(String),

    /// Releasing the connection during shutdown failed
    #[error("close failed: {0}")]
    Close(String),

    /// `stop()` was called on an endpoint that was never started
    #[error("endpoint has not been started")]
    NotStarted,

    /// `start()` was called on an endpoint that is already running
    #[error("endpoint is already started")]
    AlreadyStarted,

    /// A dispatcher task panicked while being joined during shutdown
    #[error("dispatcher task panicked: {0}")]
    TaskPanicked(String),
}

/// Result type alias for endpoint operations
pub type Result<T> = std::result::Result<T, Error>;
