//! Shared error type across wsRelay crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type used by the core, broker, and client crates.
///
/// Dispatch misses and reply timeouts are deliberately *not* represented
/// here: an unknown message type is discarded, and a missing reply surfaces
/// to the caller as "no answer" (`Ok(None)`), never as an error.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection attempt did not complete. Not retried automatically.
    #[error("connect failed: {0}")]
    Connect(String),
    /// A received text frame does not decode into an envelope. The frame is
    /// dropped and the connection stays open.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    /// A reassembled logical message exceeded the configured cap. Fatal for
    /// the affected connection.
    #[error("message too large: {observed} bytes exceeds limit of {limit}")]
    MessageTooLarge { limit: usize, observed: usize },
    /// Read/write failure on an established connection.
    #[error("transport error: {0}")]
    Transport(String),
    /// Upgrade request arrived without `id`/`groupName` parameters.
    #[error("missing id/groupName route parameters")]
    MissingRouteParameters,
    /// Broker configuration failed to parse or validate.
    #[error("bad config: {0}")]
    BadConfig(String),
    /// Anything that indicates a bug rather than bad traffic.
    #[error("internal: {0}")]
    Internal(String),
}
