//! Error definitions shared by the bridge core.

use thiserror::Error;

/// Errors raised by discovery, the wizard driver and the runtime subscriber.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The broker could not be reached.
    ///
    /// Kept apart from an empty discovery result so callers can offer a retry
    /// instead of falling through to manual entry.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker accepted the connection but refused a subscription.
    #[error("Subscribe failed for {filter}: {reason}")]
    SubscribeFailed { filter: String, reason: String },

    /// A subscription stream ended while a collection window was still open.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// The collection window was cancelled by the caller.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// An input was handed to the wizard in a state that does not accept it.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
