//! Error types for ChronoSync core.

use thiserror::Error;

/// Core errors raised by names, codecs and signatures.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid name component: {0}")]
    InvalidComponent(String),

    #[error("component is not a sequence number")]
    NotSequenceNumber,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("response is not signed")]
    MissingSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Errors reported by a transport when sending on a channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The channel that delivered the request is gone.
    #[error("channel {0} is closed")]
    ChannelClosed(u64),

    /// The underlying link refused the packet.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Prefix registration was refused.
    #[error("prefix registration failed: {0}")]
    RegistrationFailed(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
