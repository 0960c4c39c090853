use thiserror::Error;

/// Errors that can occur when using the Channels client.
#[derive(Error, Debug)]
pub enum PusherError {
    /// Inbound frame could not be turned into an event (not an object, missing `event`)
    #[error("Malformed frame: {0}")]
    Construction(String),

    /// Authorizer refused or failed to authorize a private/presence/encrypted channel
    #[error("Authorization failed for channel '{channel}': {message}")]
    Authorization { channel: String, message: String },

    /// Payload on an encrypted channel could not be decrypted
    #[error("Decryption error: {0}")]
    Decryption(#[from] DecryptionError),

    /// Transport could not be opened or failed while in use
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error reported by the broker (`pusher:error`)
    #[error("Protocol error {code:?}: {message}")]
    Protocol { code: Option<u32>, message: String },

    /// Channel name rejected before any frame was sent
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    /// Client event rejected before any frame was sent
    #[error("Client event rejected: {0}")]
    ClientEvent(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// WebSocket protocol error (connection failed, invalid frame, etc.)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error (used by the HTTP authorizer)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error (malformed endpoint URL)
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Operation timed out
    #[error("Timeout error")]
    Timeout,

    /// Attempted operation while not connected to the broker
    #[error("Not connected")]
    NotConnected,
}

/// Failures of the encryption module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    /// No shared secret is registered for the channel
    #[error("no key registered for channel '{0}'")]
    KeyNotFound(String),

    /// Integrity check failed (wrong or stale key, tampered payload)
    #[error("authentication failed for channel '{0}'")]
    AuthenticationFailed(String),

    /// Data is not a `{nonce, ciphertext}` object or does not decode
    #[error("malformed encrypted payload: {0}")]
    MalformedPayload(String),

    /// Shared secret is not base64 of exactly 32 bytes
    #[error("invalid shared secret: {0}")]
    InvalidKey(String),
}

/// Convenience type alias for `Result<T, PusherError>`.
pub type Result<T> = std::result::Result<T, PusherError>;
