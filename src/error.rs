use thiserror::Error;

/// Error type for the drone control core.
#[derive(Debug, Error)]
pub enum DroneError {
    /// Endpoint string is not a well-formed IPv4 dotted quad
    #[error("invalid drone address: {0}")]
    InvalidAddress(String),

    /// Socket setup failure, fatal to the connect attempt
    #[error("connection failed: {0}")]
    Connection(String),

    /// Unknown configuration key or value
    #[error("unsupported configuration key: {0}")]
    UnsupportedConfig(String),

    /// Telemetry payload too short or structurally inconsistent
    #[error("malformed navdata packet: {0}")]
    MalformedPacket(String),

    /// Operation called in a state that cannot honor it
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// I/O errors on an established socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the drone control core.
pub type Result<T> = std::result::Result<T, DroneError>;
