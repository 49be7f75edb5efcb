//! Error types for NetraIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// NetraIO error types
///
/// Socket faults on the video transports are not errors: `send` reports them
/// as [`crate::streaming::SendOutcome::ReconnectRequired`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JPEG encode/decode or image file error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Camera device could not be opened or read
    #[error("Camera error: {0}")]
    Camera(String),

    /// Configuration could not be parsed or failed validation
    #[error("Config error: {0}")]
    Config(String),

    /// None of the configured serial ports could be opened
    #[error("No serial port available (tried: {0})")]
    NoSerialPort(String),

    /// Task binding names a detector that is not registered
    #[error("Unknown detector: {0}")]
    UnknownDetector(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
