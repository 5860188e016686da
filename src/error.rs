/// Error types for RAW conversion.

use thiserror::Error;

/// Every way a conversion can fail.
///
/// All variants are fatal for the current call. Input and calibration errors
/// are raised before any GPU work is submitted; GPU errors are raised before
/// the destination bitmap is written.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No such illuminant for reference illuminant {slot}: {code}")]
    UnknownIlluminant { slot: u8, code: u16 },

    #[error("Cannot invert {0}, input matrices are invalid")]
    SingularMatrix(&'static str),

    #[error("GPU error: {0}")]
    Gpu(String),
}

impl ConvertError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;
