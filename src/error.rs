use thiserror::Error;

/// Failures that abort a conversion request.
///
/// A missing card is not an error: detection returns `None` and callers
/// take the fallback path instead.
#[derive(Debug, Error)]
pub enum CardError {
    /// Input bytes could not be interpreted as an image
    #[error("could not read this image: {0}")]
    Decode(String),

    /// Malformed interactive-correction input
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Encoding a raster image failed
    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CardError>;
