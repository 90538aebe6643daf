use celestial_headers::HeaderError;
use thiserror::Error;

pub type WcsResult<T> = Result<T, WcsError>;

#[derive(Debug, Error)]
pub enum WcsError {
    #[error("Invalid argument: {message}")]
    Argument { message: String },

    #[error("WCS key '{key}' is already in use in extension {extension}")]
    KeyCollision { key: char, extension: String },

    #[error("WCS key '{key}' not found in extension {extension}")]
    KeyNotFound { key: char, extension: String },

    #[error("No free WCS key left in extension {extension}")]
    KeyExhausted { extension: String },

    #[error("Extension {extension} has neither HDRNAME nor WCSNAME and no name was given")]
    MissingName { extension: String },

    #[error("Distortion model mismatch: {message}")]
    ModelMismatch { message: String },

    #[error("Missing required WCS keyword: {keyword}")]
    MissingKeyword { keyword: String },

    #[error("Invalid WCS keyword '{keyword}': {message}")]
    InvalidKeyword { keyword: String, message: String },

    #[error("Non-invertible matrix (determinant = {determinant})")]
    NonInvertibleMatrix { determinant: f64 },

    #[error("Header error: {0}")]
    Header(HeaderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<HeaderError> for WcsError {
    fn from(err: HeaderError) -> Self {
        match err {
            HeaderError::Io(io) => Self::Io(io),
            other => Self::Header(other),
        }
    }
}

impl WcsError {
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }

    pub fn key_collision(key: char, extension: impl Into<String>) -> Self {
        Self::KeyCollision {
            key,
            extension: extension.into(),
        }
    }

    pub fn key_not_found(key: char, extension: impl Into<String>) -> Self {
        Self::KeyNotFound {
            key,
            extension: extension.into(),
        }
    }

    pub fn key_exhausted(extension: impl Into<String>) -> Self {
        Self::KeyExhausted {
            extension: extension.into(),
        }
    }

    pub fn missing_name(extension: impl Into<String>) -> Self {
        Self::MissingName {
            extension: extension.into(),
        }
    }

    pub fn model_mismatch(message: impl Into<String>) -> Self {
        Self::ModelMismatch {
            message: message.into(),
        }
    }

    pub fn missing_keyword(keyword: impl Into<String>) -> Self {
        Self::MissingKeyword {
            keyword: keyword.into(),
        }
    }

    pub fn invalid_keyword(keyword: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidKeyword {
            keyword: keyword.into(),
            message: message.into(),
        }
    }

    pub fn non_invertible_matrix(determinant: f64) -> Self {
        Self::NonInvertibleMatrix { determinant }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
