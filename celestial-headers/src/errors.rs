#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("Extension not found: {0}")]
    ExtensionNotFound(String),

    #[error("Invalid header file: {0}")]
    InvalidFormat(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HeaderError>;

impl From<tempfile::PersistError> for HeaderError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}
