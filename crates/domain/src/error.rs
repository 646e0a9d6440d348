/// Shared error type used across all watchdeck crates.
///
/// Policy denials are NOT errors; the engine returns them as `Decision`
/// values. This enum covers everything that genuinely fails: bad payloads,
/// missing rows, storage problems, transport problems, and invalid Standing
/// Orders documents.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("integrity: {0}")]
    Integrity(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("Standing Orders invalid: {0}")]
    Policy(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a user-facing payload validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}
