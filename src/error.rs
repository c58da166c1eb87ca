use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error for key {key}: {source}")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token expired")]
    TokenExpired,

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transfer failed for {path}: {source}")]
    Transfer {
        path: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps an error with the file path the transfer was working on.
    pub fn transfer(path: impl Into<String>, source: Error) -> Self {
        Error::Transfer {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Wraps an io error with the blob-store key it occurred on.
    pub fn storage(key: impl Into<String>, source: std::io::Error) -> Self {
        Error::Storage {
            key: key.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
