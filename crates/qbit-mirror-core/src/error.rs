use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Other(String),
}

/// Failures talking to a qBittorrent WebUI endpoint.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} answered {status} for {path}")]
    Status {
        endpoint: String,
        path: String,
        status: u16,
    },

    #[error("{0} rejected the login credentials")]
    AuthRejected(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
