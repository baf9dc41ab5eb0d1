use thiserror::Error;

#[derive(Error, Debug)]
pub enum PicdexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Inspector error: {0}")]
    Inspector(String),

    #[error("Resize error: {0}")]
    Resize(String),

    #[error("Unexpected http status ({0})")]
    UnexpectedStatus(u16),

    #[error("Browsing error: {0}")]
    Browse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PicdexerError>;
