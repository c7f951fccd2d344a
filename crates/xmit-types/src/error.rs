use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, XmitError>;

#[derive(Debug, Error)]
pub enum XmitError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error("reading '{}': {source}", path.display())]
    Ingest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path traversal detected: {name:?} escapes the destination")]
    PathTraversal { name: String },

    #[error("encoding request: {0}")]
    Encode(String),

    #[error("decoding response: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("server rejected the request: {}", .0.join("; "))]
    Server(Vec<String>),

    #[error("{0}")]
    Other(String),
}
