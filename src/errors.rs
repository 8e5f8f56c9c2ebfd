//! Error types shared by the season-goals pipeline stages.

use thiserror::Error;

/// Result type for pipeline components.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// An input line could not be turned into observations.
    ///
    /// Recovered by the map stage: the line is logged and skipped.
    #[error("malformed record: {reason}")]
    RecordParse { reason: String },

    /// A key reached the reducer without a single observation.
    #[error("no observations for key `{key}`, cannot compute an average")]
    DivisionByZero { key: String },

    /// A key or value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn record_parse(reason: impl Into<String>) -> Self {
        Self::RecordParse {
            reason: reason.into(),
        }
    }

    pub fn serialization<E: std::fmt::Display>(err: E) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
