use thiserror::Error;

/// Errors raised by the room and ledger stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The caller has no identity and the operation requires one.
    #[error("Unauthorised")]
    Unauthorised,

    #[error("ledger entry not found: '{0}'")]
    UnknownEntry(String),

    #[error("store io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

impl StoreError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
