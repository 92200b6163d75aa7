use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A conditional write was rejected because the caller's eTag is stale.
    #[error("etag mismatch for partition {partition_id}")]
    Conflict { partition_id: String },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;
