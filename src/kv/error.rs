use thiserror::Error;

/// Errors from the byte-level store.
#[derive(Error, Debug)]
pub enum KVError {
    /// Backend failed to read or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored bytes are not what the reader expected.
    #[error("serialization error: {0}")]
    Serialization(String),
}
