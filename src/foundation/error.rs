/// Convenience result type used across sortlast.
pub type SortLastResult<T> = Result<T, SortLastError>;

/// Top-level error taxonomy used by the compositing and broadcast APIs.
///
/// Every variant is fatal to the operation that produced it. Nothing in this crate retries.
#[derive(thiserror::Error, Debug)]
pub enum SortLastError {
    /// The caller built an unusable configuration (no images, no transport for a collective
    /// mode, out-of-range destination rank, zero chunk size).
    #[error("configuration error: {0}")]
    Config(String),

    /// Image or buffer data does not satisfy the compositing contract.
    #[error("validation error: {0}")]
    Validation(String),

    /// A peer endpoint went away or a message had an unexpected shape.
    #[error("transport error: {0}")]
    Transport(String),

    /// Errors when serializing or deserializing control messages.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SortLastError {
    /// Build a [`SortLastError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`SortLastError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`SortLastError::Transport`] value.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Build a [`SortLastError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
