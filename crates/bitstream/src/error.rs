//! Error types for the bit codec

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("buffer underrun: needed {needed} bits, {available} available")]
    BufferUnderrun { needed: usize, available: usize },

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

impl CodecError {
    pub fn underrun(needed: usize, available: usize) -> Self {
        Self::BufferUnderrun { needed, available }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }
}
