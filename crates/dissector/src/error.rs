//! Dissection error taxonomy
//!
//! Severity contract: a `BufferUnderrun` abandons the current frame and
//! nothing else; a `Schema` failure discards the frame because the bit
//! cursor can no longer be trusted; an `UnrecognizedPacketType` reports the
//! frame undecoded from that point on. None of them terminate a conversation
//! or the capture session.

use rakscope_bitstream::CodecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DissectError {
    #[error("unrecognized packet type {0:#04x}")]
    UnrecognizedPacketType(u8),

    #[error("schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type DissectResult<T> = std::result::Result<T, DissectError>;

impl DissectError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// True when abandoning the current frame fully recovers the stream
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Codec(CodecError::BufferUnderrun { .. }))
    }
}
