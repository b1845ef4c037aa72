//! Adapter error types.

use bytepack_core::CodecError;
use thiserror::Error;

/// Errors raised while moving values through a stream or channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source closed in the middle of a value.
    #[error("unexpected end of stream: {needed} more bytes needed")]
    UnexpectedEof { needed: usize },

    #[error("buffer limit exceeded: {requested} bytes requested, limit is {limit}")]
    BufferLimit { requested: usize, limit: usize },

    #[error("channel closed")]
    Closed,
}

impl ChannelError {
    /// Returns whether the input ended before a value was complete.
    pub fn is_end_of_input(&self) -> bool {
        match self {
            ChannelError::UnexpectedEof { .. } => true,
            ChannelError::Codec(e) => e.is_end_of_input(),
            _ => false,
        }
    }
}
