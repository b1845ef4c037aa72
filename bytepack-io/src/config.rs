//! Stream adapter configuration.

use serde::{Deserialize, Serialize};

/// Default chunk size for reads and writes (8 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = bytepack_core::DEFAULT_CHUNK_SIZE;

/// Minimum chunk size (64 bytes).
pub const MIN_CHUNK_SIZE: usize = 64;

/// Maximum chunk size (1 MiB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Default upper bound for a scratch buffer (16 MiB).
pub const DEFAULT_MAX_BUFFER: usize = 16 * 1024 * 1024;

/// Buffer sizing for the stream adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Bytes requested from the source per read, and the normal size of an
    /// output chunk.
    pub chunk_size: usize,
    /// Largest scratch buffer a single token may force.
    pub max_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self.max_buffer = self.max_buffer.max(self.chunk_size);
        self
    }

    /// Sets the buffer limit; never below the chunk size.
    pub fn with_max_buffer(mut self, size: usize) -> Self {
        self.max_buffer = size.max(self.chunk_size);
        self
    }

    /// Re-applies the bounds, e.g. after deserializing.
    pub fn normalized(self) -> Self {
        let max_buffer = self.max_buffer;
        Self::default()
            .with_chunk_size(self.chunk_size)
            .with_max_buffer(max_buffer)
    }
}
