//! Scratch buffer with residue compaction.

use crate::config::StreamConfig;
use crate::error::ChannelError;
use crate::pool::BufferPool;
use bytes::BytesMut;
use std::io::Read;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Input window for the read engine.
///
/// Bytes in `[start, len)` are unread. Consumed bytes are not discarded until
/// the buffer needs room, at which point the unread residue is moved to the
/// front. The buffer only grows when the residue plus the requested room does
/// not fit its current capacity.
#[derive(Debug)]
pub struct ScratchBuffer {
    pool: Arc<dyn BufferPool>,
    buf: BytesMut,
    start: usize,
    max_size: usize,
}

impl ScratchBuffer {
    pub fn new(pool: Arc<dyn BufferPool>, config: &StreamConfig) -> Self {
        let buf = pool.rent(config.chunk_size);
        Self {
            pool,
            buf,
            start: 0,
            max_size: config.max_buffer,
        }
    }

    /// Bytes received but not yet consumed.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Marks `n` unread bytes as consumed.
    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.buf.len());
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        }
    }

    /// Moves the unread residue to the front of the buffer.
    pub fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        let residue = self.len();
        self.buf.copy_within(self.start.., 0);
        self.buf.truncate(residue);
        tracing::debug!(
            "Compacted scratch buffer: {} residue bytes moved, {} reclaimed",
            residue,
            self.start
        );
        self.start = 0;
    }

    /// Ensures room for `additional` more bytes after the unread residue.
    pub fn reserve(&mut self, additional: usize) -> Result<(), ChannelError> {
        if self.buf.capacity() - self.buf.len() >= additional {
            return Ok(());
        }
        self.compact();
        let required = self.buf.len() + additional;
        if self.buf.capacity() >= required {
            return Ok(());
        }
        if required > self.max_size {
            return Err(ChannelError::BufferLimit {
                requested: required,
                limit: self.max_size,
            });
        }
        let target = (self.buf.capacity() * 2).clamp(required, self.max_size);
        tracing::debug!(
            "Growing scratch buffer from {} to {} bytes",
            self.buf.capacity(),
            target
        );
        let old = std::mem::take(&mut self.buf);
        self.buf = self.pool.grow(old, target);
        Ok(())
    }

    /// Appends bytes after the residue.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.reserve(data.len())?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Reads at most `max` bytes from `reader`. Returns 0 at end of stream.
    pub fn read_from<R: Read>(&mut self, reader: &mut R, max: usize) -> Result<usize, ChannelError> {
        self.reserve(max)?;
        let filled = self.buf.len();
        self.buf.resize(filled + max, 0);
        let result = reader.read(&mut self.buf[filled..]);
        let n = *result.as_ref().unwrap_or(&0);
        self.buf.truncate(filled + n);
        Ok(result?)
    }

    /// Async counterpart of [`read_from`](Self::read_from).
    pub async fn read_from_async<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
        max: usize,
    ) -> Result<usize, ChannelError> {
        self.reserve(max)?;
        let filled = self.buf.len();
        self.buf.resize(filled + max, 0);
        let result = reader.read(&mut self.buf[filled..]).await;
        let n = *result.as_ref().unwrap_or(&0);
        self.buf.truncate(filled + n);
        Ok(result?)
    }

    /// Drops all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.start = 0;
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}
