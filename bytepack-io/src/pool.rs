//! Buffer pools.
//!
//! The adapters never allocate scratch space directly; they rent it from a
//! [`BufferPool`] and hand it back when done.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::fmt;

/// Source of growable byte buffers.
pub trait BufferPool: Send + Sync + fmt::Debug {
    /// An empty buffer with at least `capacity` bytes of room.
    fn rent(&self, capacity: usize) -> BytesMut;

    /// A buffer with at least `capacity` bytes of room holding the contents
    /// of `buf`. The old buffer goes back to the pool.
    fn grow(&self, buf: BytesMut, capacity: usize) -> BytesMut {
        let mut bigger = self.rent(capacity.max(buf.len()));
        bigger.extend_from_slice(&buf);
        self.release(buf);
        bigger
    }

    /// Returns a buffer to the pool.
    fn release(&self, buf: BytesMut);
}

/// Allocates every buffer fresh and drops released ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapPool;

impl BufferPool for HeapPool {
    fn rent(&self, capacity: usize) -> BytesMut {
        BytesMut::with_capacity(capacity)
    }

    fn release(&self, _buf: BytesMut) {}
}

/// Retains released buffers for reuse, up to a count and size limit.
pub struct SharedPool {
    free: Mutex<Vec<BytesMut>>,
    max_retained: usize,
    max_buffer_size: usize,
}

impl SharedPool {
    /// Default number of buffers kept.
    pub const DEFAULT_RETAINED: usize = 16;

    pub fn new(max_retained: usize, max_buffer_size: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_retained)),
            max_retained,
            max_buffer_size,
        }
    }

    /// Number of idle buffers held.
    pub fn pooled(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for SharedPool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETAINED, crate::config::DEFAULT_MAX_BUFFER)
    }
}

impl BufferPool for SharedPool {
    fn rent(&self, capacity: usize) -> BytesMut {
        let mut free = self.free.lock();
        if let Some(pos) = free.iter().position(|b| b.capacity() >= capacity) {
            return free.swap_remove(pos);
        }
        drop(free);
        BytesMut::with_capacity(capacity)
    }

    fn release(&self, mut buf: BytesMut) {
        if buf.capacity() > self.max_buffer_size {
            tracing::warn!(
                "Dropping oversized buffer of {} bytes (pool limit {})",
                buf.capacity(),
                self.max_buffer_size
            );
            return;
        }
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }
}

impl fmt::Debug for SharedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPool")
            .field("pooled", &self.pooled())
            .field("max_retained", &self.max_retained)
            .field("max_buffer_size", &self.max_buffer_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_pool_reuses() {
        let pool = SharedPool::new(2, 1024);
        let buf = pool.rent(100);
        assert!(buf.capacity() >= 100);
        pool.release(buf);
        assert_eq!(pool.pooled(), 1);

        let again = pool.rent(50);
        assert!(again.is_empty());
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_oversized_buffer_dropped() {
        let pool = SharedPool::new(2, 64);
        pool.release(BytesMut::with_capacity(4096));
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_retention_limit() {
        let pool = SharedPool::new(1, 1024);
        pool.release(BytesMut::with_capacity(8));
        pool.release(BytesMut::with_capacity(8));
        assert_eq!(pool.pooled(), 1);
    }

    #[test]
    fn test_grow_keeps_contents() {
        let pool = SharedPool::default();
        let mut buf = pool.rent(4);
        buf.extend_from_slice(b"abcd");
        let grown = pool.grow(buf, 64);
        assert!(grown.capacity() >= 64);
        assert_eq!(&grown[..], b"abcd");
        assert_eq!(pool.pooled(), 1);
    }
}
