//! # bytepack-io
//!
//! Feeds the bytepack engines from in-memory blocks, blocking `std::io`
//! streams and asynchronous tokio streams or channels.
//!
//! The engines only ever ask for "at least N more bytes" or "a window of at
//! least N bytes". This crate answers those requests with a pooled
//! [`ScratchBuffer`] that compacts unread residue to its front before growing.

pub mod blocking;
pub mod config;
mod driver;
pub mod error;
pub mod pool;
pub mod scratch;
pub mod stream;

pub use blocking::{read_value, write_value, ValueReader, ValueWriter};
pub use config::StreamConfig;
pub use error::ChannelError;
pub use pool::{BufferPool, HeapPool, SharedPool};
pub use scratch::ScratchBuffer;
pub use stream::{recv_value, send_value, AsyncValueReader, AsyncValueWriter};
