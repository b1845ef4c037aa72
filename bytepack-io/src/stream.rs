//! Async adapters over tokio streams and channels.

use crate::config::StreamConfig;
use crate::driver::{fill_chunk, Pull, ReadDriver};
use crate::error::ChannelError;
use crate::pool::{BufferPool, HeapPool};
use crate::scratch::ScratchBuffer;
use bytepack_core::{Codec, TypeRef, Value};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Reads a sequence of values of one type from an async reader.
pub struct AsyncValueReader<R> {
    inner: R,
    driver: ReadDriver,
    scratch: ScratchBuffer,
    chunk_size: usize,
}

impl<R: AsyncRead + Unpin> AsyncValueReader<R> {
    pub fn new(inner: R, codec: Codec, ty: TypeRef, config: &StreamConfig) -> Self {
        Self::with_pool(inner, codec, ty, config, Arc::new(HeapPool))
    }

    pub fn with_pool(
        inner: R,
        codec: Codec,
        ty: TypeRef,
        config: &StreamConfig,
        pool: Arc<dyn BufferPool>,
    ) -> Self {
        Self {
            inner,
            driver: ReadDriver::new(codec, ty),
            scratch: ScratchBuffer::new(pool, config),
            chunk_size: config.chunk_size,
        }
    }

    /// Next value, or `None` if the reader ended cleanly between values.
    pub async fn read(&mut self) -> Result<Option<Value>, ChannelError> {
        let mut needed = 0;
        loop {
            if !self.scratch.is_empty() {
                match self.driver.advance(&mut self.scratch)? {
                    Pull::Value(value) => return Ok(Some(value)),
                    Pull::Need(n) => needed = n,
                }
            }
            let n = self
                .scratch
                .read_from_async(&mut self.inner, needed.max(self.chunk_size))
                .await?;
            tracing::trace!("Read {} bytes, {} buffered", n, self.scratch.len());
            if n == 0 {
                self.driver.end(&self.scratch, needed)?;
                return Ok(None);
            }
            needed = 0;
        }
    }

    /// Bytes read from the source but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.scratch.len()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes values of one type to an async writer.
pub struct AsyncValueWriter<W> {
    inner: W,
    codec: Codec,
    ty: TypeRef,
    config: StreamConfig,
    out: BytesMut,
}

impl<W: AsyncWrite + Unpin> AsyncValueWriter<W> {
    pub fn new(inner: W, codec: Codec, ty: TypeRef, config: &StreamConfig) -> Self {
        Self {
            inner,
            codec,
            ty,
            config: *config,
            out: BytesMut::with_capacity(config.chunk_size),
        }
    }

    /// Encodes `value` and writes it chunk by chunk.
    pub async fn write(&mut self, value: &Value) -> Result<usize, ChannelError> {
        let mut state = self.codec.writer(value, &self.ty)?;
        let mut window = self.config.chunk_size;
        let mut total = 0;
        loop {
            let done = fill_chunk(&mut state, &mut self.out, &mut window, self.config.max_buffer)?;
            self.inner.write_all(&self.out).await?;
            total += self.out.len();
            if done {
                return Ok(total);
            }
        }
    }

    pub async fn flush(&mut self) -> Result<(), ChannelError> {
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Sends the encoding of `value` over a channel as a series of chunks.
/// Returns the number of chunks sent.
pub async fn send_value(
    codec: &Codec,
    value: &Value,
    ty: &TypeRef,
    tx: &mpsc::Sender<Bytes>,
    config: &StreamConfig,
) -> Result<usize, ChannelError> {
    let mut state = codec.writer(value, ty)?;
    let mut out = BytesMut::with_capacity(config.chunk_size);
    let mut window = config.chunk_size;
    let mut chunks = 0;
    loop {
        let done = fill_chunk(&mut state, &mut out, &mut window, config.max_buffer)?;
        if !out.is_empty() {
            let chunk = out.split().freeze();
            tx.send(chunk).await.map_err(|_| ChannelError::Closed)?;
            chunks += 1;
        }
        if done {
            return Ok(chunks);
        }
    }
}

/// Receives one value from a channel of chunks. Bytes received past the end
/// of the value are returned alongside it.
pub async fn recv_value(
    codec: &Codec,
    ty: &TypeRef,
    rx: &mut mpsc::Receiver<Bytes>,
    config: &StreamConfig,
) -> Result<(Value, Bytes), ChannelError> {
    let mut driver = ReadDriver::new(codec.clone(), ty.clone());
    let mut scratch = ScratchBuffer::new(Arc::new(HeapPool), config);
    let mut needed = 0;
    loop {
        let Some(chunk) = rx.recv().await else {
            driver.end(&scratch, needed)?;
            return Err(ChannelError::UnexpectedEof { needed: needed.max(1) });
        };
        scratch.extend_from_slice(&chunk)?;
        match driver.advance(&mut scratch)? {
            Pull::Value(value) => {
                let rest = Bytes::copy_from_slice(scratch.unread());
                return Ok((value, rest));
            }
            Pull::Need(n) => needed = n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytepack_core::{Options, PrimitiveKind, TypeDescriptor};

    fn codec() -> Codec {
        Codec::new(Options::default())
    }

    fn ty() -> TypeRef {
        TypeDescriptor::list(TypeDescriptor::primitive(PrimitiveKind::I32))
    }

    fn numbers(n: i32) -> Value {
        Value::List((0..n).map(Value::I32).collect())
    }

    #[tokio::test]
    async fn test_duplex_round_trip() {
        let (client, server) = tokio::io::duplex(64);
        let config = StreamConfig::new().with_chunk_size(64);

        let writer_task = tokio::spawn(async move {
            let mut writer = AsyncValueWriter::new(client, codec(), ty(), &config);
            for n in [0, 5, 100] {
                writer.write(&numbers(n)).await.unwrap();
            }
            writer.shutdown().await.unwrap();
        });

        let mut reader = AsyncValueReader::new(server, codec(), ty(), &config);
        for n in [0, 5, 100] {
            assert_eq!(reader.read().await.unwrap(), Some(numbers(n)));
        }
        assert_eq!(reader.read().await.unwrap(), None);
        writer_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_round_trip() {
        let (tx, mut rx) = mpsc::channel(4);
        let config = StreamConfig::new().with_chunk_size(64);
        let value = numbers(50);

        let sent = value.clone();
        let sender = tokio::spawn(async move {
            send_value(&codec(), &sent, &ty(), &tx, &config).await.unwrap()
        });
        let (received, rest) = recv_value(&codec(), &ty(), &mut rx, &config).await.unwrap();
        assert_eq!(received, value);
        assert!(rest.is_empty());
        assert!(sender.await.unwrap() > 1);
    }

    #[tokio::test]
    async fn test_channel_closed_mid_value() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.send(Bytes::from_static(&[1, 3, 0, 0, 0, 7])).await.unwrap();
        drop(tx);
        let err = recv_value(&codec(), &ty(), &mut rx, &StreamConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_end_of_input());
    }

    #[test]
    fn test_reader_with_mock_stream() {
        let bytes = codec().encode(&numbers(3), &ty()).unwrap();
        let (head, tail) = bytes.split_at(4);
        let mock = tokio_test::io::Builder::new().read(head).read(tail).build();
        let mut reader = AsyncValueReader::new(mock, codec(), ty(), &StreamConfig::default());
        let value = tokio_test::block_on(reader.read()).unwrap();
        assert_eq!(value, Some(numbers(3)));
    }
}
