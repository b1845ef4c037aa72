//! Blocking `std::io` adapters.

use crate::config::StreamConfig;
use crate::driver::{fill_chunk, Pull, ReadDriver};
use crate::error::ChannelError;
use crate::pool::{BufferPool, HeapPool};
use crate::scratch::ScratchBuffer;
use bytepack_core::{Codec, TypeRef, Value};
use bytes::BytesMut;
use std::io::{Read, Write};
use std::sync::Arc;

/// Encodes `value` to `writer` in chunks of about `config.chunk_size`
/// bytes. Returns the number of bytes written.
pub fn write_value<W: Write>(
    codec: &Codec,
    value: &Value,
    ty: &TypeRef,
    writer: &mut W,
    config: &StreamConfig,
) -> Result<usize, ChannelError> {
    let mut state = codec.writer(value, ty)?;
    let mut out = BytesMut::with_capacity(config.chunk_size);
    let mut window = config.chunk_size;
    let mut total = 0;
    loop {
        let done = fill_chunk(&mut state, &mut out, &mut window, config.max_buffer)?;
        writer.write_all(&out)?;
        total += out.len();
        if done {
            return Ok(total);
        }
    }
}

/// Decodes exactly one value from `reader`.
pub fn read_value<R: Read>(
    codec: &Codec,
    ty: &TypeRef,
    reader: R,
    config: &StreamConfig,
) -> Result<Value, ChannelError> {
    let mut values = ValueReader::new(reader, codec.clone(), ty.clone(), config);
    values.read()?.ok_or(ChannelError::UnexpectedEof { needed: 1 })
}

/// Reads a sequence of values of one type from a blocking reader.
pub struct ValueReader<R> {
    inner: R,
    driver: ReadDriver,
    scratch: ScratchBuffer,
    chunk_size: usize,
}

impl<R: Read> ValueReader<R> {
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
    pub fn read(&mut self) -> Result<Option<Value>, ChannelError> {
        let mut needed = 0;
        loop {
            if !self.scratch.is_empty() || needed > 0 {
                match self.driver.advance(&mut self.scratch)? {
                    Pull::Value(value) => return Ok(Some(value)),
                    Pull::Need(n) => needed = n,
                }
            }
            let n = self
                .scratch
                .read_from(&mut self.inner, needed.max(self.chunk_size))?;
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

impl<R: Read> Iterator for ValueReader<R> {
    type Item = Result<Value, ChannelError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Writes values of one type to a blocking writer.
pub struct ValueWriter<W> {
    inner: W,
    codec: Codec,
    ty: TypeRef,
    config: StreamConfig,
    written: u64,
}

impl<W: Write> ValueWriter<W> {
    pub fn new(inner: W, codec: Codec, ty: TypeRef, config: &StreamConfig) -> Self {
        Self {
            inner,
            codec,
            ty,
            config: *config,
            written: 0,
        }
    }

    pub fn write(&mut self, value: &Value) -> Result<usize, ChannelError> {
        let n = write_value(&self.codec, value, &self.ty, &mut self.inner, &self.config)?;
        self.written += n as u64;
        Ok(n)
    }

    pub fn flush(&mut self) -> Result<(), ChannelError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Total bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytepack_core::{Options, PrimitiveKind, Record, TypeDescriptor, TypeRegistry};
    use std::io::Cursor;

    fn setup() -> (Codec, TypeRef) {
        let types = TypeRegistry::new();
        let event = TypeDescriptor::object("Event")
            .member("seq", TypeDescriptor::primitive(PrimitiveKind::U64))
            .member("body", TypeDescriptor::string())
            .build();
        types.register(event.clone());
        (Codec::with_types(Arc::new(types), Options::default()), event)
    }

    fn event(seq: u64, body: &str) -> Value {
        Value::Record(Record::new("Event").with("seq", seq).with("body", body))
    }

    #[test]
    fn test_write_then_read_many() {
        let (codec, ty) = setup();
        let config = StreamConfig::new().with_chunk_size(64);
        let mut writer = ValueWriter::new(Vec::new(), codec.clone(), ty.clone(), &config);
        let events: Vec<Value> = (0..20).map(|i| event(i, &"z".repeat(i as usize * 7))).collect();
        for e in &events {
            writer.write(e).unwrap();
        }
        let bytes = writer.into_inner();

        let reader = ValueReader::new(Cursor::new(bytes), codec, ty, &config);
        let decoded: Vec<Value> = reader.map(Result::unwrap).collect();
        assert_eq!(decoded, events);
    }

    #[test]
    fn test_read_value_truncated() {
        let (codec, ty) = setup();
        let bytes = codec.encode(&event(1, "hello"), &ty).unwrap();
        let config = StreamConfig::default();
        let err = read_value(&codec, &ty, &bytes[..bytes.len() - 3], &config).unwrap_err();
        assert!(err.is_end_of_input());
    }

    #[test]
    fn test_read_value_empty_source() {
        let (codec, ty) = setup();
        let err = read_value(&codec, &ty, std::io::empty(), &StreamConfig::default()).unwrap_err();
        assert!(matches!(err, ChannelError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_write_value_counts_bytes() {
        let (codec, ty) = setup();
        let value = event(9, "counted");
        let mut out = Vec::new();
        let n = write_value(&codec, &value, &ty, &mut out, &StreamConfig::default()).unwrap();
        assert_eq!(n, out.len());
        assert_eq!(out, codec.encode(&value, &ty).unwrap().as_ref());
    }
}
