//! Encode/decode entry points.
//!
//! [`Codec`] handles whole values held in one block. [`Encoder`] and
//! [`Decoder`] drive the engines incrementally for chunked output and input.

use crate::converter::Converter;
use crate::descriptor::TypeRef;
use crate::error::CodecError;
use crate::frame::Progress;
use crate::options::Options;
use crate::read::ReadState;
use crate::registry::ConverterRegistry;
use crate::types::TypeRegistry;
use crate::value::Value;
use crate::wire::{ReadCursor, WriteCursor};
use crate::write::WriteState;
use crate::DEFAULT_CHUNK_SIZE;
use bytes::{Buf, Bytes, BytesMut};
use std::sync::Arc;

/// Options plus the type and converter registries they are applied with.
#[derive(Debug, Clone)]
pub struct Codec {
    options: Options,
    types: Arc<TypeRegistry>,
    converters: Arc<ConverterRegistry>,
}

impl Codec {
    /// Creates a codec with a fresh type registry holding only built-in types.
    pub fn new(options: Options) -> Self {
        Self::with_types(Arc::new(TypeRegistry::new()), options)
    }

    pub fn with_types(types: Arc<TypeRegistry>, options: Options) -> Self {
        let converters = Arc::new(ConverterRegistry::new(types.clone()));
        Self {
            options,
            types,
            converters,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    /// Converter for `ty` under this codec's member layout.
    pub fn converter(&self, ty: &TypeRef) -> Result<Arc<Converter>, CodecError> {
        self.converters.resolve(ty, self.options.member_layout())
    }

    fn converter_pair(&self, memory: &TypeRef, wire: &TypeRef) -> Result<Arc<Converter>, CodecError> {
        self.converters
            .resolve_pair(memory, wire, self.options.member_layout())
    }

    /// Encodes `value` of type `ty` into a single block.
    pub fn encode(&self, value: &Value, ty: &TypeRef) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        self.encode_into(value, ty, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Encodes a value held as `memory` in the layout of `wire`.
    pub fn encode_as(
        &self,
        value: &Value,
        memory: &TypeRef,
        wire: &TypeRef,
    ) -> Result<Bytes, CodecError> {
        let converter = self.converter_pair(memory, wire)?;
        let mut buf = BytesMut::new();
        self.run_writer(converter, value, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Appends the encoding of `value` to `buf`.
    pub fn encode_into(
        &self,
        value: &Value,
        ty: &TypeRef,
        buf: &mut BytesMut,
    ) -> Result<(), CodecError> {
        let converter = self.converter(ty)?;
        self.run_writer(converter, value, buf)
    }

    fn run_writer(
        &self,
        converter: Arc<Converter>,
        value: &Value,
        buf: &mut BytesMut,
    ) -> Result<(), CodecError> {
        let mut state = WriteState::new(converter, value, self.options.clone(), self.converters.clone())?;
        let mut out = WriteCursor::unbounded(buf);
        match state.resume(&mut out)? {
            Progress::Completed => Ok(()),
            // An unbounded window never suspends.
            _ => Err(CodecError::NotFinished),
        }
    }

    /// Decodes one value of type `ty` from `bytes`. Trailing bytes are
    /// ignored.
    ///
    /// A member unknown to `ty` can only be skipped when its shape is known:
    /// with type names enabled, or when `ty` declares it as ignored. Name
    /// mode alone does not carry value shapes, so decoding a newer payload
    /// fails with [`CodecError::UnknownMember`]; use
    /// [`decode_as`](Self::decode_as) with the sender's type instead.
    pub fn decode(&self, bytes: &[u8], ty: &TypeRef) -> Result<Value, CodecError> {
        self.decode_prefix(bytes, ty).map(|(value, _)| value)
    }

    /// Decodes bytes written as `wire` into a value of `memory`. Wire
    /// members without a memory counterpart are drained.
    pub fn decode_as(
        &self,
        bytes: &[u8],
        wire: &TypeRef,
        memory: &TypeRef,
    ) -> Result<Value, CodecError> {
        let converter = self.converter_pair(memory, wire)?;
        self.run_reader(converter, bytes).map(|(value, _)| value)
    }

    /// Decodes one value and reports how many bytes it occupied.
    pub fn decode_prefix(&self, bytes: &[u8], ty: &TypeRef) -> Result<(Value, usize), CodecError> {
        let converter = self.converter(ty)?;
        self.run_reader(converter, bytes)
    }

    fn run_reader(
        &self,
        converter: Arc<Converter>,
        bytes: &[u8],
    ) -> Result<(Value, usize), CodecError> {
        let mut state = ReadState::new(converter, self.options.clone(), self.converters.clone())?;
        let mut input = ReadCursor::new(bytes);
        match state.resume(&mut input)? {
            Progress::Completed => Ok((state.finish()?, input.position())),
            Progress::NeedMoreBytes(needed) | Progress::NeedMoreCapacity(needed) => {
                Err(CodecError::UnexpectedEof { needed })
            }
        }
    }

    /// Resumable write state for driving the engine by hand.
    pub fn writer<'v>(&self, value: &'v Value, ty: &TypeRef) -> Result<WriteState<'v>, CodecError> {
        WriteState::new(
            self.converter(ty)?,
            value,
            self.options.clone(),
            self.converters.clone(),
        )
    }

    /// Resumable read state for driving the engine by hand.
    pub fn reader(&self, ty: &TypeRef) -> Result<ReadState, CodecError> {
        ReadState::new(
            self.converter(ty)?,
            self.options.clone(),
            self.converters.clone(),
        )
    }

    /// Chunked encoder producing at most `chunk_size` bytes per chunk,
    /// except when a single token is larger.
    pub fn encoder<'v>(
        &self,
        value: &'v Value,
        ty: &TypeRef,
        chunk_size: usize,
    ) -> Result<Encoder<'v>, CodecError> {
        Ok(Encoder {
            state: self.writer(value, ty)?,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Incremental decoder for a sequence of values of type `ty`.
    pub fn decoder(&self, ty: &TypeRef) -> Result<Decoder, CodecError> {
        Ok(Decoder {
            converter: self.converter(ty)?,
            options: self.options.clone(),
            registry: self.converters.clone(),
            state: None,
            buffer: BytesMut::with_capacity(DEFAULT_CHUNK_SIZE),
        })
    }
}

/// Produces the encoding of one value as a series of bounded chunks.
pub struct Encoder<'v> {
    state: WriteState<'v>,
    chunk_size: usize,
}

impl<'v> Encoder<'v> {
    /// Next chunk of output, or `None` once the value is fully written.
    pub fn next_chunk(&mut self) -> Result<Option<Bytes>, CodecError> {
        if self.state.is_ended() {
            return Ok(None);
        }
        let mut window = self.chunk_size;
        loop {
            let mut buf = BytesMut::with_capacity(window);
            let mut out = WriteCursor::new(&mut buf, window);
            let progress = self.state.resume(&mut out)?;
            let written = out.written();
            match progress {
                Progress::NeedMoreCapacity(needed) if written == 0 => {
                    tracing::debug!("Growing encoder window from {} to {} bytes", window, needed);
                    window = needed;
                }
                _ if written == 0 => return Ok(None),
                _ => return Ok(Some(buf.freeze())),
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_ended()
    }

    /// Drains all remaining chunks into one buffer.
    pub fn collect(mut self) -> Result<Bytes, CodecError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_chunk()? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }
}

/// Buffers incoming bytes and decodes values as soon as they are complete.
pub struct Decoder {
    converter: Arc<Converter>,
    options: Options,
    registry: Arc<ConverterRegistry>,
    state: Option<ReadState>,
    buffer: BytesMut,
}

impl Decoder {
    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next value from the buffer. Consumed bytes
    /// are removed; an incomplete trailing token stays buffered.
    pub fn decode(&mut self) -> Result<Option<Value>, CodecError> {
        let mut state = match self.state.take() {
            Some(state) => state,
            None => {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                ReadState::new(
                    self.converter.clone(),
                    self.options.clone(),
                    self.registry.clone(),
                )?
            }
        };

        let mut input = ReadCursor::new(&self.buffer);
        let progress = state.resume(&mut input)?;
        let consumed = input.position();
        self.buffer.advance(consumed);

        match progress {
            Progress::Completed => state.finish().map(Some),
            _ => {
                self.state = Some(state);
                Ok(None)
            }
        }
    }

    /// Bytes held but not yet consumed by the engine.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Additional bytes requested by the last suspension, 0 if none.
    pub fn bytes_needed(&self) -> usize {
        self.state.as_ref().map_or(0, ReadState::bytes_needed)
    }

    /// Whether a value is partially decoded.
    pub fn in_progress(&self) -> bool {
        self.state.is_some()
    }

    /// Fails if input ended in the middle of a value.
    pub fn finish(&self) -> Result<(), CodecError> {
        match &self.state {
            Some(state) => Err(CodecError::UnexpectedEof {
                needed: state.bytes_needed().max(1),
            }),
            None => Ok(()),
        }
    }

    /// Clears buffered input and any partial value.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = None;
    }
}
