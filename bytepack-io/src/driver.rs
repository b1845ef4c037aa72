//! Engine loops shared by the blocking and async adapters.

use crate::error::ChannelError;
use crate::scratch::ScratchBuffer;
use bytepack_core::{Codec, Progress, ReadCursor, ReadState, TypeRef, Value, WriteCursor, WriteState};
use bytes::BytesMut;

/// Outcome of running the read engine over the buffered input.
pub(crate) enum Pull {
    Value(Value),
    /// At least this many more bytes are needed.
    Need(usize),
}

/// Decodes successive values of one type from a scratch buffer.
pub(crate) struct ReadDriver {
    codec: Codec,
    ty: TypeRef,
    state: Option<ReadState>,
    consumed: usize,
}

impl ReadDriver {
    pub fn new(codec: Codec, ty: TypeRef) -> Self {
        Self {
            codec,
            ty,
            state: None,
            consumed: 0,
        }
    }

    pub fn advance(&mut self, scratch: &mut ScratchBuffer) -> Result<Pull, ChannelError> {
        let mut state = match self.state.take() {
            Some(state) => state,
            None => self.codec.reader(&self.ty)?,
        };
        let mut input = ReadCursor::new(scratch.unread());
        let progress = state.resume(&mut input)?;
        let used = input.position();
        scratch.consume(used);
        self.consumed += used;

        match progress {
            Progress::Completed => {
                self.consumed = 0;
                Ok(Pull::Value(state.finish()?))
            }
            Progress::NeedMoreBytes(n) | Progress::NeedMoreCapacity(n) => {
                self.state = Some(state);
                Ok(Pull::Need(n))
            }
        }
    }

    /// Whether part of a value has been seen, either consumed or buffered.
    pub fn in_value(&self, scratch: &ScratchBuffer) -> bool {
        self.consumed > 0 || !scratch.is_empty()
    }

    /// Handles end of input. Fine between values, an error inside one.
    pub fn end(&mut self, scratch: &ScratchBuffer, needed: usize) -> Result<(), ChannelError> {
        let partial = self.in_value(scratch);
        self.state = None;
        self.consumed = 0;
        if partial {
            Err(ChannelError::UnexpectedEof {
                needed: needed.max(1),
            })
        } else {
            Ok(())
        }
    }
}

/// Writes the next chunk of `state` into `out`, growing `window` when a
/// single token does not fit. Returns whether the value is complete.
pub(crate) fn fill_chunk(
    state: &mut WriteState<'_>,
    out: &mut BytesMut,
    window: &mut usize,
    max_buffer: usize,
) -> Result<bool, ChannelError> {
    loop {
        out.clear();
        if out.capacity() < *window {
            out.reserve(*window);
        }
        let mut cursor = WriteCursor::new(out, *window);
        let progress = state.resume(&mut cursor)?;
        let written = cursor.written();
        match progress {
            Progress::Completed => return Ok(true),
            Progress::NeedMoreCapacity(needed) | Progress::NeedMoreBytes(needed) => {
                if written > 0 {
                    return Ok(false);
                }
                if needed > max_buffer {
                    return Err(ChannelError::BufferLimit {
                        requested: needed,
                        limit: max_buffer,
                    });
                }
                tracing::debug!("Growing output window from {} to {} bytes", window, needed);
                *window = needed;
            }
        }
    }
}
