//! Frames and suspension.
//!
//! The engines never recurse: every in-flight value is a frame on an explicit
//! stack, and every step either completes a token or reports how many more
//! bytes (decode) or how much more room (encode) it needs without consuming
//! or producing anything.

use crate::converter::{Converter, ConverterKind};
use crate::descriptor::Category;
use crate::error::CodecError;
use crate::options::Options;
use crate::registry::ConverterRegistry;
use crate::wire::{checked_len, ReadCursor, LEN_PREFIX};

/// Outcome of one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The root value is complete.
    Completed,
    /// Input ran out; at least this many bytes beyond the unread residue are
    /// needed before the next token can be read.
    NeedMoreBytes(usize),
    /// Output window is full; the next token needs a window of this size.
    NeedMoreCapacity(usize),
}

impl Progress {
    pub fn is_completed(&self) -> bool {
        matches!(self, Progress::Completed)
    }
}

/// Encode-side frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFrameKind {
    EmitTypeName,
    Primitive,
    Enum,
    Special,
    Object,
    PrimitiveEnumerable,
    EnumEnumerable,
    ObjectEnumerable,
}

/// Decode-side frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrameKind {
    ReadTypeName,
    Primitive,
    Enum,
    Special,
    Object,
    PrimitiveEnumerable,
    EnumEnumerable,
    ObjectEnumerable,
}

/// Kind shared by both engines once the preamble is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyKind {
    Primitive,
    Enum,
    Special,
    Object,
    PrimitiveEnumerable,
    EnumEnumerable,
    ObjectEnumerable,
}

/// Routes a converter to its body kind. Polymorphic values and dictionaries
/// go through `Special`; sequences are split by element category.
pub(crate) fn body_kind(converter: &Converter, element: Option<&Converter>) -> BodyKind {
    match converter.kind() {
        ConverterKind::Polymorphic | ConverterKind::Dictionary(_) => BodyKind::Special,
        ConverterKind::Primitive(_) | ConverterKind::ConvertPrimitive { .. } => BodyKind::Primitive,
        ConverterKind::Enum(_) => BodyKind::Enum,
        ConverterKind::Object(_) => BodyKind::Object,
        ConverterKind::Collection(_) => match element.map(Converter::category) {
            Some(Category::Primitive) => BodyKind::PrimitiveEnumerable,
            Some(Category::Enum) => BodyKind::EnumEnumerable,
            _ => BodyKind::ObjectEnumerable,
        },
    }
}

/// Body kind of a converter, resolving the element converter of sequences.
pub(crate) fn resolve_body(
    converter: &Converter,
    registry: &ConverterRegistry,
) -> Result<BodyKind, CodecError> {
    let element = match converter.kind() {
        ConverterKind::Collection(c) => Some(c.element().get(registry, converter.layout())?),
        _ => None,
    };
    Ok(body_kind(converter, element.as_deref()))
}

/// Per-operation settings shared by every frame step.
pub(crate) struct Context<'a> {
    pub options: &'a Options,
    pub registry: &'a ConverterRegistry,
}

impl WriteFrameKind {
    /// Entry kind for a value: polymorphic resolution first, then the type
    /// name when requested and not yet written, then the body.
    pub(crate) fn select(body: BodyKind, emit_type: bool) -> Self {
        match body {
            BodyKind::Special => WriteFrameKind::Special,
            _ if emit_type => WriteFrameKind::EmitTypeName,
            other => Self::from_body(other),
        }
    }

    pub(crate) fn from_body(body: BodyKind) -> Self {
        match body {
            BodyKind::Primitive => WriteFrameKind::Primitive,
            BodyKind::Enum => WriteFrameKind::Enum,
            BodyKind::Special => WriteFrameKind::Special,
            BodyKind::Object => WriteFrameKind::Object,
            BodyKind::PrimitiveEnumerable => WriteFrameKind::PrimitiveEnumerable,
            BodyKind::EnumEnumerable => WriteFrameKind::EnumEnumerable,
            BodyKind::ObjectEnumerable => WriteFrameKind::ObjectEnumerable,
        }
    }
}

impl ReadFrameKind {
    pub(crate) fn select(body: BodyKind, read_type: bool) -> Self {
        match body {
            BodyKind::Special => ReadFrameKind::Special,
            _ if read_type => ReadFrameKind::ReadTypeName,
            other => Self::from_body(other),
        }
    }

    pub(crate) fn from_body(body: BodyKind) -> Self {
        match body {
            BodyKind::Primitive => ReadFrameKind::Primitive,
            BodyKind::Enum => ReadFrameKind::Enum,
            BodyKind::Special => ReadFrameKind::Special,
            BodyKind::Object => ReadFrameKind::Object,
            BodyKind::PrimitiveEnumerable => ReadFrameKind::PrimitiveEnumerable,
            BodyKind::EnumEnumerable => ReadFrameKind::EnumEnumerable,
            BodyKind::ObjectEnumerable => ReadFrameKind::ObjectEnumerable,
        }
    }
}

/// Token-level progress of one value being read: which preamble tokens have
/// been consumed and a length prefix already read but not yet satisfied.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TokenState {
    pub flag_read: bool,
    pub type_read: bool,
    pub pending_len: Option<usize>,
}

impl TokenState {
    pub fn reset(&mut self) {
        *self = TokenState::default();
    }
}

/// A token that is either complete or needs more input.
pub(crate) enum Scalar<T> {
    Ready(T),
    /// Additional bytes required.
    Need(usize),
}

/// Reads exactly `n` bytes, or reports the shortfall without consuming.
pub(crate) fn read_exact<'a>(input: &mut ReadCursor<'a>, n: usize) -> Scalar<&'a [u8]> {
    match input.take(n) {
        Some(bytes) => Scalar::Ready(bytes),
        None => Scalar::Need(n - input.remaining()),
    }
}

/// Reads `i32(len) bytes[len]`. A length already decoded in an earlier
/// invocation is remembered in `pending` and not read again.
pub(crate) fn read_prefixed<'a>(
    input: &mut ReadCursor<'a>,
    pending: &mut Option<usize>,
) -> Result<Scalar<&'a [u8]>, CodecError> {
    let len = match *pending {
        Some(len) => len,
        None => {
            let Some(raw) = input.read_i32() else {
                return Ok(Scalar::Need(LEN_PREFIX - input.remaining()));
            };
            let len = checked_len(raw)?;
            *pending = Some(len);
            len
        }
    };
    match read_exact(input, len) {
        Scalar::Ready(bytes) => {
            *pending = None;
            Ok(Scalar::Ready(bytes))
        }
        Scalar::Need(n) => Ok(Scalar::Need(n)),
    }
}

/// Reads a not-null flag: `Ready(true)` when a value follows.
pub(crate) fn read_flag(input: &mut ReadCursor<'_>) -> Result<Scalar<bool>, CodecError> {
    match input.read_u8() {
        None => Ok(Scalar::Need(1)),
        Some(crate::wire::FLAG_PRESENT) => Ok(Scalar::Ready(true)),
        Some(crate::wire::FLAG_NULL) => Ok(Scalar::Ready(false)),
        Some(other) => Err(CodecError::InvalidNullFlag(other)),
    }
}
