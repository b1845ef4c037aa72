//! Write engine.
//!
//! [`WriteState`] encodes one value into a sequence of bounded output
//! windows. Each call to [`WriteState::resume`] writes whole tokens until the
//! value is complete or the next token does not fit, in which case it returns
//! [`Progress::NeedMoreCapacity`] with the window size that token needs.

use crate::converter::collection::{
    ENTRY_KEY_INDEX, ENTRY_KEY_NAME, ENTRY_VALUE_INDEX, ENTRY_VALUE_NAME,
};
use crate::converter::{primitive, Converter, ConverterKind};
use crate::descriptor::PrimitiveKind;
use crate::error::CodecError;
use crate::frame::{resolve_body, Context, Progress, WriteFrameKind};
use crate::options::Options;
use crate::registry::ConverterRegistry;
use crate::value::Value;
use crate::wire::{self, WriteCursor, FLAG_NULL, FLAG_PRESENT, LEN_PREFIX};
use std::borrow::Cow;
use std::sync::Arc;

/// Position inside one dictionary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryPhase {
    Flag,
    Key,
    Value,
    End,
}

/// Progress of one value being written.
struct WriteFrame<'v> {
    converter: Arc<Converter>,
    kind: WriteFrameKind,
    source: &'v Value,
    flagged: bool,
    flag_written: bool,
    type_written: bool,
    force_type: bool,
    /// Count prefix written.
    started: bool,
    /// Next member plan or element.
    cursor: usize,
    entry: EntryPhase,
}

impl<'v> WriteFrame<'v> {
    fn new(
        converter: Arc<Converter>,
        source: &'v Value,
        flagged: bool,
        ctx: &Context<'_>,
    ) -> Result<Self, CodecError> {
        let body = resolve_body(&converter, ctx.registry)?;
        Ok(Self {
            kind: WriteFrameKind::select(body, ctx.options.use_types),
            converter,
            source,
            flagged,
            flag_written: false,
            type_written: false,
            force_type: false,
            started: false,
            cursor: 0,
            entry: EntryPhase::Flag,
        })
    }

    fn wants_type(&self, options: &Options) -> bool {
        (options.use_types || self.force_type) && !self.type_written
    }
}

enum Step<'v> {
    Done,
    Push(WriteFrame<'v>),
    Suspend(usize),
    Continue,
}

/// Resumable encoder state for one root value.
pub struct WriteState<'v> {
    stack: Vec<WriteFrame<'v>>,
    options: Options,
    registry: Arc<ConverterRegistry>,
    capacity_needed: usize,
    ended: bool,
}

impl<'v> WriteState<'v> {
    /// Prepares to write `value` with `converter` at the root position.
    pub fn new(
        converter: Arc<Converter>,
        value: &'v Value,
        options: Options,
        registry: Arc<ConverterRegistry>,
    ) -> Result<Self, CodecError> {
        let flagged = converter.is_nullable();
        if value.is_null() && !flagged {
            return Err(CodecError::mismatch(converter.name(), "null"));
        }
        let ctx = Context {
            options: &options,
            registry: &registry,
        };
        let root = WriteFrame::new(converter, value, flagged, &ctx)?;
        Ok(Self {
            stack: vec![root],
            options,
            registry,
            capacity_needed: 0,
            ended: false,
        })
    }

    /// Writes as many tokens as fit in `out`.
    pub fn resume(&mut self, out: &mut WriteCursor<'_>) -> Result<Progress, CodecError> {
        self.capacity_needed = 0;
        let ctx = Context {
            options: &self.options,
            registry: &self.registry,
        };
        loop {
            let Some(frame) = self.stack.last_mut() else {
                self.ended = true;
                return Ok(Progress::Completed);
            };
            match step(frame, out, &ctx)? {
                Step::Done => {
                    self.stack.pop();
                }
                Step::Push(child) => self.stack.push(child),
                Step::Continue => {}
                Step::Suspend(needed) => {
                    tracing::trace!(
                        "Write suspended at depth {}: token needs {} bytes, {} available",
                        self.stack.len(),
                        needed,
                        out.available()
                    );
                    self.capacity_needed = needed;
                    return Ok(Progress::NeedMoreCapacity(needed));
                }
            }
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Window size requested by the last suspension, 0 if none.
    pub fn capacity_needed(&self) -> usize {
        self.capacity_needed
    }

    /// Number of frames in flight.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

fn step<'v>(
    frame: &mut WriteFrame<'v>,
    out: &mut WriteCursor<'_>,
    ctx: &Context<'_>,
) -> Result<Step<'v>, CodecError> {
    if frame.flagged && !frame.flag_written {
        if !out.fits(1) {
            return Ok(Step::Suspend(1));
        }
        if frame.source.is_null() {
            out.put_u8(FLAG_NULL);
            return Ok(Step::Done);
        }
        out.put_u8(FLAG_PRESENT);
        frame.flag_written = true;
    }

    match frame.kind {
        WriteFrameKind::Special => special(frame, ctx),
        WriteFrameKind::EmitTypeName => {
            let name = ctx.options.text_encoding.encode(frame.converter.name());
            let needed = LEN_PREFIX + name.len();
            if !out.fits(needed) {
                return Ok(Step::Suspend(needed));
            }
            out.put_prefixed(&name);
            frame.type_written = true;
            frame.kind = WriteFrameKind::from_body(resolve_body(&frame.converter, ctx.registry)?);
            Ok(Step::Continue)
        }
        WriteFrameKind::Primitive | WriteFrameKind::Enum => {
            let (kind, value) = scalar_value(&frame.converter, frame.source)?;
            let needed = wire::primitive_len(kind, &value, ctx.options.text_encoding)?;
            if !out.fits(needed) {
                return Ok(Step::Suspend(needed));
            }
            wire::write_primitive(kind, &value, ctx.options.text_encoding, out)?;
            Ok(Step::Done)
        }
        WriteFrameKind::Object => object(frame, out, ctx),
        WriteFrameKind::PrimitiveEnumerable
        | WriteFrameKind::EnumEnumerable
        | WriteFrameKind::ObjectEnumerable => {
            if matches!(frame.converter.kind(), ConverterKind::Dictionary(_)) {
                dictionary(frame, out, ctx)
            } else {
                sequence(frame, out, ctx)
            }
        }
    }
}

/// Polymorphic values switch to the converter of their runtime type;
/// dictionaries are lowered to an entry sequence.
fn special<'v>(frame: &mut WriteFrame<'v>, ctx: &Context<'_>) -> Result<Step<'v>, CodecError> {
    if matches!(frame.converter.kind(), ConverterKind::Polymorphic) {
        let concrete = ctx.registry.resolve_for_value(
            frame.converter.wire_type(),
            frame.source,
            frame.converter.layout(),
        )?;
        if matches!(concrete.kind(), ConverterKind::Polymorphic) {
            return Err(CodecError::invalid_type(
                concrete.name(),
                "runtime type of a value cannot be abstract",
            ));
        }
        frame.converter = concrete;
        frame.force_type = true;
        frame.kind = WriteFrameKind::EmitTypeName;
    } else if frame.wants_type(ctx.options) {
        frame.kind = WriteFrameKind::EmitTypeName;
    } else {
        frame.kind = WriteFrameKind::ObjectEnumerable;
    }
    Ok(Step::Continue)
}

/// Wire kind and wire value of a primitive or enum.
fn scalar_value<'a>(
    converter: &Converter,
    value: &'a Value,
) -> Result<(PrimitiveKind, Cow<'a, Value>), CodecError> {
    match converter.kind() {
        ConverterKind::Primitive(kind) => Ok((*kind, Cow::Borrowed(value))),
        ConverterKind::ConvertPrimitive { wire, .. } => {
            Ok((*wire, Cow::Owned(primitive::convert(value, *wire)?)))
        }
        ConverterKind::Enum(e) => Ok((e.wire_kind(), Cow::Owned(e.to_wire(value)?))),
        _ => Err(CodecError::invalid_type(
            converter.name(),
            "not a primitive or enum",
        )),
    }
}

fn member_token_len(options: &Options, name: &str) -> usize {
    if options.use_property_names {
        LEN_PREFIX + options.text_encoding.encoded_len(name)
    } else {
        options.index_size.width()
    }
}

fn put_member_token(out: &mut WriteCursor<'_>, options: &Options, index: u16, name: &str) {
    if options.use_property_names {
        out.put_prefixed(&options.text_encoding.encode(name));
    } else {
        out.put_index(options.index_size, index);
    }
}

fn end_marker_len(options: &Options) -> usize {
    if options.use_property_names {
        LEN_PREFIX
    } else {
        options.index_size.width()
    }
}

fn put_end_marker(out: &mut WriteCursor<'_>, options: &Options) {
    if options.use_property_names {
        out.put_i32(0);
    } else {
        out.put_index(options.index_size, 0);
    }
}

fn object<'v>(
    frame: &mut WriteFrame<'v>,
    out: &mut WriteCursor<'_>,
    ctx: &Context<'_>,
) -> Result<Step<'v>, CodecError> {
    let converter = frame.converter.clone();
    let ConverterKind::Object(object) = converter.kind() else {
        return Err(CodecError::invalid_type(converter.name(), "not an object"));
    };
    let record = object.record(frame.source)?;
    let options = ctx.options;

    while let Some(plan) = object.members().get(frame.cursor) {
        let value = if plan.is_emitted() { plan.get(record) } else { None };
        let Some(value) = value else {
            frame.cursor += 1;
            continue;
        };

        let index = plan.wire_index().unwrap_or(0);
        if options.use_property_names {
            if plan.name().is_empty() {
                return Err(CodecError::invalid_type(
                    converter.name(),
                    "member names may not be empty in name mode",
                ));
            }
        } else if index == 0 || index > options.index_size.max_wire_index() {
            return Err(CodecError::IndexOutOfRange {
                type_name: converter.name().to_owned(),
                index: u32::from(index).saturating_sub(1),
                max: u32::from(options.index_size.max_wire_index()) - 1,
            });
        }

        let needed = member_token_len(options, plan.name());
        if !out.fits(needed) {
            return Ok(Step::Suspend(needed));
        }
        let child = plan.slot().get(ctx.registry, converter.layout())?;
        put_member_token(out, options, index, plan.name());
        frame.cursor += 1;
        return Ok(Step::Push(WriteFrame::new(child, value, false, ctx)?));
    }

    let needed = end_marker_len(options);
    if !out.fits(needed) {
        return Ok(Step::Suspend(needed));
    }
    put_end_marker(out, options);
    Ok(Step::Done)
}

fn put_count(
    frame: &mut WriteFrame<'_>,
    out: &mut WriteCursor<'_>,
    count: usize,
) -> Result<bool, CodecError> {
    if frame.started {
        return Ok(true);
    }
    let count = wire::encode_len(count)?;
    if !out.fits(LEN_PREFIX) {
        return Ok(false);
    }
    out.put_i32(count);
    frame.started = true;
    Ok(true)
}

fn sequence<'v>(
    frame: &mut WriteFrame<'v>,
    out: &mut WriteCursor<'_>,
    ctx: &Context<'_>,
) -> Result<Step<'v>, CodecError> {
    let converter = frame.converter.clone();
    let ConverterKind::Collection(collection) = converter.kind() else {
        return Err(CodecError::invalid_type(converter.name(), "not a collection"));
    };
    let items: &'v [Value] = collection.elements(frame.source)?;
    if !put_count(frame, out, items.len())? {
        return Ok(Step::Suspend(LEN_PREFIX));
    }

    let element = collection.element().get(ctx.registry, converter.layout())?;
    let flagged = element.is_nullable();
    let inline = frame.kind != WriteFrameKind::ObjectEnumerable && !ctx.options.use_types;

    while let Some(item) = items.get(frame.cursor) {
        if item.is_null() && !flagged {
            return Err(CodecError::mismatch(element.name(), "null"));
        }
        if !inline {
            frame.cursor += 1;
            return Ok(Step::Push(WriteFrame::new(element.clone(), item, flagged, ctx)?));
        }

        let flag = usize::from(flagged);
        if item.is_null() {
            if !out.fits(1) {
                return Ok(Step::Suspend(1));
            }
            out.put_u8(FLAG_NULL);
            frame.cursor += 1;
            continue;
        }
        let (kind, value) = scalar_value(&element, item)?;
        let needed = flag + wire::primitive_len(kind, &value, ctx.options.text_encoding)?;
        if !out.fits(needed) {
            return Ok(Step::Suspend(needed));
        }
        if flagged {
            out.put_u8(FLAG_PRESENT);
        }
        wire::write_primitive(kind, &value, ctx.options.text_encoding, out)?;
        frame.cursor += 1;
    }
    Ok(Step::Done)
}

/// Each entry is written like a two-member object preceded by a present
/// flag: `1 [Key] key [Value] value End`. A null value is left out.
fn dictionary<'v>(
    frame: &mut WriteFrame<'v>,
    out: &mut WriteCursor<'_>,
    ctx: &Context<'_>,
) -> Result<Step<'v>, CodecError> {
    let converter = frame.converter.clone();
    let ConverterKind::Dictionary(dictionary) = converter.kind() else {
        return Err(CodecError::invalid_type(converter.name(), "not a dictionary"));
    };
    let entries: &'v [(Value, Value)] = dictionary.entries(frame.source)?;
    if !put_count(frame, out, entries.len())? {
        return Ok(Step::Suspend(LEN_PREFIX));
    }
    let options = ctx.options;

    while let Some((key, value)) = entries.get(frame.cursor) {
        match frame.entry {
            EntryPhase::Flag => {
                if !out.fits(1) {
                    return Ok(Step::Suspend(1));
                }
                out.put_u8(FLAG_PRESENT);
                frame.entry = EntryPhase::Key;
            }
            EntryPhase::Key => {
                if key.is_null() {
                    return Err(CodecError::mismatch("a map key", "null"));
                }
                let needed = member_token_len(options, ENTRY_KEY_NAME);
                if !out.fits(needed) {
                    return Ok(Step::Suspend(needed));
                }
                let child = dictionary.key().get(ctx.registry, converter.layout())?;
                put_member_token(out, options, ENTRY_KEY_INDEX, ENTRY_KEY_NAME);
                frame.entry = EntryPhase::Value;
                return Ok(Step::Push(WriteFrame::new(child, key, false, ctx)?));
            }
            EntryPhase::Value => {
                if value.is_null() {
                    frame.entry = EntryPhase::End;
                    continue;
                }
                let needed = member_token_len(options, ENTRY_VALUE_NAME);
                if !out.fits(needed) {
                    return Ok(Step::Suspend(needed));
                }
                let child = dictionary.value().get(ctx.registry, converter.layout())?;
                put_member_token(out, options, ENTRY_VALUE_INDEX, ENTRY_VALUE_NAME);
                frame.entry = EntryPhase::End;
                return Ok(Step::Push(WriteFrame::new(child, value, false, ctx)?));
            }
            EntryPhase::End => {
                let needed = end_marker_len(options);
                if !out.fits(needed) {
                    return Ok(Step::Suspend(needed));
                }
                put_end_marker(out, options);
                frame.entry = EntryPhase::Flag;
                frame.cursor += 1;
            }
        }
    }
    Ok(Step::Done)
}
