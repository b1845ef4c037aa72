//! Read engine.
//!
//! [`ReadState`] decodes one root value from input that may arrive in
//! pieces. [`ReadState::resume`] consumes whole tokens only; when the next
//! token is incomplete it returns [`Progress::NeedMoreBytes`] and leaves the
//! partial token unread, so the caller must present those residue bytes again
//! followed by more input.

use crate::converter::collection::{
    ENTRY_KEY_INDEX, ENTRY_KEY_NAME, ENTRY_VALUE_INDEX, ENTRY_VALUE_NAME, MAX_PREALLOCATION,
};
use crate::converter::{primitive, Converter, ConverterKind, Storage};
use crate::descriptor::TypeDescriptor;
use crate::error::CodecError;
use crate::frame::{
    read_exact, read_flag, read_prefixed, resolve_body, Context, Progress, ReadFrameKind, Scalar,
    TokenState,
};
use crate::options::{MemberLayout, Options};
use crate::registry::ConverterRegistry;
use crate::value::{Record, Value};
use crate::wire::{self, ReadCursor, LEN_PREFIX};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What the parent of an in-flight child does with its result.
#[derive(Debug, Clone, Copy)]
enum Awaiting {
    Nothing,
    Member(usize),
    Discard,
}

#[derive(Debug, Clone, Copy)]
enum EntryPart {
    Key,
    Value,
    Discard,
}

#[derive(Debug, Default)]
struct EntryState {
    flag_read: bool,
    pending_len: Option<usize>,
    key: Option<Value>,
    value: Option<Value>,
    awaiting: Option<EntryPart>,
}

/// Partially decoded result of a frame.
#[derive(Debug)]
enum Partial {
    Empty,
    Record {
        /// `None` while draining.
        record: Option<Record>,
        awaiting: Awaiting,
    },
    Sequence {
        count: usize,
        done: usize,
        items: Vec<Value>,
        seen: Option<HashSet<Value>>,
        awaiting: bool,
        element: TokenState,
    },
    Map {
        count: usize,
        done: usize,
        entries: Vec<(Value, Value)>,
        positions: HashMap<Value, usize>,
        entry: EntryState,
    },
}

/// Progress of one value being read.
struct ReadFrame {
    converter: Arc<Converter>,
    kind: ReadFrameKind,
    flagged: bool,
    /// Parse and discard.
    drain: bool,
    force_type: bool,
    token: TokenState,
    partial: Partial,
}

impl ReadFrame {
    fn new(
        converter: Arc<Converter>,
        flagged: bool,
        drain: bool,
        ctx: &Context<'_>,
    ) -> Result<Self, CodecError> {
        let body = resolve_body(&converter, ctx.registry)?;
        Ok(Self {
            kind: ReadFrameKind::select(body, ctx.options.use_types),
            converter,
            flagged,
            drain,
            force_type: false,
            token: TokenState::default(),
            partial: Partial::Empty,
        })
    }

    /// A frame that parses a value of any type from its type name.
    fn drain_any(ctx: &Context<'_>, layout: MemberLayout) -> Result<Self, CodecError> {
        let any = ctx.registry.resolve(&TypeDescriptor::any(), layout)?;
        Self::new(any, false, true, ctx)
    }

    fn finish(&self, value: Value) -> Step {
        Step::Done(if self.drain { Value::Null } else { value })
    }
}

enum Step {
    Done(Value),
    Push(ReadFrame),
    Suspend(usize),
    Continue,
}

/// Resumable decoder state for one root value.
pub struct ReadState {
    stack: Vec<ReadFrame>,
    last_result: Option<Value>,
    result: Option<Value>,
    bytes_needed: usize,
    ended: bool,
    options: Options,
    registry: Arc<ConverterRegistry>,
}

impl ReadState {
    /// Prepares to read a root value with `converter`.
    pub fn new(
        converter: Arc<Converter>,
        options: Options,
        registry: Arc<ConverterRegistry>,
    ) -> Result<Self, CodecError> {
        let ctx = Context {
            options: &options,
            registry: &registry,
        };
        let flagged = converter.is_nullable();
        let root = ReadFrame::new(converter, flagged, false, &ctx)?;
        Ok(Self {
            stack: vec![root],
            last_result: None,
            result: None,
            bytes_needed: 0,
            ended: false,
            options,
            registry,
        })
    }

    /// Consumes as many whole tokens from `input` as possible.
    pub fn resume(&mut self, input: &mut ReadCursor<'_>) -> Result<Progress, CodecError> {
        self.bytes_needed = 0;
        if self.ended {
            return Ok(Progress::Completed);
        }
        let ctx = Context {
            options: &self.options,
            registry: &self.registry,
        };
        loop {
            let Some(frame) = self.stack.last_mut() else {
                self.ended = true;
                return Ok(Progress::Completed);
            };
            match step(frame, input, &mut self.last_result, &ctx)? {
                Step::Done(value) => {
                    self.stack.pop();
                    if self.stack.is_empty() {
                        self.result = Some(value);
                        self.ended = true;
                        return Ok(Progress::Completed);
                    }
                    self.last_result = Some(value);
                }
                Step::Push(child) => self.stack.push(child),
                Step::Continue => {}
                Step::Suspend(needed) => {
                    tracing::trace!(
                        "Read suspended at depth {}: need {} more bytes",
                        self.stack.len(),
                        needed
                    );
                    self.bytes_needed = needed;
                    return Ok(Progress::NeedMoreBytes(needed));
                }
            }
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Bytes requested by the last suspension, 0 if none.
    pub fn bytes_needed(&self) -> usize {
        self.bytes_needed
    }

    /// Number of frames in flight.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Takes the decoded root value once the state has ended.
    pub fn take_result(&mut self) -> Option<Value> {
        self.result.take()
    }

    pub fn finish(mut self) -> Result<Value, CodecError> {
        self.take_result().ok_or(CodecError::NotFinished)
    }
}

fn step(
    frame: &mut ReadFrame,
    input: &mut ReadCursor<'_>,
    last: &mut Option<Value>,
    ctx: &Context<'_>,
) -> Result<Step, CodecError> {
    if frame.flagged && !frame.token.flag_read {
        match read_flag(input)? {
            Scalar::Need(n) => return Ok(Step::Suspend(n)),
            Scalar::Ready(false) => return Ok(Step::Done(Value::Null)),
            Scalar::Ready(true) => frame.token.flag_read = true,
        }
    }

    match frame.kind {
        ReadFrameKind::Special => {
            if matches!(frame.converter.kind(), ConverterKind::Polymorphic) {
                frame.force_type = true;
                frame.kind = ReadFrameKind::ReadTypeName;
            } else if (ctx.options.use_types || frame.force_type) && !frame.token.type_read {
                frame.kind = ReadFrameKind::ReadTypeName;
            } else {
                frame.kind = ReadFrameKind::ObjectEnumerable;
            }
            Ok(Step::Continue)
        }
        ReadFrameKind::ReadTypeName => type_name(frame, input, ctx),
        ReadFrameKind::Primitive | ReadFrameKind::Enum => {
            match read_scalar(&frame.converter, input, &mut frame.token.pending_len, frame.drain, ctx)? {
                Scalar::Need(n) => Ok(Step::Suspend(n)),
                Scalar::Ready(value) => Ok(frame.finish(value)),
            }
        }
        ReadFrameKind::Object => object(frame, input, last, ctx),
        ReadFrameKind::PrimitiveEnumerable
        | ReadFrameKind::EnumEnumerable
        | ReadFrameKind::ObjectEnumerable => {
            if matches!(frame.converter.kind(), ConverterKind::Dictionary(_)) {
                dictionary(frame, input, last, ctx)
            } else {
                sequence(frame, input, last, ctx)
            }
        }
    }
}

/// Reads a primitive or enum token and maps it to the memory kind.
fn read_scalar(
    converter: &Converter,
    input: &mut ReadCursor<'_>,
    pending: &mut Option<usize>,
    drain: bool,
    ctx: &Context<'_>,
) -> Result<Scalar<Value>, CodecError> {
    let kind = match converter.kind() {
        ConverterKind::Primitive(kind) => *kind,
        ConverterKind::ConvertPrimitive { wire, .. } => *wire,
        ConverterKind::Enum(e) => e.wire_kind(),
        _ => {
            return Err(CodecError::invalid_type(
                converter.name(),
                "not a primitive or enum",
            ))
        }
    };
    let raw = match kind.fixed_width() {
        Some(width) => match read_exact(input, width) {
            Scalar::Need(n) => return Ok(Scalar::Need(n)),
            Scalar::Ready(bytes) => wire::read_fixed(kind, bytes)?,
        },
        None => match read_prefixed(input, pending)? {
            Scalar::Need(n) => return Ok(Scalar::Need(n)),
            Scalar::Ready(bytes) => Value::String(ctx.options.text_encoding.decode(bytes)?),
        },
    };
    if drain {
        return Ok(Scalar::Ready(Value::Null));
    }
    let value = match converter.kind() {
        ConverterKind::ConvertPrimitive { memory, .. } => primitive::convert(&raw, *memory)?,
        ConverterKind::Enum(e) => e.from_wire(&raw)?,
        _ => raw,
    };
    Ok(Scalar::Ready(value))
}

/// Resolves a type name from the wire and swaps in its converter.
fn type_name(
    frame: &mut ReadFrame,
    input: &mut ReadCursor<'_>,
    ctx: &Context<'_>,
) -> Result<Step, CodecError> {
    let name = match read_prefixed(input, &mut frame.token.pending_len)? {
        Scalar::Need(n) => return Ok(Step::Suspend(n)),
        Scalar::Ready(bytes) => ctx.options.text_encoding.decode(bytes)?,
    };
    let types = ctx.registry.types();
    let named = types.lookup(&name)?;
    let expected = frame.converter.wire_type().clone();
    if !types.is_assignable(&named, &expected) {
        return Err(CodecError::TypeMismatch {
            expected: expected.name().to_owned(),
            actual: name,
        });
    }

    if named.name() != expected.name() {
        let layout = frame.converter.layout();
        let memory = frame.converter.memory_type();
        frame.converter = if frame.drain || memory.is_polymorphic() {
            ctx.registry.resolve(&named, layout)?
        } else {
            ctx.registry.resolve_pair(memory, &named, layout)?
        };
    }
    if matches!(frame.converter.kind(), ConverterKind::Polymorphic) {
        return Err(CodecError::invalid_type(
            name,
            "type name on the wire must be a concrete type",
        ));
    }
    frame.token.type_read = true;
    frame.kind = ReadFrameKind::from_body(resolve_body(&frame.converter, ctx.registry)?);
    Ok(Step::Continue)
}

/// A member tag read from an object segment.
enum MemberToken {
    End,
    Index(u16),
    Name(String),
}

fn read_member_token(
    input: &mut ReadCursor<'_>,
    pending: &mut Option<usize>,
    options: &Options,
) -> Result<Scalar<MemberToken>, CodecError> {
    if options.use_property_names {
        return Ok(match read_prefixed(input, pending)? {
            Scalar::Need(n) => Scalar::Need(n),
            Scalar::Ready([]) => Scalar::Ready(MemberToken::End),
            Scalar::Ready(bytes) => {
                Scalar::Ready(MemberToken::Name(options.text_encoding.decode(bytes)?))
            }
        });
    }
    let width = options.index_size.width();
    Ok(match input.read_index(options.index_size) {
        None => Scalar::Need(width - input.remaining()),
        Some(0) => Scalar::Ready(MemberToken::End),
        Some(index) => Scalar::Ready(MemberToken::Index(index)),
    })
}

fn object(
    frame: &mut ReadFrame,
    input: &mut ReadCursor<'_>,
    last: &mut Option<Value>,
    ctx: &Context<'_>,
) -> Result<Step, CodecError> {
    let converter = frame.converter.clone();
    let ConverterKind::Object(object) = converter.kind() else {
        return Err(CodecError::invalid_type(converter.name(), "not an object"));
    };
    if matches!(frame.partial, Partial::Empty) {
        let record = if frame.drain {
            None
        } else {
            Some(object.instantiate()?)
        };
        frame.partial = Partial::Record {
            record,
            awaiting: Awaiting::Nothing,
        };
    }
    let draining = frame.drain;
    let ReadFrame { partial, token, .. } = frame;
    let Partial::Record { record, awaiting } = partial else {
        return Err(CodecError::invalid_type(converter.name(), "frame state mismatch"));
    };

    match std::mem::replace(awaiting, Awaiting::Nothing) {
        Awaiting::Member(position) => {
            let value = last.take().unwrap_or(Value::Null);
            if let Some(record) = record.as_mut() {
                object.members()[position].set(record, value);
            }
        }
        Awaiting::Discard => {
            last.take();
        }
        Awaiting::Nothing => {}
    }

    let token = match read_member_token(input, &mut token.pending_len, ctx.options)? {
        Scalar::Need(n) => return Ok(Step::Suspend(n)),
        Scalar::Ready(token) => token,
    };
    let position = match token {
        MemberToken::End => {
            let value = record.take().map(Value::Record).unwrap_or(Value::Null);
            return Ok(Step::Done(value));
        }
        MemberToken::Index(index) => object
            .position_by_index(index)
            .ok_or_else(|| format!("#{}", index - 1)),
        MemberToken::Name(name) => object.position_by_name(&name).ok_or(name),
    };

    match position {
        Ok(position) => {
            let plan = &object.members()[position];
            let child = plan.slot().get(ctx.registry, converter.layout())?;
            let drain = draining || plan.is_drained();
            if drain && !draining {
                tracing::debug!("Draining member {} of {}", plan.name(), converter.name());
            }
            let frame = ReadFrame::new(child, false, drain, ctx)?;
            *awaiting = if drain {
                Awaiting::Discard
            } else {
                Awaiting::Member(position)
            };
            Ok(Step::Push(frame))
        }
        Err(member) if ctx.options.use_types => {
            tracing::debug!("Draining unknown member {} of {}", member, converter.name());
            let frame = ReadFrame::drain_any(ctx, converter.layout())?;
            *awaiting = Awaiting::Discard;
            Ok(Step::Push(frame))
        }
        Err(member) => Err(CodecError::UnknownMember {
            type_name: converter.name().to_owned(),
            member,
        }),
    }
}

/// Reads the `i32` element count of a sequence or dictionary.
fn read_count(input: &mut ReadCursor<'_>) -> Result<Scalar<usize>, CodecError> {
    match input.read_i32() {
        None => Ok(Scalar::Need(LEN_PREFIX - input.remaining())),
        Some(raw) => Ok(Scalar::Ready(wire::checked_len(raw)?)),
    }
}

fn sequence(
    frame: &mut ReadFrame,
    input: &mut ReadCursor<'_>,
    last: &mut Option<Value>,
    ctx: &Context<'_>,
) -> Result<Step, CodecError> {
    let converter = frame.converter.clone();
    let ConverterKind::Collection(collection) = converter.kind() else {
        return Err(CodecError::invalid_type(converter.name(), "not a collection"));
    };
    if matches!(frame.partial, Partial::Empty) {
        let count = match read_count(input)? {
            Scalar::Need(n) => return Ok(Step::Suspend(n)),
            Scalar::Ready(count) => count,
        };
        let capacity = if frame.drain { 0 } else { collection.capacity(count) };
        frame.partial = Partial::Sequence {
            count,
            done: 0,
            items: Vec::with_capacity(capacity),
            seen: (collection.storage() == Storage::Set).then(HashSet::new),
            awaiting: false,
            element: TokenState::default(),
        };
    }

    let element_conv = collection.element().get(ctx.registry, converter.layout())?;
    let flagged = element_conv.is_nullable();
    let inline = frame.kind != ReadFrameKind::ObjectEnumerable && !ctx.options.use_types;
    let drain = frame.drain;
    let Partial::Sequence {
        count,
        done,
        items,
        seen,
        awaiting,
        element,
    } = &mut frame.partial
    else {
        return Err(CodecError::invalid_type(converter.name(), "frame state mismatch"));
    };

    let mut push = |items: &mut Vec<Value>, value: Value| {
        if drain {
            return;
        }
        match seen.as_mut() {
            Some(seen) => {
                if seen.insert(value.clone()) {
                    items.push(value);
                }
            }
            None => items.push(value),
        }
    };

    loop {
        if *awaiting {
            *awaiting = false;
            push(items, last.take().unwrap_or(Value::Null));
            *done += 1;
        }
        if *done == *count {
            let items = std::mem::take(items);
            return Ok(Step::Done(if drain {
                Value::Null
            } else {
                collection.finish(items)
            }));
        }

        if !inline {
            *awaiting = true;
            return Ok(Step::Push(ReadFrame::new(
                element_conv.clone(),
                flagged,
                drain,
                ctx,
            )?));
        }

        if flagged && !element.flag_read {
            match read_flag(input)? {
                Scalar::Need(n) => return Ok(Step::Suspend(n)),
                Scalar::Ready(false) => {
                    push(items, Value::Null);
                    *done += 1;
                    continue;
                }
                Scalar::Ready(true) => element.flag_read = true,
            }
        }
        match read_scalar(&element_conv, input, &mut element.pending_len, drain, ctx)? {
            Scalar::Need(n) => return Ok(Step::Suspend(n)),
            Scalar::Ready(value) => {
                element.reset();
                push(items, value);
                *done += 1;
            }
        }
    }
}

/// Rebuilds a dictionary from its entry sequence. Later duplicates overwrite
/// the value of the first occurrence in place.
fn dictionary(
    frame: &mut ReadFrame,
    input: &mut ReadCursor<'_>,
    last: &mut Option<Value>,
    ctx: &Context<'_>,
) -> Result<Step, CodecError> {
    let converter = frame.converter.clone();
    let ConverterKind::Dictionary(dictionary) = converter.kind() else {
        return Err(CodecError::invalid_type(converter.name(), "not a dictionary"));
    };
    if matches!(frame.partial, Partial::Empty) {
        let count = match read_count(input)? {
            Scalar::Need(n) => return Ok(Step::Suspend(n)),
            Scalar::Ready(count) => count,
        };
        let capacity = if frame.drain { 0 } else { count.min(MAX_PREALLOCATION) };
        frame.partial = Partial::Map {
            count,
            done: 0,
            entries: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
            entry: EntryState::default(),
        };
    }
    let drain = frame.drain;
    let Partial::Map {
        count,
        done,
        entries,
        positions,
        entry,
    } = &mut frame.partial
    else {
        return Err(CodecError::invalid_type(converter.name(), "frame state mismatch"));
    };

    loop {
        if let Some(part) = entry.awaiting.take() {
            let value = last.take().unwrap_or(Value::Null);
            match part {
                EntryPart::Key => entry.key = Some(value),
                EntryPart::Value => entry.value = Some(value),
                EntryPart::Discard => {}
            }
        }
        if *done == *count {
            let entries = std::mem::take(entries);
            return Ok(Step::Done(if drain {
                Value::Null
            } else {
                Value::Map(entries)
            }));
        }

        if !entry.flag_read {
            match read_flag(input)? {
                Scalar::Need(n) => return Ok(Step::Suspend(n)),
                Scalar::Ready(false) => return Err(CodecError::mismatch("a map entry", "null")),
                Scalar::Ready(true) => entry.flag_read = true,
            }
        }

        let token = match read_member_token(input, &mut entry.pending_len, ctx.options)? {
            Scalar::Need(n) => return Ok(Step::Suspend(n)),
            Scalar::Ready(token) => token,
        };
        let part = match token {
            MemberToken::End => {
                let key = entry
                    .key
                    .take()
                    .ok_or_else(|| CodecError::mismatch("a map key", "none"))?;
                let value = entry.value.take().unwrap_or(Value::Null);
                *entry = EntryState::default();
                *done += 1;
                if !drain {
                    match positions.get(&key) {
                        Some(&at) => entries[at].1 = value,
                        None => {
                            positions.insert(key.clone(), entries.len());
                            entries.push((key, value));
                        }
                    }
                }
                continue;
            }
            MemberToken::Index(ENTRY_KEY_INDEX) => Ok(EntryPart::Key),
            MemberToken::Index(ENTRY_VALUE_INDEX) => Ok(EntryPart::Value),
            MemberToken::Name(name) if name == ENTRY_KEY_NAME => Ok(EntryPart::Key),
            MemberToken::Name(name) if name == ENTRY_VALUE_NAME => Ok(EntryPart::Value),
            MemberToken::Index(index) => Err(format!("#{}", index - 1)),
            MemberToken::Name(name) => Err(name),
        };

        let child = match part {
            Ok(EntryPart::Key) => {
                let conv = dictionary.key().get(ctx.registry, converter.layout())?;
                ReadFrame::new(conv, false, drain, ctx)?
            }
            Ok(_) => {
                let conv = dictionary.value().get(ctx.registry, converter.layout())?;
                ReadFrame::new(conv, false, drain, ctx)?
            }
            Err(_) if ctx.options.use_types => ReadFrame::drain_any(ctx, converter.layout())?,
            Err(member) => {
                return Err(CodecError::UnknownMember {
                    type_name: converter.name().to_owned(),
                    member,
                })
            }
        };
        entry.awaiting = Some(part.unwrap_or(EntryPart::Discard));
        return Ok(Step::Push(child));
    }
}
