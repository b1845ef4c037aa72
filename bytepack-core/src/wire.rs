//! Byte cursors and primitive wire tokens.
//!
//! All fixed-width values are little-endian. Date and time kinds use a
//! 100-nanosecond tick layout:
//!
//! ```text
//! datetime        i64 ticks since 0001-01-01T00:00:00Z
//! datetimeoffset  i64 local ticks, i16 offset minutes
//! timespan        i64 ticks
//! date            i32 days since 0001-01-01
//! time            i64 ticks since midnight
//! guid            16 bytes, mixed-endian field layout
//! decimal         u32 lo, u32 mid, u32 hi, u32 flags (scale << 16 | sign << 31)
//! ```

use crate::descriptor::PrimitiveKind;
use crate::error::CodecError;
use crate::options::{IndexSize, TextEncoding};
use crate::value::{Decimal, Value};
use bytes::{BufMut, BytesMut};
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc,
};
use uuid::Uuid;

/// Ticks per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01 and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Byte length of a length/count prefix.
pub const LEN_PREFIX: usize = 4;

/// Not-null flag values.
pub const FLAG_NULL: u8 = 0;
pub const FLAG_PRESENT: u8 = 1;

/// Read window over a borrowed input block.
#[derive(Debug)]
pub struct ReadCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReadCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes exactly `n` bytes, or nothing if fewer are available.
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Some(out)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Option<i16> {
        self.array().map(i16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.array().map(i32::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Option<i64> {
        self.array().map(i64::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Option<u64> {
        self.array().map(u64::from_le_bytes)
    }

    /// Reads a member index token of the configured width.
    pub fn read_index(&mut self, size: IndexSize) -> Option<u16> {
        match size {
            IndexSize::Byte => self.read_u8().map(u16::from),
            IndexSize::UInt16 => self.read_u16(),
        }
    }
}

/// Write window appending to a destination buffer, bounded by `limit`
/// bytes for the current invocation.
#[derive(Debug)]
pub struct WriteCursor<'a> {
    buf: &'a mut BytesMut,
    limit: usize,
    written: usize,
}

impl<'a> WriteCursor<'a> {
    pub fn new(buf: &'a mut BytesMut, limit: usize) -> Self {
        Self {
            buf,
            limit,
            written: 0,
        }
    }

    /// A cursor that never runs out of room.
    pub fn unbounded(buf: &'a mut BytesMut) -> Self {
        Self::new(buf, usize::MAX)
    }

    /// Room left in this window.
    pub fn available(&self) -> usize {
        self.limit - self.written
    }

    pub fn fits(&self, n: usize) -> bool {
        self.available() >= n
    }

    /// Bytes appended through this cursor.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        debug_assert!(self.fits(bytes.len()));
        self.buf.put_slice(bytes);
        self.written += bytes.len();
    }

    pub fn put_u8(&mut self, v: u8) {
        self.put_slice(&[v]);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.put_slice(&v.to_le_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.put_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.put_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.put_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.put_slice(&v.to_le_bytes());
    }

    pub fn put_index(&mut self, size: IndexSize, index: u16) {
        match size {
            IndexSize::Byte => self.put_u8(index as u8),
            IndexSize::UInt16 => self.put_u16(index),
        }
    }

    /// Writes `i32(len) bytes`.
    pub fn put_prefixed(&mut self, bytes: &[u8]) {
        self.put_i32(bytes.len() as i32);
        self.put_slice(bytes);
    }
}

/// Validates a decoded length or count prefix.
pub fn checked_len(raw: i32) -> Result<usize, CodecError> {
    usize::try_from(raw).map_err(|_| CodecError::InvalidLength(raw as i64))
}

/// Converts a byte length or element count to its prefix value.
pub fn encode_len(len: usize) -> Result<i32, CodecError> {
    i32::try_from(len).map_err(|_| CodecError::InvalidLength(len as i64))
}

/// Encoded size of a length-prefixed string.
pub fn text_token_len(text: &str, encoding: TextEncoding) -> usize {
    LEN_PREFIX + encoding.encoded_len(text)
}

/// Encoded size of a primitive token.
pub fn primitive_len(
    kind: PrimitiveKind,
    value: &Value,
    encoding: TextEncoding,
) -> Result<usize, CodecError> {
    match kind.fixed_width() {
        Some(width) => Ok(width),
        None => match value {
            Value::String(s) => Ok(text_token_len(s, encoding)),
            other => Err(CodecError::mismatch("string", other.kind_name())),
        },
    }
}

/// Writes one primitive token. The caller has already checked capacity
/// with [`primitive_len`].
pub fn write_primitive(
    kind: PrimitiveKind,
    value: &Value,
    encoding: TextEncoding,
    out: &mut WriteCursor<'_>,
) -> Result<(), CodecError> {
    match (kind, value) {
        (PrimitiveKind::Bool, Value::Bool(v)) => out.put_u8(*v as u8),
        (PrimitiveKind::I8, Value::I8(v)) => out.put_u8(*v as u8),
        (PrimitiveKind::U8, Value::U8(v)) => out.put_u8(*v),
        (PrimitiveKind::I16, Value::I16(v)) => out.put_i16(*v),
        (PrimitiveKind::U16, Value::U16(v)) => out.put_u16(*v),
        (PrimitiveKind::I32, Value::I32(v)) => out.put_i32(*v),
        (PrimitiveKind::U32, Value::U32(v)) => out.put_u32(*v),
        (PrimitiveKind::I64, Value::I64(v)) => out.put_i64(*v),
        (PrimitiveKind::U64, Value::U64(v)) => out.put_u64(*v),
        (PrimitiveKind::F32, Value::F32(v)) => out.put_u32(v.to_bits()),
        (PrimitiveKind::F64, Value::F64(v)) => out.put_u64(v.to_bits()),
        (PrimitiveKind::Decimal, Value::Decimal(v)) => {
            for word in v.to_words() {
                out.put_u32(word);
            }
        }
        (PrimitiveKind::Char, Value::Char(c)) => out.put_u16(char_unit(*c)?),
        (PrimitiveKind::DateTime, Value::DateTime(v)) => out.put_i64(datetime_ticks(v)?),
        (PrimitiveKind::DateTimeOffset, Value::DateTimeOffset(v)) => {
            let (ticks, minutes) = offset_ticks(v)?;
            out.put_i64(ticks);
            out.put_i16(minutes);
        }
        (PrimitiveKind::TimeSpan, Value::TimeSpan(v)) => out.put_i64(timespan_ticks(v)?),
        (PrimitiveKind::Date, Value::Date(v)) => out.put_i32(date_days(v)),
        (PrimitiveKind::Time, Value::Time(v)) => out.put_i64(time_ticks(v)),
        (PrimitiveKind::Guid, Value::Guid(v)) => out.put_slice(&v.to_bytes_le()),
        (PrimitiveKind::String, Value::String(s)) => {
            let bytes = encoding.encode(s);
            encode_len(bytes.len())?;
            out.put_prefixed(&bytes);
        }
        (kind, other) => return Err(CodecError::mismatch(kind.name(), other.kind_name())),
    }
    Ok(())
}

/// Decodes a fixed-width primitive from exactly `kind.fixed_width()` bytes.
pub fn read_fixed(kind: PrimitiveKind, bytes: &[u8]) -> Result<Value, CodecError> {
    let mut cur = ReadCursor::new(bytes);
    let short = || CodecError::UnexpectedEof {
        needed: kind.fixed_width().unwrap_or(0).saturating_sub(bytes.len()),
    };
    let value = match kind {
        PrimitiveKind::Bool => Value::Bool(cur.read_u8().ok_or_else(short)? != 0),
        PrimitiveKind::I8 => Value::I8(cur.read_u8().ok_or_else(short)? as i8),
        PrimitiveKind::U8 => Value::U8(cur.read_u8().ok_or_else(short)?),
        PrimitiveKind::I16 => Value::I16(cur.read_i16().ok_or_else(short)?),
        PrimitiveKind::U16 => Value::U16(cur.read_u16().ok_or_else(short)?),
        PrimitiveKind::I32 => Value::I32(cur.read_i32().ok_or_else(short)?),
        PrimitiveKind::U32 => Value::U32(cur.read_u32().ok_or_else(short)?),
        PrimitiveKind::I64 => Value::I64(cur.read_i64().ok_or_else(short)?),
        PrimitiveKind::U64 => Value::U64(cur.read_u64().ok_or_else(short)?),
        PrimitiveKind::F32 => Value::F32(f32::from_bits(cur.read_u32().ok_or_else(short)?)),
        PrimitiveKind::F64 => Value::F64(f64::from_bits(cur.read_u64().ok_or_else(short)?)),
        PrimitiveKind::Decimal => {
            let mut words = [0u32; 4];
            for word in &mut words {
                *word = cur.read_u32().ok_or_else(short)?;
            }
            let decimal = Decimal::from_words(words).ok_or_else(|| CodecError::Conversion {
                from: "wire".into(),
                to: "decimal".into(),
                reason: format!("malformed decimal words {:08x?}", words),
            })?;
            Value::Decimal(decimal)
        }
        PrimitiveKind::Char => {
            let unit = cur.read_u16().ok_or_else(short)?;
            Value::Char(char::from_u32(unit as u32).ok_or(CodecError::InvalidText)?)
        }
        PrimitiveKind::DateTime => {
            Value::DateTime(datetime_from_ticks(cur.read_i64().ok_or_else(short)?)?)
        }
        PrimitiveKind::DateTimeOffset => {
            let ticks = cur.read_i64().ok_or_else(short)?;
            let minutes = cur.read_i16().ok_or_else(short)?;
            Value::DateTimeOffset(offset_from_ticks(ticks, minutes)?)
        }
        PrimitiveKind::TimeSpan => Value::TimeSpan(timespan_from_ticks(
            cur.read_i64().ok_or_else(short)?,
        )),
        PrimitiveKind::Date => Value::Date(date_from_days(cur.read_i32().ok_or_else(short)?)?),
        PrimitiveKind::Time => Value::Time(time_from_ticks(cur.read_i64().ok_or_else(short)?)?),
        PrimitiveKind::Guid => {
            let raw = cur.take(16).ok_or_else(short)?;
            let mut le = [0u8; 16];
            le.copy_from_slice(raw);
            Value::Guid(Uuid::from_bytes_le(le))
        }
        PrimitiveKind::String => {
            return Err(CodecError::invalid_type(
                "string",
                "strings are length-prefixed, not fixed width",
            ))
        }
    };
    Ok(value)
}

fn char_unit(c: char) -> Result<u16, CodecError> {
    u16::try_from(c as u32).map_err(|_| CodecError::InvalidChar(c))
}

fn tick_overflow(to: &str) -> CodecError {
    CodecError::Conversion {
        from: "ticks".into(),
        to: to.into(),
        reason: "value out of range".into(),
    }
}

fn naive_ticks(naive: &NaiveDateTime) -> Result<i64, CodecError> {
    let utc = naive.and_utc();
    let nanos = (utc.timestamp_subsec_nanos() as i64).min(999_999_999);
    utc.timestamp()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(nanos / 100))
        .and_then(|t| t.checked_add(UNIX_EPOCH_TICKS))
        .ok_or_else(|| tick_overflow("datetime"))
}

fn naive_from_ticks(ticks: i64) -> Result<NaiveDateTime, CodecError> {
    let since_epoch = ticks
        .checked_sub(UNIX_EPOCH_TICKS)
        .ok_or_else(|| tick_overflow("datetime"))?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = (since_epoch.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| tick_overflow("datetime"))
}

pub fn datetime_ticks(dt: &DateTime<Utc>) -> Result<i64, CodecError> {
    naive_ticks(&dt.naive_utc())
}

pub fn datetime_from_ticks(ticks: i64) -> Result<DateTime<Utc>, CodecError> {
    naive_from_ticks(ticks).map(|naive| naive.and_utc())
}

/// Local ticks plus the offset in whole minutes.
pub fn offset_ticks(dt: &DateTime<FixedOffset>) -> Result<(i64, i16), CodecError> {
    let seconds = dt.offset().local_minus_utc();
    if seconds % 60 != 0 {
        return Err(CodecError::Conversion {
            from: "datetimeoffset".into(),
            to: "wire".into(),
            reason: format!("offset of {}s is not a whole number of minutes", seconds),
        });
    }
    Ok((naive_ticks(&dt.naive_local())?, (seconds / 60) as i16))
}

pub fn offset_from_ticks(ticks: i64, minutes: i16) -> Result<DateTime<FixedOffset>, CodecError> {
    let offset = FixedOffset::east_opt(minutes as i32 * 60)
        .ok_or_else(|| tick_overflow("datetimeoffset"))?;
    let local = naive_from_ticks(ticks)?;
    let utc = local
        .checked_sub_signed(TimeDelta::seconds(offset.local_minus_utc() as i64))
        .ok_or_else(|| tick_overflow("datetimeoffset"))?;
    Ok(DateTime::from_naive_utc_and_offset(utc, offset))
}

pub fn timespan_ticks(span: &TimeDelta) -> Result<i64, CodecError> {
    span.num_seconds()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(span.subsec_nanos() as i64 / 100))
        .ok_or_else(|| tick_overflow("timespan"))
}

pub fn timespan_from_ticks(ticks: i64) -> TimeDelta {
    TimeDelta::seconds(ticks / TICKS_PER_SECOND)
        + TimeDelta::nanoseconds((ticks % TICKS_PER_SECOND) * 100)
}

pub fn date_days(date: &NaiveDate) -> i32 {
    date.num_days_from_ce() - 1
}

pub fn date_from_days(days: i32) -> Result<NaiveDate, CodecError> {
    days.checked_add(1)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| tick_overflow("date"))
}

pub fn time_ticks(time: &NaiveTime) -> i64 {
    let nanos = time.nanosecond().min(999_999_999) as i64;
    time.num_seconds_from_midnight() as i64 * TICKS_PER_SECOND + nanos / 100
}

pub fn time_from_ticks(ticks: i64) -> Result<NaiveTime, CodecError> {
    if !(0..86_400 * TICKS_PER_SECOND).contains(&ticks) {
        return Err(tick_overflow("time"));
    }
    let secs = (ticks / TICKS_PER_SECOND) as u32;
    let nanos = ((ticks % TICKS_PER_SECOND) * 100) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos).ok_or_else(|| tick_overflow("time"))
}
