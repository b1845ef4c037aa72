//! Primitive conversions between mismatched memory and wire kinds.
//!
//! Numeric conversions are checked: a value that does not fit the target
//! kind is a [`CodecError::Conversion`], never a silent wrap.

use crate::descriptor::PrimitiveKind;
use crate::error::CodecError;
use crate::value::{Decimal, Value};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

/// Whether values of `from` can be converted to `to` at all.
pub fn is_convertible(from: PrimitiveKind, to: PrimitiveKind) -> bool {
    use PrimitiveKind::*;
    if from == to || from == String || to == String {
        return true;
    }
    let numeric_like = |k: PrimitiveKind| k.is_numeric() || matches!(k, Bool | Char);
    match (from, to) {
        (a, b) if numeric_like(a) && numeric_like(b) => true,
        (DateTime | DateTimeOffset, DateTime | DateTimeOffset | Date) => true,
        (TimeSpan, I64) | (I64, TimeSpan) => true,
        _ => false,
    }
}

/// Numeric view of a value.
enum Number {
    Int(i128),
    Float(f64),
    Decimal(Decimal),
}

fn number(value: &Value) -> Option<Number> {
    match value {
        Value::Bool(b) => Some(Number::Int(*b as i128)),
        Value::Char(c) => Some(Number::Int(*c as i128)),
        Value::F32(v) => Some(Number::Float(*v as f64)),
        Value::F64(v) => Some(Number::Float(*v)),
        Value::Decimal(d) => Some(Number::Decimal(*d)),
        other => other.as_i128().map(Number::Int),
    }
}

fn fail(value: &Value, to: PrimitiveKind, reason: impl Into<String>) -> CodecError {
    CodecError::Conversion {
        from: value.kind_name().to_owned(),
        to: to.name().to_owned(),
        reason: reason.into(),
    }
}

/// Converts `value` to the primitive kind `to`.
pub fn convert(value: &Value, to: PrimitiveKind) -> Result<Value, CodecError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if to == PrimitiveKind::String {
        return Ok(Value::String(to_text(value)?));
    }
    if let Value::String(text) = value {
        return parse_text(text, to).ok_or_else(|| fail(value, to, format!("cannot parse {:?}", text)));
    }
    if to.is_numeric() || matches!(to, PrimitiveKind::Bool | PrimitiveKind::Char) {
        if let Some(n) = number(value) {
            return from_number(n, to).map_err(|reason| fail(value, to, reason));
        }
    }
    let converted = match (value, to) {
        (Value::DateTime(v), PrimitiveKind::DateTime) => Value::DateTime(*v),
        (Value::DateTime(v), PrimitiveKind::DateTimeOffset) => Value::DateTimeOffset(v.fixed_offset()),
        (Value::DateTime(v), PrimitiveKind::Date) => Value::Date(v.date_naive()),
        (Value::DateTimeOffset(v), PrimitiveKind::DateTime) => Value::DateTime(v.with_timezone(&Utc)),
        (Value::DateTimeOffset(v), PrimitiveKind::DateTimeOffset) => Value::DateTimeOffset(*v),
        (Value::DateTimeOffset(v), PrimitiveKind::Date) => Value::Date(v.date_naive()),
        (Value::TimeSpan(v), PrimitiveKind::I64) => {
            Value::I64(crate::wire::timespan_ticks(v)?)
        }
        (Value::I64(ticks), PrimitiveKind::TimeSpan) => {
            Value::TimeSpan(crate::wire::timespan_from_ticks(*ticks))
        }
        (v, to) if v.kind_name() == to.name() => v.clone(),
        _ => return Err(fail(value, to, "no conversion between these kinds")),
    };
    Ok(converted)
}

fn from_number(n: Number, to: PrimitiveKind) -> Result<Value, String> {
    let int = match n {
        Number::Int(i) => i,
        Number::Float(f) if to.is_float() => {
            return Ok(match to {
                PrimitiveKind::F32 => {
                    let narrowed = f as f32;
                    if f.is_finite() && narrowed.is_infinite() {
                        return Err(format!("{} overflows f32", f));
                    }
                    Value::F32(narrowed)
                }
                _ => Value::F64(f),
            });
        }
        Number::Float(f) if to == PrimitiveKind::Decimal => {
            return Decimal::from_f64(f)
                .map(Value::Decimal)
                .ok_or_else(|| format!("{} is not representable as a decimal", f));
        }
        Number::Float(f) => {
            if !f.is_finite() || f.trunc().abs() >= 1e38 {
                return Err(format!("{} is not an integer value in range", f));
            }
            f.trunc() as i128
        }
        Number::Decimal(d) if to == PrimitiveKind::Decimal => return Ok(Value::Decimal(d)),
        Number::Decimal(d) if to.is_float() => {
            return from_number(Number::Float(d.to_f64()), to);
        }
        Number::Decimal(d) => d.trunc(),
    };
    from_int(int, to)
}

fn from_int(v: i128, to: PrimitiveKind) -> Result<Value, String> {
    let range = || format!("{} is out of range for {}", v, to.name());
    let value = match to {
        PrimitiveKind::Bool => Value::Bool(v != 0),
        PrimitiveKind::I8 => Value::I8(i8::try_from(v).map_err(|_| range())?),
        PrimitiveKind::I16 => Value::I16(i16::try_from(v).map_err(|_| range())?),
        PrimitiveKind::I32 => Value::I32(i32::try_from(v).map_err(|_| range())?),
        PrimitiveKind::I64 => Value::I64(i64::try_from(v).map_err(|_| range())?),
        PrimitiveKind::U8 => Value::U8(u8::try_from(v).map_err(|_| range())?),
        PrimitiveKind::U16 => Value::U16(u16::try_from(v).map_err(|_| range())?),
        PrimitiveKind::U32 => Value::U32(u32::try_from(v).map_err(|_| range())?),
        PrimitiveKind::U64 => Value::U64(u64::try_from(v).map_err(|_| range())?),
        PrimitiveKind::F32 => Value::F32(v as f32),
        PrimitiveKind::F64 => Value::F64(v as f64),
        PrimitiveKind::Decimal => Value::Decimal(Decimal::from_i128(v).ok_or_else(range)?),
        PrimitiveKind::Char => {
            let unit = u16::try_from(v).map_err(|_| range())?;
            Value::Char(char::from_u32(unit as u32).ok_or_else(range)?)
        }
        other => return Err(format!("{} is not numeric", other.name())),
    };
    Ok(value)
}

/// Integer-valued view used by enum conversions.
pub fn to_integer(value: &Value, to: PrimitiveKind) -> Result<Value, CodecError> {
    let v = value
        .as_i128()
        .ok_or_else(|| CodecError::mismatch("an integer", value.kind_name()))?;
    from_int(v, to).map_err(|reason| fail(value, to, reason))
}

fn to_text(value: &Value) -> Result<String, CodecError> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Bool(v) => v.to_string(),
        Value::I8(v) => v.to_string(),
        Value::I16(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U8(v) => v.to_string(),
        Value::U16(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::F32(v) => v.to_string(),
        Value::F64(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Char(v) => v.to_string(),
        Value::DateTime(v) => v.to_rfc3339(),
        Value::DateTimeOffset(v) => v.to_rfc3339(),
        Value::TimeSpan(v) => crate::wire::timespan_ticks(v)?.to_string(),
        Value::Date(v) => v.format("%Y-%m-%d").to_string(),
        Value::Time(v) => v.format("%H:%M:%S%.f").to_string(),
        Value::Guid(v) => v.hyphenated().to_string(),
        other => return Err(fail(other, PrimitiveKind::String, "not a primitive")),
    };
    Ok(text)
}

fn parse_text(text: &str, to: PrimitiveKind) -> Option<Value> {
    let text = text.trim();
    let value = match to {
        PrimitiveKind::Bool => Value::Bool(text.parse().ok()?),
        PrimitiveKind::I8 => Value::I8(text.parse().ok()?),
        PrimitiveKind::I16 => Value::I16(text.parse().ok()?),
        PrimitiveKind::I32 => Value::I32(text.parse().ok()?),
        PrimitiveKind::I64 => Value::I64(text.parse().ok()?),
        PrimitiveKind::U8 => Value::U8(text.parse().ok()?),
        PrimitiveKind::U16 => Value::U16(text.parse().ok()?),
        PrimitiveKind::U32 => Value::U32(text.parse().ok()?),
        PrimitiveKind::U64 => Value::U64(text.parse().ok()?),
        PrimitiveKind::F32 => Value::F32(text.parse().ok()?),
        PrimitiveKind::F64 => Value::F64(text.parse().ok()?),
        PrimitiveKind::Decimal => Value::Decimal(text.parse().ok()?),
        PrimitiveKind::Char => {
            let mut chars = text.chars();
            let c = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            Value::Char(c)
        }
        PrimitiveKind::DateTime => {
            Value::DateTime(DateTime::parse_from_rfc3339(text).ok()?.with_timezone(&Utc))
        }
        PrimitiveKind::DateTimeOffset => {
            Value::DateTimeOffset(DateTime::<FixedOffset>::parse_from_rfc3339(text).ok()?)
        }
        PrimitiveKind::TimeSpan => {
            Value::TimeSpan(crate::wire::timespan_from_ticks(text.parse().ok()?))
        }
        PrimitiveKind::Date => Value::Date(NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?),
        PrimitiveKind::Time => Value::Time(NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()?),
        PrimitiveKind::Guid => Value::Guid(Uuid::parse_str(text).ok()?),
        PrimitiveKind::String => Value::String(text.to_owned()),
    };
    Some(value)
}
