//! Dynamic values handled by the codec.
//!
//! A [`Value`] is an in-memory object graph node. Its shape is described
//! separately by a [`TypeDescriptor`](crate::descriptor::TypeDescriptor);
//! the same value can be encoded under different descriptors.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use uuid::Uuid;

/// Largest magnitude a [`Decimal`] mantissa can hold (96 bits).
const MAX_MANTISSA: u128 = (1u128 << 96) - 1;

/// Largest decimal scale.
const MAX_SCALE: u8 = 28;

/// A 96-bit scaled decimal number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u8,
}

impl Decimal {
    /// Creates a decimal equal to `mantissa / 10^scale`.
    pub fn new(mantissa: i128, scale: u8) -> Option<Self> {
        if mantissa.unsigned_abs() > MAX_MANTISSA || scale > MAX_SCALE {
            return None;
        }
        Some(Self { mantissa, scale })
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Splits into the four 32-bit words used on the wire: lo, mid, hi, flags.
    pub fn to_words(&self) -> [u32; 4] {
        let magnitude = self.mantissa.unsigned_abs();
        let mut flags = (self.scale as u32) << 16;
        if self.mantissa < 0 {
            flags |= 1 << 31;
        }
        [
            magnitude as u32,
            (magnitude >> 32) as u32,
            (magnitude >> 64) as u32,
            flags,
        ]
    }

    /// Rebuilds a decimal from its wire words; `None` if the flags are malformed.
    pub fn from_words(words: [u32; 4]) -> Option<Self> {
        let [lo, mid, hi, flags] = words;
        if flags & 0x7F00_FFFF != 0 {
            return None;
        }
        let scale = ((flags >> 16) & 0xFF) as u8;
        let magnitude = (lo as u128) | ((mid as u128) << 32) | ((hi as u128) << 64);
        let mantissa = if flags & (1 << 31) != 0 {
            -(magnitude as i128)
        } else {
            magnitude as i128
        };
        Self::new(mantissa, scale)
    }

    /// Integer part, truncated toward zero.
    pub fn trunc(&self) -> i128 {
        self.mantissa / 10i128.pow(self.scale as u32)
    }

    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    pub fn from_i128(value: i128) -> Option<Self> {
        Self::new(value, 0)
    }

    /// Converts through the shortest decimal representation of `value`.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        format!("{}", value).parse().ok()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int, frac) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int, frac)
    }
}

impl FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int, frac) = body.split_once('.').unwrap_or((body, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(format!("invalid decimal: {:?}", s));
        }
        if !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid decimal: {:?}", s));
        }
        let digits = format!("{}{}", int, frac);
        let magnitude: u128 = if digits.is_empty() {
            0
        } else {
            digits
                .parse()
                .map_err(|_| format!("decimal out of range: {:?}", s))?
        };
        let scale = u8::try_from(frac.len()).map_err(|_| format!("scale too large: {:?}", s))?;
        let mantissa = if negative {
            -(magnitude as i128)
        } else {
            magnitude as i128
        };
        Decimal::new(mantissa, scale).ok_or_else(|| format!("decimal out of range: {:?}", s))
    }
}

/// An enum value: its underlying integer plus the enum type it belongs to.
///
/// Unsigned 64-bit underlying values are stored bit-for-bit in `value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub type_name: String,
    pub value: i64,
}

/// A named object instance: its type name and a map of member values.
///
/// A member that is absent from `fields` reads as null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Record {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }
}

/// A node in an object graph.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    DateTime(DateTime<Utc>),
    DateTimeOffset(DateTime<FixedOffset>),
    TimeSpan(TimeDelta),
    Date(NaiveDate),
    Time(NaiveTime),
    Guid(Uuid),
    String(String),
    Enum(EnumValue),
    List(Vec<Value>),
    Set(Vec<Value>),
    /// Ordered key/value entries.
    Map(Vec<(Value, Value)>),
    Record(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Decimal(_) => "decimal",
            Value::Char(_) => "char",
            Value::DateTime(_) => "datetime",
            Value::DateTimeOffset(_) => "datetimeoffset",
            Value::TimeSpan(_) => "timespan",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Guid(_) => "guid",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }

    /// Shorthand for an enum value.
    pub fn enumeration(type_name: impl Into<String>, value: i64) -> Self {
        Value::Enum(EnumValue {
            type_name: type_name.into(),
            value,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Elements of a list or set.
    pub fn as_elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Integer payload widened to `i128`, including enum values.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::I8(v) => Some(*v as i128),
            Value::I16(v) => Some(*v as i128),
            Value::I32(v) => Some(*v as i128),
            Value::I64(v) => Some(*v as i128),
            Value::U8(v) => Some(*v as i128),
            Value::U16(v) => Some(*v as i128),
            Value::U32(v) => Some(*v as i128),
            Value::U64(v) => Some(*v as i128),
            Value::Enum(e) => Some(e.value as i128),
            _ => None,
        }
    }
}

// Floats compare and hash by bit pattern so values can key maps and sets.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (F32(a), F32(b)) => a.to_bits() == b.to_bits(),
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (Decimal(a), Decimal(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (DateTimeOffset(a), DateTimeOffset(b)) => {
                a == b && a.offset().local_minus_utc() == b.offset().local_minus_utc()
            }
            (TimeSpan(a), TimeSpan(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (Guid(a), Guid(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Set(a), Set(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Record(a), Record(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::I8(v) => v.hash(state),
            Value::I16(v) => v.hash(state),
            Value::I32(v) => v.hash(state),
            Value::I64(v) => v.hash(state),
            Value::U8(v) => v.hash(state),
            Value::U16(v) => v.hash(state),
            Value::U32(v) => v.hash(state),
            Value::U64(v) => v.hash(state),
            Value::F32(v) => v.to_bits().hash(state),
            Value::F64(v) => v.to_bits().hash(state),
            Value::Decimal(v) => v.hash(state),
            Value::Char(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
            Value::DateTimeOffset(v) => {
                v.hash(state);
                v.offset().local_minus_utc().hash(state);
            }
            Value::TimeSpan(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Time(v) => v.hash(state),
            Value::Guid(v) => v.hash(state),
            Value::String(v) => v.hash(state),
            Value::Enum(v) => v.hash(state),
            Value::List(v) | Value::Set(v) => v.hash(state),
            Value::Map(v) => v.hash(state),
            Value::Record(v) => v.hash(state),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    char => Char,
    DateTime<Utc> => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    TimeDelta => TimeSpan,
    NaiveDate => Date,
    NaiveTime => Time,
    Uuid => Guid,
    String => String,
    EnumValue => Enum,
    Record => Record,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_decimal_words_roundtrip() {
        let d = Decimal::new(-123_456_789, 4).unwrap();
        let words = d.to_words();
        assert_eq!(words[3], (4 << 16) | (1 << 31));
        assert_eq!(Decimal::from_words(words), Some(d));
    }

    #[test]
    fn test_decimal_rejects_out_of_range() {
        assert!(Decimal::new(1, 29).is_none());
        assert!(Decimal::new(1i128 << 96, 0).is_none());
        assert!(Decimal::from_words([0, 0, 0, 1]).is_none());
    }

    #[test]
    fn test_decimal_display_and_parse() {
        let d: Decimal = "-12.034".parse().unwrap();
        assert_eq!(d.mantissa(), -12034);
        assert_eq!(d.scale(), 3);
        assert_eq!(d.to_string(), "-12.034");
        assert_eq!(Decimal::new(5, 3).unwrap().to_string(), "0.005");
        assert_eq!(d.trunc(), -12);
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_decimal_from_f64() {
        let d = Decimal::from_f64(2.5).unwrap();
        assert_eq!(d.to_string(), "2.5");
        assert!(Decimal::from_f64(f64::NAN).is_none());
    }

    #[test]
    fn test_float_equality_by_bits() {
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
        assert_ne!(Value::F64(0.0), Value::F64(-0.0));
    }

    #[test]
    fn test_values_hash_as_set_members() {
        let mut set = HashSet::new();
        set.insert(Value::from("a"));
        set.insert(Value::from("a"));
        set.insert(Value::I32(1));
        set.insert(Value::I64(1));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_record_builder() {
        let r = Record::new("Order").with("id", 42).with("name", "ok");
        assert_eq!(r.get("id"), Some(&Value::I32(42)));
        assert_eq!(r.get("missing"), None);
        let v = Value::from(r.clone());
        assert_eq!(v.as_record(), Some(&r));
    }

    #[test]
    fn test_from_option_and_vec() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(3u8)), Value::U8(3));
        assert_eq!(
            Value::from(vec!["a", "b"]),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_as_i128_covers_enums() {
        assert_eq!(Value::enumeration("Color", -2).as_i128(), Some(-2));
        assert_eq!(Value::U64(u64::MAX).as_i128(), Some(u64::MAX as i128));
        assert_eq!(Value::from("x").as_i128(), None);
    }
}
