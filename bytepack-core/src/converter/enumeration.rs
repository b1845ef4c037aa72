//! Enum converters.
//!
//! Enums travel as their underlying integer. Decoding does not check the
//! integer against the declared variants: any value that fits the
//! underlying width is accepted.

use crate::converter::primitive;
use crate::descriptor::{PrimitiveKind, TypeKind, TypeRef};
use crate::error::CodecError;
use crate::value::Value;

/// What a decoded enum integer becomes in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumTarget {
    Enum {
        type_name: String,
        underlying: PrimitiveKind,
    },
    Integer(PrimitiveKind),
}

#[derive(Debug)]
pub struct EnumConverter {
    wire: PrimitiveKind,
    target: EnumTarget,
}

impl EnumConverter {
    pub(crate) fn build(memory: &TypeRef, wire: &TypeRef) -> Result<Self, CodecError> {
        let wire_kind = integer_kind(wire)?;
        let target = match memory.kind() {
            TypeKind::Enum(e) => EnumTarget::Enum {
                type_name: base_name(memory.name()).to_owned(),
                underlying: e.underlying,
            },
            _ => EnumTarget::Integer(integer_kind(memory)?),
        };
        let memory_kind = match &target {
            EnumTarget::Enum { underlying, .. } => *underlying,
            EnumTarget::Integer(kind) => *kind,
        };
        if !memory_kind.is_integer() {
            return Err(CodecError::invalid_type(
                memory.name(),
                "enum underlying type must be an integer",
            ));
        }
        Ok(Self {
            wire: wire_kind,
            target,
        })
    }

    /// Underlying integer kind on the wire.
    pub fn wire_kind(&self) -> PrimitiveKind {
        self.wire
    }

    pub fn target(&self) -> &EnumTarget {
        &self.target
    }

    /// Whether memory and wire widths differ.
    pub fn is_converting(&self) -> bool {
        match &self.target {
            EnumTarget::Enum { underlying, .. } => *underlying != self.wire,
            EnumTarget::Integer(_) => true,
        }
    }

    /// Memory value to the wire integer value.
    ///
    /// A u64-backed enum holds its bit pattern in the `i64` of [`EnumValue`],
    /// so values above `i64::MAX` are stored negative.
    ///
    /// [`EnumValue`]: crate::value::EnumValue
    pub fn to_wire(&self, value: &Value) -> Result<Value, CodecError> {
        match (&self.target, value) {
            (
                EnumTarget::Enum {
                    underlying: PrimitiveKind::U64,
                    ..
                },
                Value::Enum(e),
            ) => primitive::to_integer(&Value::U64(e.value as u64), self.wire),
            _ => primitive::to_integer(value, self.wire),
        }
    }

    /// Wire integer value to the memory value.
    pub fn from_wire(&self, value: &Value) -> Result<Value, CodecError> {
        let raw = value
            .as_i128()
            .ok_or_else(|| CodecError::mismatch("an integer", value.kind_name()))?;
        match &self.target {
            EnumTarget::Enum {
                type_name,
                underlying,
            } => {
                primitive::to_integer(value, *underlying)?;
                Ok(Value::enumeration(type_name.clone(), raw as i64))
            }
            EnumTarget::Integer(kind) => primitive::to_integer(value, *kind),
        }
    }
}

fn integer_kind(ty: &TypeRef) -> Result<PrimitiveKind, CodecError> {
    let kind = match ty.kind() {
        TypeKind::Enum(e) => e.underlying,
        TypeKind::Primitive { kind, .. } => *kind,
        _ => {
            return Err(CodecError::invalid_type(
                ty.name(),
                "only enums and integers can pair with an enum",
            ))
        }
    };
    if !kind.is_integer() {
        return Err(CodecError::invalid_type(
            ty.name(),
            "enum underlying type must be an integer",
        ));
    }
    Ok(kind)
}

fn base_name(name: &str) -> &str {
    name.strip_suffix('?').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeDescriptor;

    #[test]
    fn test_enum_roundtrip_values() {
        let color = TypeDescriptor::enumeration("Color", PrimitiveKind::U8);
        let conv = EnumConverter::build(&color, &color).unwrap();
        assert!(!conv.is_converting());
        let wire = conv.to_wire(&Value::enumeration("Color", 2)).unwrap();
        assert_eq!(wire, Value::U8(2));
        assert_eq!(conv.from_wire(&wire).unwrap(), Value::enumeration("Color", 2));
    }

    #[test]
    fn test_out_of_range_variant_decodes() {
        let color = TypeDescriptor::enumeration("Color", PrimitiveKind::U8);
        let conv = EnumConverter::build(&color, &color).unwrap();
        assert_eq!(
            conv.from_wire(&Value::U8(200)).unwrap(),
            Value::enumeration("Color", 200)
        );
    }

    #[test]
    fn test_u64_enum_keeps_high_bit() {
        let big = TypeDescriptor::enumeration("Big", PrimitiveKind::U64);
        let conv = EnumConverter::build(&big, &big).unwrap();
        let decoded = conv.from_wire(&Value::U64(u64::MAX)).unwrap();
        assert_eq!(decoded, Value::enumeration("Big", -1));
        assert_eq!(conv.to_wire(&decoded).unwrap(), Value::U64(u64::MAX));

        let narrow = TypeDescriptor::enumeration("Big", PrimitiveKind::I64);
        let conv = EnumConverter::build(&big, &narrow).unwrap();
        assert!(conv.to_wire(&decoded).is_err());
    }

    #[test]
    fn test_width_mismatch() {
        let wide = TypeDescriptor::enumeration("Level", PrimitiveKind::I64);
        let narrow = TypeDescriptor::enumeration("Level", PrimitiveKind::I8);
        let conv = EnumConverter::build(&wide, &narrow).unwrap();
        assert!(conv.is_converting());
        assert_eq!(conv.to_wire(&Value::enumeration("Level", -3)).unwrap(), Value::I8(-3));
        assert!(conv.to_wire(&Value::enumeration("Level", 1000)).is_err());
    }

    #[test]
    fn test_enum_to_integer_memory() {
        let color = TypeDescriptor::enumeration("Color", PrimitiveKind::U8);
        let int = TypeDescriptor::primitive(PrimitiveKind::I32);
        let conv = EnumConverter::build(&int, &color).unwrap();
        assert_eq!(conv.to_wire(&Value::I32(4)).unwrap(), Value::U8(4));
        assert_eq!(conv.from_wire(&Value::U8(4)).unwrap(), Value::I32(4));
    }

    #[test]
    fn test_non_integer_underlying_rejected() {
        let bad = TypeDescriptor::enumeration("Bad", PrimitiveKind::F32);
        assert!(EnumConverter::build(&bad, &bad).unwrap_err().is_construction());
        let color = TypeDescriptor::enumeration("Color", PrimitiveKind::U8);
        assert!(EnumConverter::build(&TypeDescriptor::string(), &color).is_err());
    }
}
