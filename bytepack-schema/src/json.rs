//! JSON bridge.
//!
//! Converts between JSON documents and codec values under the guidance of
//! a type descriptor:
//!
//! - primitives map to JSON scalars; dates, times, guids, decimals and
//!   timespans (as ticks) are strings
//! - enums are their underlying integer
//! - maps with string keys are JSON objects, other maps are arrays of
//!   `[key, value]` pairs
//! - at polymorphic positions records carry a `"$type"` field and other
//!   values are wrapped as `{"$type": ..., "$value": ...}`

use crate::error::SchemaError;
use bytepack_core::converter::primitive;
use bytepack_core::{
    CollectionShape, Decimal, PrimitiveKind, Record, TypeKind, TypeRef, TypeRegistry, Value,
};
use serde_json::{Map, Number, Value as Json};

const TYPE_FIELD: &str = "$type";
const VALUE_FIELD: &str = "$value";

/// Renders `value`, declared as `ty`, as JSON.
pub fn to_json(value: &Value, ty: &TypeRef, registry: &TypeRegistry) -> Result<Json, SchemaError> {
    encode(value, ty, registry, "$")
}

/// Builds a value of type `ty` from JSON.
pub fn from_json(json: &Json, ty: &TypeRef, registry: &TypeRegistry) -> Result<Value, SchemaError> {
    decode(json, ty, registry, "$")
}

fn encode(value: &Value, ty: &TypeRef, registry: &TypeRegistry, path: &str) -> Result<Json, SchemaError> {
    let ty = registry.resolve(ty)?;
    if value.is_null() {
        return if ty.is_nullable() {
            Ok(Json::Null)
        } else {
            Err(SchemaError::mismatch(path, ty.name(), "null"))
        };
    }
    if ty.is_polymorphic() {
        let concrete = registry.type_of(value)?;
        if !registry.is_assignable(&concrete, &ty) {
            return Err(SchemaError::mismatch(path, ty.name(), concrete.name()));
        }
        let inner = encode(value, &concrete, registry, path)?;
        return Ok(tag(concrete.name(), inner));
    }

    match ty.kind() {
        TypeKind::Primitive { kind, .. } => encode_primitive(value, *kind, path),
        TypeKind::Enum(e) => {
            let raw = value
                .as_i128()
                .ok_or_else(|| SchemaError::mismatch(path, ty.name(), value.kind_name()))?;
            // unsigned 64-bit enums keep their bit pattern in an i64
            let raw = match (e.underlying, value) {
                (PrimitiveKind::U64, Value::Enum(v)) => v.value as u64 as i128,
                _ => raw,
            };
            Ok(integer_json(raw))
        }
        TypeKind::Collection(c) if c.shape.is_dictionary() => {
            let (Some(key_ty), Some(value_ty)) = (&c.key, &c.value) else {
                return Err(SchemaError::invalid(ty.name(), "dictionary without key or value type"));
            };
            let Value::Map(entries) = value else {
                return Err(SchemaError::mismatch(path, ty.name(), value.kind_name()));
            };
            let string_keys = registry.resolve(key_ty)?.primitive_kind() == Some(PrimitiveKind::String);
            if string_keys {
                let mut object = Map::new();
                for (k, v) in entries {
                    let Value::String(k) = k else {
                        return Err(SchemaError::mismatch(path, "a string key", k.kind_name()));
                    };
                    let child = format!("{}.{}", path, k);
                    object.insert(k.clone(), encode(v, value_ty, registry, &child)?);
                }
                Ok(Json::Object(object))
            } else {
                let mut pairs = Vec::with_capacity(entries.len());
                for (i, (k, v)) in entries.iter().enumerate() {
                    let child = format!("{}[{}]", path, i);
                    pairs.push(Json::Array(vec![
                        encode(k, key_ty, registry, &child)?,
                        encode(v, value_ty, registry, &child)?,
                    ]));
                }
                Ok(Json::Array(pairs))
            }
        }
        TypeKind::Collection(c) => {
            let Some(element) = &c.element else {
                return Err(SchemaError::invalid(ty.name(), "collection without element type"));
            };
            let items = value
                .as_elements()
                .ok_or_else(|| SchemaError::mismatch(path, ty.name(), value.kind_name()))?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| encode(item, element, registry, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array)
        }
        TypeKind::Object(o) => {
            let record = value
                .as_record()
                .ok_or_else(|| SchemaError::mismatch(path, ty.name(), value.kind_name()))?;
            let mut object = Map::new();
            for member in o.members.iter().filter(|m| !m.ignored) {
                let Some(field) = member.accessor.get(record) else {
                    continue;
                };
                let child = format!("{}.{}", path, member.name);
                object.insert(member.name.clone(), encode(field, &member.ty, registry, &child)?);
            }
            Ok(Json::Object(object))
        }
        TypeKind::Any | TypeKind::Named(_) => Err(SchemaError::mismatch(path, "a resolved type", ty.name())),
    }
}

fn encode_primitive(value: &Value, kind: PrimitiveKind, path: &str) -> Result<Json, SchemaError> {
    let value = primitive::convert(value, kind)?;
    let json = match &value {
        Value::Bool(b) => Json::Bool(*b),
        Value::F32(f) => float_json(*f as f64, &value)?,
        Value::F64(f) => float_json(*f, &value)?,
        other => match other.as_i128() {
            Some(i) => integer_json(i),
            None => text(other, path)?,
        },
    };
    Ok(json)
}

fn float_json(f: f64, value: &Value) -> Result<Json, SchemaError> {
    match Number::from_f64(f) {
        Some(n) => Ok(Json::Number(n)),
        // NaN and infinities have no JSON number form
        None => text(value, "$"),
    }
}

fn integer_json(i: i128) -> Json {
    if let Ok(v) = i64::try_from(i) {
        Json::from(v)
    } else if let Ok(v) = u64::try_from(i) {
        Json::from(v)
    } else {
        Json::String(i.to_string())
    }
}

fn text(value: &Value, path: &str) -> Result<Json, SchemaError> {
    match primitive::convert(value, PrimitiveKind::String)? {
        Value::String(s) => Ok(Json::String(s)),
        other => Err(SchemaError::mismatch(path, "text", other.kind_name())),
    }
}

fn tag(type_name: &str, inner: Json) -> Json {
    let mut object = Map::new();
    object.insert(TYPE_FIELD.to_owned(), Json::String(type_name.to_owned()));
    match inner {
        Json::Object(fields) => object.extend(fields),
        other => {
            object.insert(VALUE_FIELD.to_owned(), other);
        }
    }
    Json::Object(object)
}

fn decode(json: &Json, ty: &TypeRef, registry: &TypeRegistry, path: &str) -> Result<Value, SchemaError> {
    let ty = registry.resolve(ty)?;
    if json.is_null() {
        return if ty.is_nullable() {
            Ok(Value::Null)
        } else {
            Err(SchemaError::mismatch(path, ty.name(), "null"))
        };
    }
    if ty.is_polymorphic() {
        return decode_polymorphic(json, &ty, registry, path);
    }

    match ty.kind() {
        TypeKind::Primitive { kind, .. } => decode_primitive(json, *kind, path),
        TypeKind::Enum(e) => {
            let raw = match json {
                Json::Number(n) => n.as_i64().map(Value::I64).or_else(|| n.as_u64().map(Value::U64)),
                Json::String(s) => s.trim().parse::<i64>().ok().map(Value::I64),
                _ => None,
            }
            .ok_or_else(|| SchemaError::mismatch(path, ty.name(), describe(json)))?;
            primitive::to_integer(&raw, e.underlying)
                .map_err(|err| SchemaError::mismatch(path, ty.name(), err.to_string()))?;
            let bits = match raw {
                Value::U64(u) => u as i64,
                other => other.as_i128().unwrap_or_default() as i64,
            };
            Ok(Value::enumeration(ty.name().trim_end_matches('?'), bits))
        }
        TypeKind::Collection(c) if c.shape.is_dictionary() => {
            let (Some(key_ty), Some(value_ty)) = (&c.key, &c.value) else {
                return Err(SchemaError::invalid(ty.name(), "dictionary without key or value type"));
            };
            let mut entries: Vec<(Value, Value)> = Vec::new();
            let mut push = |k: Value, v: Value| match entries.iter_mut().find(|(e, _)| *e == k) {
                Some(existing) => existing.1 = v,
                None => entries.push((k, v)),
            };
            match json {
                Json::Object(object) => {
                    for (k, v) in object {
                        let child = format!("{}.{}", path, k);
                        let key = decode(&Json::String(k.clone()), key_ty, registry, &child)?;
                        push(key, decode(v, value_ty, registry, &child)?);
                    }
                }
                Json::Array(pairs) => {
                    for (i, pair) in pairs.iter().enumerate() {
                        let child = format!("{}[{}]", path, i);
                        let Some([k, v]) = pair.as_array().map(Vec::as_slice) else {
                            return Err(SchemaError::mismatch(&child, "a [key, value] pair", describe(pair)));
                        };
                        push(
                            decode(k, key_ty, registry, &child)?,
                            decode(v, value_ty, registry, &child)?,
                        );
                    }
                }
                other => return Err(SchemaError::mismatch(path, ty.name(), describe(other))),
            }
            Ok(Value::Map(entries))
        }
        TypeKind::Collection(c) => {
            let Some(element) = &c.element else {
                return Err(SchemaError::invalid(ty.name(), "collection without element type"));
            };
            let Json::Array(items) = json else {
                return Err(SchemaError::mismatch(path, ty.name(), describe(json)));
            };
            let mut values = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let value = decode(item, element, registry, &format!("{}[{}]", path, i))?;
                if c.shape == CollectionShape::Set && values.contains(&value) {
                    continue;
                }
                values.push(value);
            }
            Ok(if c.shape == CollectionShape::Set {
                Value::Set(values)
            } else {
                Value::List(values)
            })
        }
        TypeKind::Object(o) => {
            let Json::Object(object) = json else {
                return Err(SchemaError::mismatch(path, ty.name(), describe(json)));
            };
            let mut record = Record::new(ty.name());
            for (field, value) in object {
                if field == TYPE_FIELD {
                    continue;
                }
                let Some(member) = o.members.iter().find(|m| m.name == *field) else {
                    return Err(SchemaError::UnknownField {
                        path: path.to_owned(),
                        type_name: ty.name().to_owned(),
                        field: field.clone(),
                    });
                };
                if member.ignored {
                    continue;
                }
                let child = format!("{}.{}", path, field);
                let decoded = decode(value, &member.ty, registry, &child)?;
                if !decoded.is_null() {
                    member.accessor.set(&mut record, decoded);
                }
            }
            Ok(Value::Record(record))
        }
        TypeKind::Any | TypeKind::Named(_) => Err(SchemaError::mismatch(path, "a resolved type", ty.name())),
    }
}

fn decode_polymorphic(
    json: &Json,
    declared: &TypeRef,
    registry: &TypeRegistry,
    path: &str,
) -> Result<Value, SchemaError> {
    let named = json
        .as_object()
        .and_then(|o| o.get(TYPE_FIELD))
        .and_then(Json::as_str);
    let Some(name) = named else {
        if matches!(declared.kind(), TypeKind::Any) {
            return infer(json, path);
        }
        return Err(SchemaError::mismatch(path, format!("a {} field", TYPE_FIELD), describe(json)));
    };
    let concrete = registry.lookup(name)?;
    if !registry.is_assignable(&concrete, declared) {
        return Err(SchemaError::mismatch(path, declared.name(), name));
    }
    match json.get(VALUE_FIELD) {
        Some(inner) => decode(inner, &concrete, registry, path),
        None => decode(json, &concrete, registry, path),
    }
}

/// Untagged JSON at an `any` position.
fn infer(json: &Json, path: &str) -> Result<Value, SchemaError> {
    let value = match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::I64(i),
            (None, Some(u), _) => Value::U64(u),
            (_, _, Some(f)) => Value::F64(f),
            _ => return Err(SchemaError::mismatch(path, "a number", n.to_string())),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| infer(item, &format!("{}[{}]", path, i)))
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(_) => {
            return Err(SchemaError::mismatch(path, format!("a {} field", TYPE_FIELD), "an untyped object"))
        }
    };
    Ok(value)
}

fn decode_primitive(json: &Json, kind: PrimitiveKind, path: &str) -> Result<Value, SchemaError> {
    let raw = match json {
        Json::Bool(b) => Value::Bool(*b),
        Json::String(s) => Value::String(s.clone()),
        Json::Number(n) if kind == PrimitiveKind::Decimal => {
            let parsed: Decimal = n
                .to_string()
                .parse()
                .map_err(|_| SchemaError::mismatch(path, kind.name(), n.to_string()))?;
            Value::Decimal(parsed)
        }
        Json::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::I64(i),
            (None, Some(u), _) => Value::U64(u),
            (_, _, Some(f)) => Value::F64(f),
            _ => return Err(SchemaError::mismatch(path, kind.name(), n.to_string())),
        },
        other => return Err(SchemaError::mismatch(path, kind.name(), describe(other))),
    };
    primitive::convert(&raw, kind).map_err(|e| SchemaError::mismatch(path, kind.name(), e.to_string()))
}

fn describe(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
