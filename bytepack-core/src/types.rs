//! Type registry.
//!
//! Maps type names to descriptors. Composite names such as `list<i32>`,
//! `map<string,Order>` or `i32?` are parsed on demand and cached, so every
//! descriptor reachable from the wire can be found by its name.

use crate::descriptor::{CollectionShape, PrimitiveKind, TypeDescriptor, TypeKind, TypeRef};
use crate::error::CodecError;
use crate::value::Value;
use dashmap::DashMap;
use std::collections::HashSet;

/// Upper bound on `Named` indirections followed before giving up.
const MAX_ALIAS_DEPTH: usize = 32;

/// Concurrent registry of named types.
pub struct TypeRegistry {
    types: DashMap<String, TypeRef>,
}

impl TypeRegistry {
    /// Creates a registry with every primitive, its nullable form, and the
    /// polymorphic containers pre-registered.
    pub fn new() -> Self {
        let registry = Self {
            types: DashMap::new(),
        };
        for kind in PrimitiveKind::ALL {
            registry.register(TypeDescriptor::primitive(kind));
            if !kind.is_reference() {
                registry.register(TypeDescriptor::nullable(kind));
            }
        }
        let any = TypeDescriptor::any();
        registry.register(any.clone());
        registry.register(TypeDescriptor::list(any.clone()));
        registry.register(TypeDescriptor::set(any.clone()));
        registry.register(TypeDescriptor::map(any.clone(), any));
        registry
    }

    /// Registers a type under its own name, replacing any previous entry.
    pub fn register(&self, ty: TypeRef) -> Option<TypeRef> {
        self.types.insert(ty.name().to_owned(), ty)
    }

    /// Returns the type registered under exactly `name`.
    pub fn get(&self, name: &str) -> Option<TypeRef> {
        self.types.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Looks up a name, parsing composite type expressions when the exact
    /// name is not registered. Parsed composites are cached.
    pub fn lookup(&self, name: &str) -> Result<TypeRef, CodecError> {
        if let Some(ty) = self.get(name) {
            return Ok(ty);
        }
        let ty = self.parse(name.trim())?;
        let cached = self
            .types
            .entry(ty.name().to_owned())
            .or_insert(ty)
            .value()
            .clone();
        Ok(cached)
    }

    /// Follows `Named` references to the registered descriptor.
    pub fn resolve(&self, ty: &TypeRef) -> Result<TypeRef, CodecError> {
        let mut current = ty.clone();
        for _ in 0..MAX_ALIAS_DEPTH {
            let target = match current.kind() {
                TypeKind::Named(target) => target.clone(),
                _ => return Ok(current),
            };
            current = match self.get(&target) {
                Some(next) => next,
                None if is_expression(&target) => self.lookup(&target)?,
                None => return Err(CodecError::UnresolvedType(target)),
            };
        }
        Err(CodecError::invalid_type(
            ty.name(),
            "type reference chain is too deep or cyclic",
        ))
    }

    /// Runtime type of a value at a polymorphic position.
    pub fn type_of(&self, value: &Value) -> Result<TypeRef, CodecError> {
        let name = match value {
            Value::Null => return Err(CodecError::mismatch("a non-null value", "null")),
            Value::Enum(e) => e.type_name.as_str(),
            Value::Record(r) => r.type_name.as_str(),
            Value::List(_) => "list<any>",
            Value::Set(_) => "set<any>",
            Value::Map(_) => "map<any,any>",
            other => other.kind_name(),
        };
        self.get(name)
            .ok_or_else(|| CodecError::UnknownType(name.to_owned()))
    }

    /// Whether a value of type `concrete` may stand where `expected` is declared.
    pub fn is_assignable(&self, concrete: &TypeRef, expected: &TypeRef) -> bool {
        let (concrete, expected) = match (self.resolve(concrete), self.resolve(expected)) {
            (Ok(c), Ok(e)) => (c, e),
            _ => return false,
        };
        if matches!(expected.kind(), TypeKind::Any) || concrete.name() == expected.name() {
            return true;
        }
        match (concrete.kind(), expected.kind()) {
            (TypeKind::Primitive { kind: a, .. }, TypeKind::Primitive { kind: b, .. }) => a == b,
            (TypeKind::Enum(_), TypeKind::Enum(_)) => {
                base_name(concrete.name()) == base_name(expected.name())
            }
            (TypeKind::Collection(a), TypeKind::Collection(b)) => {
                a.shape == b.shape
                    && [&b.element, &b.key, &b.value]
                        .into_iter()
                        .flatten()
                        .all(|t| matches!(t.kind(), TypeKind::Any))
            }
            (TypeKind::Object(_), TypeKind::Object(_)) => {
                self.has_supertype(&concrete, expected.name())
            }
            _ => false,
        }
    }

    fn has_supertype(&self, ty: &TypeRef, target: &str) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![ty.clone()];
        while let Some(current) = pending.pop() {
            let Some(object) = current.as_object() else {
                continue;
            };
            for parent in &object.supertypes {
                if parent == target {
                    return true;
                }
                if seen.insert(parent.clone()) {
                    if let Some(next) = self.get(parent) {
                        pending.push(next);
                    }
                }
            }
        }
        false
    }

    fn parse(&self, expr: &str) -> Result<TypeRef, CodecError> {
        if expr.is_empty() {
            return Err(CodecError::UnknownType(expr.to_owned()));
        }
        if let Some(base) = expr.strip_suffix('?') {
            let inner = self.lookup(base)?;
            return match inner.kind() {
                TypeKind::Primitive { kind, .. } => Ok(TypeDescriptor::nullable(*kind)),
                TypeKind::Enum(_) => TypeDescriptor::nullable_enum(&inner)
                    .ok_or_else(|| CodecError::UnknownType(expr.to_owned())),
                _ => Ok(inner),
            };
        }
        let Some(open) = expr.find('<') else {
            return Err(CodecError::UnknownType(expr.to_owned()));
        };
        let body = expr[open + 1..]
            .strip_suffix('>')
            .ok_or_else(|| CodecError::UnknownType(expr.to_owned()))?;
        let (shape, interface) = CollectionShape::from_prefix(expr[..open].trim())
            .ok_or_else(|| CodecError::UnknownType(expr.to_owned()))?;
        let args = split_args(body).ok_or_else(|| CodecError::UnknownType(expr.to_owned()))?;

        match (shape, args.as_slice()) {
            (CollectionShape::Dictionary, [key, value]) => Ok(TypeDescriptor::dictionary(
                interface,
                self.lookup(key)?,
                self.lookup(value)?,
            )),
            (CollectionShape::Dictionary, _) => Err(CodecError::invalid_type(
                expr,
                "dictionary types take a key and a value type",
            )),
            (_, [element]) => Ok(TypeDescriptor::collection(
                shape,
                interface,
                self.lookup(element)?,
            )),
            _ => Err(CodecError::invalid_type(
                expr,
                "collection types take one element type",
            )),
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.len())
            .finish()
    }
}

fn is_expression(name: &str) -> bool {
    name.ends_with('?') || name.contains('<')
}

fn base_name(name: &str) -> &str {
    name.strip_suffix('?').unwrap_or(name)
}

/// Splits `a,map<b,c>` at top-level commas.
fn split_args(body: &str) -> Option<Vec<&str>> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            ',' if depth == 0 => {
                args.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    args.push(body[start..].trim());
    if args.iter().any(|a| a.is_empty()) {
        return None;
    }
    Some(args)
}
