//! Converters.
//!
//! A [`Converter`] knows how one (memory type, wire type) pair is encoded.
//! It is built once by the [`ConverterRegistry`](crate::registry::ConverterRegistry),
//! never mutated afterwards, and shared by every operation that needs it. All
//! per-call progress lives in engine frames.

pub mod collection;
pub mod enumeration;
pub mod object;
pub mod primitive;

pub use collection::{CollectionConverter, DictionaryConverter, Storage};
pub use enumeration::{EnumConverter, EnumTarget};
pub use object::{MemberPlan, ObjectConverter};

use crate::descriptor::{Category, PrimitiveKind, TypeKind, TypeRef};
use crate::error::CodecError;
use crate::options::MemberLayout;
use crate::registry::ConverterRegistry;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Encoding strategy chosen for a type pair.
#[derive(Debug)]
pub enum ConverterKind {
    /// Same primitive kind on both sides.
    Primitive(PrimitiveKind),
    /// Different primitive kinds; values pass through a checked conversion.
    ConvertPrimitive {
        memory: PrimitiveKind,
        wire: PrimitiveKind,
    },
    /// Enum or enum/integer pair, encoded as the wire's underlying integer.
    Enum(EnumConverter),
    /// Array, list, set or enumerable.
    Collection(CollectionConverter),
    /// Dictionary, lowered to a sequence of key/value entries.
    Dictionary(DictionaryConverter),
    Object(ObjectConverter),
    /// `any` or abstract wire type: the concrete type travels with the value.
    Polymorphic,
}

/// Converter for one (memory, wire) type pair.
pub struct Converter {
    memory: TypeRef,
    wire: TypeRef,
    layout: MemberLayout,
    kind: ConverterKind,
}

impl Converter {
    /// Picks the strategy for a pair of resolved types. First match wins:
    /// polymorphic wire type, primitives, enums, collections, objects.
    pub fn build(
        memory: TypeRef,
        wire: TypeRef,
        layout: MemberLayout,
    ) -> Result<Self, CodecError> {
        if wire.is_polymorphic() {
            return Ok(Self {
                memory,
                wire,
                layout,
                kind: ConverterKind::Polymorphic,
            });
        }
        let memory = if matches!(memory.kind(), TypeKind::Any) {
            wire.clone()
        } else {
            memory
        };

        let kind = match (memory.kind(), wire.kind()) {
            (TypeKind::Primitive { kind: m, .. }, TypeKind::Primitive { kind: w, .. }) => {
                if m == w {
                    ConverterKind::Primitive(*m)
                } else if primitive::is_convertible(*m, *w) && primitive::is_convertible(*w, *m) {
                    ConverterKind::ConvertPrimitive {
                        memory: *m,
                        wire: *w,
                    }
                } else {
                    return Err(CodecError::invalid_type(
                        memory.name(),
                        format!("no conversion to {}", wire.name()),
                    ));
                }
            }
            (TypeKind::Enum(_), _) | (_, TypeKind::Enum(_)) => {
                ConverterKind::Enum(EnumConverter::build(&memory, &wire)?)
            }
            (TypeKind::Collection(m), TypeKind::Collection(w)) => {
                if m.shape.is_dictionary() != w.shape.is_dictionary() {
                    return Err(CodecError::invalid_type(
                        memory.name(),
                        format!("collection shape does not match {}", wire.name()),
                    ));
                }
                if w.shape.is_dictionary() {
                    ConverterKind::Dictionary(DictionaryConverter::build(&memory, m, &wire, w)?)
                } else {
                    ConverterKind::Collection(CollectionConverter::build(&memory, m, &wire, w)?)
                }
            }
            (TypeKind::Object(_), TypeKind::Object(_)) => {
                ConverterKind::Object(ObjectConverter::build(&memory, &wire, layout)?)
            }
            (TypeKind::Named(name), _) | (_, TypeKind::Named(name)) => {
                return Err(CodecError::UnresolvedType(name.clone()))
            }
            _ => {
                return Err(CodecError::invalid_type(
                    memory.name(),
                    format!("cannot be encoded as {}", wire.name()),
                ))
            }
        };

        Ok(Self {
            memory,
            wire,
            layout,
            kind,
        })
    }

    pub fn memory_type(&self) -> &TypeRef {
        &self.memory
    }

    pub fn wire_type(&self) -> &TypeRef {
        &self.wire
    }

    /// Name written in type-info mode.
    pub fn name(&self) -> &str {
        self.wire.name()
    }

    pub fn layout(&self) -> MemberLayout {
        self.layout
    }

    pub fn kind(&self) -> &ConverterKind {
        &self.kind
    }

    /// Nullability follows the wire type.
    pub fn is_nullable(&self) -> bool {
        self.wire.is_nullable()
    }

    pub fn category(&self) -> Category {
        match self.kind {
            ConverterKind::Polymorphic => Category::Special,
            _ => self.wire.category(),
        }
    }

    /// Child slots, in declaration order.
    pub(crate) fn slots(&self) -> Vec<&ChildSlot> {
        match &self.kind {
            ConverterKind::Collection(c) => vec![&c.element],
            ConverterKind::Dictionary(d) => vec![&d.key, &d.value],
            ConverterKind::Object(o) => o.members().iter().map(|m| &m.slot).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("memory", &self.memory.name())
            .field("wire", &self.wire.name())
            .field("layout", &self.layout)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A child converter (element, key, value or member), resolved on first use.
///
/// Deferring resolution lets recursive types refer to themselves: the
/// registry fills the slots of a new converter before publishing it, and a
/// slot pointing back at a converter under construction is filled with that
/// converter.
pub struct ChildSlot {
    memory: TypeRef,
    wire: TypeRef,
    cell: OnceLock<Arc<Converter>>,
}

impl ChildSlot {
    pub(crate) fn new(memory: TypeRef, wire: TypeRef) -> Self {
        Self {
            memory,
            wire,
            cell: OnceLock::new(),
        }
    }

    pub fn memory_type(&self) -> &TypeRef {
        &self.memory
    }

    pub fn wire_type(&self) -> &TypeRef {
        &self.wire
    }

    /// Whether the slot has been resolved yet.
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    pub(crate) fn fill(&self, converter: Arc<Converter>) {
        let _ = self.cell.set(converter);
    }

    /// Resolves the child converter through `registry`, caching it in the slot.
    pub fn get(
        &self,
        registry: &ConverterRegistry,
        layout: MemberLayout,
    ) -> Result<Arc<Converter>, CodecError> {
        if let Some(converter) = self.cell.get() {
            return Ok(converter.clone());
        }
        let converter = registry.resolve_pair(&self.memory, &self.wire, layout)?;
        Ok(self.cell.get_or_init(|| converter).clone())
    }
}

impl fmt::Debug for ChildSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildSlot")
            .field("memory", &self.memory.name())
            .field("wire", &self.wire.name())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
