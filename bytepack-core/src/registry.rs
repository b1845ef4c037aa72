//! Converter registry.
//!
//! Converters are keyed by the identity of the resolved memory and wire
//! descriptors plus the member layout, and built at most once per key under
//! normal operation. Two descriptors that share a name (an old and a new
//! version of a type) get separate converters. The cache is shared by all
//! concurrent operations and keeps the descriptors it was keyed on alive.

use crate::converter::{ChildSlot, Converter};
use crate::descriptor::TypeRef;
use crate::error::CodecError;
use crate::options::MemberLayout;
use crate::types::TypeRegistry;
use crate::value::Value;
use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A descriptor compared by address.
#[derive(Debug, Clone)]
struct TypeIdentity(TypeRef);

impl PartialEq for TypeIdentity {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TypeIdentity {}

impl Hash for TypeIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConverterKey {
    memory: TypeIdentity,
    wire: TypeIdentity,
    layout: MemberLayout,
}

/// Converters built during one resolution but not yet published.
type Pending = Vec<(ConverterKey, Arc<Converter>)>;

/// Thread-safe get-or-create cache of converters.
pub struct ConverterRegistry {
    types: Arc<TypeRegistry>,
    converters: DashMap<ConverterKey, Arc<Converter>>,
}

impl ConverterRegistry {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            types,
            converters: DashMap::new(),
        }
    }

    /// The type registry used to resolve names.
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Converter encoding `ty` as itself.
    pub fn resolve(&self, ty: &TypeRef, layout: MemberLayout) -> Result<Arc<Converter>, CodecError> {
        self.resolve_pair(ty, ty, layout)
    }

    /// Converter for a registered type name or type expression.
    pub fn resolve_name(
        &self,
        name: &str,
        layout: MemberLayout,
    ) -> Result<Arc<Converter>, CodecError> {
        let ty = self.types.lookup(name)?;
        self.resolve(&ty, layout)
    }

    /// Converter reading/writing values of `memory` in the layout of `wire`.
    ///
    /// The converter and every converter reachable from it are fully built
    /// before any of them is published, so a cached converter never fails
    /// later on an unresolvable child.
    pub fn resolve_pair(
        &self,
        memory: &TypeRef,
        wire: &TypeRef,
        layout: MemberLayout,
    ) -> Result<Arc<Converter>, CodecError> {
        let mut pending = Pending::new();
        let root = self.resolve_pending(memory, wire, layout, &mut pending)?;
        if pending.is_empty() {
            return Ok(root);
        }

        // A concurrent builder of the same key may have published first, in
        // which case its converter is returned.
        let mut published = None;
        for (key, built) in pending {
            let is_root = Arc::ptr_eq(&built, &root);
            let converter = self.converters.entry(key.clone()).or_insert(built).value().clone();
            tracing::debug!(
                "Cached converter {} -> {} ({:?})",
                key.memory.0.name(),
                key.wire.0.name(),
                layout
            );
            if is_root {
                published = Some(converter);
            }
        }
        Ok(published.unwrap_or(root))
    }

    fn resolve_pending(
        &self,
        memory: &TypeRef,
        wire: &TypeRef,
        layout: MemberLayout,
        pending: &mut Pending,
    ) -> Result<Arc<Converter>, CodecError> {
        let memory = self.types.resolve(memory)?;
        let wire = self.types.resolve(wire)?;
        let key = ConverterKey {
            memory: TypeIdentity(memory.clone()),
            wire: TypeIdentity(wire.clone()),
            layout,
        };
        if let Some(existing) = self.converters.get(&key) {
            return Ok(existing.value().clone());
        }
        if let Some((_, building)) = pending.iter().find(|(k, _)| *k == key) {
            return Ok(building.clone());
        }

        let built = Arc::new(Converter::build(memory, wire, layout)?);
        pending.push((key, built.clone()));
        for slot in built.slots() {
            self.warm(slot, layout, pending)?;
        }
        Ok(built)
    }

    /// Resolves a child slot within the current resolution. Cycles stop at
    /// converters that are cached or still being built.
    fn warm(
        &self,
        slot: &ChildSlot,
        layout: MemberLayout,
        pending: &mut Pending,
    ) -> Result<(), CodecError> {
        if slot.is_resolved() {
            return Ok(());
        }
        let child = self.resolve_pending(slot.memory_type(), slot.wire_type(), layout, pending)?;
        slot.fill(child);
        Ok(())
    }

    /// Converter for a value at a position declared as `declared`. For
    /// polymorphic positions this is the converter of the value's runtime type.
    pub fn resolve_for_value(
        &self,
        declared: &TypeRef,
        value: &Value,
        layout: MemberLayout,
    ) -> Result<Arc<Converter>, CodecError> {
        let declared = self.types.resolve(declared)?;
        if !declared.is_polymorphic() || value.is_null() {
            return self.resolve(&declared, layout);
        }
        let concrete = self.types.type_of(value)?;
        if !self.types.is_assignable(&concrete, &declared) {
            return Err(CodecError::TypeMismatch {
                expected: declared.name().to_owned(),
                actual: concrete.name().to_owned(),
            });
        }
        self.resolve(&concrete, layout)
    }

    /// Number of cached converters.
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    pub fn clear(&self) {
        self.converters.clear();
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.converters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterKind;
    use crate::descriptor::{PrimitiveKind, TypeDescriptor};
    use crate::value::Record;
    use std::thread;

    fn registry() -> ConverterRegistry {
        let types = TypeRegistry::new();
        types.register(
            TypeDescriptor::object("Node")
                .member("value", TypeDescriptor::primitive(PrimitiveKind::I32))
                .member("next", TypeDescriptor::named("Node"))
                .build(),
        );
        types.register(TypeDescriptor::object("Shape").abstract_type().build());
        types.register(
            TypeDescriptor::object("Circle")
                .member("radius", TypeDescriptor::primitive(PrimitiveKind::F64))
                .supertype("Shape")
                .build(),
        );
        ConverterRegistry::new(Arc::new(types))
    }

    #[test]
    fn test_resolve_is_cached() {
        let registry = registry();
        let a = registry.resolve_name("list<i32>", MemberLayout::Attribute).unwrap();
        let b = registry.resolve_name("list<i32>", MemberLayout::Attribute).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = registry.resolve_name("list<i32>", MemberLayout::Declaration).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_recursive_type_resolves() {
        let registry = registry();
        let node = registry.resolve_name("Node", MemberLayout::Attribute).unwrap();
        let ConverterKind::Object(object) = node.kind() else {
            panic!("expected object converter");
        };
        let next = object.member_by_name("next").unwrap();
        assert!(next.slot().is_resolved());
        let child = next.slot().get(&registry, MemberLayout::Attribute).unwrap();
        assert!(Arc::ptr_eq(&node, &child));
    }

    #[test]
    fn test_unresolved_child_is_construction_error() {
        let registry = registry();
        registry.types().register(
            TypeDescriptor::object("Broken")
                .member("ghost", TypeDescriptor::named("Ghost"))
                .build(),
        );
        let err = registry
            .resolve_name("Broken", MemberLayout::Attribute)
            .unwrap_err();
        assert!(matches!(err, CodecError::UnresolvedType(name) if name == "Ghost"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failed_child_publishes_nothing() {
        let registry = registry();
        registry.types().register(
            TypeDescriptor::object("Holder")
                .member("items", TypeDescriptor::list(TypeDescriptor::named("Ghost")))
                .member("node", TypeDescriptor::named("Node"))
                .build(),
        );
        assert!(registry.resolve_name("Holder", MemberLayout::Attribute).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_same_name_different_descriptors() {
        let registry = registry();
        let old = registry.types().get("Circle").unwrap();
        let new = TypeDescriptor::object("Circle")
            .member("radius", TypeDescriptor::primitive(PrimitiveKind::F64))
            .member("label", TypeDescriptor::string())
            .supertype("Shape")
            .build();

        let a = registry.resolve(&old, MemberLayout::Attribute).unwrap();
        let b = registry.resolve_pair(&old, &new, MemberLayout::Attribute).unwrap();
        let c = registry.resolve(&new, MemberLayout::Attribute).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(!Arc::ptr_eq(&b, &c));
        assert!(Arc::ptr_eq(
            &b,
            &registry.resolve_pair(&old, &new, MemberLayout::Attribute).unwrap()
        ));
    }

    #[test]
    fn test_resolve_for_value() {
        let registry = registry();
        let shape = registry.types().get("Shape").unwrap();
        let circle = Value::Record(Record::new("Circle").with("radius", 1.0));
        let conv = registry
            .resolve_for_value(&shape, &circle, MemberLayout::Attribute)
            .unwrap();
        assert_eq!(conv.name(), "Circle");

        let node = Value::Record(Record::new("Node"));
        let err = registry
            .resolve_for_value(&shape, &node, MemberLayout::Attribute)
            .unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn test_concurrent_resolution() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    registry
                        .resolve_name("map<string,list<Node>>", MemberLayout::Attribute)
                        .unwrap()
                })
            })
            .collect();
        let converters: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for c in &converters[1..] {
            assert!(Arc::ptr_eq(&converters[0], c));
        }
    }
}
