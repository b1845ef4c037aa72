//! Object converters.
//!
//! Members are written in the wire type's declaration order. Each member is
//! tagged by its wire index (declared index + 1, so that 0 stays free for
//! the end marker) or by its name.

use crate::converter::ChildSlot;
use crate::descriptor::{Constructor, MemberAccessor, MemberDescriptor, ObjectDescriptor, TypeRef};
use crate::error::CodecError;
use crate::options::MemberLayout;
use crate::value::{Record, Value};
use std::collections::HashMap;

/// Largest declared member index (wire index 65534).
pub const MAX_MEMBER_INDEX: u32 = 65533;

/// One member as seen by an object converter.
#[derive(Debug)]
pub struct MemberPlan {
    pub(crate) name: String,
    /// Wire index; `None` for a member that can only be matched by name.
    pub(crate) wire_index: Option<u16>,
    /// Written on encode.
    pub(crate) emit: bool,
    /// Accessor on the memory type; `None` means the member is drained on decode.
    pub(crate) accessor: Option<MemberAccessor>,
    pub(crate) slot: ChildSlot,
}

impl MemberPlan {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wire_index(&self) -> Option<u16> {
        self.wire_index
    }

    pub fn is_emitted(&self) -> bool {
        self.emit
    }

    /// Whether decoded values are discarded instead of assigned.
    pub fn is_drained(&self) -> bool {
        !self
            .accessor
            .as_ref()
            .is_some_and(MemberAccessor::can_set)
    }

    pub fn slot(&self) -> &ChildSlot {
        &self.slot
    }

    /// Member value on a record being encoded; absent and null members
    /// are both `None`.
    pub fn get<'v>(&self, record: &'v Record) -> Option<&'v Value> {
        self.accessor
            .as_ref()
            .and_then(|a| a.get(record))
            .filter(|v| !v.is_null())
    }

    pub(crate) fn set(&self, record: &mut Record, value: Value) {
        if let Some(accessor) = &self.accessor {
            accessor.set(record, value);
        }
    }
}

#[derive(Debug)]
pub struct ObjectConverter {
    type_name: String,
    constructor: Constructor,
    members: Vec<MemberPlan>,
    by_index: HashMap<u16, usize>,
    by_name: HashMap<String, usize>,
}

impl ObjectConverter {
    /// Plans the members of `wire` against the accessors of `memory`.
    pub(crate) fn build(
        memory: &TypeRef,
        wire: &TypeRef,
        layout: MemberLayout,
    ) -> Result<Self, CodecError> {
        let (Some(m), Some(w)) = (memory.as_object(), wire.as_object()) else {
            return Err(CodecError::invalid_type(memory.name(), "not an object type"));
        };
        if matches!(m.constructor, Constructor::Abstract) {
            return Err(CodecError::invalid_type(
                memory.name(),
                "abstract types cannot be instantiated",
            ));
        }

        let indices = assign_indices(wire.name(), w, layout)?;
        let mut converter = Self {
            type_name: memory.name().to_owned(),
            constructor: m.constructor.clone(),
            members: Vec::with_capacity(w.members.len()),
            by_index: HashMap::new(),
            by_name: HashMap::new(),
        };

        for (member, wire_index) in w.members.iter().zip(indices) {
            let counterpart = m
                .members
                .iter()
                .find(|candidate| candidate.name == member.name && !candidate.ignored);
            let (accessor, memory_ty) = match counterpart {
                Some(c) if !member.ignored => (Some(c.accessor.clone()), c.ty.clone()),
                _ => (None, member.ty.clone()),
            };

            let position = converter.members.len();
            if converter
                .by_name
                .insert(member.name.clone(), position)
                .is_some()
            {
                return Err(CodecError::DuplicateName {
                    type_name: wire.name().to_owned(),
                    name: member.name.clone(),
                });
            }
            if let Some(index) = wire_index {
                converter.by_index.entry(index).or_insert(position);
            }
            converter.members.push(MemberPlan {
                name: member.name.clone(),
                wire_index,
                emit: !member.ignored,
                accessor,
                slot: ChildSlot::new(memory_ty, member.ty.clone()),
            });
        }

        Ok(converter)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// All planned members, in wire declaration order.
    pub fn members(&self) -> &[MemberPlan] {
        &self.members
    }

    pub fn member_by_index(&self, wire_index: u16) -> Option<&MemberPlan> {
        self.by_index.get(&wire_index).map(|&i| &self.members[i])
    }

    pub fn member_by_name(&self, name: &str) -> Option<&MemberPlan> {
        self.by_name.get(name).map(|&i| &self.members[i])
    }

    pub(crate) fn position_by_index(&self, wire_index: u16) -> Option<usize> {
        self.by_index.get(&wire_index).copied()
    }

    pub(crate) fn position_by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// A fresh instance to decode into.
    pub fn instantiate(&self) -> Result<Record, CodecError> {
        match &self.constructor {
            Constructor::Default => Ok(Record::new(self.type_name.clone())),
            Constructor::Custom(factory) => Ok(factory()),
            Constructor::Abstract => Err(CodecError::invalid_type(
                self.type_name.clone(),
                "abstract types cannot be instantiated",
            )),
        }
    }

    /// The record being encoded.
    pub fn record<'v>(&self, value: &'v Value) -> Result<&'v Record, CodecError> {
        value
            .as_record()
            .ok_or_else(|| CodecError::mismatch(self.type_name.clone(), value.kind_name()))
    }
}

/// Computes the wire index of every member, in declaration order.
///
/// Included members take their explicit index under [`MemberLayout::Attribute`]
/// and otherwise their position among included members. Excluded members keep
/// an explicit index, when they have one and it is free, so that a sender who
/// still writes them can be drained.
fn assign_indices(
    type_name: &str,
    object: &ObjectDescriptor,
    layout: MemberLayout,
) -> Result<Vec<Option<u16>>, CodecError> {
    let mut taken: HashMap<u32, &MemberDescriptor> = HashMap::new();
    let mut result = vec![None; object.members.len()];
    let mut position = 0u32;

    for (slot, member) in object.members.iter().enumerate() {
        if member.ignored {
            continue;
        }
        let declared = match (layout, member.index) {
            (MemberLayout::Attribute, Some(explicit)) => explicit as u32,
            _ => position,
        };
        position += 1;
        if declared > MAX_MEMBER_INDEX {
            return Err(CodecError::IndexOutOfRange {
                type_name: type_name.to_owned(),
                index: declared,
                max: MAX_MEMBER_INDEX,
            });
        }
        if let Some(first) = taken.insert(declared, member) {
            return Err(CodecError::DuplicateIndex {
                type_name: type_name.to_owned(),
                index: declared as u16,
                first: first.name.clone(),
                second: member.name.clone(),
            });
        }
        result[slot] = Some(declared as u16 + 1);
    }

    if layout == MemberLayout::Attribute {
        for (slot, member) in object.members.iter().enumerate() {
            match member.index {
                Some(explicit)
                    if member.ignored
                        && (explicit as u32) <= MAX_MEMBER_INDEX
                        && !taken.contains_key(&(explicit as u32)) =>
                {
                    result[slot] = Some(explicit + 1);
                }
                _ => {}
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{PrimitiveKind, TypeDescriptor};

    fn i32_ty() -> TypeRef {
        TypeDescriptor::primitive(PrimitiveKind::I32)
    }

    fn plan(ty: &TypeRef, layout: MemberLayout) -> Result<ObjectConverter, CodecError> {
        ObjectConverter::build(ty, ty, layout)
    }

    #[test]
    fn test_implicit_indices_follow_declaration() {
        let order = TypeDescriptor::object("Order")
            .member("id", i32_ty())
            .member("name", TypeDescriptor::string())
            .build();
        let conv = plan(&order, MemberLayout::Attribute).unwrap();
        assert_eq!(conv.members()[0].wire_index(), Some(1));
        assert_eq!(conv.members()[1].wire_index(), Some(2));
        assert_eq!(conv.member_by_index(2).unwrap().name(), "name");
        assert_eq!(conv.member_by_name("id").unwrap().wire_index(), Some(1));
        assert!(conv.member_by_index(3).is_none());
    }

    #[test]
    fn test_explicit_indices() {
        let ty = TypeDescriptor::object("Tagged")
            .indexed("b", 10, i32_ty())
            .indexed("a", 20, i32_ty())
            .build();
        let conv = plan(&ty, MemberLayout::Attribute).unwrap();
        assert_eq!(conv.member_by_index(11).unwrap().name(), "b");
        assert_eq!(conv.member_by_index(21).unwrap().name(), "a");

        let conv = plan(&ty, MemberLayout::Declaration).unwrap();
        assert_eq!(conv.member_by_index(1).unwrap().name(), "b");
        assert_eq!(conv.member_by_index(2).unwrap().name(), "a");
    }

    #[test]
    fn test_duplicate_index_is_construction_error() {
        let ty = TypeDescriptor::object("Clash")
            .indexed("a", 3, i32_ty())
            .indexed("b", 3, i32_ty())
            .build();
        let err = plan(&ty, MemberLayout::Attribute).unwrap_err();
        match err {
            CodecError::DuplicateIndex {
                index,
                first,
                second,
                ..
            } => {
                assert_eq!(index, 3);
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(plan(&ty, MemberLayout::Declaration).is_ok());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let ty = TypeDescriptor::object("Twice")
            .member("a", i32_ty())
            .member("a", TypeDescriptor::string())
            .build();
        assert!(matches!(
            plan(&ty, MemberLayout::Attribute),
            Err(CodecError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_ignored_members() {
        let ty = TypeDescriptor::object("Cache")
            .member("id", i32_ty())
            .with_member(MemberDescriptor::new("scratch", i32_ty()).with_index(9).ignored())
            .ignored("tmp", i32_ty())
            .member("name", TypeDescriptor::string())
            .build();
        let conv = plan(&ty, MemberLayout::Attribute).unwrap();
        let scratch = conv.member_by_name("scratch").unwrap();
        assert!(!scratch.is_emitted());
        assert!(scratch.is_drained());
        assert_eq!(scratch.wire_index(), Some(10));
        assert_eq!(conv.member_by_name("tmp").unwrap().wire_index(), None);
        assert_eq!(conv.member_by_name("name").unwrap().wire_index(), Some(2));
    }

    #[test]
    fn test_index_out_of_range() {
        let ty = TypeDescriptor::object("Huge")
            .indexed("a", u16::MAX, i32_ty())
            .build();
        assert!(matches!(
            plan(&ty, MemberLayout::Attribute),
            Err(CodecError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_pair_drains_members_missing_from_memory() {
        let v2 = TypeDescriptor::object("Order")
            .member("id", i32_ty())
            .member("note", TypeDescriptor::string())
            .build();
        let v1 = TypeDescriptor::object("Order").member("id", i32_ty()).build();
        let conv = ObjectConverter::build(&v1, &v2, MemberLayout::Attribute).unwrap();
        assert!(!conv.member_by_name("id").unwrap().is_drained());
        let note = conv.member_by_name("note").unwrap();
        assert!(note.is_drained());
        assert!(note.is_emitted());
        assert_eq!(note.get(&Record::new("Order").with("note", "x")), None);
    }

    #[test]
    fn test_abstract_memory_rejected() {
        let shape = TypeDescriptor::object("Shape").abstract_type().build();
        assert!(plan(&shape, MemberLayout::Attribute)
            .unwrap_err()
            .is_construction());
    }

    #[test]
    fn test_custom_constructor() {
        let ty = TypeDescriptor::object("Counter")
            .member("count", i32_ty())
            .constructor(Constructor::custom(|| Record::new("Counter").with("count", 1)))
            .build();
        let conv = plan(&ty, MemberLayout::Attribute).unwrap();
        assert_eq!(conv.instantiate().unwrap().get("count"), Some(&Value::I32(1)));
    }
}
