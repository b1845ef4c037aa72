//! Type descriptors.
//!
//! Descriptors are the metadata the codec consumes: what category a type
//! belongs to, the element types of collections, and the ordered member list
//! of objects together with get/set closures. They are built once and shared
//! behind [`TypeRef`].

use crate::value::{Record, Value};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a descriptor.
pub type TypeRef = Arc<TypeDescriptor>;

/// Fixed primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Char,
    DateTime,
    DateTimeOffset,
    TimeSpan,
    Date,
    Time,
    Guid,
    String,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 20] = [
        PrimitiveKind::Bool,
        PrimitiveKind::I8,
        PrimitiveKind::I16,
        PrimitiveKind::I32,
        PrimitiveKind::I64,
        PrimitiveKind::U8,
        PrimitiveKind::U16,
        PrimitiveKind::U32,
        PrimitiveKind::U64,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
        PrimitiveKind::Decimal,
        PrimitiveKind::Char,
        PrimitiveKind::DateTime,
        PrimitiveKind::DateTimeOffset,
        PrimitiveKind::TimeSpan,
        PrimitiveKind::Date,
        PrimitiveKind::Time,
        PrimitiveKind::Guid,
        PrimitiveKind::String,
    ];

    /// Canonical type name.
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "i8",
            PrimitiveKind::I16 => "i16",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::U8 => "u8",
            PrimitiveKind::U16 => "u16",
            PrimitiveKind::U32 => "u32",
            PrimitiveKind::U64 => "u64",
            PrimitiveKind::F32 => "f32",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::Decimal => "decimal",
            PrimitiveKind::Char => "char",
            PrimitiveKind::DateTime => "datetime",
            PrimitiveKind::DateTimeOffset => "datetimeoffset",
            PrimitiveKind::TimeSpan => "timespan",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Time => "time",
            PrimitiveKind::Guid => "guid",
            PrimitiveKind::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Encoded width, or `None` for length-prefixed kinds.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::I8 | PrimitiveKind::U8 => Some(1),
            PrimitiveKind::I16 | PrimitiveKind::U16 | PrimitiveKind::Char => Some(2),
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 | PrimitiveKind::Date => {
                Some(4)
            }
            PrimitiveKind::I64
            | PrimitiveKind::U64
            | PrimitiveKind::F64
            | PrimitiveKind::DateTime
            | PrimitiveKind::TimeSpan
            | PrimitiveKind::Time => Some(8),
            PrimitiveKind::DateTimeOffset => Some(10),
            PrimitiveKind::Decimal | PrimitiveKind::Guid => Some(16),
            PrimitiveKind::String => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::I8
                | PrimitiveKind::I16
                | PrimitiveKind::I32
                | PrimitiveKind::I64
                | PrimitiveKind::U8
                | PrimitiveKind::U16
                | PrimitiveKind::U32
                | PrimitiveKind::U64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float() || *self == PrimitiveKind::Decimal
    }

    /// Strings are references: always nullable.
    pub fn is_reference(&self) -> bool {
        *self == PrimitiveKind::String
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse category used by converter dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Primitive,
    Enum,
    Special,
    Collection,
    Object,
}

/// Collection shapes. Together with `interface` they select how a decoded
/// collection is stored and rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionShape {
    Array,
    List,
    Set,
    Dictionary,
    Collection,
    Enumerable,
}

impl CollectionShape {
    pub fn is_dictionary(&self) -> bool {
        *self == CollectionShape::Dictionary
    }

    fn prefix(&self, interface: bool) -> &'static str {
        match (self, interface) {
            (CollectionShape::Array, _) => "array",
            (CollectionShape::List, false) => "list",
            (CollectionShape::List, true) => "ilist",
            (CollectionShape::Set, false) => "set",
            (CollectionShape::Set, true) => "iset",
            (CollectionShape::Dictionary, false) => "map",
            (CollectionShape::Dictionary, true) => "imap",
            (CollectionShape::Collection, false) => "collection",
            (CollectionShape::Collection, true) => "icollection",
            (CollectionShape::Enumerable, _) => "enumerable",
        }
    }

    /// Parses a shape prefix such as `list` or `imap`.
    pub fn from_prefix(prefix: &str) -> Option<(Self, bool)> {
        let parsed = match prefix {
            "array" => (CollectionShape::Array, false),
            "list" => (CollectionShape::List, false),
            "ilist" => (CollectionShape::List, true),
            "set" => (CollectionShape::Set, false),
            "iset" => (CollectionShape::Set, true),
            "map" | "dictionary" => (CollectionShape::Dictionary, false),
            "imap" => (CollectionShape::Dictionary, true),
            "collection" => (CollectionShape::Collection, false),
            "icollection" => (CollectionShape::Collection, true),
            "enumerable" => (CollectionShape::Enumerable, true),
            _ => return None,
        };
        Some(parsed)
    }
}

/// Collection metadata.
#[derive(Debug, Clone)]
pub struct CollectionDescriptor {
    pub shape: CollectionShape,
    pub interface: bool,
    pub array_backed: bool,
    pub element: Option<TypeRef>,
    pub key: Option<TypeRef>,
    pub value: Option<TypeRef>,
}

/// Enum metadata.
#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    pub underlying: PrimitiveKind,
    pub flags: bool,
    pub nullable: bool,
}

type Getter = dyn for<'a> Fn(&'a Record) -> Option<&'a Value> + Send + Sync;
type Setter = dyn Fn(&mut Record, Value) + Send + Sync;
type Factory = dyn Fn() -> Record + Send + Sync;

/// Get/set closures for one member, resolved when the descriptor is built.
#[derive(Clone)]
pub struct MemberAccessor {
    get: Arc<Getter>,
    set: Option<Arc<Setter>>,
}

impl MemberAccessor {
    /// Reads and writes the record field called `name`.
    pub fn field(name: &str) -> Self {
        let get_name = name.to_owned();
        let set_name = name.to_owned();
        Self {
            get: Arc::new(move |record: &Record| record.fields.get(&get_name)),
            set: Some(Arc::new(move |record: &mut Record, value: Value| {
                record.fields.insert(set_name.clone(), value);
            })),
        }
    }

    pub fn custom<G, S>(get: G, set: S) -> Self
    where
        G: for<'a> Fn(&'a Record) -> Option<&'a Value> + Send + Sync + 'static,
        S: Fn(&mut Record, Value) + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: Some(Arc::new(set)),
        }
    }

    /// A member that can be encoded but not assigned on decode.
    pub fn read_only<G>(get: G) -> Self
    where
        G: for<'a> Fn(&'a Record) -> Option<&'a Value> + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(get),
            set: None,
        }
    }

    pub fn get<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        (self.get)(record)
    }

    /// Assigns the value; returns `false` if the member has no setter.
    pub fn set(&self, record: &mut Record, value: Value) -> bool {
        match &self.set {
            Some(set) => {
                set(record, value);
                true
            }
            None => false,
        }
    }

    pub fn can_set(&self) -> bool {
        self.set.is_some()
    }
}

impl fmt::Debug for MemberAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberAccessor")
            .field("settable", &self.set.is_some())
            .finish()
    }
}

/// One object member.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub name: String,
    pub ty: TypeRef,
    /// Explicitly assigned index; `None` falls back to declaration order.
    pub index: Option<u16>,
    /// Excluded members are never written and are drained when read.
    pub ignored: bool,
    pub accessor: MemberAccessor,
}

impl MemberDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        let name = name.into();
        Self {
            accessor: MemberAccessor::field(&name),
            name,
            ty,
            index: None,
            ignored: false,
        }
    }

    pub fn with_index(mut self, index: u16) -> Self {
        self.index = Some(index);
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn with_accessor(mut self, accessor: MemberAccessor) -> Self {
        self.accessor = accessor;
        self
    }
}

/// How instances of an object type come into existence on decode.
#[derive(Clone, Default)]
pub enum Constructor {
    /// An empty record named after the type.
    #[default]
    Default,
    /// Interface or abstract base: only concrete subtypes are instantiated.
    Abstract,
    Custom(Arc<Factory>),
}

impl Constructor {
    pub fn custom<F>(factory: F) -> Self
    where
        F: Fn() -> Record + Send + Sync + 'static,
    {
        Constructor::Custom(Arc::new(factory))
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constructor::Default => write!(f, "Default"),
            Constructor::Abstract => write!(f, "Abstract"),
            Constructor::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Object metadata.
#[derive(Debug, Clone, Default)]
pub struct ObjectDescriptor {
    pub members: Vec<MemberDescriptor>,
    pub constructor: Constructor,
    /// Names of base types and interfaces this type satisfies.
    pub supertypes: Vec<String>,
}

/// Shape of a type.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Primitive { kind: PrimitiveKind, nullable: bool },
    Enum(EnumDescriptor),
    Collection(CollectionDescriptor),
    Object(ObjectDescriptor),
    /// A boxed value of any registered type.
    Any,
    /// Reference to a registered type, resolved through the type registry.
    Named(String),
}

/// A named type and its shape.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    kind: TypeKind,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> TypeRef {
        Arc::new(Self::new(
            kind.name(),
            TypeKind::Primitive {
                kind,
                nullable: kind.is_reference(),
            },
        ))
    }

    /// The nullable form of a value-type primitive.
    pub fn nullable(kind: PrimitiveKind) -> TypeRef {
        if kind.is_reference() {
            return Self::primitive(kind);
        }
        Arc::new(Self::new(
            format!("{}?", kind.name()),
            TypeKind::Primitive {
                kind,
                nullable: true,
            },
        ))
    }

    pub fn string() -> TypeRef {
        Self::primitive(PrimitiveKind::String)
    }

    pub fn enumeration(name: impl Into<String>, underlying: PrimitiveKind) -> TypeRef {
        Arc::new(Self::new(
            name,
            TypeKind::Enum(EnumDescriptor {
                underlying,
                flags: false,
                nullable: false,
            }),
        ))
    }

    pub fn flags(name: impl Into<String>, underlying: PrimitiveKind) -> TypeRef {
        Arc::new(Self::new(
            name,
            TypeKind::Enum(EnumDescriptor {
                underlying,
                flags: true,
                nullable: false,
            }),
        ))
    }

    /// The nullable form of an enum type (`Color?`).
    pub fn nullable_enum(ty: &TypeRef) -> Option<TypeRef> {
        match &ty.kind {
            TypeKind::Enum(e) => Some(Arc::new(Self::new(
                format!("{}?", ty.name),
                TypeKind::Enum(EnumDescriptor {
                    nullable: true,
                    ..e.clone()
                }),
            ))),
            _ => None,
        }
    }

    pub fn collection(shape: CollectionShape, interface: bool, element: TypeRef) -> TypeRef {
        let name = format!("{}<{}>", shape.prefix(interface), element.name);
        Arc::new(Self::new(
            name,
            TypeKind::Collection(CollectionDescriptor {
                shape,
                interface,
                array_backed: shape == CollectionShape::Array,
                element: Some(element),
                key: None,
                value: None,
            }),
        ))
    }

    pub fn array(element: TypeRef) -> TypeRef {
        Self::collection(CollectionShape::Array, false, element)
    }

    pub fn list(element: TypeRef) -> TypeRef {
        Self::collection(CollectionShape::List, false, element)
    }

    pub fn set(element: TypeRef) -> TypeRef {
        Self::collection(CollectionShape::Set, false, element)
    }

    pub fn enumerable(element: TypeRef) -> TypeRef {
        Self::collection(CollectionShape::Enumerable, true, element)
    }

    pub fn dictionary(interface: bool, key: TypeRef, value: TypeRef) -> TypeRef {
        let name = format!(
            "{}<{},{}>",
            CollectionShape::Dictionary.prefix(interface),
            key.name,
            value.name
        );
        Arc::new(Self::new(
            name,
            TypeKind::Collection(CollectionDescriptor {
                shape: CollectionShape::Dictionary,
                interface,
                array_backed: false,
                element: None,
                key: Some(key),
                value: Some(value),
            }),
        ))
    }

    pub fn map(key: TypeRef, value: TypeRef) -> TypeRef {
        Self::dictionary(false, key, value)
    }

    pub fn any() -> TypeRef {
        Arc::new(Self::new("any", TypeKind::Any))
    }

    /// A reference to a type registered elsewhere; enables recursive types.
    pub fn named(name: impl Into<String>) -> TypeRef {
        let name = name.into();
        Arc::new(Self::new(name.clone(), TypeKind::Named(name)))
    }

    pub fn object(name: impl Into<String>) -> ObjectBuilder {
        ObjectBuilder {
            name: name.into(),
            object: ObjectDescriptor::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn category(&self) -> Category {
        match &self.kind {
            TypeKind::Primitive { .. } => Category::Primitive,
            TypeKind::Enum(_) => Category::Enum,
            TypeKind::Collection(_) => Category::Collection,
            TypeKind::Object(o) if matches!(o.constructor, Constructor::Abstract) => {
                Category::Special
            }
            TypeKind::Object(_) => Category::Object,
            TypeKind::Any | TypeKind::Named(_) => Category::Special,
        }
    }

    /// Whether a value of this type can be null, and thus carries a
    /// null flag at root and element positions.
    pub fn is_nullable(&self) -> bool {
        match &self.kind {
            TypeKind::Primitive { nullable, .. } => *nullable,
            TypeKind::Enum(e) => e.nullable,
            _ => true,
        }
    }

    /// Whether decoding a value of this type needs a type name on the wire.
    pub fn is_polymorphic(&self) -> bool {
        match &self.kind {
            TypeKind::Any => true,
            TypeKind::Object(o) => matches!(o.constructor, Constructor::Abstract),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectDescriptor> {
        match &self.kind {
            TypeKind::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionDescriptor> {
        match &self.kind {
            TypeKind::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match &self.kind {
            TypeKind::Primitive { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Builder for object descriptors.
#[derive(Debug)]
pub struct ObjectBuilder {
    name: String,
    object: ObjectDescriptor,
}

impl ObjectBuilder {
    /// Adds a member read and written through the record field of the same name.
    pub fn member(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.object.members.push(MemberDescriptor::new(name, ty));
        self
    }

    /// Adds a member with an explicit index.
    pub fn indexed(mut self, name: impl Into<String>, index: u16, ty: TypeRef) -> Self {
        self.object
            .members
            .push(MemberDescriptor::new(name, ty).with_index(index));
        self
    }

    /// Adds a member that is never written and is drained when read.
    pub fn ignored(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.object
            .members
            .push(MemberDescriptor::new(name, ty).ignored());
        self
    }

    pub fn with_member(mut self, member: MemberDescriptor) -> Self {
        self.object.members.push(member);
        self
    }

    pub fn constructor(mut self, constructor: Constructor) -> Self {
        self.object.constructor = constructor;
        self
    }

    /// Marks the type as an interface or abstract base.
    pub fn abstract_type(self) -> Self {
        self.constructor(Constructor::Abstract)
    }

    pub fn supertype(mut self, name: impl Into<String>) -> Self {
        self.object.supertypes.push(name.into());
        self
    }

    pub fn build(self) -> TypeRef {
        Arc::new(TypeDescriptor::new(self.name, TypeKind::Object(self.object)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_names_roundtrip() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(PrimitiveKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(PrimitiveKind::from_name("int"), None);
    }

    #[test]
    fn test_fixed_widths() {
        assert_eq!(PrimitiveKind::I32.fixed_width(), Some(4));
        assert_eq!(PrimitiveKind::Char.fixed_width(), Some(2));
        assert_eq!(PrimitiveKind::DateTimeOffset.fixed_width(), Some(10));
        assert_eq!(PrimitiveKind::Guid.fixed_width(), Some(16));
        assert_eq!(PrimitiveKind::String.fixed_width(), None);
    }

    #[test]
    fn test_collection_names() {
        let i32_ty = TypeDescriptor::primitive(PrimitiveKind::I32);
        assert_eq!(TypeDescriptor::list(i32_ty.clone()).name(), "list<i32>");
        assert_eq!(TypeDescriptor::array(i32_ty.clone()).name(), "array<i32>");
        assert_eq!(
            TypeDescriptor::collection(CollectionShape::List, true, i32_ty.clone()).name(),
            "ilist<i32>"
        );
        assert_eq!(
            TypeDescriptor::map(i32_ty, TypeDescriptor::string()).name(),
            "map<i32,string>"
        );
    }

    #[test]
    fn test_nullability() {
        assert!(!TypeDescriptor::primitive(PrimitiveKind::I32).is_nullable());
        assert!(TypeDescriptor::nullable(PrimitiveKind::I32).is_nullable());
        assert_eq!(TypeDescriptor::nullable(PrimitiveKind::I32).name(), "i32?");
        assert!(TypeDescriptor::string().is_nullable());
        assert_eq!(TypeDescriptor::nullable(PrimitiveKind::String).name(), "string");

        let color = TypeDescriptor::enumeration("Color", PrimitiveKind::U8);
        assert!(!color.is_nullable());
        let nullable = TypeDescriptor::nullable_enum(&color).unwrap();
        assert!(nullable.is_nullable());
        assert_eq!(nullable.name(), "Color?");
    }

    #[test]
    fn test_categories() {
        let shape = TypeDescriptor::object("Shape").abstract_type().build();
        let circle = TypeDescriptor::object("Circle")
            .member("radius", TypeDescriptor::primitive(PrimitiveKind::F64))
            .supertype("Shape")
            .build();
        assert_eq!(shape.category(), Category::Special);
        assert!(shape.is_polymorphic());
        assert_eq!(circle.category(), Category::Object);
        assert!(!circle.is_polymorphic());
        assert_eq!(TypeDescriptor::any().category(), Category::Special);
    }

    #[test]
    fn test_field_accessor() {
        let accessor = MemberAccessor::field("id");
        let mut record = Record::new("Order");
        assert!(accessor.get(&record).is_none());
        assert!(accessor.set(&mut record, Value::I32(7)));
        assert_eq!(accessor.get(&record), Some(&Value::I32(7)));

        let read_only = MemberAccessor::read_only(|r: &Record| r.fields.get("id"));
        assert!(!read_only.can_set());
        assert!(!read_only.set(&mut record, Value::I32(9)));
        assert_eq!(read_only.get(&record), Some(&Value::I32(7)));
    }
}
