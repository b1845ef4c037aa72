//! Collection and dictionary converters.

use crate::converter::ChildSlot;
use crate::descriptor::{CollectionDescriptor, CollectionShape, TypeRef};
use crate::error::CodecError;
use crate::value::Value;

/// Largest number of elements preallocated from a decoded count.
pub const MAX_PREALLOCATION: usize = 1 << 16;

/// How a decoded sequence is stored in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Fixed-length array, allocated to the decoded count.
    Array,
    /// Growable list.
    List,
    /// Set; duplicate elements keep their first occurrence.
    Set,
}

#[derive(Debug)]
pub struct CollectionConverter {
    pub(crate) shape: CollectionShape,
    pub(crate) interface: bool,
    pub(crate) storage: Storage,
    pub(crate) element: ChildSlot,
}

impl CollectionConverter {
    pub(crate) fn build(
        memory: &TypeRef,
        m: &CollectionDescriptor,
        wire: &TypeRef,
        w: &CollectionDescriptor,
    ) -> Result<Self, CodecError> {
        let (Some(m_elem), Some(w_elem)) = (&m.element, &w.element) else {
            let missing = if m.element.is_none() { memory } else { wire };
            return Err(CodecError::invalid_type(
                missing.name(),
                "collection has no element type",
            ));
        };
        let storage = match m.shape {
            CollectionShape::Set => Storage::Set,
            _ if m.array_backed => Storage::Array,
            _ => Storage::List,
        };
        Ok(Self {
            shape: m.shape,
            interface: m.interface,
            storage,
            element: ChildSlot::new(m_elem.clone(), w_elem.clone()),
        })
    }

    pub fn shape(&self) -> CollectionShape {
        self.shape
    }

    pub fn is_interface(&self) -> bool {
        self.interface
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    pub fn element(&self) -> &ChildSlot {
        &self.element
    }

    /// Elements of a value being encoded.
    pub fn elements<'v>(&self, value: &'v Value) -> Result<&'v [Value], CodecError> {
        value
            .as_elements()
            .ok_or_else(|| CodecError::mismatch("a list or set", value.kind_name()))
    }

    /// Initial capacity for `count` decoded elements.
    pub fn capacity(&self, count: usize) -> usize {
        count.min(MAX_PREALLOCATION)
    }

    /// Wraps decoded elements into the memory representation.
    pub fn finish(&self, items: Vec<Value>) -> Value {
        match self.storage {
            Storage::Set => Value::Set(items),
            Storage::Array | Storage::List => Value::List(items),
        }
    }
}

/// Entry member tokens: index 1 / name `Key`, index 2 / name `Value`.
pub const ENTRY_KEY_INDEX: u16 = 1;
pub const ENTRY_VALUE_INDEX: u16 = 2;
pub const ENTRY_KEY_NAME: &str = "Key";
pub const ENTRY_VALUE_NAME: &str = "Value";

#[derive(Debug)]
pub struct DictionaryConverter {
    pub(crate) interface: bool,
    pub(crate) key: ChildSlot,
    pub(crate) value: ChildSlot,
}

impl DictionaryConverter {
    pub(crate) fn build(
        memory: &TypeRef,
        m: &CollectionDescriptor,
        wire: &TypeRef,
        w: &CollectionDescriptor,
    ) -> Result<Self, CodecError> {
        let (Some(mk), Some(mv)) = (&m.key, &m.value) else {
            return Err(CodecError::invalid_type(
                memory.name(),
                "dictionary has no key or value type",
            ));
        };
        let (Some(wk), Some(wv)) = (&w.key, &w.value) else {
            return Err(CodecError::invalid_type(
                wire.name(),
                "dictionary has no key or value type",
            ));
        };
        Ok(Self {
            interface: m.interface,
            key: ChildSlot::new(mk.clone(), wk.clone()),
            value: ChildSlot::new(mv.clone(), wv.clone()),
        })
    }

    pub fn is_interface(&self) -> bool {
        self.interface
    }

    pub fn key(&self) -> &ChildSlot {
        &self.key
    }

    pub fn value(&self) -> &ChildSlot {
        &self.value
    }

    /// Entries of a value being encoded.
    pub fn entries<'v>(&self, value: &'v Value) -> Result<&'v [(Value, Value)], CodecError> {
        match value {
            Value::Map(entries) => Ok(entries),
            other => Err(CodecError::mismatch("a map", other.kind_name())),
        }
    }
}
