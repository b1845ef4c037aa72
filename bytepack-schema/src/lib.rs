//! # bytepack-schema
//!
//! Declarative type definitions for bytepack.
//!
//! A schema file lists object, enum and alias definitions in YAML or JSON.
//! Loading it populates a [`TypeRegistry`](bytepack_core::TypeRegistry);
//! member types are type expressions (`i32`, `string?`, `list<Order>`,
//! `map<string,list<i64>>`) resolved lazily, so definitions may refer to
//! each other in any order and recursively.
//!
//! The [`json`] module converts between JSON documents and codec values,
//! guided by those descriptors.

pub mod definition;
pub mod error;
pub mod json;

pub use definition::{AliasDef, EnumDef, MemberDef, ObjectDef, Schema, TypeDef};
pub use error::SchemaError;
pub use json::{from_json, to_json};
