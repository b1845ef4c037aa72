//! # bytepack-core
//!
//! Compact binary object codec for bytepack.
//!
//! This crate provides:
//! - A dynamic value model and the type descriptors that describe its shape
//! - Per-type converters, selected once per type pair and cached
//! - Resumable read/write engines driven by an explicit frame stack
//! - Single-block and incremental (chunked) encode/decode entry points
//!
//! Wire layout of a value:
//!
//! ```text
//! Value         := NotNullFlag? TypeNameSeg? ( Primitive | StringVal | ObjectSeg | EnumerableSeg )
//! StringVal     := i32(len) bytes[len]
//! ObjectSeg     := ( (Index | NameSeg) Value )* EndMarker
//! EnumerableSeg := i32(count) Value[count]
//! ```

pub mod codec;
pub mod converter;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod options;
pub mod read;
pub mod registry;
pub mod types;
pub mod value;
pub mod wire;
pub mod write;

pub use codec::{Codec, Decoder, Encoder};
pub use converter::{Converter, ConverterKind};
pub use descriptor::{
    Category, CollectionShape, Constructor, MemberAccessor, MemberDescriptor, ObjectBuilder,
    PrimitiveKind, TypeDescriptor, TypeKind, TypeRef,
};
pub use error::CodecError;
pub use frame::Progress;
pub use options::{IndexSize, MemberLayout, Options, TextEncoding};
pub use read::ReadState;
pub use registry::ConverterRegistry;
pub use types::TypeRegistry;
pub use value::{Decimal, EnumValue, Record, Value};
pub use wire::{ReadCursor, WriteCursor};
pub use write::WriteState;

/// Format revision implemented by this crate.
pub const FORMAT_VERSION: u16 = 1;

/// Default chunk size used by the incremental encoder (8 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
