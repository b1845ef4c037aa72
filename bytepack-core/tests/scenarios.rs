//! End-to-end encode/decode behaviour through the `Codec` facade.

use bytepack_core::{
    Codec, CodecError, IndexSize, Options, PrimitiveKind, Record, TypeDescriptor, TypeRef,
    TypeRegistry, Value,
};
use std::sync::Arc;

fn i32_ty() -> TypeRef {
    TypeDescriptor::primitive(PrimitiveKind::I32)
}

fn order_codec(options: Options) -> (Codec, TypeRef) {
    let types = TypeRegistry::new();
    let order = TypeDescriptor::object("Order")
        .member("id", i32_ty())
        .member("name", TypeDescriptor::string())
        .build();
    types.register(order.clone());
    (Codec::with_types(Arc::new(types), options), order)
}

#[test]
fn test_object_with_index_tokens() {
    let (codec, order) = order_codec(Options::default());
    let value = Value::Record(Record::new("Order").with("id", 42).with("name", "ok"));

    let bytes = codec.encode(&value, &order).unwrap();
    assert_eq!(
        bytes.as_ref(),
        &[1, 1, 42, 0, 0, 0, 2, 2, 0, 0, 0, b'o', b'k', 0]
    );
    assert_eq!(codec.decode(&bytes, &order).unwrap(), value);
}

#[test]
fn test_null_member_is_omitted() {
    let types = TypeRegistry::new();
    let reading = TypeDescriptor::object("Reading")
        .member("id", i32_ty())
        .member("value", TypeDescriptor::nullable(PrimitiveKind::I32))
        .build();
    types.register(reading.clone());
    let codec = Codec::with_types(Arc::new(types), Options::default());

    let value = Value::Record(Record::new("Reading").with("id", 7).with("value", Value::Null));
    let bytes = codec.encode(&value, &reading).unwrap();
    assert_eq!(bytes.as_ref(), &[1, 1, 7, 0, 0, 0, 0]);

    let decoded = codec.decode(&bytes, &reading).unwrap();
    let record = decoded.as_record().unwrap();
    assert_eq!(record.get("id"), Some(&Value::I32(7)));
    assert_eq!(record.get("value"), None);
}

#[test]
fn test_string_array_with_null_element() {
    let codec = Codec::new(Options::default());
    let ty = TypeDescriptor::array(TypeDescriptor::string());
    let value = Value::List(vec!["a".into(), Value::Null, "ccc".into()]);

    let bytes = codec.encode(&value, &ty).unwrap();
    assert_eq!(
        bytes.as_ref(),
        &[
            1, // root
            3, 0, 0, 0, // count
            1, 1, 0, 0, 0, b'a', //
            0, //
            1, 3, 0, 0, 0, b'c', b'c', b'c',
        ]
    );
    assert_eq!(codec.decode(&bytes, &ty).unwrap(), value);
}

#[test]
fn test_dictionary_lowered_to_entries() {
    let codec = Codec::new(Options::default());
    let ty = TypeDescriptor::map(i32_ty(), TypeDescriptor::string());
    let value = Value::Map(vec![(1.into(), "x".into()), (2.into(), "y".into())]);

    let bytes = codec.encode(&value, &ty).unwrap();
    assert_eq!(
        bytes.as_ref(),
        &[
            1, // root
            2, 0, 0, 0, // entries
            1, 1, 1, 0, 0, 0, 2, 1, 0, 0, 0, b'x', 0, //
            1, 1, 2, 0, 0, 0, 2, 1, 0, 0, 0, b'y', 0,
        ]
    );
    assert_eq!(codec.decode(&bytes, &ty).unwrap(), value);
}

#[test]
fn test_duplicate_keys_overwrite() {
    let codec = Codec::new(Options::default());
    let ty = TypeDescriptor::map(i32_ty(), TypeDescriptor::string());
    let bytes = [
        1, 2, 0, 0, 0, //
        1, 1, 5, 0, 0, 0, 2, 1, 0, 0, 0, b'a', 0, //
        1, 1, 5, 0, 0, 0, 2, 1, 0, 0, 0, b'b', 0,
    ];
    assert_eq!(
        codec.decode(&bytes, &ty).unwrap(),
        Value::Map(vec![(5.into(), "b".into())])
    );
}

#[test]
fn test_truncated_object_is_end_of_input() {
    let (codec, order) = order_codec(Options::default());
    let bytes = [1, 1, 42, 0, 0, 0, 2, 2, 0, 0, 0, b'o', b'k'];
    let err = codec.decode(&bytes, &order).unwrap_err();
    assert!(matches!(err, CodecError::UnexpectedEof { needed: 1 }));
}

#[test]
fn test_duplicate_index_fails_at_resolution() {
    let codec = Codec::new(Options::default());
    let ty = TypeDescriptor::object("Clash")
        .indexed("a", 3, i32_ty())
        .indexed("b", 3, i32_ty())
        .build();
    let err = codec.converter(&ty).unwrap_err();
    assert!(err.is_construction());
    assert!(matches!(err, CodecError::DuplicateIndex { .. }));
}

#[test]
fn test_null_list_element_keeps_flag() {
    let codec = Codec::new(Options::default());
    let ty = TypeDescriptor::list(TypeDescriptor::nullable(PrimitiveKind::I16));
    let value = Value::List(vec![Value::I16(1), Value::Null]);
    let bytes = codec.encode(&value, &ty).unwrap();
    assert_eq!(bytes.as_ref(), &[1, 2, 0, 0, 0, 1, 1, 0, 0]);
    assert_eq!(codec.decode(&bytes, &ty).unwrap(), value);
}

#[test]
fn test_set_deduplicates_on_decode() {
    let codec = Codec::new(Options::default());
    let ty = TypeDescriptor::set(i32_ty());
    let bytes = [1, 3, 0, 0, 0, 4, 0, 0, 0, 4, 0, 0, 0, 9, 0, 0, 0];
    assert_eq!(
        codec.decode(&bytes, &ty).unwrap(),
        Value::Set(vec![Value::I32(4), Value::I32(9)])
    );
}

#[test]
fn test_names_survive_member_reordering() {
    let options = Options::default().with_property_names();
    let sender_types = TypeRegistry::new();
    let sender = TypeDescriptor::object("Person")
        .member("first", TypeDescriptor::string())
        .member("last", TypeDescriptor::string())
        .member("age", TypeDescriptor::primitive(PrimitiveKind::U8))
        .build();
    sender_types.register(sender.clone());

    let receiver_types = TypeRegistry::new();
    let receiver = TypeDescriptor::object("Person")
        .member("age", TypeDescriptor::primitive(PrimitiveKind::U8))
        .member("last", TypeDescriptor::string())
        .member("first", TypeDescriptor::string())
        .build();
    receiver_types.register(receiver.clone());

    let value = Value::Record(
        Record::new("Person")
            .with("first", "Ada")
            .with("last", "Lovelace")
            .with("age", 36u8),
    );
    let bytes = Codec::with_types(Arc::new(sender_types), options.clone())
        .encode(&value, &sender)
        .unwrap();
    let decoded = Codec::with_types(Arc::new(receiver_types), options)
        .decode(&bytes, &receiver)
        .unwrap();
    assert_eq!(decoded, value);
}

fn index_pair() -> (TypeRef, TypeRef) {
    let a = TypeDescriptor::object("A")
        .indexed("a0", 7, i32_ty())
        .indexed("x", 3, i32_ty())
        .build();
    let b = TypeDescriptor::object("B")
        .indexed("y", 3, i32_ty())
        .indexed("b0", 7, i32_ty())
        .build();
    (a, b)
}

#[test]
fn test_explicit_indices_map_across_types() {
    let (a, b) = index_pair();
    let codec = Codec::new(Options::default());
    let value = Value::Record(Record::new("A").with("a0", 10).with("x", 20));
    let bytes = codec.encode(&value, &a).unwrap();
    let decoded = codec.decode(&bytes, &b).unwrap();
    let record = decoded.as_record().unwrap();
    assert_eq!(record.get("y"), Some(&Value::I32(20)));
    assert_eq!(record.get("b0"), Some(&Value::I32(10)));
}

#[test]
fn test_ignore_index_uses_declaration_order() {
    let (a, b) = index_pair();
    let codec = Codec::new(Options::default().with_ignore_index_attribute());
    let value = Value::Record(Record::new("A").with("a0", 10).with("x", 20));
    let bytes = codec.encode(&value, &a).unwrap();
    let decoded = codec.decode(&bytes, &b).unwrap();
    let record = decoded.as_record().unwrap();
    assert_eq!(record.get("y"), Some(&Value::I32(10)));
    assert_eq!(record.get("b0"), Some(&Value::I32(20)));
}

fn versioned_order(extra: bool) -> (Arc<TypeRegistry>, TypeRef) {
    let types = TypeRegistry::new();
    let mut builder = TypeDescriptor::object("Order")
        .member("id", i32_ty())
        .member("name", TypeDescriptor::string());
    if extra {
        builder = builder.member("note", TypeDescriptor::string());
    }
    let ty = builder.build();
    types.register(ty.clone());
    (Arc::new(types), ty)
}

fn order_v2() -> Value {
    Value::Record(
        Record::new("Order")
            .with("id", 5)
            .with("name", "pen")
            .with("note", "fragile"),
    )
}

#[test]
fn test_extra_member_drained_with_types() {
    let options = Options::default().with_types();
    let (new_types, new_ty) = versioned_order(true);
    let (old_types, old_ty) = versioned_order(false);

    let bytes = Codec::with_types(new_types, options.clone())
        .encode(&order_v2(), &new_ty)
        .unwrap();
    let decoded = Codec::with_types(old_types, options)
        .decode(&bytes, &old_ty)
        .unwrap();
    assert_eq!(
        decoded,
        Value::Record(Record::new("Order").with("id", 5).with("name", "pen"))
    );
}

#[test]
fn test_extra_member_drained_with_names() {
    let options = Options::default().with_property_names();
    let (new_types, new_ty) = versioned_order(true);
    let (old_types, old_ty) = versioned_order(false);

    let bytes = Codec::with_types(new_types, options.clone())
        .encode(&order_v2(), &new_ty)
        .unwrap();
    let decoded = Codec::with_types(old_types, options)
        .decode_as(&bytes, &new_ty, &old_ty)
        .unwrap();
    assert_eq!(
        decoded,
        Value::Record(Record::new("Order").with("id", 5).with("name", "pen"))
    );
}

#[test]
fn test_extra_member_fatal_in_plain_index_mode() {
    let (new_types, new_ty) = versioned_order(true);
    let (old_types, old_ty) = versioned_order(false);

    let bytes = Codec::with_types(new_types, Options::default())
        .encode(&order_v2(), &new_ty)
        .unwrap();
    let err = Codec::with_types(old_types, Options::default())
        .decode(&bytes, &old_ty)
        .unwrap_err();
    match err {
        CodecError::UnknownMember { type_name, member } => {
            assert_eq!(type_name, "Order");
            assert_eq!(member, "#2");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_decode_and_decode_as_on_one_codec() {
    let options = Options::default().with_property_names();
    let (new_types, new_ty) = versioned_order(true);
    let (old_types, old_ty) = versioned_order(false);
    let codec = Codec::with_types(old_types, options.clone());

    let current = Value::Record(Record::new("Order").with("id", 1).with("name", "cup"));
    let bytes_v1 = codec.encode(&current, &old_ty).unwrap();
    assert_eq!(codec.decode(&bytes_v1, &old_ty).unwrap(), current);

    let bytes_v2 = Codec::with_types(new_types, options)
        .encode(&order_v2(), &new_ty)
        .unwrap();
    let decoded = codec.decode_as(&bytes_v2, &new_ty, &old_ty).unwrap();
    assert_eq!(
        decoded,
        Value::Record(Record::new("Order").with("id", 5).with("name", "pen"))
    );

    // the plain converter is untouched by the pair
    assert_eq!(codec.decode(&bytes_v1, &old_ty).unwrap(), current);
    assert!(codec.decode(&bytes_v2, &old_ty).is_err());
}

#[test]
fn test_extra_member_in_names_mode_needs_wire_type() {
    let options = Options::default().with_property_names();
    let (new_types, new_ty) = versioned_order(true);
    let (old_types, old_ty) = versioned_order(false);

    let bytes = Codec::with_types(new_types, options.clone())
        .encode(&order_v2(), &new_ty)
        .unwrap();
    let err = Codec::with_types(old_types, options)
        .decode(&bytes, &old_ty)
        .unwrap_err();
    assert!(matches!(
        &err,
        CodecError::UnknownMember { member, .. } if member == "note"
    ));
    assert!(err.to_string().contains("decode_as"));
}

fn shapes() -> (Codec, TypeRef) {
    let types = TypeRegistry::new();
    types.register(TypeDescriptor::object("Shape").abstract_type().build());
    types.register(
        TypeDescriptor::object("Circle")
            .member("radius", TypeDescriptor::primitive(PrimitiveKind::F64))
            .supertype("Shape")
            .build(),
    );
    types.register(
        TypeDescriptor::object("Label")
            .member("text", TypeDescriptor::string())
            .build(),
    );
    let drawing = TypeDescriptor::object("Drawing")
        .member("shape", TypeDescriptor::named("Shape"))
        .member("extra", TypeDescriptor::any())
        .build();
    types.register(drawing.clone());
    (Codec::with_types(Arc::new(types), Options::default()), drawing)
}

#[test]
fn test_polymorphic_members_carry_type_names() {
    let (codec, drawing) = shapes();
    let value = Value::Record(
        Record::new("Drawing")
            .with("shape", Record::new("Circle").with("radius", 2.5))
            .with("extra", Value::List(vec![Value::I64(1), "two".into()])),
    );
    let bytes = codec.encode(&value, &drawing).unwrap();
    let circle = b"Circle";
    assert_eq!(&bytes[2..6], &(circle.len() as i32).to_le_bytes());
    assert_eq!(&bytes[6..12], circle);
    assert_eq!(codec.decode(&bytes, &drawing).unwrap(), value);
}

#[test]
fn test_value_outside_declared_hierarchy_is_rejected() {
    let (codec, drawing) = shapes();
    let value = Value::Record(
        Record::new("Drawing").with("shape", Record::new("Label").with("text", "hi")),
    );
    let err = codec.encode(&value, &drawing).unwrap_err();
    assert!(matches!(err, CodecError::TypeMismatch { .. }));
}

#[test]
fn test_type_name_mismatch_on_decode() {
    let codec = Codec::new(Options::default().with_types());
    let bytes = codec.encode(&Value::I32(3), &i32_ty()).unwrap();
    let err = codec
        .decode(&bytes, &TypeDescriptor::primitive(PrimitiveKind::I64))
        .unwrap_err();
    match err {
        CodecError::TypeMismatch { expected, actual } => {
            assert_eq!(expected, "i64");
            assert_eq!(actual, "i32");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_out_of_range_enum_is_kept() {
    let codec = Codec::new(Options::default());
    let color = TypeDescriptor::enumeration("Color", PrimitiveKind::I32);
    let decoded = codec.decode(&99i32.to_le_bytes(), &color).unwrap();
    assert_eq!(decoded, Value::enumeration("Color", 99));
}

#[test]
fn test_u64_enum_round_trips_above_i64_max() {
    let codec = Codec::new(Options::default());
    let big = TypeDescriptor::enumeration("Big", PrimitiveKind::U64);
    for raw in [u64::MAX, 1 << 63, 7] {
        let bytes = raw.to_le_bytes();
        let decoded = codec.decode(&bytes, &big).unwrap();
        assert_eq!(decoded, Value::enumeration("Big", raw as i64));
        assert_eq!(codec.encode(&decoded, &big).unwrap().as_ref(), &bytes);
    }
}

#[test]
fn test_uint16_indices() {
    let options = Options::default().with_index_size(IndexSize::UInt16);
    let (codec, order) = order_codec(options);
    let value = Value::Record(Record::new("Order").with("id", 1).with("name", ""));
    let bytes = codec.encode(&value, &order).unwrap();
    assert_eq!(
        bytes.as_ref(),
        &[1, 1, 0, 1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0]
    );
    assert_eq!(codec.decode(&bytes, &order).unwrap(), value);
}

#[test]
fn test_type_info_round_trip() {
    let (codec, order) = order_codec(Options::default().with_types());
    let value = Value::Record(Record::new("Order").with("id", 3).with("name", "typed"));
    let list = TypeDescriptor::list(order.clone());
    let items = Value::List(vec![value.clone(), Value::Null, value]);
    let bytes = codec.encode(&items, &list).unwrap();
    assert_eq!(codec.decode(&bytes, &list).unwrap(), items);
}
