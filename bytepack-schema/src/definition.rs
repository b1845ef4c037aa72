//! Schema documents.

use crate::error::SchemaError;
use bytepack_core::{
    ConverterRegistry, MemberDescriptor, MemberLayout, PrimitiveKind, TypeDescriptor, TypeKind,
    TypeRef, TypeRegistry,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// A set of type definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

/// One named definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDef {
    Object(ObjectDef),
    Enum(EnumDef),
    Alias(AliasDef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    #[serde(default)]
    pub members: Vec<MemberDef>,
    /// Interface or abstract base; values always travel with their type name.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDef {
    pub name: String,
    /// Type expression, e.g. `list<Order>`.
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u16>,
    #[serde(default)]
    pub ignored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    #[serde(default = "default_underlying")]
    pub underlying: String,
    #[serde(default)]
    pub flags: bool,
}

fn default_underlying() -> String {
    PrimitiveKind::I32.name().to_owned()
}

/// Another name for a type expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasDef {
    pub name: String,
    pub target: String,
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Object(o) => &o.name,
            TypeDef::Enum(e) => &e.name,
            TypeDef::Alias(a) => &a.name,
        }
    }

    /// Builds the descriptor. Member types stay unresolved references.
    pub fn to_descriptor(&self) -> Result<TypeRef, SchemaError> {
        match self {
            TypeDef::Object(def) => {
                let mut builder = TypeDescriptor::object(def.name.clone());
                for member in &def.members {
                    let mut descriptor =
                        MemberDescriptor::new(member.name.clone(), type_expr(&member.ty));
                    if let Some(index) = member.index {
                        descriptor = descriptor.with_index(index);
                    }
                    if member.ignored {
                        descriptor = descriptor.ignored();
                    }
                    builder = builder.with_member(descriptor);
                }
                if def.is_abstract {
                    builder = builder.abstract_type();
                }
                for parent in &def.extends {
                    builder = builder.supertype(parent.clone());
                }
                Ok(builder.build())
            }
            TypeDef::Enum(def) => {
                let underlying = PrimitiveKind::from_name(def.underlying.trim())
                    .filter(PrimitiveKind::is_integer)
                    .ok_or_else(|| {
                        SchemaError::invalid(
                            &def.name,
                            format!("enum underlying type {} is not an integer", def.underlying),
                        )
                    })?;
                Ok(if def.flags {
                    TypeDescriptor::flags(def.name.clone(), underlying)
                } else {
                    TypeDescriptor::enumeration(def.name.clone(), underlying)
                })
            }
            TypeDef::Alias(def) => Ok(Arc::new(TypeDescriptor::new(
                def.name.clone(),
                TypeKind::Named(def.target.trim().to_owned()),
            ))),
        }
    }
}

fn type_expr(expr: &str) -> TypeRef {
    match expr.trim() {
        "any" => TypeDescriptor::any(),
        other => TypeDescriptor::named(other),
    }
}

impl Schema {
    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a `.yaml`, `.yml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            Some("json") => Self::from_json_str(&text),
            other => Err(SchemaError::UnsupportedFormat(
                other.unwrap_or_default().to_owned(),
            )),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String, SchemaError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Structural checks that do not need other types.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names = HashSet::new();
        for def in &self.types {
            let name = def.name();
            if name.trim().is_empty() || name.contains(['<', '>', ',', '?']) {
                return Err(SchemaError::invalid(name, "not a valid type name"));
            }
            if !names.insert(name) {
                return Err(SchemaError::DuplicateDefinition(name.to_owned()));
            }
            if let TypeDef::Object(object) = def {
                let mut members = HashSet::new();
                for member in &object.members {
                    if member.name.is_empty() {
                        return Err(SchemaError::invalid(name, "member names cannot be empty"));
                    }
                    if !members.insert(member.name.as_str()) {
                        return Err(SchemaError::invalid(
                            name,
                            format!("member {} is declared twice", member.name),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Validates and registers every definition, replacing types of the
    /// same name.
    pub fn install(&self, registry: &TypeRegistry) -> Result<Vec<TypeRef>, SchemaError> {
        self.validate()?;
        let descriptors = self
            .types
            .iter()
            .map(TypeDef::to_descriptor)
            .collect::<Result<Vec<_>, _>>()?;
        for ty in &descriptors {
            registry.register(ty.clone());
            tracing::debug!("Registered type {}", ty.name());
        }
        Ok(descriptors)
    }

    /// Builds a converter for every defined type so that unresolved
    /// references, duplicate indices and similar faults surface now.
    pub fn check(&self, converters: &ConverterRegistry, layout: MemberLayout) -> Result<(), SchemaError> {
        for def in &self.types {
            converters.resolve_name(def.name(), layout)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytepack_core::CodecError;
    use std::io::Write;

    const ORDERS: &str = r#"
types:
  - kind: object
    name: Order
    members:
      - { name: id, type: i64, index: 0 }
      - { name: lines, type: "list<Line>", index: 1 }
      - { name: status, type: Status, index: 2 }
      - { name: cache, type: string, ignored: true }
  - kind: object
    name: Line
    members:
      - { name: sku, type: string }
      - { name: qty, type: u16 }
      - { name: next, type: Line }
  - kind: enum
    name: Status
    underlying: u8
  - kind: alias
    name: OrderList
    target: "list<Order>"
"#;

    #[test]
    fn test_parse_yaml() {
        let schema = Schema::from_yaml_str(ORDERS).unwrap();
        assert_eq!(schema.types.len(), 4);
        let TypeDef::Object(order) = &schema.types[0] else {
            panic!("expected object");
        };
        assert_eq!(order.members[1].ty, "list<Line>");
        assert_eq!(order.members[2].index, Some(2));
        assert!(order.members[3].ignored);
        let TypeDef::Enum(status) = &schema.types[2] else {
            panic!("expected enum");
        };
        assert_eq!(status.underlying, "u8");
        assert!(!status.flags);
    }

    #[test]
    fn test_install_and_check() {
        let schema = Schema::from_yaml_str(ORDERS).unwrap();
        let types = Arc::new(TypeRegistry::new());
        schema.install(&types).unwrap();
        assert!(types.contains("Order"));
        assert!(types.contains("OrderList"));

        let converters = ConverterRegistry::new(types);
        schema.check(&converters, MemberLayout::Attribute).unwrap();
        let list = converters
            .resolve_name("OrderList", MemberLayout::Attribute)
            .unwrap();
        assert_eq!(list.name(), "list<Order>");
    }

    #[test]
    fn test_unresolved_member_fails_check() {
        let schema = Schema::from_yaml_str(
            "types:\n  - kind: object\n    name: Broken\n    members:\n      - { name: x, type: Missing }\n",
        )
        .unwrap();
        let types = Arc::new(TypeRegistry::new());
        schema.install(&types).unwrap();
        let err = schema
            .check(&ConverterRegistry::new(types), MemberLayout::Attribute)
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Codec(CodecError::UnresolvedType(name)) if name == "Missing"
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut schema = Schema::from_yaml_str(ORDERS).unwrap();
        schema.types.push(schema.types[0].clone());
        assert!(matches!(
            schema.validate(),
            Err(SchemaError::DuplicateDefinition(name)) if name == "Order"
        ));
    }

    #[test]
    fn test_enum_requires_integer() {
        let def = TypeDef::Enum(EnumDef {
            name: "Bad".into(),
            underlying: "f64".into(),
            flags: false,
        });
        assert!(matches!(
            def.to_descriptor(),
            Err(SchemaError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_from_path_json_and_yaml() {
        let schema = Schema::from_yaml_str(ORDERS).unwrap();

        let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        yaml.write_all(schema.to_yaml_string().unwrap().as_bytes())
            .unwrap();
        assert_eq!(Schema::from_path(yaml.path()).unwrap(), schema);

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json.write_all(serde_json::to_string(&schema).unwrap().as_bytes())
            .unwrap();
        assert_eq!(Schema::from_path(json.path()).unwrap(), schema);

        let other = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        assert!(matches!(
            Schema::from_path(other.path()),
            Err(SchemaError::UnsupportedFormat(ext)) if ext == "toml"
        ));
    }
}
