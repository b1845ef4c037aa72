//! Command execution.

use crate::config::Config;
use bytepack_core::{Codec, TypeRef, TypeRegistry, Value};
use bytepack_io::{AsyncValueReader, AsyncValueWriter, StreamConfig, ValueReader};
use bytepack_schema::{from_json, to_json, Schema, TypeDef};
use colored::Colorize;
use serde_json::Value as Json;
use std::error::Error;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

pub type CommandResult<T> = Result<T, Box<dyn Error>>;

/// Codec and stream settings shared by every command.
pub struct Context {
    pub codec: Codec,
    pub stream: StreamConfig,
}

impl Context {
    /// Builds the codec, registering the definitions of `schema` if given.
    pub fn new(config: &Config, schema: Option<&Path>) -> CommandResult<Self> {
        let types = Arc::new(TypeRegistry::new());
        if let Some(path) = schema {
            let schema = Schema::from_path(path)?;
            let installed = schema.install(&types)?;
            tracing::info!("Loaded {} type(s) from {}", installed.len(), path.display());
        }
        Ok(Self {
            codec: Codec::with_types(types, config.codec.clone()),
            stream: config.stream,
        })
    }

    /// Looks up a registered type name or a type expression.
    pub fn resolve(&self, type_name: &str) -> CommandResult<TypeRef> {
        Ok(self.codec.types().lookup(type_name)?)
    }

    fn to_json(&self, value: &Value, ty: &TypeRef) -> CommandResult<Json> {
        Ok(to_json(value, ty, self.codec.types())?)
    }
}

/// Encodes every JSON document in `text` to `writer`. Returns the number of
/// values and bytes written.
pub async fn encode_stream<W>(
    ctx: &Context,
    ty: &TypeRef,
    text: &str,
    writer: W,
) -> CommandResult<(usize, u64)>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = AsyncValueWriter::new(writer, ctx.codec.clone(), ty.clone(), &ctx.stream);
    let mut count = 0;
    let mut bytes = 0u64;
    for document in serde_json::Deserializer::from_str(text).into_iter::<Json>() {
        let value = from_json(&document?, ty, ctx.codec.types())?;
        bytes += writer.write(&value).await? as u64;
        count += 1;
    }
    writer.flush().await?;
    tracing::debug!("Encoded {} value(s), {} bytes", count, bytes);
    Ok((count, bytes))
}

/// Encodes every JSON document in `text` as one hex line per value.
pub fn encode_hex(ctx: &Context, ty: &TypeRef, text: &str) -> CommandResult<Vec<String>> {
    let mut lines = Vec::new();
    for document in serde_json::Deserializer::from_str(text).into_iter::<Json>() {
        let value = from_json(&document?, ty, ctx.codec.types())?;
        lines.push(hex::encode(ctx.codec.encode(&value, ty)?));
    }
    Ok(lines)
}

/// Decodes values from `reader` until it ends between values.
pub async fn decode_stream<R>(ctx: &Context, ty: &TypeRef, reader: R) -> CommandResult<Vec<Json>>
where
    R: AsyncRead + Unpin,
{
    let mut reader = AsyncValueReader::new(reader, ctx.codec.clone(), ty.clone(), &ctx.stream);
    let mut documents = Vec::new();
    while let Some(value) = reader.read().await? {
        documents.push(ctx.to_json(&value, ty)?);
    }
    Ok(documents)
}

/// Decodes values from hex text.
pub fn decode_hex(ctx: &Context, ty: &TypeRef, text: &str) -> CommandResult<Vec<Json>> {
    let bytes = parse_hex(text)?;
    let reader = ValueReader::new(Cursor::new(bytes), ctx.codec.clone(), ty.clone(), &ctx.stream);
    let mut documents = Vec::new();
    for value in reader {
        documents.push(ctx.to_json(&value?, ty)?);
    }
    Ok(documents)
}

/// Hex text with any whitespace removed.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact)
}

/// Hex dump, 16 bytes per line with offsets. Bytes at or past `highlight`
/// are dimmed.
pub fn hex_dump(bytes: &[u8], highlight: Option<usize>) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let offset = line * 16;
        out.push_str(&format!("{}  ", format!("{:08x}", offset).dimmed()));
        for (i, byte) in chunk.iter().enumerate() {
            let cell = format!("{:02x}", byte);
            match highlight {
                Some(end) if offset + i >= end => out.push_str(&cell.dimmed().to_string()),
                _ => out.push_str(&cell),
            }
            out.push(if i == 7 { '-' } else { ' ' });
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        let ascii: String = chunk
            .iter()
            .map(|b| if b.is_ascii_graphic() { *b as char } else { '.' })
            .collect();
        out.push_str(&format!(" {}\n", ascii));
    }
    out
}

/// Dumps `bytes` and, when a type is given, decodes one value from the front.
pub fn inspect(ctx: &Context, bytes: &[u8], ty: Option<&TypeRef>) -> CommandResult<String> {
    let mut out = format!("{} {} bytes\n", "Input:".bold(), bytes.len());
    let Some(ty) = ty else {
        out.push_str(&hex_dump(bytes, None));
        return Ok(out);
    };

    match ctx.codec.decode_prefix(bytes, ty) {
        Ok((value, used)) => {
            out.push_str(&hex_dump(bytes, Some(used)));
            out.push_str(&format!(
                "{} {} ({} bytes, {} trailing)\n",
                "Decoded".green(),
                ty.name().cyan(),
                used,
                bytes.len() - used
            ));
            out.push_str(&format_json(&ctx.to_json(&value, ty)?));
        }
        Err(e) => {
            out.push_str(&hex_dump(bytes, None));
            out.push_str(&format!("{}: {}", "Decode failed".red(), e));
        }
    }
    Ok(out)
}

/// Loads a schema and builds a converter for every definition.
pub fn check_schema(ctx: &Context, path: &Path) -> CommandResult<String> {
    let schema = Schema::from_path(path)?;
    schema.install(ctx.codec.types())?;
    schema.check(ctx.codec.converters(), ctx.codec.options().member_layout())?;

    let mut out = format!(
        "{} {} ({} types)\n",
        "Valid".green(),
        path.display(),
        schema.types.len()
    );
    for def in &schema.types {
        let detail = match def {
            TypeDef::Object(o) if o.is_abstract => "abstract object".to_string(),
            TypeDef::Object(o) => format!("object, {} members", o.members.len()),
            TypeDef::Enum(e) if e.flags => format!("flags ({})", e.underlying),
            TypeDef::Enum(e) => format!("enum ({})", e.underlying),
            TypeDef::Alias(a) => format!("alias of {}", a.target),
        };
        out.push_str(&format!("  {} {}\n", def.name().cyan(), detail.dimmed()));
    }
    Ok(out)
}

pub fn format_json(value: &Json) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCHEMA: &str = r#"
types:
  - kind: object
    name: Point
    members:
      - { name: x, type: i32 }
      - { name: y, type: i32 }
      - { name: label, type: string }
"#;

    fn context(config: &Config) -> (Context, tempfile::NamedTempFile) {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(SCHEMA.as_bytes()).unwrap();
        let ctx = Context::new(config, Some(file.path())).unwrap();
        (ctx, file)
    }

    #[tokio::test]
    async fn test_encode_then_decode_stream() {
        let (ctx, _schema) = context(&Config::default());
        let ty = ctx.resolve("Point").unwrap();
        let input = r#"{"x": 1, "y": 2, "label": "a"} {"x": -5, "y": 0}"#;

        let mut out = Vec::new();
        let (count, bytes) = encode_stream(&ctx, &ty, input, &mut out).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(bytes, out.len() as u64);

        let decoded = decode_stream(&ctx, &ty, out.as_slice()).await.unwrap();
        assert_eq!(decoded[0], serde_json::json!({"x": 1, "y": 2, "label": "a"}));
        assert_eq!(decoded[1], serde_json::json!({"x": -5, "y": 0}));
    }

    #[test]
    fn test_hex_round_trip_with_names() {
        let mut config = Config::default();
        config.codec = config.codec.with_property_names();
        let (ctx, _schema) = context(&config);
        let ty = ctx.resolve("Point").unwrap();

        let lines = encode_hex(&ctx, &ty, r#"{"x": 3, "y": 4}"#).unwrap();
        assert_eq!(lines.len(), 1);
        let decoded = decode_hex(&ctx, &ty, &lines[0]).unwrap();
        assert_eq!(decoded, vec![serde_json::json!({"x": 3, "y": 4})]);
    }

    #[test]
    fn test_type_expression_without_schema() {
        let ctx = Context::new(&Config::default(), None).unwrap();
        let ty = ctx.resolve("list<i16>").unwrap();
        let lines = encode_hex(&ctx, &ty, "[7, 8]").unwrap();
        assert_eq!(lines, vec!["010200000007000800".to_string()]);
    }

    #[test]
    fn test_parse_hex_ignores_whitespace() {
        assert_eq!(parse_hex("01 ff\n0a").unwrap(), vec![0x01, 0xff, 0x0a]);
        assert!(parse_hex("0").is_err());
    }

    #[test]
    fn test_hex_dump_layout() {
        colored::control::set_override(false);
        let dump = hex_dump(b"bytepack", None);
        let expected = format!(
            "00000000  62 79 74 65 70 61 63 6b-{} bytepack\n",
            " ".repeat(24)
        );
        assert_eq!(dump, expected);
    }

    #[test]
    fn test_inspect_reports_trailing_bytes() {
        colored::control::set_override(false);
        let ctx = Context::new(&Config::default(), None).unwrap();
        let ty = ctx.resolve("i16").unwrap();
        let out = inspect(&ctx, &[7, 0, 9, 9], Some(&ty)).unwrap();
        assert!(out.contains("(2 bytes, 2 trailing)"));
    }

    #[test]
    fn test_check_schema_lists_types() {
        colored::control::set_override(false);
        let (ctx, schema) = context(&Config::default());
        let out = check_schema(&ctx, schema.path()).unwrap();
        assert!(out.starts_with("Valid"));
        assert!(out.contains("Point object, 3 members"));
    }
}
