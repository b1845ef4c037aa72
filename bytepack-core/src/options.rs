//! Encode/decode options.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Width of the member index token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSize {
    /// One byte per index: at most 254 members per type.
    #[default]
    Byte,
    /// Two bytes per index: at most 65534 members per type.
    #[serde(alias = "u16")]
    UInt16,
}

impl IndexSize {
    /// Number of bytes an index token occupies.
    pub fn width(&self) -> usize {
        match self {
            IndexSize::Byte => 1,
            IndexSize::UInt16 => 2,
        }
    }

    /// Largest wire index (declared index + 1) this size can carry.
    pub fn max_wire_index(&self) -> u16 {
        match self {
            IndexSize::Byte => 254,
            IndexSize::UInt16 => 65534,
        }
    }
}

impl FromStr for IndexSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "byte" | "u8" | "1" => Ok(IndexSize::Byte),
            "uint16" | "u16" | "2" => Ok(IndexSize::UInt16),
            other => Err(format!("unknown index size: {}", other)),
        }
    }
}

/// Byte encoding used for every length-prefixed string on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "utf-16le", alias = "utf16")]
    Utf16Le,
}

impl TextEncoding {
    /// Encodes text into wire bytes.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        match self {
            TextEncoding::Utf8 => Cow::Borrowed(text.as_bytes()),
            TextEncoding::Utf16Le => Cow::Owned(
                text.encode_utf16()
                    .flat_map(|unit| unit.to_le_bytes())
                    .collect(),
            ),
        }
    }

    /// Byte length of `text` once encoded.
    pub fn encoded_len(&self, text: &str) -> usize {
        match self {
            TextEncoding::Utf8 => text.len(),
            TextEncoding::Utf16Le => text.encode_utf16().count() * 2,
        }
    }

    /// Decodes wire bytes into text.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, CodecError> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| CodecError::InvalidText),
            TextEncoding::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(CodecError::InvalidText);
                }
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|_| CodecError::InvalidText)
            }
        }
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "utf16" | "utf-16" | "utf16le" | "utf-16le" => Ok(TextEncoding::Utf16Le),
            other => Err(format!("unknown text encoding: {}", other)),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf-8"),
            TextEncoding::Utf16Le => write!(f, "utf-16le"),
        }
    }
}

/// How member indices are assigned when building an object converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberLayout {
    /// Explicit indices win; unassigned members take their declaration position.
    Attribute,
    /// Explicit indices are ignored; every member takes its declaration position.
    Declaration,
}

/// Options shared by an encode/decode operation.
///
/// Both sides of an exchange must agree on every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Tag members by name instead of numeric index.
    pub use_property_names: bool,
    /// Precede every value with its concrete type name.
    pub use_types: bool,
    /// Disregard explicit member indices and use declaration order.
    pub ignore_index_attribute: bool,
    /// Width of index tokens.
    pub index_size: IndexSize,
    /// Encoding for all length-prefixed strings.
    pub text_encoding: TextEncoding,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property_names(mut self) -> Self {
        self.use_property_names = true;
        self
    }

    pub fn with_types(mut self) -> Self {
        self.use_types = true;
        self
    }

    pub fn with_ignore_index_attribute(mut self) -> Self {
        self.ignore_index_attribute = true;
        self
    }

    pub fn with_index_size(mut self, size: IndexSize) -> Self {
        self.index_size = size;
        self
    }

    pub fn with_text_encoding(mut self, encoding: TextEncoding) -> Self {
        self.text_encoding = encoding;
        self
    }

    /// Index assignment strategy implied by these options.
    pub fn member_layout(&self) -> MemberLayout {
        if self.ignore_index_attribute {
            MemberLayout::Declaration
        } else {
            MemberLayout::Attribute
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builders() {
        let options = Options::new()
            .with_property_names()
            .with_types()
            .with_ignore_index_attribute()
            .with_index_size(IndexSize::UInt16)
            .with_text_encoding(TextEncoding::Utf16Le);

        assert!(options.use_property_names);
        assert!(options.use_types);
        assert_eq!(options.member_layout(), MemberLayout::Declaration);
        assert_eq!(options.index_size.width(), 2);
        assert_eq!(options.text_encoding, TextEncoding::Utf16Le);
        assert_eq!(Options::default().member_layout(), MemberLayout::Attribute);
    }

    #[test]
    fn test_index_size_limits() {
        assert_eq!(IndexSize::Byte.max_wire_index(), 254);
        assert_eq!(IndexSize::UInt16.max_wire_index(), 65534);
        assert_eq!("u16".parse::<IndexSize>().unwrap(), IndexSize::UInt16);
        assert_eq!("byte".parse::<IndexSize>().unwrap(), IndexSize::Byte);
        assert!("u32".parse::<IndexSize>().is_err());
    }

    #[test]
    fn test_text_encoding_roundtrip() {
        for encoding in [TextEncoding::Utf8, TextEncoding::Utf16Le] {
            let text = "héllo ✓";
            let bytes = encoding.encode(text);
            assert_eq!(bytes.len(), encoding.encoded_len(text));
            assert_eq!(encoding.decode(&bytes).unwrap(), text);
        }
        assert_eq!(TextEncoding::Utf16Le.encoded_len("ab"), 4);
    }

    #[test]
    fn test_text_encoding_rejects_garbage() {
        assert!(TextEncoding::Utf8.decode(&[0xFF, 0xFE]).is_err());
        assert!(TextEncoding::Utf16Le.decode(&[0x41]).is_err());
    }

    #[test]
    fn test_options_serde() {
        let json = r#"{"use_types": true, "index_size": "uint16", "text_encoding": "utf-16le"}"#;
        let options: Options = serde_json::from_str(json).unwrap();
        assert!(options.use_types);
        assert!(!options.use_property_names);
        assert_eq!(options.index_size, IndexSize::UInt16);
        assert_eq!(options.text_encoding, TextEncoding::Utf16Le);
    }
}
