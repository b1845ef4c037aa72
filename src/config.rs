//! CLI configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via BYTEPACK_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by the caller)

use bytepack_core::{IndexSize, Options, TextEncoding};
use bytepack_io::StreamConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "BYTEPACK_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wire options; both ends of an exchange must agree on them.
    pub codec: Options,
    /// Chunking and buffer limits for file and stdin/stdout streams.
    pub stream: StreamConfig,
}

impl Config {
    /// Loads configuration from `path`, or from BYTEPACK_CONFIG when no path
    /// is given, then applies environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config.normalized())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Applies overrides from a variable source. Unparseable values are
    /// logged and skipped.
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_flag(&var, "BYTEPACK_USE_NAMES") {
            self.codec.use_property_names = v;
        }
        if let Some(v) = parse_flag(&var, "BYTEPACK_USE_TYPES") {
            self.codec.use_types = v;
        }
        if let Some(v) = parse_flag(&var, "BYTEPACK_IGNORE_INDEX") {
            self.codec.ignore_index_attribute = v;
        }
        if let Some(v) = parse_var::<IndexSize, _>(&var, "BYTEPACK_INDEX_SIZE") {
            self.codec.index_size = v;
        }
        if let Some(v) = parse_var::<TextEncoding, _>(&var, "BYTEPACK_TEXT_ENCODING") {
            self.codec.text_encoding = v;
        }
        if let Some(v) = parse_var::<usize, _>(&var, "BYTEPACK_CHUNK_SIZE") {
            self.stream = self.stream.with_chunk_size(v);
        }
        if let Some(v) = parse_var::<usize, _>(&var, "BYTEPACK_MAX_BUFFER") {
            self.stream = self.stream.with_max_buffer(v);
        }
    }

    fn normalized(mut self) -> Self {
        self.stream = self.stream.normalized();
        self
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value {:?} for {}", raw, key);
            None
        }
    }
}

fn parse_flag<F>(var: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = var(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Ignoring invalid value {:?} for {}", raw, key);
            None
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.codec.use_property_names);
        assert_eq!(config.codec.index_size, IndexSize::Byte);
        assert_eq!(config.stream, StreamConfig::default());
    }

    #[test]
    fn test_yaml_file_then_env() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "codec:\n  use_property_names: true\n  index_size: uint16\nstream:\n  chunk_size: 1024"
        )
        .unwrap();

        let mut config = Config::from_file(file.path()).unwrap();
        assert!(config.codec.use_property_names);
        assert_eq!(config.codec.index_size, IndexSize::UInt16);
        assert_eq!(config.stream.chunk_size, 1024);

        config.apply_overrides(vars(&[
            ("BYTEPACK_USE_NAMES", "0"),
            ("BYTEPACK_USE_TYPES", "true"),
            ("BYTEPACK_TEXT_ENCODING", "utf-16le"),
            ("BYTEPACK_CHUNK_SIZE", "4096"),
        ]));
        assert!(!config.codec.use_property_names);
        assert!(config.codec.use_types);
        assert_eq!(config.codec.text_encoding, TextEncoding::Utf16Le);
        assert_eq!(config.stream.chunk_size, 4096);
        // untouched by env
        assert_eq!(config.codec.index_size, IndexSize::UInt16);
    }

    #[test]
    fn test_invalid_env_values_are_skipped() {
        let mut config = Config::default();
        config.apply_overrides(vars(&[
            ("BYTEPACK_INDEX_SIZE", "u32"),
            ("BYTEPACK_IGNORE_INDEX", "maybe"),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bytepack.yaml");
        let mut config = Config::default();
        config.codec = config.codec.with_types();
        config.save(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/bytepack.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
