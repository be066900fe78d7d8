use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LoadError;

/// Declarative description of one build, as read from a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    pub entry_point: PathBuf,

    #[serde(default)]
    pub datas: Vec<DataMapping>,

    #[serde(default)]
    pub hidden_imports: Vec<String>,

    #[serde(default)]
    pub excludes: Vec<String>,

    /// Kept untyped so the resolver can report every unknown option at once.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// A resource copied verbatim into the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawMapping")]
pub struct DataMapping {
    pub source: PathBuf,
    pub destination: String,
}

// Accepts both `["src", "dest"]` pairs and `{ source, destination }` tables.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMapping {
    Pair(PathBuf, String),
    Table(MappingTable),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingTable {
    source: PathBuf,
    destination: String,
}

impl From<RawMapping> for DataMapping {
    fn from(raw: RawMapping) -> Self {
        match raw {
            RawMapping::Pair(source, destination)
            | RawMapping::Table(MappingTable {
                source,
                destination,
            }) => DataMapping {
                source,
                destination,
            },
        }
    }
}

impl DataMapping {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(ConfigFormat::Json),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            _ => None,
        }
    }
}

impl BuildConfig {
    pub fn new(entry_point: impl Into<PathBuf>) -> Self {
        Self {
            entry_point: entry_point.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| LoadError::UnsupportedFormat(path.to_path_buf()))?;

        let content = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = match format {
            ConfigFormat::Json => {
                serde_json::from_str(&content).map_err(|source| LoadError::Json {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            ConfigFormat::Yaml => {
                serde_yaml::from_str(&content).map_err(|source| LoadError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        };

        tracing::debug!(path = %path.display(), "loaded build configuration");

        Ok(config)
    }

    /// Directory that relative paths in the configuration at `path` are resolved against.
    pub fn base_dir(path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}
