use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DataMapping;
use crate::metadata::TargetMetadata;

pub const MANIFEST_VERSION: u32 = 1;

/// Everything a platform bundler must embed into one standalone executable.
///
/// Set-valued fields are `BTreeSet`s so the serialized form is sorted and two
/// resolutions of the same input produce identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub version: u32,
    pub entry_point: PathBuf,
    pub data_mappings: Vec<DataMapping>,
    pub modules: BTreeSet<String>,
    pub excludes: BTreeSet<String>,
    pub metadata: TargetMetadata,
}

impl BundleManifest {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize manifest to JSON")
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: BundleManifest =
            serde_json::from_str(content).context("Failed to parse manifest JSON")?;

        if manifest.version != MANIFEST_VERSION {
            return Err(anyhow::anyhow!(
                "Unsupported manifest version {} (expected {})",
                manifest.version,
                MANIFEST_VERSION
            ));
        }

        Ok(manifest)
    }
}

pub struct ManifestStore {
    cache_dir: PathBuf,
}

impl ManifestStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }

    pub fn write_manifest(&self, manifest: &BundleManifest) -> Result<PathBuf> {
        let manifest_path = self.manifest_path(&manifest.metadata.executable_name);
        write_manifest_to(manifest, &manifest_path)?;
        Ok(manifest_path)
    }

    pub fn manifest_path(&self, executable_name: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}-manifest.json", executable_name))
    }

    pub fn read_manifest(&self, manifest_path: &Path) -> Result<BundleManifest> {
        let manifest_content = fs::read_to_string(manifest_path)
            .with_context(|| format!("Failed to read manifest from {}", manifest_path.display()))?;

        BundleManifest::from_json(&manifest_content)
            .with_context(|| format!("Invalid manifest at {}", manifest_path.display()))
    }
}

impl Default for ManifestStore {
    fn default() -> Self {
        Self::new(".packspec/cache")
    }
}

/// Writes `manifest` as pretty JSON, creating parent directories as needed.
pub fn write_manifest_to(manifest: &BundleManifest, manifest_path: &Path) -> Result<()> {
    if let Some(manifest_parent) = manifest_path.parent() {
        if !manifest_parent.as_os_str().is_empty() {
            fs::create_dir_all(manifest_parent).with_context(|| {
                format!("Failed to create manifest directory: {}", manifest_parent.display())
            })?;
        }
    }

    let manifest_json = manifest.to_json()?;

    fs::write(manifest_path, manifest_json)
        .with_context(|| format!("Failed to write manifest to {}", manifest_path.display()))?;

    tracing::info!(path = %manifest_path.display(), "wrote bundle manifest");

    Ok(())
}
