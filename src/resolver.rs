//! Resolution of a declarative build description into a [`BundleManifest`].
//!
//! Resolution validates every referenced path up front and reports all defects
//! together, so a single run tells the user everything that needs fixing. The
//! only filesystem access is read-only existence checks; nothing is copied or
//! written here.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use crate::config::{BuildConfig, DataMapping};
use crate::error::{ConfigIssue, ConfigurationError};
use crate::manifest::{BundleManifest, MANIFEST_VERSION};
use crate::metadata::{self, TargetMetadata};

pub struct Resolver {
    base_dir: PathBuf,
}

impl Resolver {
    /// Relative paths are checked against `base_dir`. The manifest keeps them as written.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn resolve(&self, config: &BuildConfig) -> Result<BundleManifest, ConfigurationError> {
        self.resolve_parts(
            &config.entry_point,
            &config.datas,
            &config.hidden_imports,
            &config.excludes,
            &config.metadata,
        )
    }

    pub fn resolve_parts(
        &self,
        entry_point: &Path,
        data_mappings: &[DataMapping],
        hidden_imports: &[String],
        excludes: &[String],
        options: &BTreeMap<String, Value>,
    ) -> Result<BundleManifest, ConfigurationError> {
        let mut issues = Vec::new();

        self.check_entry_point(entry_point, &mut issues);
        self.check_data_mappings(data_mappings, &mut issues);

        let metadata = TargetMetadata::from_options(options, entry_point, &mut issues);
        if let Some(icon) = &metadata.icon {
            metadata::check_icon(icon, &self.locate(icon), &mut issues);
        }

        ConfigurationError::check(issues)?;

        let excludes: BTreeSet<String> = excludes.iter().cloned().collect();
        let modules = final_modules(hidden_imports, &excludes);

        tracing::info!(
            entry_point = %entry_point.display(),
            modules = modules.len(),
            excludes = excludes.len(),
            data_mappings = data_mappings.len(),
            "resolved bundle manifest"
        );

        Ok(BundleManifest {
            version: MANIFEST_VERSION,
            entry_point: entry_point.to_path_buf(),
            data_mappings: data_mappings.to_vec(),
            modules,
            excludes,
            metadata,
        })
    }

    fn locate(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn check_entry_point(&self, entry_point: &Path, issues: &mut Vec<ConfigIssue>) {
        if entry_point.as_os_str().is_empty() {
            issues.push(ConfigIssue::EmptyEntryPoint);
            return;
        }

        let located = self.locate(entry_point);
        if !located.exists() {
            issues.push(ConfigIssue::MissingEntryPoint(entry_point.to_path_buf()));
        } else if !located.is_file() {
            issues.push(ConfigIssue::EntryPointNotFile(entry_point.to_path_buf()));
        }
    }

    fn check_data_mappings(&self, data_mappings: &[DataMapping], issues: &mut Vec<ConfigIssue>) {
        for (index, mapping) in data_mappings.iter().enumerate() {
            if mapping.source.as_os_str().is_empty() {
                issues.push(invalid_mapping(index, "source is empty"));
            } else if !self.locate(&mapping.source).exists() {
                issues.push(ConfigIssue::MissingDataSource(mapping.source.clone()));
            }

            if let Some(reason) = destination_defect(&mapping.destination) {
                issues.push(invalid_mapping(index, reason));
            }
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Resolves the five inputs against the current directory.
pub fn resolve(
    entry_point: &Path,
    data_mappings: &[DataMapping],
    hidden_imports: &[String],
    excludes: &[String],
    metadata: &BTreeMap<String, Value>,
) -> Result<BundleManifest, ConfigurationError> {
    Resolver::default().resolve_parts(entry_point, data_mappings, hidden_imports, excludes, metadata)
}

/// Hidden imports minus everything an exclusion covers.
pub fn final_modules(hidden_imports: &[String], excludes: &BTreeSet<String>) -> BTreeSet<String> {
    hidden_imports
        .iter()
        .filter(|module| match covering_exclusion(module, excludes) {
            Some(exclusion) => {
                tracing::debug!(module = %module, exclusion, "dropping excluded module");
                false
            }
            None => true,
        })
        .cloned()
        .collect()
}

/// Returns the exclusion covering `module`: the module itself or any dotted parent package.
pub fn covering_exclusion<'a>(module: &str, excludes: &'a BTreeSet<String>) -> Option<&'a str> {
    let mut candidate = module;
    loop {
        if let Some(hit) = excludes.get(candidate) {
            return Some(hit.as_str());
        }
        match candidate.rfind('.') {
            Some(dot) => candidate = &candidate[..dot],
            None => return None,
        }
    }
}

fn invalid_mapping(index: usize, reason: &str) -> ConfigIssue {
    ConfigIssue::InvalidMapping {
        index,
        reason: reason.to_string(),
    }
}

fn destination_defect(destination: &str) -> Option<&'static str> {
    if destination.trim().is_empty() {
        return Some("destination is empty");
    }

    let path = Path::new(destination);
    let drive_prefixed = destination.len() >= 2 && destination.as_bytes()[1] == b':';
    if path.has_root() || destination.starts_with(['/', '\\']) || drive_prefixed {
        return Some("destination must be relative to the bundle root");
    }

    let escapes = destination.split(['/', '\\']).any(|part| part == "..")
        || path.components().any(|c| matches!(c, Component::ParentDir));
    if escapes {
        return Some("destination escapes the bundle root");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn options(value: serde_json::Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    /// A project directory with an entry point, a config file and an asset directory.
    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
        fs::write(dir.path().join("config.py"), "DEBUG = False\n").unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets").join("icon.ico"), [0u8; 4]).unwrap();
        dir
    }

    #[test]
    fn test_exclusion_wins_over_inclusion() {
        let modules = final_modules(&names(&["tkinter", "numpy"]), &set(&["tkinter"]));
        assert_eq!(modules, set(&["numpy"]));
    }

    #[test]
    fn test_disjoint_lists_keep_hidden_imports() {
        let hidden = names(&["numpy", "pyttsx3", "speech_recognition", "numpy"]);
        let modules = final_modules(&hidden, &set(&["matplotlib", "tkinter"]));
        assert_eq!(modules, set(&["numpy", "pyttsx3", "speech_recognition"]));
    }

    #[test]
    fn test_exclusion_covers_submodules_only() {
        let excludes = set(&["PyQt5"]);
        assert_eq!(covering_exclusion("PyQt5", &excludes), Some("PyQt5"));
        assert_eq!(covering_exclusion("PyQt5.QtCore", &excludes), Some("PyQt5"));
        assert_eq!(covering_exclusion("PyQt5Extras", &excludes), None);

        let modules = final_modules(&names(&["PyQt5.QtCore", "PyQt5Extras"]), &excludes);
        assert_eq!(modules, set(&["PyQt5Extras"]));
    }

    #[test]
    fn test_module_names_are_case_sensitive() {
        let modules = final_modules(&names(&["Tkinter"]), &set(&["tkinter"]));
        assert_eq!(modules, set(&["Tkinter"]));
    }

    #[test]
    fn test_resolve_full_config() {
        let dir = project();
        let mut config = BuildConfig::new("main.py");
        config.datas = vec![
            DataMapping::new("config.py", "."),
            DataMapping::new("assets", "assets"),
        ];
        config.hidden_imports = names(&["tkinter", "numpy"]);
        config.excludes = names(&["tkinter"]);
        config.metadata = options(json!({
            "executable_name": "ShadowAI",
            "icon": "assets/icon.ico",
            "console_visible": false,
        }));

        let manifest = Resolver::new(dir.path()).resolve(&config).unwrap();

        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert_eq!(manifest.entry_point, PathBuf::from("main.py"));
        assert_eq!(manifest.data_mappings, config.datas);
        assert_eq!(manifest.modules, set(&["numpy"]));
        assert_eq!(manifest.excludes, set(&["tkinter"]));
        assert_eq!(manifest.metadata.executable_name, "ShadowAI");
        assert_eq!(manifest.metadata.icon, Some(PathBuf::from("assets/icon.ico")));
        assert!(!manifest.metadata.console_visible);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let dir = project();
        let mut config = BuildConfig::new("main.py");
        config.hidden_imports = names(&["pyttsx3", "numpy", "edge_tts", "numpy"]);
        config.excludes = names(&["matplotlib", "tkinter"]);
        let resolver = Resolver::new(dir.path());

        let first = resolver.resolve(&config).unwrap().to_json().unwrap();
        let second = resolver.resolve(&config).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_entry_point_named() {
        let dir = project();
        let config = BuildConfig::new("run_shadow_gui.py");

        let err = Resolver::new(dir.path()).resolve(&config).unwrap_err();
        assert_eq!(
            err.issues(),
            &[ConfigIssue::MissingEntryPoint(PathBuf::from("run_shadow_gui.py"))]
        );
        assert!(err.to_string().contains("run_shadow_gui.py"));
    }

    #[test]
    fn test_entry_point_must_be_file() {
        let dir = project();
        let err = Resolver::new(dir.path())
            .resolve(&BuildConfig::new("assets"))
            .unwrap_err();
        assert!(err.contains(&ConfigIssue::EntryPointNotFile(PathBuf::from("assets"))));
    }

    #[test]
    fn test_empty_entry_point() {
        let dir = project();
        let err = Resolver::new(dir.path())
            .resolve(&BuildConfig::new(""))
            .unwrap_err();
        assert!(err.contains(&ConfigIssue::EmptyEntryPoint));
    }

    #[test]
    fn test_every_missing_source_reported() {
        let dir = project();
        let mut config = BuildConfig::new("main.py");
        config.datas = vec![
            DataMapping::new(".env", "."),
            DataMapping::new("config.py", "."),
            DataMapping::new("data", "data"),
            DataMapping::new("shadow_core/models", "models"),
        ];

        let err = Resolver::new(dir.path()).resolve(&config).unwrap_err();
        assert_eq!(
            err.missing_paths(),
            vec![
                &PathBuf::from(".env"),
                &PathBuf::from("data"),
                &PathBuf::from("shadow_core/models"),
            ]
        );
    }

    #[test]
    fn test_single_missing_source_fails_whole_resolution() {
        let dir = project();
        let mut config = BuildConfig::new("main.py");
        config.datas = vec![
            DataMapping::new("config.py", "."),
            DataMapping::new("missing.json", "."),
        ];

        let err = Resolver::new(dir.path()).resolve(&config).unwrap_err();
        assert_eq!(
            err.issues(),
            &[ConfigIssue::MissingDataSource(PathBuf::from("missing.json"))]
        );
    }

    #[test]
    fn test_unknown_option_cited() {
        let dir = project();
        let mut config = BuildConfig::new("main.py");
        config.metadata = options(json!({ "executable_name": "App", "unknown_option": true }));

        let err = Resolver::new(dir.path()).resolve(&config).unwrap_err();
        assert_eq!(
            err.issues(),
            &[ConfigIssue::UnknownOption("unknown_option".to_string())]
        );
        assert!(err.to_string().contains("unknown_option"));
    }

    #[test]
    fn test_icon_checks() {
        let dir = project();
        fs::write(dir.path().join("logo.svg"), "<svg/>").unwrap();
        let resolver = Resolver::new(dir.path());

        let mut config = BuildConfig::new("main.py");
        config.metadata = options(json!({ "icon": "assets/missing.ico" }));
        let err = resolver.resolve(&config).unwrap_err();
        assert_eq!(
            err.issues(),
            &[ConfigIssue::MissingIcon(PathBuf::from("assets/missing.ico"))]
        );

        config.metadata = options(json!({ "icon": "logo.svg" }));
        let err = resolver.resolve(&config).unwrap_err();
        assert_eq!(
            err.issues(),
            &[ConfigIssue::UnsupportedIcon(PathBuf::from("logo.svg"))]
        );

        config.metadata = BTreeMap::new();
        assert_eq!(resolver.resolve(&config).unwrap().metadata.icon, None);
    }

    #[test]
    fn test_all_defects_collected_together() {
        let dir = project();
        let mut config = BuildConfig::new("absent.py");
        config.datas = vec![
            DataMapping::new("", "."),
            DataMapping::new("nowhere", ""),
        ];
        config.metadata = options(json!({ "icon": "nope.ico", "upx": true }));

        let err = Resolver::new(dir.path()).resolve(&config).unwrap_err();
        assert_eq!(
            err.issues(),
            &[
                ConfigIssue::MissingEntryPoint(PathBuf::from("absent.py")),
                ConfigIssue::InvalidMapping {
                    index: 0,
                    reason: "source is empty".to_string(),
                },
                ConfigIssue::MissingDataSource(PathBuf::from("nowhere")),
                ConfigIssue::InvalidMapping {
                    index: 1,
                    reason: "destination is empty".to_string(),
                },
                ConfigIssue::UnknownOption("upx".to_string()),
                ConfigIssue::MissingIcon(PathBuf::from("nope.ico")),
            ]
        );
    }

    #[test]
    fn test_destination_rules() {
        assert_eq!(destination_defect("."), None);
        assert_eq!(destination_defect("assets/icons"), None);
        assert_eq!(destination_defect(""), Some("destination is empty"));
        assert_eq!(
            destination_defect("/etc"),
            Some("destination must be relative to the bundle root")
        );
        assert_eq!(
            destination_defect("C:\\data"),
            Some("destination must be relative to the bundle root")
        );
        assert_eq!(
            destination_defect("assets/../../x"),
            Some("destination escapes the bundle root")
        );
    }

    #[test]
    fn test_free_function_resolve() {
        let dir = project();
        let entry = dir.path().join("main.py");

        let manifest = resolve(
            &entry,
            &[],
            &names(&["numpy"]),
            &[],
            &options(json!({ "executable_name": "App" })),
        )
        .unwrap();

        assert_eq!(manifest.entry_point, entry);
        assert_eq!(manifest.modules, set(&["numpy"]));
        assert_eq!(manifest.metadata.executable_name, "App");
    }
}
