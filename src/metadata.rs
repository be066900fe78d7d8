use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigIssue;

pub const EXECUTABLE_NAME: &str = "executable_name";
pub const ICON: &str = "icon";
pub const CONSOLE_VISIBLE: &str = "console_visible";
pub const COMPRESS: &str = "compress";
pub const STRIP_SYMBOLS: &str = "strip_symbols";

/// The closed set of metadata options a build may set.
pub const RECOGNIZED_OPTIONS: &[&str] = &[EXECUTABLE_NAME, ICON, CONSOLE_VISIBLE, COMPRESS, STRIP_SYMBOLS];

/// Image formats bundlers accept as executable icons.
pub const ICON_EXTENSIONS: &[&str] = &["ico", "icns", "png"];

const DEFAULT_EXECUTABLE_NAME: &str = "app";

/// Properties of the produced executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMetadata {
    pub executable_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<PathBuf>,
    pub console_visible: bool,
    pub compress: bool,
    pub strip_symbols: bool,
}

impl TargetMetadata {
    pub fn new(executable_name: impl Into<String>) -> Self {
        Self {
            executable_name: executable_name.into(),
            icon: None,
            console_visible: true,
            compress: true,
            strip_symbols: false,
        }
    }

    /// Builds metadata from raw options, pushing one issue per defect instead of
    /// stopping at the first. Options left unset keep their defaults; a missing
    /// executable name falls back to the entry point's file stem.
    pub fn from_options(
        options: &BTreeMap<String, Value>,
        entry_point: &Path,
        issues: &mut Vec<ConfigIssue>,
    ) -> Self {
        let mut metadata = Self::new(default_executable_name(entry_point));

        for (option, value) in options {
            match option.as_str() {
                EXECUTABLE_NAME => match value.as_str() {
                    Some(name) if name.trim().is_empty() => {
                        issues.push(ConfigIssue::EmptyExecutableName)
                    }
                    Some(name) if !is_plain_name(name) => {
                        issues.push(ConfigIssue::InvalidExecutableName(name.to_string()))
                    }
                    Some(name) => metadata.executable_name = name.to_string(),
                    None => issues.push(invalid_type(option, "a string")),
                },
                ICON => match value {
                    Value::Null => metadata.icon = None,
                    Value::String(path) if path.is_empty() => metadata.icon = None,
                    Value::String(path) => metadata.icon = Some(PathBuf::from(path)),
                    _ => issues.push(invalid_type(option, "a path string")),
                },
                CONSOLE_VISIBLE => set_flag(&mut metadata.console_visible, option, value, issues),
                COMPRESS => set_flag(&mut metadata.compress, option, value, issues),
                STRIP_SYMBOLS => set_flag(&mut metadata.strip_symbols, option, value, issues),
                _ => issues.push(ConfigIssue::UnknownOption(option.clone())),
            }
        }

        metadata
    }
}

fn set_flag(slot: &mut bool, option: &str, value: &Value, issues: &mut Vec<ConfigIssue>) {
    match value.as_bool() {
        Some(flag) => *slot = flag,
        None => issues.push(invalid_type(option, "a boolean")),
    }
}

fn invalid_type(option: &str, expected: &'static str) -> ConfigIssue {
    ConfigIssue::InvalidOptionType {
        option: option.to_string(),
        expected,
    }
}

// The name becomes both a file name in the manifest store and the bundler's
// `--name`, so it must not carry directory components.
fn is_plain_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && name != "." && name != ".."
}

fn default_executable_name(entry_point: &Path) -> String {
    entry_point
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(DEFAULT_EXECUTABLE_NAME)
        .to_string()
}

pub fn is_recognized_icon(icon: &Path) -> bool {
    icon.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ICON_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Checks a configured icon. `located` is where the icon lives on disk; issues
/// name the path as it was written.
pub fn check_icon(icon: &Path, located: &Path, issues: &mut Vec<ConfigIssue>) {
    if !located.is_file() {
        issues.push(ConfigIssue::MissingIcon(icon.to_path_buf()));
    }
    if !is_recognized_icon(icon) {
        issues.push(ConfigIssue::UnsupportedIcon(icon.to_path_buf()));
    }
}
