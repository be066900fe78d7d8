use std::path::PathBuf;
use thiserror::Error;

/// A single defect found while validating a build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    #[error("entry point is empty")]
    EmptyEntryPoint,

    #[error("entry point does not exist: {}", .0.display())]
    MissingEntryPoint(PathBuf),

    #[error("entry point is not a regular file: {}", .0.display())]
    EntryPointNotFile(PathBuf),

    #[error("data source does not exist: {}", .0.display())]
    MissingDataSource(PathBuf),

    #[error("invalid data mapping #{index}: {reason}")]
    InvalidMapping { index: usize, reason: String },

    #[error("unrecognized metadata option: {0}")]
    UnknownOption(String),

    #[error("metadata option '{option}' must be {expected}")]
    InvalidOptionType {
        option: String,
        expected: &'static str,
    },

    #[error("executable name is empty")]
    EmptyExecutableName,

    #[error("executable name must be a plain file name, not a path: {0}")]
    InvalidExecutableName(String),

    #[error("icon does not exist: {}", .0.display())]
    MissingIcon(PathBuf),

    #[error("icon is not a recognized image (.ico, .icns, .png): {}", .0.display())]
    UnsupportedIcon(PathBuf),
}

/// Every defect found in one resolution pass. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} configuration problem(s):\n{}", .issues.len(), render_issues(.issues))]
pub struct ConfigurationError {
    issues: Vec<ConfigIssue>,
}

fn render_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ConfigurationError {
    /// Turns an accumulated issue list into a result: `Ok` when nothing was found.
    pub fn check(issues: Vec<ConfigIssue>) -> Result<(), Self> {
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Self { issues })
        }
    }

    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn contains(&self, issue: &ConfigIssue) -> bool {
        self.issues.contains(issue)
    }

    /// Paths of every missing file the error reports, in detection order.
    pub fn missing_paths(&self) -> Vec<&PathBuf> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                ConfigIssue::MissingEntryPoint(path)
                | ConfigIssue::MissingDataSource(path)
                | ConfigIssue::MissingIcon(path) => Some(path),
                _ => None,
            })
            .collect()
    }
}

/// Failure to read or parse a build configuration file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON in {}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse YAML in {}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported configuration format: {} (use .json, .yaml or .yml)", .0.display())]
    UnsupportedFormat(PathBuf),
}
