use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PlatformNames::new().lookup(name)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
        }
    }

    /// Separator between source and destination in a bundler `--add-data` argument.
    pub fn data_separator(&self) -> char {
        match self {
            Platform::Windows => ';',
            Platform::MacOs | Platform::Linux => ':',
        }
    }

    /// File name of the executable a one-file build produces for `name`.
    pub fn executable_file_name(&self, name: &str, console_visible: bool) -> String {
        match self {
            Platform::Windows => format!("{}.exe", name),
            Platform::MacOs if !console_visible => format!("{}.app", name),
            Platform::MacOs | Platform::Linux => name.to_string(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted platform spellings, including the names Python's `sys.platform` reports.
#[derive(Debug, Clone)]
pub struct PlatformNames {
    aliases: HashMap<String, Platform>,
}

impl PlatformNames {
    pub fn new() -> Self {
        let mut aliases = HashMap::new();

        aliases.insert("windows".to_string(), Platform::Windows);
        aliases.insert("win32".to_string(), Platform::Windows);
        aliases.insert("win".to_string(), Platform::Windows);

        aliases.insert("macos".to_string(), Platform::MacOs);
        aliases.insert("darwin".to_string(), Platform::MacOs);
        aliases.insert("osx".to_string(), Platform::MacOs);

        aliases.insert("linux".to_string(), Platform::Linux);

        Self { aliases }
    }

    pub fn lookup(&self, name: &str) -> Option<Platform> {
        self.aliases.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn supported_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.aliases.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PlatformNames {
    fn default() -> Self {
        Self::new()
    }
}
