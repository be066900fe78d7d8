use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

use crate::manifest::BundleManifest;
use crate::platform::Platform;

/// Turns a resolved manifest into an executable artifact.
pub trait PlatformBundler {
    fn name(&self) -> &str;

    fn bundle(&self, manifest: &BundleManifest) -> Result<BundleOutput, BundlerError>;
}

#[derive(Debug, Clone)]
pub struct BundleOutput {
    /// Directory (one-dir mode) or file (one-file mode) the bundler produced.
    pub artifact: PathBuf,
    pub log: String,
}

/// Bundler failures are reported as the tool reported them and never retried.
#[derive(Debug, Error)]
pub enum BundlerError {
    #[error("failed to launch {program}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed ({status}):\n{stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} timed out after {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },

    #[error("failed while waiting for {program}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// How long one bundler run may take before it is killed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleMode {
    OneDir,
    OneFile,
}

impl BundleMode {
    pub fn as_flag(&self) -> &str {
        match self {
            BundleMode::OneDir => "--onedir",
            BundleMode::OneFile => "--onefile",
        }
    }
}

pub struct PyInstallerBundler {
    program: PathBuf,
    launcher_args: Vec<String>,
    platform: Platform,
    work_dir: PathBuf,
    dist_dir: Option<PathBuf>,
    build_dir: Option<PathBuf>,
    mode: BundleMode,
    clean: bool,
    timeout: Duration,
}

impl PyInstallerBundler {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("pyinstaller"),
            launcher_args: Vec::new(),
            platform: Platform::host(),
            work_dir: PathBuf::from("."),
            dist_dir: None,
            build_dir: None,
            mode: BundleMode::OneDir,
            clean: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Runs PyInstaller as `<python> -m PyInstaller`.
    pub fn via_python(python: impl AsRef<Path>) -> Self {
        Self::new()
            .program(python)
            .launcher_args(["-m", "PyInstaller"])
    }

    pub fn program(mut self, program: impl AsRef<Path>) -> Self {
        self.program = program.as_ref().to_path_buf();
        self
    }

    pub fn launcher_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launcher_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Directory the manifest's relative paths are relative to; the bundler runs there.
    pub fn work_dir(mut self, work_dir: impl AsRef<Path>) -> Self {
        self.work_dir = work_dir.as_ref().to_path_buf();
        self
    }

    pub fn dist_dir(mut self, dist_dir: impl AsRef<Path>) -> Self {
        self.dist_dir = Some(dist_dir.as_ref().to_path_buf());
        self
    }

    pub fn build_dir(mut self, build_dir: impl AsRef<Path>) -> Self {
        self.build_dir = Some(build_dir.as_ref().to_path_buf());
        self
    }

    pub fn mode(mut self, mode: BundleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program_path(&self) -> &Path {
        &self.program
    }

    /// Full argument list for one invocation, launcher arguments included.
    pub fn command_args(&self, manifest: &BundleManifest) -> Vec<String> {
        let metadata = &manifest.metadata;
        let mut args = self.launcher_args.clone();

        args.push("--noconfirm".to_string());
        if self.clean {
            args.push("--clean".to_string());
        }
        args.push(self.mode.as_flag().to_string());

        if let Some(ref dist_dir) = self.dist_dir {
            args.push("--distpath".to_string());
            args.push(dist_dir.display().to_string());
        }
        if let Some(ref build_dir) = self.build_dir {
            args.push("--workpath".to_string());
            args.push(build_dir.display().to_string());
        }

        args.push("--name".to_string());
        args.push(metadata.executable_name.clone());

        if metadata.console_visible {
            args.push("--console".to_string());
        } else {
            args.push("--windowed".to_string());
        }

        if let Some(ref icon) = metadata.icon {
            args.push("--icon".to_string());
            args.push(icon.display().to_string());
        }

        if !metadata.compress {
            args.push("--noupx".to_string());
        }

        if metadata.strip_symbols {
            args.push("--strip".to_string());
        }

        let separator = self.platform.data_separator();
        for mapping in &manifest.data_mappings {
            args.push("--add-data".to_string());
            args.push(format!(
                "{}{}{}",
                mapping.source.display(),
                separator,
                mapping.destination
            ));
        }

        for module in &manifest.modules {
            args.push("--hidden-import".to_string());
            args.push(module.clone());
        }

        for module in &manifest.excludes {
            args.push("--exclude-module".to_string());
            args.push(module.clone());
        }

        args.push(manifest.entry_point.display().to_string());

        args
    }

    /// Where the artifact for `manifest` will land. The bundler runs inside
    /// `work_dir`, so a relative dist directory is relative to it.
    pub fn expected_artifact(&self, manifest: &BundleManifest) -> PathBuf {
        let dist_dir = match self.dist_dir {
            Some(ref dist_dir) if dist_dir.is_absolute() => dist_dir.clone(),
            Some(ref dist_dir) => self.work_dir.join(dist_dir),
            None => self.work_dir.join("dist"),
        };
        let metadata = &manifest.metadata;

        match self.mode {
            BundleMode::OneDir => dist_dir.join(&metadata.executable_name),
            BundleMode::OneFile => dist_dir.join(
                self.platform
                    .executable_file_name(&metadata.executable_name, metadata.console_visible),
            ),
        }
    }

    /// The command line as a shell-like string, for dry runs and logs.
    pub fn describe(&self, manifest: &BundleManifest) -> String {
        let mut parts = vec![quote(&self.program.display().to_string())];
        parts.extend(self.command_args(manifest).iter().map(|arg| quote(arg)));
        parts.join(" ")
    }
}

impl Default for PyInstallerBundler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBundler for PyInstallerBundler {
    fn name(&self) -> &str {
        "pyinstaller"
    }

    fn bundle(&self, manifest: &BundleManifest) -> Result<BundleOutput, BundlerError> {
        let program = self.program.display().to_string();

        let mut cmd = Command::new(&self.program);
        cmd.args(self.command_args(manifest));
        cmd.current_dir(&self.work_dir);

        tracing::info!(
            command = %self.describe(manifest),
            work_dir = %self.work_dir.display(),
            "running bundler"
        );

        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BundlerError::Launch {
                program: program.clone(),
                source,
            })?;

        // Drain both pipes while waiting so a chatty bundler cannot fill them and stall.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let waited = child.wait_timeout(self.timeout);
        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(program = %program, timeout_secs = self.timeout.as_secs(), "bundler timed out");
                return Err(BundlerError::TimedOut {
                    program,
                    after: self.timeout,
                });
            }
            Err(source) => {
                let _ = child.kill();
                return Err(BundlerError::Wait { program, source });
            }
        };

        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        if !status.success() {
            return Err(BundlerError::Failed {
                program,
                status: status.to_string(),
                stderr,
            });
        }

        let mut log = stdout;
        log.push_str(&stderr);

        Ok(BundleOutput {
            artifact: self.expected_artifact(manifest),
            log,
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

fn join_reader(reader: Option<thread::JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"', '\'']) {
        arg.to_string()
    } else {
        format!("\"{}\"", arg.replace('"', "\\\""))
    }
}
