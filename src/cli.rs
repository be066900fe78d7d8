use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::bundler::{BundleMode, PlatformBundler, PyInstallerBundler};
use crate::config::BuildConfig;
use crate::manifest::{self, BundleManifest, ManifestStore};
use crate::platform::{Platform, PlatformNames};
use crate::resolver::Resolver;

#[derive(Parser)]
#[command(name = "packspec")]
#[command(about = "Resolve declarative packaging descriptions into bundle manifests for PyInstaller-style freezers")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a build configuration and print the bundle manifest
    Resolve {
        /// Path to the build configuration (.json, .yaml or .yml)
        config: PathBuf,

        /// Write the manifest to this file instead of stdout
        #[arg(long, conflicts_with = "write")]
        output: Option<PathBuf>,

        /// Write the manifest into the manifest cache directory
        #[arg(long)]
        write: bool,

        /// Manifest cache directory used by --write
        #[arg(long, default_value = ".packspec/cache")]
        cache_dir: PathBuf,
    },

    /// Resolve a build configuration and run PyInstaller on the result
    Build {
        /// Path to the build configuration (.json, .yaml or .yml)
        config: PathBuf,

        /// Output directory for the bundle (default: dist/ next to the configuration)
        #[arg(long)]
        dist_dir: Option<PathBuf>,

        /// Directory for the bundler's intermediate files
        #[arg(long)]
        work_path: Option<PathBuf>,

        /// Produce a single executable file instead of a directory
        #[arg(long)]
        onefile: bool,

        /// Clear the bundler's cache before building
        #[arg(long)]
        clean: bool,

        /// Target platform conventions (default: host)
        #[arg(long)]
        platform: Option<String>,

        /// PyInstaller executable to run
        #[arg(long, conflicts_with = "python")]
        pyinstaller: Option<PathBuf>,

        /// Run PyInstaller through this Python interpreter (`python -m PyInstaller`)
        #[arg(long)]
        python: Option<PathBuf>,

        /// Seconds the bundler may run before it is stopped
        #[arg(long, default_value_t = 600)]
        timeout: u64,

        /// Print the bundler command instead of running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarize a previously written manifest
    Show {
        /// Path to a manifest JSON file
        manifest: PathBuf,
    },

    /// Check that the packaging toolchain is available
    Doctor,
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Resolve {
            config,
            output,
            write,
            cache_dir,
        } => resolve_command(&config, output.as_deref(), write, &cache_dir),
        Commands::Build {
            config,
            dist_dir,
            work_path,
            onefile,
            clean,
            platform,
            pyinstaller,
            python,
            timeout,
            dry_run,
        } => {
            let platform = match platform {
                Some(name) => parse_platform(&name)?,
                None => Platform::host(),
            };

            let mut bundler = match (pyinstaller, python) {
                (_, Some(python)) => PyInstallerBundler::via_python(python),
                (Some(pyinstaller), None) => PyInstallerBundler::new().program(pyinstaller),
                (None, None) => PyInstallerBundler::new(),
            };
            bundler = bundler
                .platform(platform)
                .work_dir(BuildConfig::base_dir(&config))
                .mode(if onefile { BundleMode::OneFile } else { BundleMode::OneDir })
                .clean(clean)
                .timeout(Duration::from_secs(timeout));

            // The bundler runs in the configuration's directory; paths given on
            // the command line are relative to where packspec was started.
            if let Some(dist_dir) = dist_dir {
                bundler = bundler.dist_dir(absolute_from_cwd(dist_dir)?);
            }
            if let Some(work_path) = work_path {
                bundler = bundler.build_dir(absolute_from_cwd(work_path)?);
            }

            build_command(&config, &bundler, dry_run)
        }
        Commands::Show { manifest } => show_command(&manifest),
        Commands::Doctor => doctor_command(),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be installed when embedded; keep the existing one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

fn absolute_from_cwd(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
    Ok(cwd.join(path))
}

fn parse_platform(name: &str) -> Result<Platform> {
    let names = PlatformNames::new();
    names.lookup(name).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown platform: {}. Use one of: {}",
            name,
            names.supported_names().join(", ")
        )
    })
}

/// Loads the configuration at `config` and resolves it against its own directory.
pub fn load_and_resolve(config: &Path) -> Result<BundleManifest> {
    let build_config = BuildConfig::load(config)
        .with_context(|| format!("Failed to load build configuration {}", config.display()))?;

    let resolver = Resolver::new(BuildConfig::base_dir(config));
    let manifest = resolver
        .resolve(&build_config)
        .with_context(|| format!("Invalid build configuration {}", config.display()))?;

    Ok(manifest)
}

fn resolve_command(
    config: &Path,
    output: Option<&Path>,
    write: bool,
    cache_dir: &Path,
) -> Result<()> {
    let manifest = load_and_resolve(config)?;

    if let Some(output) = output {
        manifest::write_manifest_to(&manifest, output)?;
        println!("Generated manifest: {}", output.display());
    } else if write {
        let store = ManifestStore::new(cache_dir);
        let manifest_path = store.write_manifest(&manifest)?;
        println!("Generated manifest: {}", manifest_path.display());
    } else {
        println!("{}", manifest.to_json()?);
    }

    Ok(())
}

fn build_command(config: &Path, bundler: &PyInstallerBundler, dry_run: bool) -> Result<()> {
    let manifest = load_and_resolve(config)?;

    println!(
        "Resolved {} modules, {} data mappings for {}",
        manifest.modules.len(),
        manifest.data_mappings.len(),
        manifest.metadata.executable_name
    );

    if dry_run {
        println!("{}", bundler.describe(&manifest));
        return Ok(());
    }

    let output = bundler
        .bundle(&manifest)
        .with_context(|| format!("{} could not bundle {}", bundler.name(), config.display()))?;

    tracing::debug!(log = %output.log, "bundler output");
    println!("Bundle created: {}", output.artifact.display());

    Ok(())
}

fn show_command(manifest_path: &Path) -> Result<()> {
    let manifest = ManifestStore::default().read_manifest(manifest_path)?;
    let metadata = &manifest.metadata;

    println!("Executable: {}", metadata.executable_name);
    println!("Entry point: {}", manifest.entry_point.display());
    println!(
        "Console: {}",
        if metadata.console_visible { "visible" } else { "hidden" }
    );
    println!("Compress: {}", metadata.compress);
    println!("Strip symbols: {}", metadata.strip_symbols);
    match metadata.icon {
        Some(ref icon) => println!("Icon: {}", icon.display()),
        None => println!("Icon: bundler default"),
    }

    println!("\nData mappings ({}):", manifest.data_mappings.len());
    for mapping in &manifest.data_mappings {
        println!("  {} -> {}", mapping.source.display(), mapping.destination);
    }

    println!("\nHidden imports ({}):", manifest.modules.len());
    for module in &manifest.modules {
        println!("  {}", module);
    }

    println!("\nExcluded ({}):", manifest.excludes.len());
    for module in &manifest.excludes {
        println!("  {}", module);
    }

    Ok(())
}

fn doctor_command() -> Result<()> {
    println!("packspec doctor - checking packaging toolchain...\n");

    let pyinstaller = find_command("pyinstaller", "PyInstaller");
    let python = ["python3", "python"]
        .iter()
        .any(|candidate| find_command(candidate, "Python interpreter"));

    if !find_command("upx", "UPX compressor (optional, used when compress is enabled)") {
        println!("  Without UPX, bundles are built uncompressed");
    }

    println!("\nPlatform conventions:");
    let host = Platform::host();
    println!("  Host platform: {}", host);
    println!("  --add-data separator: '{}'", host.data_separator());

    if !pyinstaller && !python {
        return Err(anyhow::anyhow!(
            "Neither pyinstaller nor a Python interpreter was found in PATH"
        ));
    }

    if !pyinstaller {
        println!("\nInstall PyInstaller with: python -m pip install pyinstaller");
        println!("or build with: packspec build <config> --python python3");
    }

    println!("\n✓ packspec doctor check complete");

    Ok(())
}

fn find_command(command: &str, description: &str) -> bool {
    match which::which(command) {
        Ok(path) => {
            println!("✓ {} found at: {}", description, path.display());
            true
        }
        Err(_) => {
            println!("✗ {} not found ({})", description, command);
            tracing::warn!(command, "not found in PATH");
            false
        }
    }
}
