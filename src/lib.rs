pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod platform;
pub mod resolver;

pub use config::{BuildConfig, DataMapping};
pub use error::{ConfigIssue, ConfigurationError, LoadError};
pub use manifest::BundleManifest;
pub use metadata::TargetMetadata;
pub use resolver::{Resolver, resolve};
