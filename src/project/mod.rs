//! Compose manifest model and loader.
//!
//! The loader turns one or more YAML files (plus `.env` and the process
//! environment) into an immutable [`Project`] whose dependency graph has
//! already been checked for undefined references and cycles.

mod discovery;
mod env;
mod loader;
mod raw;
mod types;

use std::path::PathBuf;

use thiserror::Error;

pub use discovery::{DEFAULT_FILENAMES, find_config_files};
pub use env::{Environment, interpolate, parse_dotenv};
pub use loader::{LoadOptions, load, parse};
pub use types::{
    BuildSpec, DEFAULT_NETWORK, Dependency, DependencyCondition, MountKind, NetworkSpec, Project,
    ResourceSpec, Service, VERIFY_EXTENSION, VolumeMount, VolumeSpec,
};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no compose file found in {} or any parent directory", .dir.display())]
    NoConfigFile { dir: PathBuf },
    #[error(
        "invalid project name {0:?}: must contain only lowercase letters, digits, dashes and underscores, and start with a letter or digit"
    )]
    InvalidProjectName(String),
    #[error("invalid interpolation in {expression}: {message}")]
    Interpolation { expression: String, message: String },
    #[error("service {service:?}: {message}")]
    Invalid { service: String, message: String },
    #[error("service {service:?} depends on undefined service {dependency:?}")]
    UndefinedDependency { service: String, dependency: String },
    #[error("service {service:?} refers to undefined volume {volume:?}")]
    UndefinedVolume { service: String, volume: String },
    #[error("service {service:?} refers to undefined network {network:?}")]
    UndefinedNetwork { service: String, network: String },
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
}

/// Whether `name` is usable as a project name as given.
pub fn is_valid_project_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Derive a project name from a directory basename: lowercase, drop anything
/// invalid, and trim leading separators.
pub fn normalize_project_name(raw: &str) -> String {
    raw.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_')
        .collect::<String>()
        .trim_start_matches(['-', '_'])
        .to_string()
}
