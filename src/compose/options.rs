use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Jobs;
use crate::engine::ImageRequest;
use crate::project::{Environment, LoadOptions};

/// Reports whether a named network or volume exists on the engine.
pub type ExistsFn = Arc<dyn Fn(&str) -> anyhow::Result<bool> + Send + Sync>;

/// Makes an image available locally according to the request's pull policy.
pub type EnsureImageFn = Arc<dyn Fn(&ImageRequest) -> anyhow::Result<()> + Send + Sync>;

/// Everything a [`Composer`](super::Composer) is built from. Captured once per command.
#[derive(Clone, Default)]
pub struct Options {
    pub config_paths: Vec<PathBuf>,
    pub project_name: Option<String>,
    pub project_directory: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    pub profiles: Vec<String>,
    /// Environment used for interpolation and `COMPOSE_*` lookups.
    pub environment: Environment,
    /// Engine binary and global flags every intent is run with.
    pub argv_prefix: Vec<String>,
    pub jobs: Jobs,
    pub network_exists: Option<ExistsFn>,
    pub volume_exists: Option<ExistsFn>,
    pub ensure_image: Option<EnsureImageFn>,
}

impl Options {
    pub(crate) fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_paths: self.config_paths.clone(),
            project_name: self.project_name.clone(),
            project_directory: self.project_directory.clone(),
            env_file: self.env_file.clone(),
            profiles: self.profiles.clone(),
            environment: self.environment.clone(),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("config_paths", &self.config_paths)
            .field("project_name", &self.project_name)
            .field("project_directory", &self.project_directory)
            .field("env_file", &self.env_file)
            .field("profiles", &self.profiles)
            .field("argv_prefix", &self.argv_prefix)
            .field("jobs", &self.jobs)
            .field("network_exists", &self.network_exists.is_some())
            .field("volume_exists", &self.volume_exists.is_some())
            .field("ensure_image", &self.ensure_image.is_some())
            .finish_non_exhaustive()
    }
}
