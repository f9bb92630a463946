//! Compose orchestration: dependency resolution, resource reconciliation and
//! ordered lifecycle fan-out over a loaded [`Project`].

mod down;
mod error;
pub mod labels;
mod lifecycle;
mod options;
mod query;
mod reconciler;
mod resolver;
mod up;

use std::sync::Arc;

use tracing::debug;

pub use down::DownOptions;
pub use error::ComposeError;
pub use lifecycle::{ContainerOutcome, LifecycleReport, Verb};
pub use options::{EnsureImageFn, ExistsFn, Options};
pub use query::{ImageRow, TopOutput};
pub use reconciler::ResourceKind;
pub use resolver::{Order, resolve_order};
pub use up::UpOptions;

use crate::engine::{CancelToken, Executor, ProcessExecutor, Runtime};
use crate::project::{self, Project, Service, is_valid_project_name};

/// Orchestrator for one project, valid for the duration of a single command.
pub struct Composer {
    project: Project,
    executor: Arc<dyn Executor>,
    runtime: Arc<dyn Runtime>,
    jobs: usize,
    network_exists: ExistsFn,
    volume_exists: ExistsFn,
    ensure_image: EnsureImageFn,
}

impl Composer {
    /// Load the project described by `options` and run intents through the
    /// engine binary named by its argv prefix.
    pub fn new(options: Options, runtime: Arc<dyn Runtime>) -> Result<Self, ComposeError> {
        let executor = ProcessExecutor::new(&options.argv_prefix)
            .ok_or(ComposeError::MissingOption("argv_prefix"))?;
        Self::with_executor(options, Arc::new(executor), runtime)
    }

    /// Like [`Composer::new`], with a caller-supplied executor.
    pub fn with_executor(
        options: Options,
        executor: Arc<dyn Executor>,
        runtime: Arc<dyn Runtime>,
    ) -> Result<Self, ComposeError> {
        // Predicates are checked before touching the filesystem.
        check_predicates(&options)?;
        let project = project::load(&options.load_options())?;
        Self::from_project(project, options, executor, runtime)
    }

    /// Wrap an already loaded project.
    pub fn from_project(
        project: Project,
        options: Options,
        executor: Arc<dyn Executor>,
        runtime: Arc<dyn Runtime>,
    ) -> Result<Self, ComposeError> {
        if !is_valid_project_name(&project.name) {
            return Err(ComposeError::InvalidProjectName(project.name));
        }
        let (network_exists, volume_exists, ensure_image) = check_predicates(&options)?;
        let jobs = options.jobs.resolve();
        debug!(project = %project.name, jobs, "composer ready");
        Ok(Self {
            project,
            executor,
            runtime,
            jobs,
            network_exists,
            volume_exists,
            ensure_image,
        })
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn service(&self, name: &str) -> Result<&Service, ComposeError> {
        self.project
            .service(name)
            .ok_or_else(|| ComposeError::ServiceNotFound(name.to_string()))
    }

    /// Requested services and their dependencies, dependencies first.
    pub fn resolve_services(&self, names: &[String]) -> Result<Vec<&Service>, ComposeError> {
        resolve_order(&self.project, names, Order::Forward)
    }

    pub fn resolve_service_names(&self, names: &[String]) -> Result<Vec<String>, ComposeError> {
        Ok(self
            .resolve_services(names)?
            .into_iter()
            .map(|s| s.name.clone())
            .collect())
    }

    pub fn start(
        &self,
        services: &[String],
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        self.run_verb(&Verb::Start, services, cancel)
    }

    /// Stop containers dependents first. `time` is the grace period in seconds.
    pub fn stop(
        &self,
        time: Option<u32>,
        services: &[String],
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        self.run_verb(&Verb::Stop { time }, services, cancel)
    }

    pub fn restart(
        &self,
        time: Option<u32>,
        services: &[String],
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        self.run_verb(&Verb::Restart { time }, services, cancel)
    }

    pub fn kill(
        &self,
        signal: Option<String>,
        services: &[String],
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        self.run_verb(&Verb::Kill { signal }, services, cancel)
    }

    pub fn pause(
        &self,
        services: &[String],
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        self.run_verb(&Verb::Pause, services, cancel)
    }

    pub fn unpause(
        &self,
        services: &[String],
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        self.run_verb(&Verb::Unpause, services, cancel)
    }

    fn run_verb(
        &self,
        verb: &Verb,
        services: &[String],
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        let ordered = resolve_order(&self.project, services, verb.order())?;
        self.apply(verb, &ordered, cancel)
    }
}

fn check_predicates(
    options: &Options,
) -> Result<(ExistsFn, ExistsFn, EnsureImageFn), ComposeError> {
    let network_exists = options
        .network_exists
        .clone()
        .ok_or(ComposeError::MissingOption("network_exists"))?;
    let volume_exists = options
        .volume_exists
        .clone()
        .ok_or(ComposeError::MissingOption("volume_exists"))?;
    let ensure_image = options
        .ensure_image
        .clone()
        .ok_or(ComposeError::MissingOption("ensure_image"))?;
    Ok((network_exists, volume_exists, ensure_image))
}

#[cfg(test)]
pub(crate) mod testing;
