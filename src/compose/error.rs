use thiserror::Error;

use crate::engine::BridgeError;
use crate::project::ProjectError;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(
        "invalid project name {0:?}: must contain only lowercase letters, digits, dashes and underscores, and start with a letter or digit"
    )]
    InvalidProjectName(String),
    #[error("missing required option: {0}")]
    MissingOption(&'static str),
    #[error("no such service: {0}")]
    ServiceNotFound(String),
    #[error("dependency cycle detected among: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
    #[error("{kind} {name:?} is not declared in the project")]
    UndefinedResource { kind: &'static str, name: String },
    #[error("service {service:?} has no containers; run `up` first")]
    NoContainers { service: String },
    #[error("checking {what} failed: {source:#}")]
    Predicate {
        what: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("{failed} of {total} container operations failed")]
    ContainerFailures { failed: usize, total: usize },
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
