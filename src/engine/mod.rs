// Engine access: typed intents, the subprocess bridge, and container discovery.

pub mod bridge;
pub mod intent;
pub mod runtime;
pub mod types;

pub use bridge::{BridgeError, Executor, ProcessExecutor};
pub use intent::{CreateSpec, Intent};
pub use runtime::{CliRuntime, ImageRequest, PullPolicy, Runtime};
pub use types::{CancelToken, ContainerSummary};

use anyhow::{Context, Result};

/// Verify that the engine binary runs and can reach its daemon.
pub fn ensure_available(executor: &dyn Executor) -> Result<()> {
    executor
        .invoke(&["version".to_string()])
        .context("container engine is not available; is it installed and is the daemon running?")?;
    Ok(())
}
