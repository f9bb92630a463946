use std::path::Path;

use anyhow::Context;
use tracing::debug;

use super::Config;

pub const CONFIG_FILE: &str = ".stevedore.yaml";

impl Config {
    /// Load config from a `.stevedore.yaml` file in the given directory.
    pub fn load(dir: &Path) -> anyhow::Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(Some(config))
    }
}
