use std::fmt;
use std::path::PathBuf;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Upper bound on automatically chosen parallelism.
const AUTO_JOBS_CAP: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jobs {
    #[default]
    Auto,
    Fixed(usize),
}

impl Jobs {
    pub fn resolve(self) -> usize {
        match self {
            Jobs::Fixed(n) => n.max(1),
            Jobs::Auto => std::thread::available_parallelism()
                .map(|n| n.get().min(AUTO_JOBS_CAP))
                .unwrap_or(1),
        }
    }
}

impl std::str::FromStr for Jobs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Jobs::Auto);
        }
        match s.parse::<usize>() {
            Ok(0) | Err(_) => Err(format!(
                "invalid jobs value {s:?}: expected \"auto\" or a positive integer"
            )),
            Ok(n) => Ok(Jobs::Fixed(n)),
        }
    }
}

impl Serialize for Jobs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Jobs::Auto => serializer.serialize_str("auto"),
            Jobs::Fixed(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

impl<'de> Deserialize<'de> for Jobs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct JobsVisitor;

        impl<'de> Visitor<'de> for JobsVisitor {
            type Value = Jobs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"auto\" or a positive integer")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Jobs, E> {
                if value == 0 {
                    return Err(E::custom("jobs must be a positive integer"));
                }
                Ok(Jobs::Fixed(value as usize))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Jobs, E> {
                if value <= 0 {
                    return Err(E::custom("jobs must be a positive integer"));
                }
                Ok(Jobs::Fixed(value as usize))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Jobs, E> {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(JobsVisitor)
    }
}

/// Engine connection and execution settings, read from `.stevedore.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container engine CLI every intent is sent to.
    pub engine: String,
    pub namespace: Option<String>,
    pub address: Option<String>,
    /// Directory holding the project lock file.
    pub data_root: Option<PathBuf>,
    /// Containers acted on concurrently within one service.
    pub jobs: Jobs,
    /// Turn per-container failures into a failed command.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: "nerdctl".to_string(),
            namespace: None,
            address: None,
            data_root: None,
            jobs: Jobs::Auto,
            strict: false,
        }
    }
}

impl Config {
    /// Engine invocation prefix: the binary followed by global connection flags.
    pub fn argv_prefix(&self) -> Vec<String> {
        let mut argv = vec![self.engine.clone()];
        if let Some(ns) = &self.namespace {
            argv.push(format!("--namespace={ns}"));
        }
        if let Some(addr) = &self.address {
            argv.push(format!("--address={addr}"));
        }
        argv
    }

    /// Where the lock file lives; the system temp dir when unset.
    pub fn lock_dir(&self) -> PathBuf {
        self.data_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("stevedore"))
    }
}
