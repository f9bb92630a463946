use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::bridge::{BridgeError, Executor};
use super::intent::Intent;
use super::types::{ContainerSummary, parse_label_list};

/// When a service image should be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    Always,
    #[default]
    #[serde(alias = "if_not_present")]
    Missing,
    Never,
    Build,
}

/// Input to the image-ensuring predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub reference: String,
    pub pull_policy: PullPolicy,
    pub platform: Option<String>,
    /// Verification provider passed through to `pull --verify`.
    pub verify: Option<String>,
}

/// Read access to the engine's container state.
pub trait Runtime: Send + Sync {
    /// Containers (running or not) carrying every `key=value` label in `filters`.
    fn list_containers(
        &self,
        filters: &[(String, String)],
    ) -> Result<Vec<ContainerSummary>, BridgeError>;
}

/// Engine-backed runtime that answers queries through the execution bridge.
#[derive(Clone)]
pub struct CliRuntime {
    executor: Arc<dyn Executor>,
}

impl CliRuntime {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    pub fn network_exists(&self, name: &str) -> Result<bool> {
        self.probe(&Intent::InspectNetwork {
            name: name.to_string(),
        })
    }

    pub fn volume_exists(&self, name: &str) -> Result<bool> {
        self.probe(&Intent::InspectVolume {
            name: name.to_string(),
        })
    }

    pub fn image_exists(&self, reference: &str) -> Result<bool> {
        self.probe(&Intent::InspectImage {
            reference: reference.to_string(),
        })
    }

    /// Make sure `request.reference` is available locally, honouring the pull policy.
    pub fn ensure_image(&self, request: &ImageRequest) -> Result<()> {
        let present = match request.pull_policy {
            PullPolicy::Always => false,
            _ => self.image_exists(&request.reference)?,
        };
        if present {
            debug!(image = %request.reference, "image already present");
            return Ok(());
        }
        if request.pull_policy == PullPolicy::Never {
            bail!(
                "image {} is not present locally and pull_policy is \"never\"",
                request.reference
            );
        }

        info!(image = %request.reference, "pulling image");
        self.executor
            .execute(&Intent::PullImage {
                reference: request.reference.clone(),
                platform: request.platform.clone(),
                verify: request.verify.clone(),
            })
            .with_context(|| format!("failed to pull {}", request.reference))?;
        Ok(())
    }

    // Inspect exits non-zero for a missing resource; only a spawn failure is an error.
    fn probe(&self, intent: &Intent) -> Result<bool> {
        match self.executor.execute(intent) {
            Ok(_) => Ok(true),
            Err(BridgeError::Failed { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Runtime for CliRuntime {
    fn list_containers(
        &self,
        filters: &[(String, String)],
    ) -> Result<Vec<ContainerSummary>, BridgeError> {
        let intent = Intent::ListContainers {
            filters: filters.to_vec(),
        };
        let output = self.executor.execute(&intent)?;
        parse_ps_output(&output).map_err(|source| BridgeError::Decode {
            command: intent.to_args().join(" "),
            source,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Labels")]
    labels: String,
}

/// Parse `ps --format '{{json .}}'` output: one JSON object per line.
pub fn parse_ps_output(output: &str) -> Result<Vec<ContainerSummary>, serde_json::Error> {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with('{'))
        .map(|line| {
            let ps: PsLine = serde_json::from_str(line)?;
            let state = if ps.state.is_empty() {
                state_from_status(&ps.status)
            } else {
                ps.state.to_ascii_lowercase()
            };
            Ok(ContainerSummary {
                id: ps.id,
                name: ps.names.split(',').next().unwrap_or_default().to_string(),
                image: ps.image,
                state,
                labels: parse_label_list(&ps.labels),
            })
        })
        .collect()
}

// Engines without a `State` column only report e.g. "Up 3 minutes" / "Exited (0) 1 hour ago".
fn state_from_status(status: &str) -> String {
    let first = status.split_whitespace().next().unwrap_or_default();
    match first.to_ascii_lowercase().as_str() {
        "up" => "running".to_string(),
        "" => "unknown".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Scripted {
        calls: Mutex<Vec<Vec<String>>>,
        reply: fn(&[String]) -> Result<String, BridgeError>,
    }

    impl Executor for Scripted {
        fn invoke(&self, args: &[String]) -> Result<String, BridgeError> {
            self.calls.lock().unwrap().push(args.to_vec());
            (self.reply)(args)
        }
    }

    fn runtime(reply: fn(&[String]) -> Result<String, BridgeError>) -> (Arc<Scripted>, CliRuntime) {
        let exec = Arc::new(Scripted {
            calls: Mutex::new(Vec::new()),
            reply,
        });
        (exec.clone(), CliRuntime::new(exec))
    }

    fn not_found(args: &[String]) -> Result<String, BridgeError> {
        Err(BridgeError::Failed {
            command: args.join(" "),
            code: Some(1),
            output: "not found".into(),
        })
    }

    #[test]
    fn parses_nerdctl_style_ps_lines() {
        let out = concat!(
            r#"{"ID":"abc","Names":"demo-web-1","Image":"nginx","Status":"Up 2 minutes","Labels":"com.docker.compose.service=web,com.docker.compose.container-number=1"}"#,
            "\n",
            r#"{"ID":"def","Names":"demo-db-1","Image":"postgres","Status":"Exited (0) 1 hour ago","Labels":""}"#,
            "\n"
        );
        let containers = parse_ps_output(out).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].state, "running");
        assert_eq!(containers[0].label("com.docker.compose.service"), Some("web"));
        assert_eq!(containers[1].state, "exited");
        assert!(containers[1].labels.is_empty());
    }

    #[test]
    fn prefers_explicit_state_column() {
        let out = r#"{"ID":"abc","Names":"a,b","State":"Paused","Status":"Up 1 second (Paused)"}"#;
        let containers = parse_ps_output(out).unwrap();
        assert_eq!(containers[0].state, "paused");
        assert_eq!(containers[0].name, "a");
    }

    #[test]
    fn ps_output_with_bad_json_is_an_error() {
        assert!(parse_ps_output("{not json").is_err());
    }

    #[test]
    fn failed_inspect_means_absent() {
        let (_, rt) = runtime(not_found);
        assert!(!rt.volume_exists("demo_data").unwrap());
    }

    #[test]
    fn never_policy_refuses_to_pull() {
        let (exec, rt) = runtime(not_found);
        let err = rt
            .ensure_image(&ImageRequest {
                reference: "local/only".into(),
                pull_policy: PullPolicy::Never,
                platform: None,
                verify: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("never"));
        let calls = exec.calls.lock().unwrap();
        assert!(calls.iter().all(|c| c[0] != "pull"));
    }

    #[test]
    fn always_policy_pulls_without_inspecting() {
        let (exec, rt) = runtime(|_| Ok(String::new()));
        rt.ensure_image(&ImageRequest {
            reference: "alpine:3".into(),
            pull_policy: PullPolicy::Always,
            platform: None,
            verify: None,
        })
        .unwrap();
        let calls = exec.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["pull", "alpine:3"]);
    }

    #[test]
    fn pull_policy_accepts_compose_aliases() {
        let p: PullPolicy = serde_yaml::from_str("if_not_present").unwrap();
        assert_eq!(p, PullPolicy::Missing);
        let p: PullPolicy = serde_yaml::from_str("build").unwrap();
        assert_eq!(p, PullPolicy::Build);
    }
}
