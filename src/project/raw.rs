// Serde mirror of the manifest's loose YAML forms, normalized into `types`.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use super::ProjectError;
use super::types::{
    BuildSpec, DEFAULT_NETWORK, Dependency, DependencyCondition, MountKind, NetworkSpec,
    ResourceSpec, Service, VolumeMount, VolumeSpec,
};
use crate::engine::PullPolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct RawProject {
    pub name: Option<String>,
    pub services: IndexMap<String, RawService>,
    pub networks: IndexMap<String, Option<RawResource>>,
    pub volumes: IndexMap<String, Option<RawResource>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct RawService {
    image: Option<String>,
    build: Option<RawBuild>,
    depends_on: Option<RawDependsOn>,
    scale: Option<usize>,
    deploy: Option<RawDeploy>,
    profiles: Vec<String>,
    container_name: Option<String>,
    command: Option<StringOrList>,
    entrypoint: Option<StringOrList>,
    environment: Option<ListOrMap>,
    ports: Vec<Value>,
    volumes: Vec<RawMount>,
    networks: Option<RawServiceNetworks>,
    labels: Option<ListOrMap>,
    restart: Option<String>,
    pull_policy: Option<PullPolicy>,
    platform: Option<String>,
    hostname: Option<String>,
    working_dir: Option<String>,
    user: Option<Value>,
    #[serde(flatten)]
    extra: IndexMap<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    String(String),
    List(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListOrMap {
    List(Vec<String>),
    Map(IndexMap<String, Option<Value>>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependsOn {
    List(Vec<String>),
    Map(IndexMap<String, Option<RawDependency>>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDependency {
    condition: DependencyCondition,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBuild {
    Context(String),
    Full {
        context: Option<String>,
        dockerfile: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDeploy {
    replicas: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMount {
    Short(String),
    Long {
        #[serde(rename = "type")]
        kind: Option<String>,
        source: Option<String>,
        target: String,
        #[serde(default)]
        read_only: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawServiceNetworks {
    List(Vec<String>),
    Map(IndexMap<String, Option<Value>>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct RawResource {
    external: Option<RawExternal>,
    name: Option<String>,
    driver: Option<String>,
    labels: Option<ListOrMap>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawExternal {
    Flag(bool),
    Named { name: Option<String> },
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl ListOrMap {
    /// `KEY=VALUE` list entries or map entries; a bare `KEY` has no value.
    fn into_pairs(self) -> IndexMap<String, Option<String>> {
        match self {
            ListOrMap::List(items) => items
                .into_iter()
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (k.to_string(), Some(v.to_string())),
                    None => (item, None),
                })
                .collect(),
            ListOrMap::Map(map) => map
                .into_iter()
                .map(|(k, v)| (k, v.as_ref().and_then(scalar)))
                .collect(),
        }
    }

    fn into_labels(self) -> IndexMap<String, String> {
        self.into_pairs()
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or_default()))
            .collect()
    }
}

fn words(service: &str, field: &str, value: StringOrList) -> Result<Vec<String>, ProjectError> {
    match value {
        StringOrList::List(list) => Ok(list),
        StringOrList::String(s) => shell_words::split(&s).map_err(|e| ProjectError::Invalid {
            service: service.to_string(),
            message: format!("cannot parse {field} {s:?}: {e}"),
        }),
    }
}

fn port(service: &str, value: &Value) -> Result<String, ProjectError> {
    if let Some(short) = scalar(value) {
        return Ok(short);
    }
    let invalid = || ProjectError::Invalid {
        service: service.to_string(),
        message: format!("unsupported port entry {value:?}"),
    };
    let target = value.get("target").and_then(scalar).ok_or_else(invalid)?;
    let mut spec = String::new();
    if let Some(ip) = value.get("host_ip").and_then(scalar) {
        spec.push_str(&ip);
        spec.push(':');
    }
    if let Some(published) = value.get("published").and_then(scalar) {
        spec.push_str(&published);
        spec.push(':');
    }
    spec.push_str(&target);
    if let Some(protocol) = value.get("protocol").and_then(scalar) {
        spec.push('/');
        spec.push_str(&protocol);
    }
    Ok(spec)
}

fn is_host_path(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.') || source.starts_with('~')
}

fn absolutize(source: &str, working_dir: &Path) -> String {
    if source.starts_with('.') {
        working_dir.join(source).display().to_string()
    } else {
        source.to_string()
    }
}

fn mount(service: &str, raw: RawMount, working_dir: &Path) -> Result<VolumeMount, ProjectError> {
    match raw {
        RawMount::Short(spec) => {
            let parts: Vec<&str> = spec.split(':').collect();
            let (source, target, mode) = match parts.as_slice() {
                [target] => (None, *target, None),
                [source, target] => (Some(*source), *target, None),
                [source, target, mode] => (Some(*source), *target, Some(*mode)),
                _ => {
                    return Err(ProjectError::Invalid {
                        service: service.to_string(),
                        message: format!("invalid volume spec {spec:?}"),
                    });
                }
            };
            let read_only = mode.is_some_and(|m| m.split(',').any(|o| o == "ro"));
            Ok(match source {
                Some(src) if is_host_path(src) => VolumeMount {
                    kind: MountKind::Bind,
                    source: Some(absolutize(src, working_dir)),
                    target: target.to_string(),
                    read_only,
                },
                source => VolumeMount {
                    kind: MountKind::Volume,
                    source: source.map(str::to_string),
                    target: target.to_string(),
                    read_only,
                },
            })
        }
        RawMount::Long { kind, source, target, read_only } => {
            let kind = match kind.as_deref() {
                Some("bind") => MountKind::Bind,
                Some("volume") | None => MountKind::Volume,
                Some(other) => {
                    return Err(ProjectError::Invalid {
                        service: service.to_string(),
                        message: format!("unsupported mount type {other:?}"),
                    });
                }
            };
            let source = match kind {
                MountKind::Bind => source.map(|s| absolutize(&s, working_dir)),
                MountKind::Volume => source,
            };
            Ok(VolumeMount { kind, source, target, read_only })
        }
    }
}

impl RawService {
    pub(super) fn into_service(
        self,
        name: &str,
        working_dir: &Path,
    ) -> Result<Service, ProjectError> {
        let mut service = Service::new(name);

        service.image = self.image;
        service.build = match self.build {
            None => None,
            Some(RawBuild::Context(context)) => Some(BuildSpec { context, dockerfile: None }),
            Some(RawBuild::Full { context, dockerfile }) => Some(BuildSpec {
                context: context.unwrap_or_else(|| ".".to_string()),
                dockerfile,
            }),
        };
        if service.image.is_none() && service.build.is_none() {
            return Err(ProjectError::Invalid {
                service: name.to_string(),
                message: "has neither an image nor a build context".to_string(),
            });
        }

        service.depends_on = match self.depends_on {
            None => IndexMap::new(),
            Some(RawDependsOn::List(names)) => names
                .into_iter()
                .map(|n| (n, Dependency::default()))
                .collect(),
            Some(RawDependsOn::Map(map)) => map
                .into_iter()
                .map(|(n, dep)| {
                    let condition = dep.map(|d| d.condition).unwrap_or_default();
                    (n, Dependency { condition })
                })
                .collect(),
        };

        // `deploy.replicas` wins over the legacy `scale` key.
        service.scale = self
            .deploy
            .and_then(|d| d.replicas)
            .or(self.scale)
            .unwrap_or(1);
        service.profiles = self.profiles;
        service.container_name = self.container_name;
        if service.container_name.is_some() && service.scale > 1 {
            return Err(ProjectError::Invalid {
                service: name.to_string(),
                message: "container_name cannot be combined with more than one replica".to_string(),
            });
        }
        service.command = self.command.map(|c| words(name, "command", c)).transpose()?;
        service.entrypoint = self.entrypoint.map(|e| words(name, "entrypoint", e)).transpose()?;
        service.environment = self.environment.map(ListOrMap::into_pairs).unwrap_or_default();
        service.ports = self
            .ports
            .iter()
            .map(|p| port(name, p))
            .collect::<Result<_, _>>()?;
        service.volumes = self
            .volumes
            .into_iter()
            .map(|m| mount(name, m, working_dir))
            .collect::<Result<_, _>>()?;
        let networks: Vec<String> = match self.networks {
            None => Vec::new(),
            Some(RawServiceNetworks::List(list)) => list,
            Some(RawServiceNetworks::Map(map)) => map.into_keys().collect(),
        };
        if !networks.is_empty() {
            service.networks = networks;
        } else {
            service.networks = vec![DEFAULT_NETWORK.to_string()];
        }
        service.labels = self.labels.map(ListOrMap::into_labels).unwrap_or_default();
        service.restart = self.restart;
        service.pull_policy = self.pull_policy.unwrap_or_default();
        service.platform = self.platform;
        service.hostname = self.hostname;
        service.working_dir = self.working_dir;
        service.user = self.user.as_ref().and_then(scalar);
        service.extensions = self
            .extra
            .into_iter()
            .filter(|(k, _)| k.starts_with("x-"))
            .collect();

        Ok(service)
    }
}

impl RawResource {
    fn into_spec(self) -> ResourceSpec {
        let (external, external_name) = match self.external {
            None | Some(RawExternal::Flag(false)) => (false, None),
            Some(RawExternal::Flag(true)) => (true, None),
            Some(RawExternal::Named { name }) => (true, name),
        };
        ResourceSpec {
            external,
            name: self.name.or(external_name),
            driver: self.driver,
            labels: self.labels.map(ListOrMap::into_labels).unwrap_or_default(),
        }
    }
}

pub(super) fn network_spec(raw: Option<RawResource>) -> NetworkSpec {
    NetworkSpec {
        common: raw.unwrap_or_default().into_spec(),
    }
}

pub(super) fn volume_spec(raw: Option<RawResource>) -> VolumeSpec {
    VolumeSpec {
        common: raw.unwrap_or_default().into_spec(),
    }
}
