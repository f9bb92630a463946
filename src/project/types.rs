use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::engine::PullPolicy;

/// Implicit network every service joins when it declares none.
pub const DEFAULT_NETWORK: &str = "default";

/// Extension key naming the image verification provider (e.g. `cosign`).
pub const VERIFY_EXTENSION: &str = "x-stevedore-verify";

/// A fully loaded, validated compose project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub name: String,
    pub working_dir: PathBuf,
    pub services: IndexMap<String, Service>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub networks: IndexMap<String, NetworkSpec>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub volumes: IndexMap<String, VolumeSpec>,
    /// Active profiles for this invocation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,
}

impl Project {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Position of a service in the manifest; used as the ordering tie-break.
    pub fn declaration_index(&self, name: &str) -> Option<usize> {
        self.services.get_index_of(name)
    }

    /// Whether the active profiles enable `service`.
    pub fn is_enabled(&self, service: &Service) -> bool {
        service.profiles.is_empty() || service.profiles.iter().any(|p| self.profiles.contains(p))
    }

    pub fn enabled_services(&self) -> impl Iterator<Item = &Service> {
        self.services.values().filter(|s| self.is_enabled(s))
    }

    /// Engine-side name of a network declared under `short`.
    pub fn network_name(&self, short: &str) -> String {
        scoped_resource_name(&self.name, short, self.networks.get(short).map(|n| &n.common))
    }

    /// Engine-side name of a volume declared under `short`.
    pub fn volume_name(&self, short: &str) -> String {
        scoped_resource_name(&self.name, short, self.volumes.get(short).map(|v| &v.common))
    }

    /// Name of replica `number` (1-based) of `service`.
    pub fn container_name(&self, service: &Service, number: usize) -> String {
        match &service.container_name {
            Some(name) => name.clone(),
            None => format!("{}-{}-{}", self.name, service.name, number),
        }
    }
}

fn scoped_resource_name(project: &str, short: &str, spec: Option<&ResourceSpec>) -> String {
    match spec {
        Some(ResourceSpec { name: Some(name), .. }) => name.clone(),
        Some(ResourceSpec { external: true, .. }) => short.to_string(),
        _ => format!("{project}_{short}"),
    }
}

/// One declared service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub depends_on: IndexMap<String, Dependency>,
    pub scale: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, Option<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeMount>,
    pub networks: Vec<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    pub pull_policy: PullPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// `x-*` keys, kept verbatim.
    #[serde(flatten)]
    pub extensions: IndexMap<String, Value>,
}

impl Service {
    /// A service with defaults for everything but its name; handy for building graphs in code.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            build: None,
            depends_on: IndexMap::new(),
            scale: 1,
            profiles: Vec::new(),
            container_name: None,
            command: None,
            entrypoint: None,
            environment: IndexMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            networks: vec![DEFAULT_NETWORK.to_string()],
            labels: IndexMap::new(),
            restart: None,
            pull_policy: PullPolicy::default(),
            platform: None,
            hostname: None,
            working_dir: None,
            user: None,
            extensions: IndexMap::new(),
        }
    }

    /// `<project>-<service>`.
    pub fn scoped_name(&self, project: &str) -> String {
        format!("{project}-{}", self.name)
    }

    /// The image reference replicas run, falling back to the build tag.
    pub fn image_ref(&self, project: &str) -> String {
        self.image.clone().unwrap_or_else(|| self.scoped_name(project))
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.depends_on.keys().map(String::as_str)
    }

    /// Short names of the project volumes this service mounts.
    pub fn named_volumes(&self) -> impl Iterator<Item = &str> {
        self.volumes.iter().filter_map(VolumeMount::named_volume)
    }

    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    pub fn verify_policy(&self) -> Option<String> {
        self.extension(VERIFY_EXTENSION)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    #[default]
    ServiceStarted,
    ServiceHealthy,
    ServiceCompletedSuccessfully,
}

/// An edge in the dependency graph. Only ordering is enforced; the
/// condition is carried for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub condition: DependencyCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSpec {
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Volume,
    Bind,
}

/// A service volume entry after parsing short or long syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeMount {
    #[serde(rename = "type")]
    pub kind: MountKind,
    /// Volume short name or host path; `None` for an anonymous volume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub target: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

impl VolumeMount {
    pub fn named_volume(&self) -> Option<&str> {
        match (self.kind, &self.source) {
            (MountKind::Volume, Some(source)) => Some(source),
            _ => None,
        }
    }
}

/// Fields shared by network and volume declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceSpec {
    /// Owned by the user; never created or removed by compose.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkSpec {
    #[serde(flatten)]
    pub common: ResourceSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeSpec {
    #[serde(flatten)]
    pub common: ResourceSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        let mut networks = IndexMap::new();
        networks.insert(
            "outside".to_string(),
            NetworkSpec {
                common: ResourceSpec {
                    external: true,
                    ..ResourceSpec::default()
                },
            },
        );
        networks.insert("backend".to_string(), NetworkSpec::default());
        let mut volumes = IndexMap::new();
        volumes.insert(
            "data".to_string(),
            VolumeSpec {
                common: ResourceSpec {
                    name: Some("shared-data".into()),
                    ..ResourceSpec::default()
                },
            },
        );
        Project {
            name: "demo".into(),
            working_dir: PathBuf::from("/srv/demo"),
            services: IndexMap::new(),
            networks,
            volumes,
            profiles: vec!["debug".into()],
        }
    }

    #[test]
    fn resource_names_are_scoped_unless_external_or_named() {
        let p = project();
        assert_eq!(p.network_name("backend"), "demo_backend");
        assert_eq!(p.network_name("outside"), "outside");
        assert_eq!(p.network_name("default"), "demo_default");
        assert_eq!(p.volume_name("data"), "shared-data");
    }

    #[test]
    fn container_name_defaults_to_project_service_replica() {
        let p = project();
        let mut svc = Service::new("web");
        assert_eq!(p.container_name(&svc, 2), "demo-web-2");
        svc.container_name = Some("frontend".into());
        assert_eq!(p.container_name(&svc, 1), "frontend");
    }

    #[test]
    fn profiles_gate_enablement() {
        let p = project();
        let plain = Service::new("web");
        let mut debug = Service::new("debugger");
        debug.profiles = vec!["debug".into()];
        let mut ops = Service::new("ops");
        ops.profiles = vec!["ops".into()];
        assert!(p.is_enabled(&plain));
        assert!(p.is_enabled(&debug));
        assert!(!p.is_enabled(&ops));
    }

    #[test]
    fn image_ref_falls_back_to_scoped_name() {
        let mut svc = Service::new("api");
        assert_eq!(svc.image_ref("demo"), "demo-api");
        svc.image = Some("ghcr.io/acme/api:1".into());
        assert_eq!(svc.image_ref("demo"), "ghcr.io/acme/api:1");
    }
}
