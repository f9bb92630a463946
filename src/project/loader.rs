use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_yaml::Value;
use tracing::{debug, info};

use super::discovery::{find_config_files, resolve_config_paths};
use super::env::{Environment, interpolate_value, read_dotenv};
use super::raw::{self, RawProject};
use super::types::{DEFAULT_NETWORK, NetworkSpec, Project};
use super::{ProjectError, is_valid_project_name, normalize_project_name};

/// Inputs to [`load`]. Everything is explicit so loading never reads
/// ambient process state beyond the filesystem.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Manifest files; discovered from the project directory when empty.
    pub config_paths: Vec<PathBuf>,
    pub project_name: Option<String>,
    pub project_directory: Option<PathBuf>,
    /// Defaults to `<working dir>/.env` when that file exists.
    pub env_file: Option<PathBuf>,
    /// Active profiles; falls back to `COMPOSE_PROFILES`.
    pub profiles: Vec<String>,
    /// Snapshot of the process environment; overrides `.env`.
    pub environment: Environment,
}

/// Locate, read, merge and validate the manifest described by `opts`.
pub fn load(opts: &LoadOptions) -> Result<Project, ProjectError> {
    let base = match &opts.project_directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(|source| ProjectError::Io {
            path: PathBuf::from("."),
            source,
        })?,
    };

    let files = if opts.config_paths.is_empty() {
        find_config_files(&base)?
    } else {
        resolve_config_paths(&base, &opts.config_paths)?
    };

    let working_dir = match (&opts.project_directory, files.first()) {
        (Some(dir), _) => dir.clone(),
        (None, Some(first)) => first.parent().map(Path::to_path_buf).unwrap_or(base),
        (None, None) => base,
    };
    info!(files = ?files, working_dir = %working_dir.display(), "loading compose project");

    let env = environment(opts, &working_dir)?;

    let mut merged = Value::Mapping(Default::default());
    for path in &files {
        let contents = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.clone(),
            source,
        })?;
        let doc: Value = serde_yaml::from_str(&contents).map_err(|source| ProjectError::Yaml {
            path: path.clone(),
            source,
        })?;
        merge(&mut merged, doc);
    }

    build(merged, &working_dir, &env, opts, files.first().cloned())
}

/// Build a project from a single in-memory manifest.
pub fn parse(yaml: &str, working_dir: &Path, opts: &LoadOptions) -> Result<Project, ProjectError> {
    let doc: Value = serde_yaml::from_str(yaml).map_err(|source| ProjectError::Yaml {
        path: working_dir.join("<inline>"),
        source,
    })?;
    let env = environment(opts, working_dir)?;
    build(doc, working_dir, &env, opts, None)
}

fn environment(opts: &LoadOptions, working_dir: &Path) -> Result<Environment, ProjectError> {
    let dotenv = match &opts.env_file {
        Some(path) => {
            let path = if path.is_absolute() { path.clone() } else { working_dir.join(path) };
            read_dotenv(&path)?
        }
        None => {
            let default = working_dir.join(".env");
            if default.is_file() { read_dotenv(&default)? } else { Environment::new() }
        }
    };
    let mut env = dotenv;
    env.extend(opts.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(env)
}

/// Later documents win: mappings merge key by key, everything else is replaced.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn build(
    mut doc: Value,
    working_dir: &Path,
    env: &Environment,
    opts: &LoadOptions,
    source: Option<PathBuf>,
) -> Result<Project, ProjectError> {
    interpolate_value(&mut doc, env)?;
    let raw: RawProject = serde_yaml::from_value(doc).map_err(|e| ProjectError::Yaml {
        path: source.unwrap_or_else(|| working_dir.join("<inline>")),
        source: e,
    })?;

    let name = project_name(opts, env, raw.name.as_deref(), working_dir)?;

    let mut services = IndexMap::new();
    for (service_name, raw_service) in raw.services {
        let service = raw_service.into_service(&service_name, working_dir)?;
        services.insert(service_name, service);
    }
    let mut networks: IndexMap<_, _> = raw
        .networks
        .into_iter()
        .map(|(k, v)| (k, raw::network_spec(v)))
        .collect();
    let volumes: IndexMap<_, _> = raw
        .volumes
        .into_iter()
        .map(|(k, v)| (k, raw::volume_spec(v)))
        .collect();

    let uses_default = services
        .values()
        .any(|s| s.networks.iter().any(|n| n == DEFAULT_NETWORK));
    if uses_default && !networks.contains_key(DEFAULT_NETWORK) {
        networks.insert(DEFAULT_NETWORK.to_string(), NetworkSpec::default());
    }

    let profiles = if opts.profiles.is_empty() {
        env.get("COMPOSE_PROFILES")
            .map(|p| {
                p.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    } else {
        opts.profiles.clone()
    };

    let project = Project {
        name,
        working_dir: working_dir.to_path_buf(),
        services,
        networks,
        volumes,
        profiles,
    };
    validate(&project)?;
    debug!(
        project = %project.name,
        services = project.services.len(),
        profiles = ?project.profiles,
        "project loaded"
    );
    Ok(project)
}

fn project_name(
    opts: &LoadOptions,
    env: &Environment,
    declared: Option<&str>,
    working_dir: &Path,
) -> Result<String, ProjectError> {
    let explicit = opts
        .project_name
        .clone()
        .or_else(|| env.get("COMPOSE_PROJECT_NAME").filter(|n| !n.is_empty()).cloned())
        .or_else(|| declared.map(str::to_string));

    match explicit {
        Some(name) if is_valid_project_name(&name) => Ok(name),
        Some(name) => Err(ProjectError::InvalidProjectName(name)),
        None => {
            let base = working_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let name = normalize_project_name(&base);
            if is_valid_project_name(&name) {
                Ok(name)
            } else {
                Err(ProjectError::InvalidProjectName(base))
            }
        }
    }
}

fn validate(project: &Project) -> Result<(), ProjectError> {
    for service in project.services.values() {
        for dependency in service.dependencies() {
            if !project.services.contains_key(dependency) {
                return Err(ProjectError::UndefinedDependency {
                    service: service.name.clone(),
                    dependency: dependency.to_string(),
                });
            }
        }
        for volume in service.named_volumes() {
            if !project.volumes.contains_key(volume) {
                return Err(ProjectError::UndefinedVolume {
                    service: service.name.clone(),
                    volume: volume.to_string(),
                });
            }
        }
        for network in &service.networks {
            if !project.networks.contains_key(network) {
                return Err(ProjectError::UndefinedNetwork {
                    service: service.name.clone(),
                    network: network.clone(),
                });
            }
        }
    }
    detect_cycle(project)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

// Depth-first search in declaration order; reports the first cycle as a path.
fn detect_cycle(project: &Project) -> Result<(), ProjectError> {
    let mut marks = vec![Mark::Unvisited; project.services.len()];
    let mut path: Vec<usize> = Vec::new();

    fn visit(
        project: &Project,
        idx: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Result<(), ProjectError> {
        match marks[idx] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = path.iter().position(|&i| i == idx).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .filter_map(|&i| project.services.get_index(i).map(|(n, _)| n.clone()))
                    .collect();
                if let Some((name, _)) = project.services.get_index(idx) {
                    cycle.push(name.clone());
                }
                return Err(ProjectError::DependencyCycle(cycle));
            }
            Mark::Unvisited => {}
        }
        marks[idx] = Mark::InProgress;
        path.push(idx);
        if let Some((_, service)) = project.services.get_index(idx) {
            for dependency in service.dependencies() {
                if let Some(dep_idx) = project.declaration_index(dependency) {
                    visit(project, dep_idx, marks, path)?;
                }
            }
        }
        path.pop();
        marks[idx] = Mark::Done;
        Ok(())
    }

    for idx in 0..project.services.len() {
        visit(project, idx, &mut marks, &mut path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn opts(dir: &Path) -> LoadOptions {
        LoadOptions {
            project_directory: Some(dir.to_path_buf()),
            ..LoadOptions::default()
        }
    }

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn loads_discovered_manifest_and_names_project_after_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("My_Stack");
        fs::create_dir_all(&root).unwrap();
        write(&root, "compose.yaml", "services:\n  web:\n    image: nginx\n");

        let project = load(&opts(&root)).unwrap();
        assert_eq!(project.name, "my_stack");
        assert_eq!(project.working_dir, root);
        assert!(project.networks.contains_key("default"));
    }

    #[test]
    fn dotenv_supplies_project_name_and_interpolation() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".env", "COMPOSE_PROJECT_NAME=fromenv\nTAG=1.25\n");
        write(dir.path(), "compose.yaml", "services:\n  web:\n    image: nginx:${TAG}\n");

        let project = load(&opts(dir.path())).unwrap();
        assert_eq!(project.name, "fromenv");
        assert_eq!(project.services["web"].image.as_deref(), Some("nginx:1.25"));
    }

    #[test]
    fn process_environment_overrides_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".env", "TAG=old\n");
        write(
            dir.path(),
            "compose.yaml",
            "name: app\nservices:\n  web:\n    image: nginx:${TAG}\n",
        );
        let mut o = opts(dir.path());
        o.environment.insert("TAG".into(), "new".into());

        let project = load(&o).unwrap();
        assert_eq!(project.services["web"].image.as_deref(), Some("nginx:new"));
    }

    #[test]
    fn override_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "compose.yaml",
            "name: app\nservices:\n  web:\n    image: nginx\n    environment:\n      A: \"1\"\n",
        );
        write(
            dir.path(),
            "compose.override.yaml",
            "services:\n  web:\n    environment:\n      B: \"2\"\n  debug:\n    image: busybox\n",
        );

        let project = load(&opts(dir.path())).unwrap();
        let web = &project.services["web"];
        assert_eq!(web.environment["A"].as_deref(), Some("1"));
        assert_eq!(web.environment["B"].as_deref(), Some("2"));
        assert_eq!(project.services.keys().collect::<Vec<_>>(), vec!["web", "debug"]);
    }

    #[test]
    fn explicit_invalid_name_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "compose.yaml", "services:\n  web:\n    image: nginx\n");
        let mut o = opts(dir.path());
        o.project_name = Some("Bad Name".into());

        assert!(matches!(load(&o), Err(ProjectError::InvalidProjectName(_))));
    }

    #[test]
    fn undefined_dependency_is_rejected() {
        let err = parse(
            "name: app\nservices:\n  web:\n    image: x\n    depends_on: [db]\n",
            Path::new("/srv/app"),
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::UndefinedDependency { .. }));
    }

    #[test]
    fn dependency_cycle_is_rejected_with_path() {
        let err = parse(
            "name: app\nservices:\n  a:\n    image: x\n    depends_on: [b]\n  b:\n    image: x\n    depends_on: [c]\n  c:\n    image: x\n    depends_on: [a]\n",
            Path::new("/srv/app"),
            &LoadOptions::default(),
        )
        .unwrap_err();
        match err {
            ProjectError::DependencyCycle(path) => assert_eq!(path, vec!["a", "b", "c", "a"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn undeclared_named_volume_is_rejected() {
        let err = parse(
            "name: app\nservices:\n  db:\n    image: postgres\n    volumes: [pgdata:/var/lib/postgresql/data]\n",
            Path::new("/srv/app"),
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProjectError::UndefinedVolume { .. }));
    }

    #[test]
    fn profiles_fall_back_to_environment() {
        let mut o = LoadOptions::default();
        o.environment.insert("COMPOSE_PROFILES".into(), "debug, ops".into());
        let project = parse(
            "name: app\nservices:\n  web:\n    image: x\n  tools:\n    image: x\n    profiles: [ops]\n  other:\n    image: x\n    profiles: [never]\n",
            Path::new("/srv/app"),
            &o,
        )
        .unwrap();
        assert_eq!(project.profiles, vec!["debug", "ops"]);
        let disabled: Vec<_> = project
            .services
            .values()
            .filter(|s| !project.is_enabled(s))
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(disabled, vec!["other"]);
    }
}
