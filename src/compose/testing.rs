//! In-memory engine used by the compose unit tests.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;

use super::{Composer, Options, labels};
use crate::config::Jobs;
use crate::engine::{BridgeError, ContainerSummary, Executor, ImageRequest, Runtime};
use crate::project::{Dependency, Project, Service};

type FailFn = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin(Vec<String>),
    End(Vec<String>),
}

pub struct FakeEngine {
    pub events: Mutex<Vec<Event>>,
    pub containers: Mutex<Vec<ContainerSummary>>,
    pub networks: Mutex<HashSet<String>>,
    pub volumes: Mutex<HashSet<String>>,
    pub image_requests: Mutex<Vec<ImageRequest>>,
    pub missing_images: Mutex<HashSet<String>>,
    pub network_probes: AtomicUsize,
    pub delay: Duration,
    fail: FailFn,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            containers: Mutex::new(Vec::new()),
            networks: Mutex::new(HashSet::new()),
            volumes: Mutex::new(HashSet::new()),
            image_requests: Mutex::new(Vec::new()),
            missing_images: Mutex::new(HashSet::new()),
            network_probes: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: Box::new(|_| false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, fail: impl Fn(&[String]) -> bool + Send + Sync + 'static) -> Self {
        self.fail = Box::new(fail);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_container(self, project: &str, service: &str, number: usize) -> Self {
        let name = format!("{project}-{service}-{number}");
        self.add_container(&name, project, service, number);
        self
    }

    fn add_container(&self, name: &str, project: &str, service: &str, number: usize) {
        let labels = BTreeMap::from([
            (labels::PROJECT.to_string(), project.to_string()),
            (labels::SERVICE.to_string(), service.to_string()),
            (labels::CONTAINER_NUMBER.to_string(), number.to_string()),
        ]);
        self.containers.lock().unwrap().push(ContainerSummary {
            id: name.to_string(),
            name: name.to_string(),
            image: "img".to_string(),
            state: "running".to_string(),
            labels,
        });
    }

    /// Every completed invocation, in completion order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::End(args) => Some(args.clone()),
                Event::Begin(_) => None,
            })
            .collect()
    }

    pub fn calls_to(&self, verb: &str) -> Vec<Vec<String>> {
        self.calls().into_iter().filter(|c| c[0] == verb).collect()
    }

    pub fn options(self: &Arc<Self>) -> Options {
        let networks = Arc::clone(self);
        let volumes = Arc::clone(self);
        let images = Arc::clone(self);
        Options {
            argv_prefix: vec!["nerdctl".into()],
            jobs: Jobs::Fixed(4),
            network_exists: Some(Arc::new(move |name: &str| {
                networks.network_probes.fetch_add(1, Ordering::SeqCst);
                Ok(networks.networks.lock().unwrap().contains(name))
            })),
            volume_exists: Some(Arc::new(move |name: &str| {
                Ok(volumes.volumes.lock().unwrap().contains(name))
            })),
            ensure_image: Some(Arc::new(move |request: &ImageRequest| {
                images.image_requests.lock().unwrap().push(request.clone());
                if images.missing_images.lock().unwrap().contains(&request.reference) {
                    anyhow::bail!("image {} not found", request.reference);
                }
                Ok(())
            })),
            ..Options::default()
        }
    }

    pub fn composer(self: &Arc<Self>, project: Project) -> Composer {
        self.composer_with(project, self.options())
    }

    pub fn composer_with(self: &Arc<Self>, project: Project, options: Options) -> Composer {
        Composer::from_project(project, options, self.clone(), self.clone()).unwrap()
    }

    fn record(&self, args: &[String]) {
        let name = last(args);
        match (args.first().map(String::as_str), args.get(1).map(String::as_str)) {
            (Some("network"), Some("create")) => {
                self.networks.lock().unwrap().insert(name);
            }
            (Some("volume"), Some("create")) => {
                self.volumes.lock().unwrap().insert(name);
            }
            (Some("rm"), _) => self.containers.lock().unwrap().retain(|c| c.id != name),
            (Some("create"), _) => {
                let flag = |prefix: &str| {
                    args.iter()
                        .find_map(|a| a.strip_prefix(prefix).map(str::to_string))
                        .unwrap_or_default()
                };
                let name = flag("--name=");
                let project = flag(&format!("--label={}=", labels::PROJECT));
                let service = flag(&format!("--label={}=", labels::SERVICE));
                let number = flag(&format!("--label={}=", labels::CONTAINER_NUMBER))
                    .parse()
                    .unwrap_or(0);
                self.add_container(&name, &project, &service, number);
            }
            _ => {}
        }
    }
}

fn last(args: &[String]) -> String {
    args.last().cloned().unwrap_or_default()
}

impl Executor for FakeEngine {
    fn invoke(&self, args: &[String]) -> Result<String, BridgeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(Event::Begin(args.to_vec()));
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let failed = (self.fail)(args);
        if !failed {
            self.record(args);
        }
        self.events.lock().unwrap().push(Event::End(args.to_vec()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if failed {
            Err(BridgeError::Failed {
                command: args.join(" "),
                code: Some(1),
                output: "boom".to_string(),
            })
        } else if args.first().map(String::as_str) == Some("top") {
            Ok(format!("PID CMD\n1 {}\n", last(args)))
        } else {
            Ok(String::new())
        }
    }
}

impl Runtime for FakeEngine {
    fn list_containers(
        &self,
        filters: &[(String, String)],
    ) -> Result<Vec<ContainerSummary>, BridgeError> {
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| filters.iter().all(|(k, v)| c.label(k) == Some(v.as_str())))
            .cloned()
            .collect())
    }
}

/// A project named `demo` whose services are given as `(name, depends_on)`.
pub fn project(edges: &[(&str, &[&str])]) -> Project {
    let services = edges
        .iter()
        .map(|(name, deps)| {
            let mut service = Service::new(*name);
            service.image = Some(format!("{name}:latest"));
            service.networks = Vec::new();
            for dep in *deps {
                service.depends_on.insert(dep.to_string(), Dependency::default());
            }
            (name.to_string(), service)
        })
        .collect();
    Project {
        name: "demo".into(),
        working_dir: PathBuf::from("/srv/demo"),
        services,
        networks: IndexMap::new(),
        volumes: IndexMap::new(),
        profiles: Vec::new(),
    }
}
