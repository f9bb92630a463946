//! Integration tests for the compose engine against a scripted engine.
//!
//! The tests at the bottom need a real engine and are marked `#[ignore]`.
//! Run with: `cargo test -- --ignored`

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use stevedore::compose::{
    Composer, ComposeError, DownOptions, Options, ResourceKind, UpOptions, labels,
};
use stevedore::config::Jobs;
use stevedore::engine::{
    BridgeError, CancelToken, ContainerSummary, Executor, ImageRequest, Runtime,
};

/// Records every invocation and keeps just enough state to answer `ps`.
#[derive(Default)]
struct ScriptedEngine {
    calls: Mutex<Vec<Vec<String>>>,
    containers: Mutex<Vec<ContainerSummary>>,
    volumes: Mutex<HashSet<String>>,
    networks: Mutex<HashSet<String>>,
}

impl ScriptedEngine {
    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl Executor for ScriptedEngine {
    fn invoke(&self, args: &[String]) -> Result<String, BridgeError> {
        self.calls.lock().unwrap().push(args.to_vec());
        let name = args.last().cloned().unwrap_or_default();
        match args[0].as_str() {
            "create" => {
                let label = |key: &str| {
                    let prefix = format!("--label={key}=");
                    args.iter()
                        .find_map(|a| a.strip_prefix(prefix.as_str()).map(str::to_string))
                        .unwrap_or_default()
                };
                let name = args
                    .iter()
                    .find_map(|a| a.strip_prefix("--name="))
                    .unwrap_or_default()
                    .to_string();
                let labels = BTreeMap::from([
                    (labels::PROJECT.to_string(), label(labels::PROJECT)),
                    (labels::SERVICE.to_string(), label(labels::SERVICE)),
                    (labels::CONTAINER_NUMBER.to_string(), label(labels::CONTAINER_NUMBER)),
                ]);
                self.containers.lock().unwrap().push(ContainerSummary {
                    id: name.clone(),
                    name,
                    image: String::new(),
                    state: "created".into(),
                    labels,
                });
            }
            "rm" => self.containers.lock().unwrap().retain(|c| c.id != name),
            "volume" if args[1] == "create" => {
                self.volumes.lock().unwrap().insert(name);
            }
            "network" if args[1] == "create" => {
                self.networks.lock().unwrap().insert(name);
            }
            _ => {}
        }
        Ok(String::new())
    }
}

impl Runtime for ScriptedEngine {
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

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn options(engine: &Arc<ScriptedEngine>) -> Options {
    let networks = Arc::clone(engine);
    let volumes = Arc::clone(engine);
    Options {
        project_directory: Some(fixture_dir()),
        argv_prefix: vec!["nerdctl".into(), "--namespace=test".into()],
        jobs: Jobs::Fixed(2),
        network_exists: Some(Arc::new(move |name: &str| {
            Ok(networks.networks.lock().unwrap().contains(name))
        })),
        volume_exists: Some(Arc::new(move |name: &str| {
            Ok(volumes.volumes.lock().unwrap().contains(name))
        })),
        ensure_image: Some(Arc::new(|_: &ImageRequest| Ok(()))),
        ..Options::default()
    }
}

fn composer(engine: &Arc<ScriptedEngine>) -> Composer {
    Composer::with_executor(options(engine), engine.clone(), engine.clone()).unwrap()
}

fn position(names: &[String], name: &str) -> usize {
    names.iter().position(|n| n == name).unwrap()
}

#[test]
fn loads_fixture_and_orders_services() {
    let engine = Arc::new(ScriptedEngine::default());
    let composer = composer(&engine);

    assert_eq!(composer.project().name, "shop");
    let names = composer.resolve_service_names(&[]).unwrap();
    assert!(!names.contains(&"debug".to_string()));
    for (consumer, producer) in [("api", "db"), ("api", "cache"), ("web", "api")] {
        assert!(position(&names, producer) < position(&names, consumer));
    }
    assert_eq!(composer.service("api").unwrap().scale, 2);
}

#[test]
fn profile_service_can_be_requested_by_name() {
    let engine = Arc::new(ScriptedEngine::default());
    let composer = composer(&engine);
    assert_eq!(composer.resolve_service_names(&["debug".to_string()]).unwrap(), vec!["debug"]);
}

#[test]
fn missing_predicate_is_a_configuration_error() {
    let engine = Arc::new(ScriptedEngine::default());
    let mut opts = options(&engine);
    opts.volume_exists = None;
    let err = Composer::with_executor(opts, engine.clone(), engine.clone()).err().unwrap();
    assert!(matches!(err, ComposeError::MissingOption("volume_exists")));
}

#[test]
fn invalid_project_name_fails_before_any_invocation() {
    let engine = Arc::new(ScriptedEngine::default());
    let mut opts = options(&engine);
    opts.project_name = Some("Not Valid".into());
    assert!(Composer::with_executor(opts, engine.clone(), engine.clone()).is_err());
    assert!(engine.calls().is_empty());
}

#[test]
fn volume_reconciliation_is_idempotent_and_skips_external() {
    let engine = Arc::new(ScriptedEngine::default());
    let composer = composer(&engine);

    composer.ensure_resource(ResourceKind::Volume, "pgdata").unwrap();
    composer.ensure_resource(ResourceKind::Volume, "pgdata").unwrap();
    composer.ensure_resource(ResourceKind::Volume, "backups").unwrap();

    assert_eq!(
        engine.calls(),
        vec![vec![
            "volume",
            "create",
            "--label=com.docker.compose.project=shop",
            "--label=com.docker.compose.volume=pgdata",
            "shop_pgdata",
        ]]
    );
}

#[test]
fn up_stop_down_round_trip() {
    let engine = Arc::new(ScriptedEngine::default());
    let composer = composer(&engine);
    let cancel = CancelToken::new();

    let report = composer.up(&[], &UpOptions::default(), &cancel).unwrap();
    assert!(report.is_success());
    let names: Vec<_> = composer.ps(&[]).unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names.len(), 5);
    assert!(names.contains(&"shop-api-2".to_string()));

    engine.calls.lock().unwrap().clear();
    composer.stop(Some(7), &[], &cancel).unwrap();
    let stops = engine.calls();
    assert_eq!(stops[0], vec!["stop", "--time=7", "shop-web-1"]);
    assert!(stops.iter().all(|c| c[1] == "--time=7"));
    let db = stops.iter().position(|c| c[2] == "shop-db-1").unwrap();
    let api = stops.iter().position(|c| c[2].starts_with("shop-api-")).unwrap();
    assert!(api < db);

    composer
        .down(&DownOptions { volumes: true, remove_orphans: false }, &cancel)
        .unwrap();
    assert!(composer.ps(&[]).unwrap().is_empty());
}

/// Requires a containerd-backed `nerdctl` on PATH.
#[test]
#[ignore]
fn real_engine_up_and_down() {
    use stevedore::engine::{CliRuntime, ProcessExecutor};

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("compose.yaml"),
        "name: stevedore-it\nservices:\n  sleeper:\n    image: busybox\n    command: sleep 60\n",
    )
    .unwrap();

    let argv = vec!["nerdctl".to_string()];
    let executor: Arc<dyn Executor> = Arc::new(ProcessExecutor::new(&argv).unwrap());
    let runtime = CliRuntime::new(executor.clone());
    let (n, v, i) = (runtime.clone(), runtime.clone(), runtime.clone());
    let opts = Options {
        project_directory: Some(dir.path().to_path_buf()),
        argv_prefix: argv,
        network_exists: Some(Arc::new(move |name: &str| n.network_exists(name))),
        volume_exists: Some(Arc::new(move |name: &str| v.volume_exists(name))),
        ensure_image: Some(Arc::new(move |request: &ImageRequest| i.ensure_image(request))),
        ..Options::default()
    };
    let composer = Composer::with_executor(opts, executor, Arc::new(runtime)).unwrap();
    let cancel = CancelToken::new();

    composer.up(&[], &UpOptions::default(), &cancel).unwrap().into_result().unwrap();
    assert_eq!(composer.ps(&[]).unwrap().len(), 1);
    composer.down(&DownOptions::default(), &cancel).unwrap().into_result().unwrap();
    assert!(composer.ps(&[]).unwrap().is_empty());
}
