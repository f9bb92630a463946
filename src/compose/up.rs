use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::lifecycle::replica_number;
use super::{Composer, ComposeError, LifecycleReport, ResourceKind, Verb, labels};
use crate::engine::{CancelToken, CreateSpec, Intent};
use crate::project::{MountKind, Service, VolumeMount};

#[derive(Debug, Clone, Default)]
pub struct UpOptions {
    /// Build images for services with a build section before starting.
    pub build: bool,
    /// Create containers but leave them stopped.
    pub no_start: bool,
}

impl Composer {
    /// Bring `services` (and their dependencies) to the declared state.
    ///
    /// Networks, then volumes, then images are reconciled up front; any
    /// failure there aborts before a container is touched. Containers are
    /// then created, scaled down and started one service at a time in
    /// dependency order.
    pub fn up(
        &self,
        services: &[String],
        opts: &UpOptions,
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        let ordered = self.resolve_services(services)?;

        for network in unique(ordered.iter().flat_map(|s| s.networks.iter().map(String::as_str))) {
            self.ensure_resource(ResourceKind::Network, network)?;
        }
        for volume in unique(ordered.iter().flat_map(|s| s.named_volumes())) {
            self.ensure_resource(ResourceKind::Volume, volume)?;
        }
        for service in &ordered {
            if cancel.is_cancelled() {
                return Err(ComposeError::Cancelled);
            }
            self.ensure_service_image(service, opts.build)?;
        }

        let mut report = LifecycleReport::default();
        for service in &ordered {
            if cancel.is_cancelled() {
                return Err(ComposeError::Cancelled);
            }
            report.extend(self.converge(service)?);
        }

        if !opts.no_start {
            // A service whose every create failed is already in the report;
            // starting it would turn that into a fatal `NoContainers`.
            let mut startable = Vec::with_capacity(ordered.len());
            for service in &ordered {
                if service.scale > 0 && self.containers(service)?.is_empty() {
                    warn!(service = %service.name, "no containers created, skipping start");
                    continue;
                }
                startable.push(*service);
            }
            report.extend(self.apply(&Verb::Start, &startable, cancel)?);
        }
        Ok(report)
    }

    // Create missing replicas and remove surplus ones for a single service.
    fn converge(&self, service: &Service) -> Result<LifecycleReport, ComposeError> {
        let existing = self.containers(service)?;
        let numbers: HashSet<usize> = existing.iter().map(replica_number).collect();

        let missing: Vec<CreateSpec> = (1..=service.scale)
            .filter(|n| !numbers.contains(n))
            .map(|n| self.create_spec(service, n))
            .collect();
        let surplus: Vec<_> = existing
            .into_iter()
            .filter(|c| replica_number(c) > service.scale)
            .collect();
        debug!(
            service = %service.name,
            scale = service.scale,
            create = missing.len(),
            remove = surplus.len(),
            "converging replicas"
        );

        let mut report = LifecycleReport::default();
        if !missing.is_empty() {
            info!(service = %service.name, count = missing.len(), "creating containers");
            report.extend(self.run_units("create", &service.name, &missing, |spec| {
                Intent::Create(spec.clone())
            }));
        }
        if !surplus.is_empty() {
            info!(service = %service.name, count = surplus.len(), "removing surplus containers");
            report.extend(self.run_units("remove", &service.name, &surplus, |c| {
                Verb::Remove.intent(&c.id)
            }));
        }
        Ok(report)
    }

    /// Engine-level description of replica `number` of `service`.
    pub fn create_spec(&self, service: &Service, number: usize) -> CreateSpec {
        let project = &self.project;
        let mut container_labels = vec![
            (labels::PROJECT.to_string(), project.name.clone()),
            (labels::SERVICE.to_string(), service.name.clone()),
            (labels::CONTAINER_NUMBER.to_string(), number.to_string()),
        ];
        container_labels.extend(service.labels.iter().map(|(k, v)| (k.clone(), v.clone())));

        CreateSpec {
            name: project.container_name(service, number),
            image: service.image_ref(&project.name),
            labels: container_labels,
            networks: service.networks.iter().map(|n| project.network_name(n)).collect(),
            hostname: service.hostname.clone(),
            env: service
                .environment
                .iter()
                .map(|(k, v)| match v {
                    Some(v) => format!("{k}={v}"),
                    None => k.clone(),
                })
                .collect(),
            ports: service.ports.clone(),
            volumes: service.volumes.iter().map(|m| self.mount_arg(m)).collect(),
            restart: service.restart.clone(),
            platform: service.platform.clone(),
            workdir: service.working_dir.clone(),
            user: service.user.clone(),
            entrypoint: service.entrypoint.clone(),
            command: service.command.clone().unwrap_or_default(),
        }
    }

    fn mount_arg(&self, mount: &VolumeMount) -> String {
        let source = match (mount.kind, &mount.source) {
            (MountKind::Volume, Some(short)) => Some(self.project.volume_name(short)),
            (_, source) => source.clone(),
        };
        let mut arg = match source {
            Some(source) => format!("{source}:{}", mount.target),
            None => mount.target.clone(),
        };
        if mount.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

// First occurrence wins; keeps manifest order.
fn unique<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(*item)).collect()
}
