use tracing::{info, warn};

use super::{
    Composer, ComposeError, LifecycleReport, Order, ResourceKind, Verb, labels, resolve_order,
};
use crate::engine::{CancelToken, Intent};

#[derive(Debug, Clone, Default)]
pub struct DownOptions {
    /// Also remove project-owned named volumes.
    pub volumes: bool,
    /// Also remove containers of services no longer in the manifest.
    pub remove_orphans: bool,
}

impl Composer {
    /// Remove every container of the project (dependents first), then the
    /// project's networks and, on request, its volumes. Removal failures are
    /// logged and do not stop the teardown.
    pub fn down(
        &self,
        opts: &DownOptions,
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        let all: Vec<String> = self.project.services.keys().cloned().collect();
        let ordered = resolve_order(&self.project, &all, Order::Reverse)?;
        let mut report = self.apply(&Verb::Remove, &ordered, cancel)?;

        let project_containers = self
            .runtime
            .list_containers(&labels::project_filter(&self.project.name))?;
        let orphans: Vec<_> = project_containers
            .into_iter()
            .filter(|c| {
                c.label(labels::SERVICE)
                    .is_none_or(|service| !self.project.services.contains_key(service))
            })
            .collect();
        if !orphans.is_empty() {
            if opts.remove_orphans {
                info!(count = orphans.len(), "removing orphan containers");
                report.extend(self.run_units("remove", "<orphan>", &orphans, |c| {
                    Verb::Remove.intent(&c.id)
                }));
            } else {
                let names: Vec<_> = orphans.iter().map(|c| c.name.as_str()).collect();
                warn!(
                    containers = ?names,
                    "found orphan containers; run with --remove-orphans to clean them up"
                );
            }
        }

        if cancel.is_cancelled() {
            return Err(ComposeError::Cancelled);
        }
        for short in self.project.networks.keys() {
            self.remove_resource(ResourceKind::Network, short);
        }
        if opts.volumes {
            for short in self.project.volumes.keys() {
                self.remove_resource(ResourceKind::Volume, short);
            }
        }
        Ok(report)
    }

    // Best effort: external and absent resources are skipped, failures only warn.
    fn remove_resource(&self, kind: ResourceKind, short: &str) {
        let external = match kind {
            ResourceKind::Network => {
                self.project.networks.get(short).is_some_and(|n| n.common.external)
            }
            ResourceKind::Volume => {
                self.project.volumes.get(short).is_some_and(|v| v.common.external)
            }
        };
        if external {
            return;
        }
        let name = self.resource_name(kind, short);
        match self.resource_exists(kind, &name) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(%kind, %name, error = %e, "could not check resource");
                return;
            }
        }
        let intent = match kind {
            ResourceKind::Network => Intent::RemoveNetwork { name: name.clone() },
            ResourceKind::Volume => Intent::RemoveVolume { name: name.clone() },
        };
        info!(%kind, %name, "removing");
        if let Err(e) = self.executor.execute(&intent) {
            warn!(%kind, %name, error = %e, "failed to remove");
        }
    }
}
