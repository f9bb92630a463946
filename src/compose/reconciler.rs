use std::fmt;

use tracing::{debug, info, warn};

use super::{Composer, ComposeError, labels};
use crate::engine::{ImageRequest, Intent, PullPolicy};
use crate::project::{BuildSpec, ResourceSpec, Service};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Network,
    Volume,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Volume => "volume",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ResourceKind::Network => labels::NETWORK,
            ResourceKind::Volume => labels::VOLUME,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Composer {
    /// Make sure the network or volume declared as `short` exists.
    ///
    /// External resources are left alone. A project-owned resource is created
    /// with provenance labels when the existence predicate reports it absent.
    /// If creation fails but a second probe finds the resource, another
    /// invocation won the race and the call succeeds.
    pub fn ensure_resource(&self, kind: ResourceKind, short: &str) -> Result<(), ComposeError> {
        let spec = self.resource_spec(kind, short)?;
        if spec.external {
            debug!(%kind, name = short, "external resource, skipping");
            return Ok(());
        }

        let name = self.resource_name(kind, short);
        if self.resource_exists(kind, &name)? {
            debug!(%kind, %name, "already exists");
            return Ok(());
        }

        let mut resource_labels = vec![
            (labels::PROJECT.to_string(), self.project.name.clone()),
            (kind.label().to_string(), short.to_string()),
        ];
        resource_labels.extend(spec.labels.iter().map(|(k, v)| (k.clone(), v.clone())));

        let intent = match kind {
            ResourceKind::Network => Intent::CreateNetwork {
                name: name.clone(),
                driver: spec.driver.clone(),
                labels: resource_labels,
            },
            ResourceKind::Volume => Intent::CreateVolume {
                name: name.clone(),
                driver: spec.driver.clone(),
                labels: resource_labels,
            },
        };

        info!(%kind, %name, "creating");
        match self.executor.execute(&intent) {
            Ok(_) => Ok(()),
            Err(err) => match self.resource_exists(kind, &name) {
                Ok(true) => {
                    warn!(%kind, %name, "created concurrently by another invocation");
                    Ok(())
                }
                Ok(false) => Err(err.into()),
                Err(recheck) => {
                    debug!(%kind, %name, error = %recheck, "re-check after failed create errored");
                    Err(err.into())
                }
            },
        }
    }

    /// Make the image for `service` available, building it when it has a
    /// build section and either `force_build` is set, the pull policy says
    /// `build`, or no local copy exists.
    pub fn ensure_service_image(
        &self,
        service: &Service,
        force_build: bool,
    ) -> Result<(), ComposeError> {
        let reference = service.image_ref(&self.project.name);

        if let Some(build) = &service.build {
            if !force_build && service.pull_policy != PullPolicy::Build {
                let local = ImageRequest {
                    reference: reference.clone(),
                    pull_policy: PullPolicy::Never,
                    platform: service.platform.clone(),
                    verify: None,
                };
                match (self.ensure_image)(&local) {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        debug!(service = %service.name, error = %e, "no local image, building")
                    }
                }
            }
            return self.build_image(service, build, reference);
        }

        let request = ImageRequest {
            reference,
            pull_policy: service.pull_policy,
            platform: service.platform.clone(),
            verify: service.verify_policy(),
        };
        (self.ensure_image)(&request).map_err(|source| ComposeError::Predicate {
            what: format!("image {}", request.reference),
            source,
        })
    }

    fn build_image(
        &self,
        service: &Service,
        build: &BuildSpec,
        tag: String,
    ) -> Result<(), ComposeError> {
        let context = self.project.working_dir.join(&build.context);
        info!(service = %service.name, image = %tag, "building image");
        self.executor.execute(&Intent::BuildImage {
            context: context.display().to_string(),
            dockerfile: build.dockerfile.clone(),
            tag,
            platform: service.platform.clone(),
        })?;
        Ok(())
    }

    pub(crate) fn resource_name(&self, kind: ResourceKind, short: &str) -> String {
        match kind {
            ResourceKind::Network => self.project.network_name(short),
            ResourceKind::Volume => self.project.volume_name(short),
        }
    }

    pub(crate) fn resource_exists(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<bool, ComposeError> {
        let probe = match kind {
            ResourceKind::Network => &self.network_exists,
            ResourceKind::Volume => &self.volume_exists,
        };
        probe(name).map_err(|source| ComposeError::Predicate {
            what: format!("{kind} {name}"),
            source,
        })
    }

    fn resource_spec(
        &self,
        kind: ResourceKind,
        short: &str,
    ) -> Result<&ResourceSpec, ComposeError> {
        let spec = match kind {
            ResourceKind::Network => self.project.networks.get(short).map(|n| &n.common),
            ResourceKind::Volume => self.project.volumes.get(short).map(|v| &v.common),
        };
        spec.ok_or_else(|| ComposeError::UndefinedResource {
            kind: kind.as_str(),
            name: short.to_string(),
        })
    }
}
