use serde::Serialize;

use super::lifecycle::fan_out;
use super::{Composer, ComposeError};
use crate::engine::{ContainerSummary, Intent};

/// Process listing of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopOutput {
    pub service: String,
    pub container: String,
    pub output: String,
}

/// One row of `compose images`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRow {
    pub service: String,
    pub container: String,
    pub image: String,
}

impl Composer {
    /// Containers of the resolved services, in dependency order.
    pub fn ps(&self, services: &[String]) -> Result<Vec<ContainerSummary>, ComposeError> {
        let mut all = Vec::new();
        for service in self.resolve_services(services)? {
            all.extend(self.containers(service)?);
        }
        Ok(all)
    }

    /// Run `top` against every container; the first failure is returned.
    pub fn top(&self, services: &[String]) -> Result<Vec<TopOutput>, ComposeError> {
        let mut listings = Vec::new();
        for service in self.resolve_services(services)? {
            let containers = self.containers(service)?;
            let results = fan_out(&containers, self.jobs, |c| {
                self.executor
                    .execute(&Intent::Top { id: c.id.clone() })
                    .map(|output| TopOutput {
                        service: service.name.clone(),
                        container: c.name.clone(),
                        output,
                    })
            });
            for result in results {
                listings.push(result?);
            }
        }
        Ok(listings)
    }

    pub fn images(&self, services: &[String]) -> Result<Vec<ImageRow>, ComposeError> {
        Ok(self
            .ps(services)?
            .into_iter()
            .map(|c| ImageRow {
                service: c.label(super::labels::SERVICE).unwrap_or_default().to_string(),
                container: c.name,
                image: c.image,
            })
            .collect())
    }
}
