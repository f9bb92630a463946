use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use super::{Composer, ComposeError, Order, labels};
use crate::engine::{BridgeError, CancelToken, ContainerSummary, CreateSpec, Intent};
use crate::project::Service;

/// A per-container lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Start,
    Stop { time: Option<u32> },
    Restart { time: Option<u32> },
    Kill { signal: Option<String> },
    Pause,
    Unpause,
    Remove,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Start => "start",
            Verb::Stop { .. } => "stop",
            Verb::Restart { .. } => "restart",
            Verb::Kill { .. } => "kill",
            Verb::Pause => "pause",
            Verb::Unpause => "unpause",
            Verb::Remove => "remove",
        }
    }

    /// Start-like verbs walk dependencies first, stop-like verbs dependents first.
    pub fn order(&self) -> Order {
        match self {
            Verb::Start | Verb::Restart { .. } | Verb::Unpause => Order::Forward,
            Verb::Stop { .. } | Verb::Kill { .. } | Verb::Pause | Verb::Remove => Order::Reverse,
        }
    }

    // Only `start` cannot proceed without an instance created by `up`.
    fn requires_instance(&self) -> bool {
        matches!(self, Verb::Start)
    }

    pub fn intent(&self, id: &str) -> Intent {
        let id = id.to_string();
        match self {
            Verb::Start => Intent::Start { id },
            Verb::Stop { time } => Intent::Stop { id, time: *time },
            Verb::Restart { time } => Intent::Restart { id, time: *time },
            Verb::Kill { signal } => Intent::Kill {
                id,
                signal: signal.clone(),
            },
            Verb::Pause => Intent::Pause { id },
            Verb::Unpause => Intent::Unpause { id },
            Verb::Remove => Intent::Remove { id, force: true },
        }
    }
}

/// Result of one unit of fan-out work.
#[derive(Debug)]
pub struct ContainerOutcome {
    pub action: &'static str,
    pub service: String,
    pub container: String,
    pub error: Option<BridgeError>,
}

impl ContainerOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-container outcomes of a lifecycle command, in execution order.
#[derive(Debug, Default)]
pub struct LifecycleReport {
    pub outcomes: Vec<ContainerOutcome>,
}

impl LifecycleReport {
    pub fn failures(&self) -> impl Iterator<Item = &ContainerOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(ContainerOutcome::is_ok)
    }

    /// Fail if any container operation failed.
    pub fn into_result(self) -> Result<Self, ComposeError> {
        let failed = self.failures().count();
        if failed == 0 {
            Ok(self)
        } else {
            Err(ComposeError::ContainerFailures {
                failed,
                total: self.outcomes.len(),
            })
        }
    }

    pub(crate) fn extend(&mut self, other: LifecycleReport) {
        self.outcomes.extend(other.outcomes);
    }
}

impl Composer {
    /// Run `verb` on every container of `services`, in the given order.
    ///
    /// Containers of one service are handled concurrently by at most `jobs`
    /// workers, and all of them finish before the next service is touched.
    /// A failing container is logged and recorded in the report; it does not
    /// stop its siblings or later services.
    pub fn apply(
        &self,
        verb: &Verb,
        services: &[&Service],
        cancel: &CancelToken,
    ) -> Result<LifecycleReport, ComposeError> {
        let mut report = LifecycleReport::default();
        for service in services {
            if cancel.is_cancelled() {
                return Err(ComposeError::Cancelled);
            }
            let containers = self.containers(service)?;
            if containers.is_empty() {
                if verb.requires_instance() && service.scale > 0 {
                    return Err(ComposeError::NoContainers {
                        service: service.name.clone(),
                    });
                }
                debug!(service = %service.name, verb = verb.as_str(), "no containers");
                continue;
            }

            info!(
                service = %service.name,
                verb = verb.as_str(),
                containers = containers.len(),
                "applying"
            );
            report.extend(self.run_units(verb.as_str(), &service.name, &containers, |c| {
                verb.intent(&c.id)
            }));
        }
        Ok(report)
    }

    /// Containers belonging to `service`, ordered by replica number.
    pub(crate) fn containers(
        &self,
        service: &Service,
    ) -> Result<Vec<ContainerSummary>, ComposeError> {
        let filters = labels::service_filter(&self.project.name, &service.name);
        let mut containers = self.runtime.list_containers(&filters)?;
        containers.sort_by(|a, b| {
            replica_number(a)
                .cmp(&replica_number(b))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(containers)
    }

    /// Fan `intent_for` out over `items` and collect one outcome per item.
    pub(crate) fn run_units<T, F>(
        &self,
        action: &'static str,
        service: &str,
        items: &[T],
        intent_for: F,
    ) -> LifecycleReport
    where
        T: Sync + Named,
        F: Fn(&T) -> Intent + Sync,
    {
        let outcomes = fan_out(items, self.jobs, |item| {
            let container = item.display_name().to_string();
            let error = match self.executor.execute(&intent_for(item)) {
                Ok(_) => None,
                Err(e) => {
                    warn!(service, %container, action, error = %e, "container operation failed");
                    Some(e)
                }
            };
            ContainerOutcome {
                action,
                service: service.to_string(),
                container,
                error,
            }
        });
        LifecycleReport { outcomes }
    }
}

/// Something a fan-out unit can be reported under.
pub(crate) trait Named {
    fn display_name(&self) -> &str;
}

impl Named for ContainerSummary {
    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Named for CreateSpec {
    fn display_name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn replica_number(container: &ContainerSummary) -> usize {
    container
        .label(labels::CONTAINER_NUMBER)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Run `work` over `items` on at most `jobs` scoped threads pulling from a
/// shared index. Results keep the order of `items`.
pub(crate) fn fan_out<T, R, F>(items: &[T], jobs: usize, work: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let workers = jobs.clamp(1, items.len());
    let next = AtomicUsize::new(0);
    let results = Mutex::new(Vec::with_capacity(items.len()));

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    let Some(item) = items.get(idx) else {
                        break;
                    };
                    let out = work(item);
                    results
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push((idx, out));
                }
            });
        }
    });

    let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, r)| r).collect()
}
