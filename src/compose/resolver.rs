use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use super::ComposeError;
use crate::project::{Project, Service};

/// Direction of a linearization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Dependencies before their dependents (start-like verbs).
    Forward,
    /// Dependents before their dependencies (stop-like verbs).
    Reverse,
}

/// Resolve `requested` (or every profile-enabled service when empty) plus
/// the transitive `depends_on` closure, linearized in `order`.
///
/// Profiles only select roots: an explicitly requested service runs even if
/// its profile is inactive, and dependencies are pulled in regardless of
/// their profiles. Unrelated services keep manifest declaration order.
pub fn resolve_order<'p>(
    project: &'p Project,
    requested: &[String],
    order: Order,
) -> Result<Vec<&'p Service>, ComposeError> {
    let roots: Vec<&Service> = if requested.is_empty() {
        project.enabled_services().collect()
    } else {
        requested
            .iter()
            .map(|name| {
                project
                    .service(name)
                    .ok_or_else(|| ComposeError::ServiceNotFound(name.clone()))
            })
            .collect::<Result<_, _>>()?
    };

    let selected = closure(project, &roots)?;
    let ordered = linearize(project, &selected, order)?;
    debug!(
        order = ?order,
        services = ?ordered.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        "resolved service order"
    );
    Ok(ordered)
}

// Declaration indexes of the roots and everything they depend on.
fn closure(project: &Project, roots: &[&Service]) -> Result<BTreeSet<usize>, ComposeError> {
    let mut selected = BTreeSet::new();
    let mut stack: Vec<&Service> = roots.to_vec();
    while let Some(service) = stack.pop() {
        let Some(idx) = project.declaration_index(&service.name) else {
            return Err(ComposeError::ServiceNotFound(service.name.clone()));
        };
        if !selected.insert(idx) {
            continue;
        }
        for dependency in service.dependencies() {
            let dep = project
                .service(dependency)
                .ok_or_else(|| ComposeError::ServiceNotFound(dependency.to_string()))?;
            stack.push(dep);
        }
    }
    Ok(selected)
}

// Kahn's algorithm over the selected subgraph. The ready set is ordered by
// declaration index so ties resolve deterministically.
fn linearize<'p>(
    project: &'p Project,
    selected: &BTreeSet<usize>,
    order: Order,
) -> Result<Vec<&'p Service>, ComposeError> {
    let n = project.services.len();
    // edges[a] lists nodes that may only run after a.
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];

    for &idx in selected {
        let Some((_, service)) = project.services.get_index(idx) else {
            continue;
        };
        for dependency in service.dependencies() {
            let Some(dep) = project.declaration_index(dependency) else {
                continue;
            };
            let (before, after) = match order {
                Order::Forward => (dep, idx),
                Order::Reverse => (idx, dep),
            };
            edges[before].push(after);
            indegree[after] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = selected
        .iter()
        .copied()
        .filter(|&idx| indegree[idx] == 0)
        .collect();
    let mut ordered = Vec::with_capacity(selected.len());

    while let Some(idx) = ready.pop_first() {
        if let Some((_, service)) = project.services.get_index(idx) {
            ordered.push(service);
        }
        for &next in &edges[idx] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if ordered.len() < selected.len() {
        let emitted: HashSet<&str> = ordered.iter().map(|s| s.name.as_str()).collect();
        let stuck = selected
            .iter()
            .filter_map(|&idx| project.services.get_index(idx))
            .map(|(name, _)| name.clone())
            .filter(|name| !emitted.contains(name.as_str()))
            .collect();
        return Err(ComposeError::DependencyCycle(stuck));
    }
    Ok(ordered)
}
