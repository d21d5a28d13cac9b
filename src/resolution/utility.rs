use crate::{
    PackageDependency, PackageDependencyInfo, PackageId, PackageIdentity, PackageReference,
    PackageSource, SourceDependencyInfo,
};
use std::collections::{BTreeMap, BTreeSet};

/// A package and its direct dependencies, as seen by graph algorithms.
pub trait DependencyNode {
    fn identity(&self) -> &PackageIdentity;

    fn dependencies(&self) -> &[PackageDependency];

    fn find_dependency(&self, id: &PackageId) -> Option<&PackageDependency> {
        self.dependencies().iter().find(|d| &d.id == id)
    }
}

impl DependencyNode for SourceDependencyInfo {
    fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    fn dependencies(&self) -> &[PackageDependency] {
        &self.dependencies
    }
}

impl DependencyNode for PackageDependencyInfo {
    fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    fn dependencies(&self) -> &[PackageDependency] {
        &self.dependencies
    }
}

/// Orders `nodes` so that dependencies come before their dependants.
///
/// Ties are broken by id. Dependencies on ids outside `nodes` are ignored;
/// nodes caught in a cycle are appended at the end, sorted by id.
pub fn topological_sort<N: DependencyNode>(nodes: &[N]) -> Vec<&N> {
    let ids: BTreeSet<&PackageId> = nodes.iter().map(|n| &n.identity().id).collect();
    let mut remaining: BTreeMap<&PackageId, &N> =
        nodes.iter().map(|n| (&n.identity().id, n)).collect();
    let mut placed: BTreeSet<&PackageId> = BTreeSet::new();
    let mut result = Vec::with_capacity(nodes.len());

    loop {
        let next = remaining
            .iter()
            .find(|(_, node)| {
                node.dependencies()
                    .iter()
                    .filter(|d| ids.contains(&d.id))
                    .all(|d| placed.contains(&d.id))
            })
            .map(|(id, _)| *id);

        let Some(id) = next else { break };
        if let Some(node) = remaining.remove(id) {
            placed.insert(id);
            result.push(node);
        }
    }

    result.extend(remaining.into_values());
    result
}

/// Returns the first dependency cycle in `solution`, e.g. `[A, B, A]`.
pub fn find_first_circular_dependency<N: DependencyNode>(
    solution: &[N],
) -> Option<Vec<PackageIdentity>> {
    let lookup: BTreeMap<&PackageId, &N> =
        solution.iter().map(|n| (&n.identity().id, n)).collect();
    let mut finished: BTreeSet<&PackageId> = BTreeSet::new();

    for start in lookup.keys() {
        let mut path: Vec<&PackageId> = Vec::new();
        if let Some(cycle) = visit(*start, &lookup, &mut path, &mut finished) {
            return Some(
                cycle
                    .into_iter()
                    .filter_map(|id| lookup.get(id).map(|n| n.identity().clone()))
                    .collect(),
            );
        }
    }

    None
}

fn visit<'a, N: DependencyNode>(
    id: &'a PackageId,
    lookup: &BTreeMap<&'a PackageId, &'a N>,
    path: &mut Vec<&'a PackageId>,
    finished: &mut BTreeSet<&'a PackageId>,
) -> Option<Vec<&'a PackageId>> {
    if let Some(pos) = path.iter().position(|p| *p == id) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(id);
        return Some(cycle);
    }
    if finished.contains(id) {
        return None;
    }

    let node: &'a N = *lookup.get(id)?;
    path.push(id);
    let mut dependency_ids: Vec<&PackageId> = node.dependencies().iter().map(|d| &d.id).collect();
    dependency_ids.sort();
    for dependency_id in dependency_ids {
        if let Some((key, _)) = lookup.get_key_value(dependency_id) {
            if let Some(cycle) = visit(*key, lookup, path, finished) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    finished.insert(id);
    None
}

pub fn format_cycle(cycle: &[PackageIdentity]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" => ")
}

/// `'A 1.0.0 constraint: B (>= 2.0.0)'`
pub fn format_dependency_constraint<N: DependencyNode>(node: &N, dependency_id: &PackageId) -> String {
    let range = node
        .find_dependency(dependency_id)
        .map(|d| d.range.pretty_print())
        .unwrap_or_default();
    let dependency = format!("{} {}", dependency_id, range);
    format!(
        "'{} constraint: {}'",
        node.identity(),
        dependency.trim_end()
    )
}

/// Builds the user-facing message for an id the resolver could not place.
///
/// `selected` is the partial solution at the point of failure.
pub fn diagnostic_message(
    problem_id: &PackageId,
    selected: &[&SourceDependencyInfo],
    available: &[SourceDependencyInfo],
    installed: &[PackageReference],
    sources: &[PackageSource],
) -> String {
    let mut dependants: Vec<String> = selected
        .iter()
        .filter(|p| p.depends_on(problem_id))
        .map(|p| format_dependency_constraint(*p, problem_id))
        .collect();
    dependants.sort_by_key(|s| s.to_lowercase());

    let options: Vec<&SourceDependencyInfo> =
        available.iter().filter(|p| p.id() == problem_id).collect();
    let config_entry = installed.iter().find(|r| r.id() == problem_id);
    let has_allowed_versions = config_entry.is_some_and(PackageReference::has_allowed_versions);

    let mut message = if options.is_empty() || dependants.is_empty() {
        let source_list = sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| format!("'{}'", s.name))
            .collect::<Vec<_>>()
            .join(", ");
        if source_list.is_empty() {
            format!("Unable to resolve dependency '{}'.", problem_id)
        } else {
            format!(
                "Unable to resolve dependency '{}'. Source(s) used: {}.",
                problem_id, source_list
            )
        }
    } else if options.len() == 1 && !has_allowed_versions {
        format!(
            "Unable to resolve dependencies. '{}' is not compatible with {}.",
            options[0].identity,
            dependants.join(", ")
        )
    } else {
        format!(
            "Unable to find a version of '{}' that is compatible with {}.",
            problem_id,
            dependants.join(", ")
        )
    };

    if let Some(allowed) = config_entry.and_then(|r| r.allowed_versions.as_ref()) {
        message.push_str(&format!(
            " '{}' has an additional constraint {} defined in the project.",
            problem_id,
            allowed.pretty_print()
        ));
    }

    message
}
