use crate::{
    DependencyBehavior, NuGetError, PackageId, PackageIdentity, PackageReference, PackageSource,
    SourceDependencyInfo,
    resolution::utility::{diagnostic_message, find_first_circular_dependency, format_cycle, topological_sort},
};
use semver::Version;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Inputs of one resolver run.
#[derive(Clone, Debug)]
pub struct PackageResolverContext {
    pub dependency_behavior: DependencyBehavior,
    /// Ids the user asked for in this operation.
    pub target_ids: BTreeSet<PackageId>,
    /// Ids that must be in the solution: targets plus installed ids.
    pub required_ids: BTreeSet<PackageId>,
    pub installed: Vec<PackageReference>,
    /// Versions to keep when they still fit, usually the installed ones.
    pub preferred_versions: Vec<PackageIdentity>,
    pub available: Vec<SourceDependencyInfo>,
    /// Used for error messages only.
    pub sources: Vec<PackageSource>,
}

impl PackageResolverContext {
    pub fn new<T, R>(
        dependency_behavior: DependencyBehavior,
        target_ids: T,
        required_ids: R,
        available: Vec<SourceDependencyInfo>,
    ) -> Self
    where
        T: IntoIterator<Item = PackageId>,
        R: IntoIterator<Item = PackageId>,
    {
        let target_ids: BTreeSet<PackageId> = target_ids.into_iter().collect();
        let mut required_ids: BTreeSet<PackageId> = required_ids.into_iter().collect();
        required_ids.extend(target_ids.iter().cloned());

        Self {
            dependency_behavior,
            target_ids,
            required_ids,
            installed: Vec::new(),
            preferred_versions: Vec::new(),
            available,
            sources: Vec::new(),
        }
    }

    pub fn with_installed(mut self, installed: Vec<PackageReference>) -> Self {
        self.installed = installed;
        self
    }

    pub fn with_preferred_versions(mut self, preferred: Vec<PackageIdentity>) -> Self {
        self.preferred_versions = preferred;
        self
    }

    pub fn with_sources(mut self, sources: Vec<PackageSource>) -> Self {
        self.sources = sources;
        self
    }
}

/// Picks one version per required id such that every dependency edge of the
/// selection is satisfied. Returns the solution with dependencies first.
pub fn resolve(
    context: &PackageResolverContext,
    token: &CancellationToken,
) -> Result<Vec<PackageIdentity>, NuGetError> {
    if context.required_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut search = Search::new(context, token);
    let mut selected = BTreeMap::new();

    if !search.solve(&mut selected, 0)? {
        let message = match &search.deepest_failure {
            Some((_, id, partial)) => {
                let partial: Vec<&SourceDependencyInfo> = partial.values().copied().collect();
                diagnostic_message(
                    id,
                    &partial,
                    &context.available,
                    &context.installed,
                    &context.sources,
                )
            }
            None => "Unable to resolve dependencies.".to_string(),
        };
        return Err(NuGetError::resolution(message));
    }

    let solution: Vec<SourceDependencyInfo> = selected.into_values().cloned().collect();
    if let Some(cycle) = find_first_circular_dependency(&solution) {
        return Err(NuGetError::resolution(format!(
            "Circular dependency detected '{}'.",
            format_cycle(&cycle)
        )));
    }

    let ordered: Vec<PackageIdentity> = topological_sort(&solution)
        .into_iter()
        .map(|p| p.identity.clone())
        .collect();
    debug!("Resolved {} package(s)", ordered.len());
    Ok(ordered)
}

type Selection<'a> = BTreeMap<PackageId, &'a SourceDependencyInfo>;

struct Search<'a> {
    context: &'a PackageResolverContext,
    token: &'a CancellationToken,
    candidates: BTreeMap<PackageId, Vec<&'a SourceDependencyInfo>>,
    deepest_failure: Option<(usize, PackageId, Selection<'a>)>,
    follow_dependencies: bool,
}

impl<'a> Search<'a> {
    fn new(context: &'a PackageResolverContext, token: &'a CancellationToken) -> Self {
        let preferred: BTreeMap<&PackageId, &Version> = context
            .preferred_versions
            .iter()
            .map(|p| (&p.id, &p.version))
            .collect();

        let mut candidates: BTreeMap<PackageId, Vec<&SourceDependencyInfo>> = BTreeMap::new();
        for package in &context.available {
            candidates
                .entry(package.id().clone())
                .or_default()
                .push(package);
        }
        for (id, versions) in candidates.iter_mut() {
            versions.sort_by(|a, b| a.version().cmp(b.version()));
            versions.dedup_by(|a, b| a.identity == b.identity);

            let is_target = context.target_ids.contains(id);
            let behavior = if is_target {
                DependencyBehavior::Highest
            } else {
                context.dependency_behavior
            };
            versions.sort_by(|a, b| compare_by_behavior(behavior, a.version(), b.version()));

            if !is_target {
                if let Some(preferred) = preferred.get(id) {
                    if let Some(pos) = versions.iter().position(|p| p.version() == *preferred) {
                        let keep = versions.remove(pos);
                        versions.insert(0, keep);
                    }
                }
            }
        }

        Self {
            context,
            token,
            candidates,
            deepest_failure: None,
            follow_dependencies: context.dependency_behavior != DependencyBehavior::Ignore,
        }
    }

    fn next_pending(&self, selected: &Selection<'a>) -> Option<PackageId> {
        let mut pending: BTreeSet<&PackageId> = self
            .context
            .required_ids
            .iter()
            .filter(|id| !selected.contains_key(*id))
            .collect();

        if self.follow_dependencies {
            pending.extend(
                selected
                    .values()
                    .flat_map(|p| p.dependencies.iter())
                    .map(|d| &d.id)
                    .filter(|id| !selected.contains_key(*id)),
            );
        }

        pending.into_iter().next().cloned()
    }

    /// A candidate fits when every selected package's range on its id accepts
    /// it, its own dependencies on selected ids are satisfied, and each of its
    /// unselected dependencies still has some available version in range.
    /// Otherwise returns the id that blocks it.
    fn fits(&self, candidate: &SourceDependencyInfo, selected: &Selection<'a>) -> Result<(), PackageId> {
        if !self.follow_dependencies {
            return Ok(());
        }

        let accepted_by_selection = selected.values().all(|p| {
            p.find_dependency_range(candidate.id())
                .is_none_or(|range| range.satisfies(candidate.version()))
        });
        if !accepted_by_selection {
            return Err(candidate.id().clone());
        }

        for dependency in &candidate.dependencies {
            let satisfiable = match selected.get(&dependency.id) {
                Some(chosen) => dependency.range.satisfies(chosen.version()),
                None => self.candidates.get(&dependency.id).is_some_and(|versions| {
                    versions.iter().any(|v| dependency.range.satisfies(v.version()))
                }),
            };
            if !satisfiable {
                return Err(dependency.id.clone());
            }
        }
        Ok(())
    }

    fn solve(&mut self, selected: &mut Selection<'a>, depth: usize) -> Result<bool, NuGetError> {
        if self.token.is_cancelled() {
            return Err(NuGetError::Cancelled);
        }

        let Some(id) = self.next_pending(selected) else {
            return Ok(true);
        };

        let options: Vec<&'a SourceDependencyInfo> =
            self.candidates.get(&id).cloned().unwrap_or_default();

        let mut first_block: Option<(PackageId, &'a SourceDependencyInfo)> = None;
        for candidate in options {
            if let Err(blocker) = self.fits(candidate, selected) {
                if first_block.is_none() {
                    first_block = Some((blocker, candidate));
                }
                continue;
            }
            selected.insert(id.clone(), candidate);
            if self.solve(selected, depth + 1)? {
                return Ok(true);
            }
            selected.remove(&id);
        }

        let deeper = self
            .deepest_failure
            .as_ref()
            .is_none_or(|(best, _, _)| depth > *best);
        if deeper {
            let mut partial = selected.clone();
            let problem = match first_block {
                Some((blocker, candidate)) if &blocker != candidate.id() => {
                    partial.insert(candidate.id().clone(), candidate);
                    blocker
                }
                Some((blocker, _)) => blocker,
                None => id,
            };
            self.deepest_failure = Some((depth, problem, partial));
        }
        Ok(false)
    }
}

/// Orders versions so the preferred one for `behavior` comes first.
fn compare_by_behavior(behavior: DependencyBehavior, a: &Version, b: &Version) -> Ordering {
    match behavior {
        DependencyBehavior::Ignore | DependencyBehavior::Lowest => a.cmp(b),
        DependencyBehavior::Highest => b.cmp(a),
        DependencyBehavior::HighestPatch => a
            .major
            .cmp(&b.major)
            .then(a.minor.cmp(&b.minor))
            .then_with(|| b.cmp(a)),
        DependencyBehavior::HighestMinor => a.major.cmp(&b.major).then_with(|| b.cmp(a)),
    }
}
