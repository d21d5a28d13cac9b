//! Turns resolver output into ordered project actions.
//!
//! Uninstalls always come before installs.

use crate::{
    NuGetError, NuGetProjectAction, PackageDependencyInfo, PackageId, PackageIdentity,
    SourceDependencyInfo, UninstallationContext,
    resolution::{UninstallResolver, utility::topological_sort},
};
use std::collections::{BTreeMap, BTreeSet};

fn source_for(
    identity: &PackageIdentity,
    available: &[SourceDependencyInfo],
) -> Result<NuGetProjectAction, NuGetError> {
    available
        .iter()
        .find(|p| &p.identity == identity)
        .map(|p| NuGetProjectAction::install(identity.clone(), p.source.clone()))
        .ok_or_else(|| NuGetError::PackageNotFound(identity.to_string()))
}

/// Ids the plan may install: the dependency closure of `targets` through the
/// resolved versions, plus every installed id whose version changes.
fn installable_ids(
    old: &[PackageIdentity],
    new_by_id: &BTreeMap<&PackageId, &PackageIdentity>,
    targets: &[PackageId],
    available: &[SourceDependencyInfo],
) -> BTreeSet<PackageId> {
    let mut closure = BTreeSet::new();
    let mut queue: Vec<PackageId> = targets.to_vec();
    while let Some(id) = queue.pop() {
        if !closure.insert(id.clone()) {
            continue;
        }
        let Some(resolved) = new_by_id.get(&id) else {
            continue;
        };
        if let Some(info) = available.iter().find(|p| &p.identity == *resolved) {
            queue.extend(info.dependencies.iter().map(|d| d.id.clone()));
        }
    }

    closure.extend(
        old.iter()
            .filter(|p| new_by_id.get(&p.id).is_some_and(|n| n.version != p.version))
            .map(|p| p.id.clone()),
    );
    closure
}

/// Diffs the installed list against the resolved one.
///
/// `new` is expected in install order, which is the resolver's order. A
/// resolved package that is missing from the project is only installed when
/// `targets` need it, so an unrelated gap in the project is left alone.
pub fn plan_install(
    old: &[PackageIdentity],
    new: &[PackageIdentity],
    targets: &[PackageId],
    available: &[SourceDependencyInfo],
    downgrade_allowed: bool,
) -> Result<Vec<NuGetProjectAction>, NuGetError> {
    let new_by_id: BTreeMap<_, _> = new.iter().map(|p| (&p.id, p)).collect();
    let old_set: BTreeSet<&PackageIdentity> = old.iter().collect();
    let installable = installable_ids(old, &new_by_id, targets, available);

    let mut uninstalls = Vec::new();
    for installed in old {
        let Some(replacement) = new_by_id.get(&installed.id) else {
            continue;
        };
        if replacement.version == installed.version {
            continue;
        }
        if !downgrade_allowed && installed.version > replacement.version {
            return Err(NuGetError::NewerVersionAlreadyReferenced(installed.to_string()));
        }
        uninstalls.push(NuGetProjectAction::uninstall(installed.clone()));
    }

    let mut actions = uninstalls;
    for identity in new {
        if !old_set.contains(identity) && installable.contains(&identity.id) {
            actions.push(source_for(identity, available)?);
        }
    }
    Ok(actions)
}

/// Uninstalls `reinstall` dependants first, then installs it back along with
/// anything the resolution added.
pub fn plan_reinstall(
    installed_infos: &[PackageDependencyInfo],
    reinstall: &[PackageIdentity],
    installed: &[PackageIdentity],
    new: &[PackageIdentity],
    available: &[SourceDependencyInfo],
) -> Result<Vec<NuGetProjectAction>, NuGetError> {
    let targets: BTreeSet<&PackageIdentity> = reinstall.iter().collect();
    let installed: BTreeSet<&PackageIdentity> = installed.iter().collect();

    let nodes: Vec<PackageDependencyInfo> = reinstall
        .iter()
        .map(|identity| {
            installed_infos
                .iter()
                .find(|info| &info.identity == identity)
                .cloned()
                .unwrap_or_else(|| PackageDependencyInfo::new(identity.clone(), Vec::new()))
        })
        .collect();

    let mut actions: Vec<NuGetProjectAction> = topological_sort(&nodes)
        .into_iter()
        .rev()
        .map(|node| NuGetProjectAction::uninstall(node.identity.clone()))
        .collect();

    for identity in new {
        if targets.contains(identity) || !installed.contains(identity) {
            actions.push(source_for(identity, available)?);
        }
    }
    Ok(actions)
}

pub fn plan_uninstall(
    target: &PackageIdentity,
    installed_infos: &[PackageDependencyInfo],
    installed: &[PackageIdentity],
    context: &UninstallationContext,
) -> Result<Vec<NuGetProjectAction>, NuGetError> {
    let resolver = UninstallResolver::new(installed_infos, installed);
    Ok(resolver
        .packages_to_be_uninstalled(target, context)?
        .into_iter()
        .map(NuGetProjectAction::uninstall)
        .collect())
}

/// A lone install that replaces any installed version of the same id.
pub fn plan_single_install(
    target: &PackageIdentity,
    installed: &[PackageIdentity],
    source: std::sync::Arc<dyn crate::ports::SourceRepository>,
    downgrade_allowed: bool,
) -> Result<Vec<NuGetProjectAction>, NuGetError> {
    let mut actions = Vec::new();
    if let Some(current) = installed.iter().find(|p| p.id == target.id) {
        if current.version > target.version && !downgrade_allowed {
            return Err(NuGetError::NewerVersionAlreadyReferenced(current.to_string()));
        }
        actions.push(NuGetProjectAction::uninstall(current.clone()));
    }
    actions.push(NuGetProjectAction::install(target.clone(), source));
    Ok(actions)
}
