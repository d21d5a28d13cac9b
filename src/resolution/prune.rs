//! Filters over gathered dependency information.
//!
//! Every function returns its output sorted by identity, so inputs with equal
//! content produce identical output whatever their enumeration order.

use crate::{
    NuGetError, PackageId, PackageIdentity, PackageReference, SourceDependencyInfo,
    VersionConstraints,
};
use std::collections::{BTreeMap, BTreeSet};

fn sorted<I: IntoIterator<Item = SourceDependencyInfo>>(packages: I) -> Vec<SourceDependencyInfo> {
    let mut packages: Vec<_> = packages.into_iter().collect();
    packages.sort();
    packages
}

/// Keeps only `identity`'s version of its id, and drops packages whose
/// dependency on that id the kept version does not satisfy.
pub fn remove_all_versions_for_id_except(
    packages: Vec<SourceDependencyInfo>,
    identity: &PackageIdentity,
) -> Vec<SourceDependencyInfo> {
    sorted(packages.into_iter().filter(|p| {
        if p.id() == &identity.id {
            return p.version() == &identity.version;
        }
        p.find_dependency_range(&identity.id)
            .is_none_or(|range| range.satisfies(&identity.version))
    }))
}

/// Drops prerelease versions, except for ids that `targets` pins to a
/// prerelease. Every version of such an id is kept, so an installed
/// prerelease can still move to a newer prerelease.
pub fn prune_prerelease_for_stable_targets(
    packages: Vec<SourceDependencyInfo>,
    targets: &[PackageIdentity],
) -> Vec<SourceDependencyInfo> {
    let pinned: BTreeSet<&PackageId> = targets
        .iter()
        .filter(|t| t.is_prerelease())
        .map(|t| &t.id)
        .collect();

    sorted(
        packages
            .into_iter()
            .filter(|p| !p.identity.is_prerelease() || pinned.contains(p.id())),
    )
}

/// Drops versions outside the `allowed_versions` of the matching reference.
pub fn prune_disallowed_versions(
    packages: Vec<SourceDependencyInfo>,
    references: &[PackageReference],
) -> Vec<SourceDependencyInfo> {
    let allowed: BTreeMap<&PackageId, _> = references
        .iter()
        .filter_map(|r| r.allowed_versions.as_ref().map(|range| (r.id(), range)))
        .collect();

    sorted(packages.into_iter().filter(|p| {
        allowed
            .get(p.id())
            .is_none_or(|range| range.satisfies(p.version()))
    }))
}

/// Drops versions lower than the installed version of each referenced id.
pub fn prune_downgrades(
    packages: Vec<SourceDependencyInfo>,
    references: &[PackageReference],
) -> Vec<SourceDependencyInfo> {
    let installed: BTreeMap<&PackageId, &semver::Version> = references
        .iter()
        .map(|r| (r.id(), &r.identity.version))
        .collect();

    sorted(packages.into_iter().filter(|p| {
        installed
            .get(p.id())
            .is_none_or(|version| p.version() >= *version)
    }))
}

/// Keeps only the highest available version of `id`.
pub fn prune_all_but_highest(
    packages: Vec<SourceDependencyInfo>,
    id: &PackageId,
) -> Vec<SourceDependencyInfo> {
    let highest = packages
        .iter()
        .filter(|p| p.id() == id)
        .map(|p| p.version().clone())
        .max();

    match highest {
        Some(highest) => sorted(
            packages
                .into_iter()
                .filter(|p| p.id() != id || p.version() == &highest),
        ),
        None => sorted(packages),
    }
}

/// Keeps versions that share the installed version's pinned parts.
pub fn prune_by_update_constraints(
    packages: Vec<SourceDependencyInfo>,
    references: &[PackageReference],
    constraints: VersionConstraints,
) -> Vec<SourceDependencyInfo> {
    if constraints.is_empty() {
        return sorted(packages);
    }

    let installed: BTreeMap<&PackageId, &semver::Version> = references
        .iter()
        .map(|r| (r.id(), &r.identity.version))
        .collect();

    sorted(packages.into_iter().filter(|p| {
        let Some(current) = installed.get(p.id()) else {
            return true;
        };
        let v = p.version();
        (!constraints.exact_major || v.major == current.major)
            && (!constraints.exact_minor || v.minor == current.minor)
            && (!constraints.exact_patch || v.patch == current.patch)
            && (!constraints.exact_release || v.pre == current.pre)
    }))
}

/// Fails when a target with `allowed_versions` has no remaining satisfying version.
pub fn ensure_versions_allowed(
    target_ids: &[PackageId],
    references: &[PackageReference],
    packages: &[SourceDependencyInfo],
) -> Result<(), NuGetError> {
    for id in target_ids {
        let Some(range) = references
            .iter()
            .find(|r| r.id() == id)
            .and_then(|r| r.allowed_versions.as_ref())
        else {
            continue;
        };

        let satisfied = packages
            .iter()
            .any(|p| p.id() == id && range.satisfies(p.version()));
        if !satisfied {
            return Err(NuGetError::resolution(format!(
                "Unable to find a version of '{}' that satisfies the allowed versions {} defined in the project.",
                id,
                range.pretty_print()
            )));
        }
    }
    Ok(())
}
