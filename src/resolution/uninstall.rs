use crate::{
    NuGetError, PackageDependencyInfo, PackageIdentity, UninstallationContext,
    resolution::utility::{DependencyNode, topological_sort},
};
use std::collections::{BTreeMap, BTreeSet};

/// Works out which installed packages an uninstall removes.
pub struct UninstallResolver<'a> {
    installed: BTreeMap<&'a crate::PackageId, &'a PackageIdentity>,
    infos: BTreeMap<&'a PackageIdentity, &'a PackageDependencyInfo>,
    dependants: BTreeMap<&'a PackageIdentity, BTreeSet<&'a PackageIdentity>>,
}

impl<'a> UninstallResolver<'a> {
    pub fn new(
        dependency_infos: &'a [PackageDependencyInfo],
        installed: &'a [PackageIdentity],
    ) -> Self {
        let installed_by_id: BTreeMap<_, _> = installed.iter().map(|p| (&p.id, p)).collect();
        let infos: BTreeMap<_, _> = dependency_infos
            .iter()
            .filter(|info| installed_by_id.get(&info.identity.id) == Some(&&info.identity))
            .map(|info| (&info.identity, info))
            .collect();

        let mut dependants: BTreeMap<&PackageIdentity, BTreeSet<&PackageIdentity>> = BTreeMap::new();
        for (identity, info) in &infos {
            for dependency in info.dependencies() {
                if let Some(target) = installed_by_id.get(&dependency.id) {
                    dependants.entry(*target).or_default().insert(*identity);
                }
            }
        }

        Self {
            installed: installed_by_id,
            infos,
            dependants,
        }
    }

    fn dependants_of(&self, identity: &PackageIdentity) -> impl Iterator<Item = &'a PackageIdentity> + '_ {
        self.dependants.get(identity).into_iter().flatten().copied()
    }

    /// Target first, then, when `remove_dependencies` is set, the dependencies
    /// nothing else still needs, dependants before their dependencies.
    pub fn packages_to_be_uninstalled(
        &self,
        target: &PackageIdentity,
        context: &UninstallationContext,
    ) -> Result<Vec<PackageIdentity>, NuGetError> {
        let Some(target) = self.installed.get(&target.id).copied().filter(|p| *p == target) else {
            return Err(NuGetError::UninstallFailure(format!(
                "Package '{}' is not installed",
                target
            )));
        };

        if !context.force_remove {
            let blocking: Vec<String> = self.dependants_of(target).map(|p| format!("'{}'", p)).collect();
            match blocking.len() {
                0 => {}
                1 => {
                    return Err(NuGetError::UninstallFailure(format!(
                        "Unable to uninstall '{}' because {} depends on it.",
                        target, blocking[0]
                    )));
                }
                _ => {
                    return Err(NuGetError::UninstallFailure(format!(
                        "Unable to uninstall '{}' because {} depend on it.",
                        target,
                        blocking.join(", ")
                    )));
                }
            }
        }

        let mut removal: BTreeSet<&PackageIdentity> = BTreeSet::from([target]);
        if context.remove_dependencies {
            loop {
                let orphaned: Vec<&PackageIdentity> = removal
                    .iter()
                    .filter_map(|p| self.infos.get(*p))
                    .flat_map(|info| info.dependencies())
                    .filter_map(|d| self.installed.get(&d.id).copied())
                    .filter(|p| !removal.contains(p))
                    .filter(|p| self.dependants_of(p).all(|d| removal.contains(d)))
                    .collect();

                if orphaned.is_empty() {
                    break;
                }
                removal.extend(orphaned);
            }
        }

        let nodes: Vec<PackageDependencyInfo> = removal
            .iter()
            .map(|p| match self.infos.get(*p) {
                Some(info) => (*info).clone(),
                None => PackageDependencyInfo::new((*p).clone(), Vec::new()),
            })
            .collect();

        let mut ordered: Vec<PackageIdentity> = topological_sort(&nodes)
            .into_iter()
            .rev()
            .map(|n| n.identity.clone())
            .collect();

        if let Some(pos) = ordered.iter().position(|p| p == target) {
            let first = ordered.remove(pos);
            ordered.insert(0, first);
        }
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PackageDependency, VersionRange};

    fn info(id: &str, deps: &[&str]) -> PackageDependencyInfo {
        PackageDependencyInfo::new(
            PackageIdentity::parse(id, "1.0").unwrap(),
            deps.iter()
                .map(|d| PackageDependency::new(*d, VersionRange::parse("1.0").unwrap()))
                .collect(),
        )
    }

    fn identity(id: &str) -> PackageIdentity {
        PackageIdentity::parse(id, "1.0").unwrap()
    }

    fn names(result: &[PackageIdentity]) -> Vec<&str> {
        result.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_remove_dependencies_includes_orphans() {
        let infos = vec![info("A", &["B"]), info("B", &[])];
        let installed = vec![identity("A"), identity("B")];
        let resolver = UninstallResolver::new(&infos, &installed);

        let with = resolver
            .packages_to_be_uninstalled(&identity("A"), &UninstallationContext::new(true, false))
            .unwrap();
        assert_eq!(names(&with), vec!["A", "B"]);

        let without = resolver
            .packages_to_be_uninstalled(&identity("A"), &UninstallationContext::default())
            .unwrap();
        assert_eq!(names(&without), vec!["A"]);
    }

    #[test]
    fn test_shared_dependency_is_kept() {
        let infos = vec![info("A", &["B", "C"]), info("C", &["D"]), info("D", &[]), info("B", &[]), info("E", &["B"])];
        let installed: Vec<_> = ["A", "B", "C", "D", "E"].into_iter().map(identity).collect();
        let resolver = UninstallResolver::new(&infos, &installed);

        let result = resolver
            .packages_to_be_uninstalled(&identity("A"), &UninstallationContext::new(true, false))
            .unwrap();
        assert_eq!(names(&result), vec!["A", "C", "D"]);
    }

    #[test]
    fn test_dependant_blocks_uninstall_unless_forced() {
        let infos = vec![info("C", &["A"]), info("A", &[])];
        let installed = vec![identity("A"), identity("C")];
        let resolver = UninstallResolver::new(&infos, &installed);

        let err = resolver
            .packages_to_be_uninstalled(&identity("A"), &UninstallationContext::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to uninstall 'A 1.0.0' because 'C 1.0.0' depends on it."
        );

        let forced = resolver
            .packages_to_be_uninstalled(&identity("A"), &UninstallationContext::new(false, true))
            .unwrap();
        assert_eq!(names(&forced), vec!["A"]);
    }
}
