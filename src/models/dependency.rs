use crate::{PackageId, PackageIdentity, VersionRange, ports::SourceRepository};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PackageDependency {
    pub id: PackageId,
    #[serde(default)]
    pub range: VersionRange,
}

impl PackageDependency {
    pub fn new<I: Into<PackageId>>(id: I, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
        }
    }

    pub fn is_satisfied_by(&self, identity: &PackageIdentity) -> bool {
        self.id == identity.id && self.range.satisfies(&identity.version)
    }
}

impl fmt::Display for PackageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let range = self.range.pretty_print();
        if range.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} {}", self.id, range)
        }
    }
}

/// Dependency information for one package version as reported by a source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PackageDependencyInfo {
    pub identity: PackageIdentity,
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
    #[serde(default = "listed_by_default")]
    pub listed: bool,
}

fn listed_by_default() -> bool {
    true
}

impl PackageDependencyInfo {
    pub fn new(identity: PackageIdentity, dependencies: Vec<PackageDependency>) -> Self {
        Self {
            identity,
            dependencies,
            listed: true,
        }
    }

    pub fn unlisted(mut self) -> Self {
        self.listed = false;
        self
    }

    pub fn with_source(self, source: Arc<dyn SourceRepository>) -> SourceDependencyInfo {
        SourceDependencyInfo::new(self.identity, self.dependencies, self.listed, source)
    }
}

/// Dependency information for one package version, and the source that supplied it.
#[derive(Clone)]
pub struct SourceDependencyInfo {
    pub identity: PackageIdentity,
    pub dependencies: Vec<PackageDependency>,
    pub listed: bool,
    pub source: Arc<dyn SourceRepository>,
}

impl SourceDependencyInfo {
    pub fn new(
        identity: PackageIdentity,
        dependencies: Vec<PackageDependency>,
        listed: bool,
        source: Arc<dyn SourceRepository>,
    ) -> Self {
        Self {
            identity,
            dependencies,
            listed,
            source,
        }
    }

    pub fn id(&self) -> &PackageId {
        &self.identity.id
    }

    pub fn version(&self) -> &semver::Version {
        &self.identity.version
    }

    pub fn find_dependency_range(&self, id: &PackageId) -> Option<&VersionRange> {
        self.dependencies
            .iter()
            .find(|d| &d.id == id)
            .map(|d| &d.range)
    }

    pub fn depends_on(&self, id: &PackageId) -> bool {
        self.dependencies.iter().any(|d| &d.id == id)
    }
}

impl fmt::Debug for SourceDependencyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDependencyInfo")
            .field("identity", &self.identity)
            .field("dependencies", &self.dependencies)
            .field("listed", &self.listed)
            .field("source", &self.source.package_source().name)
            .finish()
    }
}

impl PartialEq for SourceDependencyInfo {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for SourceDependencyInfo {}

impl Ord for SourceDependencyInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity.cmp(&other.identity)
    }
}

impl PartialOrd for SourceDependencyInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorts by identity and keeps the first entry of each identity.
pub fn normalize_dependency_infos(
    mut packages: Vec<SourceDependencyInfo>,
) -> Vec<SourceDependencyInfo> {
    packages.sort();
    packages.dedup_by(|a, b| a.identity == b.identity);
    packages
}
