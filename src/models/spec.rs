use crate::{NuGetError, PackageId, PackageIdentity, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared dependencies of a build-integrated project.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default)]
    pub dependencies: BTreeMap<PackageId, VersionRange>,
}

impl PackageSpec {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            dependencies: BTreeMap::new(),
        }
    }

    /// Adds or replaces the dependency on `id`.
    pub fn add_dependency(&mut self, id: PackageId, range: VersionRange) {
        self.dependencies.remove(&id);
        self.dependencies.insert(id, range);
    }

    pub fn remove_dependency(&mut self, id: &PackageId) -> Option<VersionRange> {
        self.dependencies.remove(id)
    }

    pub fn has_dependency(&self, id: &PackageId) -> bool {
        self.dependencies.contains_key(id)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, NuGetError> {
        Ok(toml::from_str(input)?)
    }

    pub fn to_toml_string(&self) -> Result<String, NuGetError> {
        Ok(toml::to_string(self)?)
    }
}

/// Packages selected by the last successful restore.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct LockFile {
    #[serde(default)]
    pub libraries: Vec<PackageIdentity>,
}

impl LockFile {
    pub fn new(mut libraries: Vec<PackageIdentity>) -> Self {
        libraries.sort();
        libraries.dedup();
        Self { libraries }
    }

    pub fn contains(&self, identity: &PackageIdentity) -> bool {
        self.libraries.binary_search(identity).is_ok()
    }

    pub fn from_toml_str(input: &str) -> Result<Self, NuGetError> {
        let lock: Self = toml::from_str(input)?;
        Ok(Self::new(lock.libraries))
    }

    pub fn to_toml_string(&self) -> Result<String, NuGetError> {
        Ok(toml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_dependency_replaces_differently_cased_id() {
        let mut spec = PackageSpec::new("app");
        spec.add_dependency(PackageId::new("json"), VersionRange::parse("1.0").unwrap());
        spec.add_dependency(PackageId::new("JSON"), VersionRange::parse("2.0").unwrap());

        assert_eq!(spec.dependencies.len(), 1);
        let (id, range) = spec.dependencies.iter().next().unwrap();
        assert_eq!(id.as_str(), "JSON");
        assert_eq!(range.original_string(), "2.0");
    }

    #[test]
    fn test_spec_toml_round_trip() {
        let spec = PackageSpec::from_toml_str(
            r#"
            name = "app"

            [dependencies]
            "Contoso.Core" = "[1.0,2.0)"
            "#,
        )
        .unwrap();

        let again = PackageSpec::from_toml_str(&spec.to_toml_string().unwrap()).unwrap();
        assert_eq!(spec, again);
        assert!(again.has_dependency(&PackageId::new("contoso.core")));
    }

    #[test]
    fn test_unbounded_dependency_round_trip() {
        let mut spec = PackageSpec::new("app");
        spec.add_dependency(PackageId::new("Contoso.Core"), VersionRange::all());

        let again = PackageSpec::from_toml_str(&spec.to_toml_string().unwrap()).unwrap();
        assert_eq!(spec, again);
        assert!(again.dependencies[&PackageId::new("contoso.core")].is_all());
    }

    #[test]
    fn test_lock_file_is_sorted() {
        let lock = LockFile::new(vec![
            PackageIdentity::parse("b", "1.0").unwrap(),
            PackageIdentity::parse("a", "1.0").unwrap(),
        ]);
        assert_eq!(lock.libraries[0].id.as_str(), "a");
        assert!(lock.contains(&PackageIdentity::parse("B", "1.0").unwrap()));
    }
}
