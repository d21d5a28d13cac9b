use crate::{NuGetError, PackageDependency, PackageIdentity, TargetFramework, parse_version};
use semver::Version;
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE_NAME: &str = "package.toml";

/// Dependencies declared for one target framework, or for all of them when
/// `target_framework` is absent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyGroup {
    #[serde(default)]
    pub target_framework: Option<TargetFramework>,
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

/// Metadata stored as `package.toml` at the root of a package archive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub min_client_version: Option<String>,
    #[serde(default = "listed_by_default")]
    pub listed: bool,
    #[serde(default)]
    pub development_dependency: bool,
    #[serde(default)]
    pub readme: Option<String>,
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
}

fn listed_by_default() -> bool {
    true
}

impl PackageManifest {
    pub fn new(identity: &PackageIdentity) -> Self {
        Self {
            id: identity.id.to_string(),
            version: identity.version.to_string(),
            min_client_version: None,
            listed: true,
            development_dependency: false,
            readme: None,
            dependency_groups: Vec::new(),
        }
    }

    pub fn with_dependencies(
        mut self,
        target_framework: Option<TargetFramework>,
        dependencies: Vec<PackageDependency>,
    ) -> Self {
        self.dependency_groups.push(DependencyGroup {
            target_framework,
            dependencies,
        });
        self
    }

    pub fn with_min_client_version(mut self, version: &Version) -> Self {
        self.min_client_version = Some(version.to_string());
        self
    }

    pub fn from_toml_str(input: &str) -> Result<Self, NuGetError> {
        let manifest: Self = toml::from_str(input)?;
        manifest.identity()?;
        manifest.min_client_version()?;
        Ok(manifest)
    }

    pub fn to_toml_string(&self) -> Result<String, NuGetError> {
        Ok(toml::to_string(self)?)
    }

    pub fn identity(&self) -> Result<PackageIdentity, NuGetError> {
        if self.id.trim().is_empty() {
            return Err(NuGetError::InvalidManifest("missing package id".to_string()));
        }
        PackageIdentity::parse(self.id.as_str(), &self.version)
            .map_err(|e| NuGetError::InvalidManifest(format!("{}: {}", self.id, e)))
    }

    pub fn min_client_version(&self) -> Result<Option<Version>, NuGetError> {
        self.min_client_version
            .as_deref()
            .map(parse_version)
            .transpose()
            .map_err(|e| NuGetError::InvalidManifest(e.to_string()))
    }

    /// Dependencies of the group that best fits `framework`: an exact moniker
    /// match first, then the framework-agnostic group.
    pub fn dependencies_for(&self, framework: &TargetFramework) -> Vec<PackageDependency> {
        let exact = self.dependency_groups.iter().find(|g| {
            g.target_framework
                .as_ref()
                .is_some_and(|tf| !tf.is_any() && tf == framework)
        });
        let fallback = || {
            self.dependency_groups.iter().find(|g| {
                g.target_framework
                    .as_ref()
                    .is_none_or(|tf| tf.is_any() || framework.is_any())
            })
        };

        exact
            .or_else(fallback)
            .map(|g| g.dependencies.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VersionRange;

    const MANIFEST: &str = r#"
id = "Contoso.Logging"
version = "1.2"
min_client_version = "3.0"

[[dependency_groups]]
dependencies = [{ id = "Contoso.Core", range = "[1.0,2.0)" }]

[[dependency_groups]]
target_framework = "net45"
dependencies = [{ id = "Contoso.Legacy", range = "1.0" }]
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = PackageManifest::from_toml_str(MANIFEST).unwrap();
        assert_eq!(
            manifest.identity().unwrap(),
            PackageIdentity::parse("contoso.logging", "1.2.0").unwrap()
        );
        assert_eq!(
            manifest.min_client_version().unwrap(),
            Some(Version::new(3, 0, 0))
        );
        assert!(manifest.listed);
    }

    #[test]
    fn test_dependencies_for_prefers_exact_framework() {
        let manifest = PackageManifest::from_toml_str(MANIFEST).unwrap();

        let legacy = manifest.dependencies_for(&TargetFramework::new("NET45"));
        assert_eq!(legacy[0].id.as_str(), "Contoso.Legacy");

        let modern = manifest.dependencies_for(&TargetFramework::new("netstandard2.0"));
        assert_eq!(modern[0].id.as_str(), "Contoso.Core");
        assert_eq!(modern[0].range, VersionRange::parse("[1.0,2.0)").unwrap());
    }

    #[test]
    fn test_missing_id_is_invalid() {
        let result = PackageManifest::from_toml_str("id = \"\"\nversion = \"1.0\"");
        assert!(matches!(result, Err(NuGetError::InvalidManifest(_))));
    }
}
