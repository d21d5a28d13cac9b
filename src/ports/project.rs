use crate::{
    NuGetError, PackageIdentity, PackageReference, TargetFramework,
    ports::{BuildIntegratedProject, ProjectContext},
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub name: String,
    pub unique_name: Option<String>,
    pub target_framework: TargetFramework,
    pub extra: BTreeMap<String, String>,
}

impl ProjectMetadata {
    pub fn new<S: Into<String>>(name: S, target_framework: TargetFramework) -> Self {
        Self {
            name: name.into(),
            unique_name: None,
            target_framework,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_unique_name<S: Into<String>>(mut self, unique_name: S) -> Self {
        self.unique_name = Some(unique_name.into());
        self
    }

    pub fn with_value<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    pub fn unique_name_or_name(&self) -> &str {
        self.unique_name.as_deref().unwrap_or(&self.name)
    }
}

/// A project packages are installed into.
#[async_trait]
pub trait NuGetProject: Send + Sync {
    fn metadata(&self) -> &ProjectMetadata;

    async fn installed_packages(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<PackageReference>, NuGetError>;

    /// Returns `false` when the package was already installed.
    async fn install_package(
        &self,
        identity: &PackageIdentity,
        package: &[u8],
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<bool, NuGetError>;

    /// Returns `false` when the package was not installed.
    async fn uninstall_package(
        &self,
        identity: &PackageIdentity,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<bool, NuGetError>;

    async fn pre_process(
        &self,
        _context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        Ok(())
    }

    async fn post_process(
        &self,
        _context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        Ok(())
    }

    /// Integrated projects consume packages from a global folder, so their
    /// uninstalls never remove package directories.
    fn is_integrated(&self) -> bool {
        false
    }

    fn as_build_integrated(&self) -> Option<&dyn BuildIntegratedProject> {
        None
    }

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn target_framework(&self) -> &TargetFramework {
        &self.metadata().target_framework
    }
}
