use crate::{
    LockFile, NuGetError, PackageIdentity, PackageSpec,
    ports::{NuGetProject, ProjectContext},
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A project whose dependencies live in a spec and are applied by a full restore.
#[async_trait]
pub trait BuildIntegratedProject: NuGetProject {
    async fn read_spec(&self) -> Result<PackageSpec, NuGetError>;

    async fn write_spec(&self, spec: &PackageSpec) -> Result<(), NuGetError>;

    /// `None` when the project was never restored.
    async fn read_lock_file(&self) -> Result<Option<LockFile>, NuGetError>;

    async fn write_lock_file(&self, lock_file: &LockFile) -> Result<(), NuGetError>;

    async fn on_package_installed(
        &self,
        identity: &PackageIdentity,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError>;

    async fn on_package_uninstalled(
        &self,
        identity: &PackageIdentity,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError>;
}
