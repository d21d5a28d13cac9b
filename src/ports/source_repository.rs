use crate::{NuGetError, PackageDependencyInfo, PackageId, PackageIdentity, PackageSource, TargetFramework};
use async_trait::async_trait;
use semver::Version;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait MetadataResource: Send + Sync {
    /// All versions of `id` the source knows about, in no particular order.
    async fn versions(
        &self,
        id: &PackageId,
        include_prerelease: bool,
        include_unlisted: bool,
        token: &CancellationToken,
    ) -> Result<Vec<Version>, NuGetError>;

    async fn latest_version(
        &self,
        id: &PackageId,
        include_prerelease: bool,
        include_unlisted: bool,
        token: &CancellationToken,
    ) -> Result<Option<Version>, NuGetError> {
        let versions = self
            .versions(id, include_prerelease, include_unlisted, token)
            .await?;
        Ok(versions.into_iter().max())
    }

    async fn exists(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        let versions = self.versions(&identity.id, true, true, token).await?;
        Ok(versions.contains(&identity.version))
    }
}

#[async_trait]
pub trait DependencyInfoResource: Send + Sync {
    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &TargetFramework,
        token: &CancellationToken,
    ) -> Result<Option<PackageDependencyInfo>, NuGetError>;

    /// Every version of `id`.
    async fn resolve_packages(
        &self,
        id: &PackageId,
        framework: &TargetFramework,
        token: &CancellationToken,
    ) -> Result<Vec<PackageDependencyInfo>, NuGetError>;
}

#[async_trait]
pub trait DownloadResource: Send + Sync {
    /// Reads the whole package archive into memory.
    async fn download(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<Vec<u8>, NuGetError>;
}

/// A package feed. Resources a feed cannot provide are `None`.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    fn package_source(&self) -> &PackageSource;

    async fn metadata_resource(&self) -> Result<Option<Arc<dyn MetadataResource>>, NuGetError>;

    async fn dependency_info_resource(
        &self,
    ) -> Result<Option<Arc<dyn DependencyInfoResource>>, NuGetError>;

    async fn download_resource(&self) -> Result<Option<Arc<dyn DownloadResource>>, NuGetError>;
}

/// Builds repository handles for configured sources.
pub trait SourceRepositoryFactory: Send + Sync {
    fn create(&self, source: &PackageSource) -> Arc<dyn SourceRepository>;
}
