use crate::{
    MessageLevel, NuGetError, PackageDependencyInfo, PackageId, PackageIdentity, PackageManifest,
    PackageReference, PackageSource, TargetFramework,
    paths::{PackagePathResolver, PackagePaths},
    ports::{
        DependencyInfoResource, DownloadResource, MetadataResource, NuGetProject, ProjectContext,
        ProjectMetadata, SourceRepository,
    },
    repositories::package_archive::PackageArchive,
};
use async_trait::async_trait;
use semver::Version;
use sha2::{Digest, Sha512};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const PACKAGES_FOLDER_NAME: &str = "packages folder";

/// The shared on-disk package cache. Every project in a solution extracts into it.
pub struct PackagesFolderProject<P: PackagePaths = PackagePathResolver> {
    metadata: ProjectMetadata,
    paths: P,
}

impl PackagesFolderProject<PackagePathResolver> {
    pub fn new<R: Into<PathBuf>>(root: R) -> Self {
        Self::with_paths(PackagePathResolver::new(root))
    }
}

impl<P: PackagePaths> PackagesFolderProject<P> {
    pub fn with_paths(paths: P) -> Self {
        Self {
            metadata: ProjectMetadata::new(PACKAGES_FOLDER_NAME, TargetFramework::any()),
            paths,
        }
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn paths(&self) -> &P {
        &self.paths
    }

    pub async fn package_exists(&self, identity: &PackageIdentity) -> bool {
        tokio::fs::try_exists(self.paths.archive_path(identity))
            .await
            .unwrap_or(false)
    }

    pub async fn read_archive(&self, identity: &PackageIdentity) -> Result<Option<Vec<u8>>, NuGetError> {
        match tokio::fs::read(self.paths.archive_path(identity)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_manifest(
        &self,
        identity: &PackageIdentity,
    ) -> Result<Option<PackageManifest>, NuGetError> {
        read_manifest_file(&self.paths.manifest_path(identity)).await
    }

    /// Identities of every extracted package, sorted.
    pub async fn packages(&self) -> Result<Vec<(PackageIdentity, PackageManifest)>, NuGetError> {
        let mut packages = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.paths.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(packages),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }

            let manifest_path = entry.path().join(crate::MANIFEST_FILE_NAME);
            match read_manifest_file(&manifest_path).await {
                Ok(Some(manifest)) => match manifest.identity() {
                    Ok(identity) => packages.push((identity, manifest)),
                    Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
                },
                Ok(None) => {}
                Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        packages.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(packages)
    }

    /// Removes the package directory. Returns `false` when it was not there.
    pub async fn delete_package(&self, identity: &PackageIdentity) -> Result<bool, NuGetError> {
        let directory = self.paths.package_directory(identity);
        match tokio::fs::remove_dir_all(&directory).await {
            Ok(()) => {
                debug!("Deleted {}", directory.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Extracts `package` next to its archive and `.sha512` file.
    ///
    /// Extraction happens in a scratch directory that is renamed into place, so a
    /// concurrent extraction of the same identity only ever sees a complete directory.
    /// Returns `false` when the package was already extracted.
    pub async fn extract(&self, identity: &PackageIdentity, package: &[u8]) -> Result<bool, NuGetError> {
        let manifest = PackageArchive::read_manifest(package)?;
        let archived = manifest.identity()?;
        if &archived != identity {
            return Err(NuGetError::InvalidManifest(format!(
                "expected '{}' but the archive contains '{}'",
                identity, archived
            )));
        }

        let directory = self.paths.package_directory(identity);
        if tokio::fs::try_exists(&directory).await? {
            return Ok(false);
        }
        tokio::fs::create_dir_all(self.paths.root()).await?;

        let temp = self.paths.temp_directory();
        let archive_name = self
            .paths
            .archive_path(identity)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| NuGetError::invalid_argument(identity.to_string()))?;
        let hash_name = self
            .paths
            .hash_path(identity)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| NuGetError::invalid_argument(identity.to_string()))?;

        let data = package.to_vec();
        let scratch = temp.clone();
        tokio::task::spawn_blocking(move || -> Result<(), NuGetError> {
            PackageArchive::extract(&data, &scratch)?;
            std::fs::write(scratch.join(&archive_name), &data)?;
            std::fs::write(scratch.join(&hash_name), format!("{:x}", Sha512::digest(&data)))?;
            Ok(())
        })
        .await
        .map_err(|e| NuGetError::execution(format!("extraction task failed: {}", e)))
        .and_then(|r| r)
        .inspect_err(|_| {
            let _ = std::fs::remove_dir_all(&temp);
        })?;

        match tokio::fs::rename(&temp, &directory).await {
            Ok(()) => Ok(true),
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&temp).await;
                if tokio::fs::try_exists(&directory).await.unwrap_or(false) {
                    debug!("{} was extracted concurrently", identity);
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }
}

async fn read_manifest_file(path: &Path) -> Result<Option<PackageManifest>, NuGetError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => PackageManifest::from_toml_str(&text).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl<P: PackagePaths> NuGetProject for PackagesFolderProject<P> {
    fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    async fn installed_packages(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<PackageReference>, NuGetError> {
        if token.is_cancelled() {
            return Err(NuGetError::Cancelled);
        }
        Ok(self
            .packages()
            .await?
            .into_iter()
            .map(|(identity, _)| PackageReference::new(identity, TargetFramework::any()))
            .collect())
    }

    async fn install_package(
        &self,
        identity: &PackageIdentity,
        package: &[u8],
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        if token.is_cancelled() {
            return Err(NuGetError::Cancelled);
        }
        let extracted = self.extract(identity, package).await?;
        if extracted {
            context.log(
                MessageLevel::Debug,
                &format!("Added package '{}' to folder '{}'", identity, self.root().display()),
            );
        } else {
            context.log(
                MessageLevel::Debug,
                &format!("Package '{}' already exists in folder '{}'", identity, self.root().display()),
            );
        }
        Ok(extracted)
    }

    async fn uninstall_package(
        &self,
        identity: &PackageIdentity,
        context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        let removed = self.delete_package(identity).await?;
        if removed {
            context.log(
                MessageLevel::Debug,
                &format!("Removed package '{}' from folder '{}'", identity, self.root().display()),
            );
        }
        Ok(removed)
    }
}

/// Exposes a packages folder as a feed, so installed packages stay resolvable
/// even after their original source unlisted or dropped them.
pub struct PackagesFolderSourceRepository<P: PackagePaths + 'static = PackagePathResolver> {
    source: PackageSource,
    resource: Arc<PackagesFolderResource<P>>,
}

impl<P: PackagePaths + 'static> PackagesFolderSourceRepository<P> {
    pub fn new(folder: Arc<PackagesFolderProject<P>>) -> Self {
        let source = PackageSource::new(
            PACKAGES_FOLDER_NAME.to_string(),
            folder.root().to_string_lossy().into_owned(),
        );
        Self {
            source,
            resource: Arc::new(PackagesFolderResource { folder }),
        }
    }
}

#[async_trait]
impl<P: PackagePaths + 'static> SourceRepository for PackagesFolderSourceRepository<P> {
    fn package_source(&self) -> &PackageSource {
        &self.source
    }

    async fn metadata_resource(&self) -> Result<Option<Arc<dyn MetadataResource>>, NuGetError> {
        Ok(Some(self.resource.clone()))
    }

    async fn dependency_info_resource(
        &self,
    ) -> Result<Option<Arc<dyn DependencyInfoResource>>, NuGetError> {
        Ok(Some(self.resource.clone()))
    }

    async fn download_resource(&self) -> Result<Option<Arc<dyn DownloadResource>>, NuGetError> {
        Ok(Some(self.resource.clone()))
    }
}

pub struct PackagesFolderResource<P: PackagePaths> {
    folder: Arc<PackagesFolderProject<P>>,
}

fn dependency_info(
    identity: PackageIdentity,
    manifest: &PackageManifest,
    framework: &TargetFramework,
) -> PackageDependencyInfo {
    let info = PackageDependencyInfo::new(identity, manifest.dependencies_for(framework));
    if manifest.listed { info } else { info.unlisted() }
}

#[async_trait]
impl<P: PackagePaths> MetadataResource for PackagesFolderResource<P> {
    async fn versions(
        &self,
        id: &PackageId,
        include_prerelease: bool,
        include_unlisted: bool,
        token: &CancellationToken,
    ) -> Result<Vec<Version>, NuGetError> {
        if token.is_cancelled() {
            return Err(NuGetError::Cancelled);
        }
        Ok(self
            .folder
            .packages()
            .await?
            .into_iter()
            .filter(|(identity, manifest)| {
                &identity.id == id
                    && (include_prerelease || !identity.is_prerelease())
                    && (include_unlisted || manifest.listed)
            })
            .map(|(identity, _)| identity.version)
            .collect())
    }

    async fn exists(
        &self,
        identity: &PackageIdentity,
        _token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        Ok(self.folder.package_exists(identity).await)
    }
}

#[async_trait]
impl<P: PackagePaths> DependencyInfoResource for PackagesFolderResource<P> {
    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &TargetFramework,
        token: &CancellationToken,
    ) -> Result<Option<PackageDependencyInfo>, NuGetError> {
        if token.is_cancelled() {
            return Err(NuGetError::Cancelled);
        }
        Ok(self
            .folder
            .read_manifest(identity)
            .await?
            .map(|manifest| dependency_info(identity.clone(), &manifest, framework)))
    }

    async fn resolve_packages(
        &self,
        id: &PackageId,
        framework: &TargetFramework,
        token: &CancellationToken,
    ) -> Result<Vec<PackageDependencyInfo>, NuGetError> {
        if token.is_cancelled() {
            return Err(NuGetError::Cancelled);
        }
        Ok(self
            .folder
            .packages()
            .await?
            .into_iter()
            .filter(|(identity, _)| &identity.id == id)
            .map(|(identity, manifest)| dependency_info(identity, &manifest, framework))
            .collect())
    }
}

#[async_trait]
impl<P: PackagePaths> DownloadResource for PackagesFolderResource<P> {
    async fn download(
        &self,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<Vec<u8>, NuGetError> {
        if token.is_cancelled() {
            return Err(NuGetError::Cancelled);
        }
        self.folder
            .read_archive(identity)
            .await?
            .ok_or_else(|| NuGetError::PackageNotFound(identity.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PackageDependency, VersionRange};
    use tempfile::TempDir;

    struct Quiet;

    impl ProjectContext for Quiet {
        fn log(&self, _level: MessageLevel, _message: &str) {}
    }

    fn archive(id: &str, version: &str, deps: &[&str]) -> (PackageIdentity, Vec<u8>) {
        let identity = PackageIdentity::parse(id, version).unwrap();
        let manifest = PackageManifest::new(&identity).with_dependencies(
            None,
            deps.iter()
                .map(|d| PackageDependency::new(*d, VersionRange::parse("1.0").unwrap()))
                .collect(),
        );
        let bytes = PackageArchive::new(manifest)
            .with_file("content/readme.txt", "hi")
            .to_bytes()
            .unwrap();
        (identity, bytes)
    }

    #[tokio::test]
    async fn test_install_writes_archive_hash_and_files() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolderProject::new(temp.path());
        let token = CancellationToken::new();
        let (identity, bytes) = archive("A", "1.0", &[]);

        assert!(folder.install_package(&identity, &bytes, &Quiet, &token).await.unwrap());

        let paths = folder.paths();
        assert!(paths.archive_path(&identity).exists());
        assert!(paths.hash_path(&identity).exists());
        assert!(paths.package_directory(&identity).join("content/readme.txt").exists());
        assert_eq!(folder.read_archive(&identity).await.unwrap(), Some(bytes));
    }

    #[tokio::test]
    async fn test_already_extracted_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolderProject::new(temp.path());
        let token = CancellationToken::new();
        let (identity, bytes) = archive("A", "1.0", &[]);

        assert!(folder.install_package(&identity, &bytes, &Quiet, &token).await.unwrap());
        assert!(!folder.install_package(&identity, &bytes, &Quiet, &token).await.unwrap());

        let leftovers: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_extraction_of_same_package() {
        let temp = TempDir::new().unwrap();
        let folder = Arc::new(PackagesFolderProject::new(temp.path()));
        let (identity, bytes) = archive("A", "1.0", &[]);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let folder = folder.clone();
                let identity = identity.clone();
                let bytes = bytes.clone();
                tokio::spawn(async move { folder.extract(&identity, &bytes).await })
            })
            .collect();

        let mut extracted = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() {
                extracted += 1;
            }
        }
        assert!(extracted >= 1);
        assert!(folder.package_exists(&identity).await);
    }

    #[tokio::test]
    async fn test_mismatched_archive_is_rejected() {
        let temp = TempDir::new().unwrap();
        let folder = PackagesFolderProject::new(temp.path());
        let (_, bytes) = archive("A", "1.0", &[]);
        let other = PackageIdentity::parse("B", "1.0").unwrap();

        assert!(matches!(
            folder.extract(&other, &bytes).await,
            Err(NuGetError::InvalidManifest(_))
        ));
    }

    #[tokio::test]
    async fn test_folder_as_source() {
        let temp = TempDir::new().unwrap();
        let folder = Arc::new(PackagesFolderProject::new(temp.path()));
        let token = CancellationToken::new();
        for (id, version, deps) in [("A", "1.0", vec!["B"]), ("B", "1.0", vec![]), ("B", "2.0", vec![])] {
            let (identity, bytes) = archive(id, version, &deps);
            folder.extract(&identity, &bytes).await.unwrap();
        }

        let source = PackagesFolderSourceRepository::new(folder.clone());
        let metadata = source.metadata_resource().await.unwrap().unwrap();
        let mut versions = metadata.versions(&PackageId::new("b"), false, false, &token).await.unwrap();
        versions.sort();
        assert_eq!(versions, vec![Version::new(1, 0, 0), Version::new(2, 0, 0)]);

        let info = source.dependency_info_resource().await.unwrap().unwrap();
        let a = PackageIdentity::parse("A", "1.0").unwrap();
        let resolved = info.resolve_package(&a, &TargetFramework::any(), &token).await.unwrap().unwrap();
        assert_eq!(resolved.dependencies[0].id.as_str(), "B");

        assert!(folder.delete_package(&a).await.unwrap());
        assert!(!folder.delete_package(&a).await.unwrap());
        let download = source.download_resource().await.unwrap().unwrap();
        assert!(matches!(
            download.download(&a, &token).await,
            Err(NuGetError::PackageNotFound(_))
        ));
    }
}
