#![allow(dead_code)]

use async_trait::async_trait;
use nuget_pm_core::{
    LockFile, NuGetError, NuGetPackageManager, PackageDependency, PackageDependencyInfo,
    PackageId, PackageIdentity, PackageManagerConfig, PackageManifest, PackageReference,
    PackageSource, PackageSpec, ProjectMetadata, RestoreResult, TargetFramework, VersionRange,
    ports::{
        BuildIntegratedProject, DependencyInfoResource, DownloadResource, MetadataResource,
        NuGetProject, ProjectContext, RestoreEngine, SolutionManager, SourceRepository,
        SourceRepositoryFactory,
    },
    repositories::PackageArchive,
    services::SourceRepositoryProvider,
};
use semver::Version;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn identity(id: &str, version: &str) -> PackageIdentity {
    PackageIdentity::parse(id, version).unwrap()
}

/// `deps` reads like `"B 1.0; C [2.0,3.0)"`.
pub fn dependencies(deps: &str) -> Vec<PackageDependency> {
    deps.split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| match d.split_once(' ') {
            Some((id, range)) => PackageDependency::new(id, VersionRange::parse(range).unwrap()),
            None => PackageDependency::new(d, VersionRange::all()),
        })
        .collect()
}

#[derive(Default)]
pub struct Feed {
    packages: Mutex<BTreeMap<PackageIdentity, (PackageManifest, Vec<u8>)>>,
    fail_downloads: AtomicBool,
    fail_requests: AtomicBool,
}

impl Feed {
    fn check(&self) -> Result<(), NuGetError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(NuGetError::source_error("test", "feed is unavailable"));
        }
        Ok(())
    }

    fn manifests(&self, id: &PackageId) -> Vec<PackageManifest> {
        self.packages
            .lock()
            .unwrap()
            .iter()
            .filter(|(identity, _)| &identity.id == id)
            .map(|(_, (manifest, _))| manifest.clone())
            .collect()
    }
}

fn dependency_info(manifest: &PackageManifest, framework: &TargetFramework) -> PackageDependencyInfo {
    let info = PackageDependencyInfo::new(manifest.identity().unwrap(), manifest.dependencies_for(framework));
    if manifest.listed { info } else { info.unlisted() }
}

#[async_trait]
impl MetadataResource for Feed {
    async fn versions(
        &self,
        id: &PackageId,
        include_prerelease: bool,
        include_unlisted: bool,
        _token: &CancellationToken,
    ) -> Result<Vec<Version>, NuGetError> {
        self.check()?;
        Ok(self
            .manifests(id)
            .into_iter()
            .filter(|m| include_unlisted || m.listed)
            .map(|m| m.identity().unwrap())
            .filter(|p| include_prerelease || !p.is_prerelease())
            .map(|p| p.version)
            .collect())
    }
}

#[async_trait]
impl DependencyInfoResource for Feed {
    async fn resolve_package(
        &self,
        identity: &PackageIdentity,
        framework: &TargetFramework,
        _token: &CancellationToken,
    ) -> Result<Option<PackageDependencyInfo>, NuGetError> {
        self.check()?;
        Ok(self
            .packages
            .lock()
            .unwrap()
            .get(identity)
            .map(|(manifest, _)| dependency_info(manifest, framework)))
    }

    async fn resolve_packages(
        &self,
        id: &PackageId,
        framework: &TargetFramework,
        _token: &CancellationToken,
    ) -> Result<Vec<PackageDependencyInfo>, NuGetError> {
        self.check()?;
        Ok(self
            .manifests(id)
            .iter()
            .map(|m| dependency_info(m, framework))
            .collect())
    }
}

#[async_trait]
impl DownloadResource for Feed {
    async fn download(
        &self,
        identity: &PackageIdentity,
        _token: &CancellationToken,
    ) -> Result<Vec<u8>, NuGetError> {
        self.check()?;
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(NuGetError::source_error("test", "connection reset"));
        }
        self.packages
            .lock()
            .unwrap()
            .get(identity)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| NuGetError::PackageNotFound(identity.to_string()))
    }
}

/// An in-memory package feed.
pub struct TestSource {
    source: PackageSource,
    feed: Arc<Feed>,
}

impl TestSource {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            source: PackageSource::new(name.to_string(), format!("https://{}.example/v3/index.json", name)),
            feed: Arc::new(Feed::default()),
        })
    }

    pub fn add(&self, id: &str, version: &str, deps: &str) -> &Self {
        let identity = identity(id, version);
        let manifest = PackageManifest::new(&identity).with_dependencies(None, dependencies(deps));
        self.add_manifest(manifest)
    }

    pub fn add_unlisted(&self, id: &str, version: &str) -> &Self {
        let mut manifest = PackageManifest::new(&identity(id, version));
        manifest.listed = false;
        self.add_manifest(manifest)
    }

    pub fn add_manifest(&self, manifest: PackageManifest) -> &Self {
        let bytes = PackageArchive::new(manifest.clone())
            .with_file("content/readme.txt", format!("{} {}", manifest.id, manifest.version))
            .to_bytes()
            .unwrap();
        self.feed
            .packages
            .lock()
            .unwrap()
            .insert(manifest.identity().unwrap(), (manifest, bytes));
        self
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.feed.fail_downloads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_requests(&self, fail: bool) {
        self.feed.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn repository(self: &Arc<Self>) -> Arc<dyn SourceRepository> {
        self.clone()
    }
}

#[async_trait]
impl SourceRepository for TestSource {
    fn package_source(&self) -> &PackageSource {
        &self.source
    }

    async fn metadata_resource(&self) -> Result<Option<Arc<dyn MetadataResource>>, NuGetError> {
        Ok(Some(self.feed.clone()))
    }

    async fn dependency_info_resource(
        &self,
    ) -> Result<Option<Arc<dyn DependencyInfoResource>>, NuGetError> {
        Ok(Some(self.feed.clone()))
    }

    async fn download_resource(&self) -> Result<Option<Arc<dyn DownloadResource>>, NuGetError> {
        Ok(Some(self.feed.clone()))
    }
}

pub struct TestFactory {
    sources: Vec<Arc<TestSource>>,
}

impl SourceRepositoryFactory for TestFactory {
    fn create(&self, source: &PackageSource) -> Arc<dyn SourceRepository> {
        let found = self
            .sources
            .iter()
            .find(|s| s.package_source() == source)
            .cloned()
            .unwrap_or_else(|| TestSource::new(&source.name));
        found
    }
}

/// A project that keeps its references in memory and fails on request.
pub struct TestProject {
    metadata: ProjectMetadata,
    installed: Mutex<BTreeMap<PackageIdentity, PackageReference>>,
    fail_on: Mutex<Option<PackageIdentity>>,
}

impl TestProject {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            metadata: ProjectMetadata::new(name, TargetFramework::new("net8.0")),
            installed: Mutex::new(BTreeMap::new()),
            fail_on: Mutex::new(None),
        })
    }

    pub fn fail_on(&self, identity: Option<PackageIdentity>) {
        *self.fail_on.lock().unwrap() = identity;
    }

    pub fn installed(&self) -> Vec<PackageIdentity> {
        self.installed.lock().unwrap().keys().cloned().collect()
    }

    fn check(&self, identity: &PackageIdentity) -> Result<(), NuGetError> {
        if self.fail_on.lock().unwrap().as_ref() == Some(identity) {
            return Err(NuGetError::execution(format!("injected failure for {}", identity)));
        }
        Ok(())
    }
}

#[async_trait]
impl NuGetProject for TestProject {
    fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    async fn installed_packages(
        &self,
        _token: &CancellationToken,
    ) -> Result<Vec<PackageReference>, NuGetError> {
        Ok(self.installed.lock().unwrap().values().cloned().collect())
    }

    async fn install_package(
        &self,
        identity: &PackageIdentity,
        package: &[u8],
        _context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        self.check(identity)?;
        PackageArchive::read_manifest(package)?;
        let mut installed = self.installed.lock().unwrap();
        if installed.contains_key(identity) {
            return Ok(false);
        }
        installed.insert(
            identity.clone(),
            PackageReference::new(identity.clone(), self.metadata.target_framework.clone()),
        );
        Ok(true)
    }

    async fn uninstall_package(
        &self,
        identity: &PackageIdentity,
        _context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        self.check(identity)?;
        Ok(self.installed.lock().unwrap().remove(identity).is_some())
    }
}

/// A lock-file project: installed packages are whatever the lock file lists.
pub struct TestBuildIntegratedProject {
    metadata: ProjectMetadata,
    spec: Mutex<PackageSpec>,
    lock_file: Mutex<Option<LockFile>>,
    pub installed_hooks: Mutex<Vec<PackageIdentity>>,
    pub uninstalled_hooks: Mutex<Vec<PackageIdentity>>,
    fail_hooks: AtomicBool,
}

impl TestBuildIntegratedProject {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            metadata: ProjectMetadata::new(name, TargetFramework::new("net8.0")),
            spec: Mutex::new(PackageSpec::new(name)),
            lock_file: Mutex::new(None),
            installed_hooks: Mutex::new(Vec::new()),
            uninstalled_hooks: Mutex::new(Vec::new()),
            fail_hooks: AtomicBool::new(false),
        })
    }

    pub fn fail_hooks(&self, fail: bool) {
        self.fail_hooks.store(fail, Ordering::SeqCst);
    }

    pub fn spec(&self) -> PackageSpec {
        self.spec.lock().unwrap().clone()
    }

    pub fn lock_file(&self) -> Option<LockFile> {
        self.lock_file.lock().unwrap().clone()
    }

    fn check_hooks(&self) -> Result<(), NuGetError> {
        if self.fail_hooks.load(Ordering::SeqCst) {
            return Err(NuGetError::execution("content hook failed"));
        }
        Ok(())
    }
}

#[async_trait]
impl NuGetProject for TestBuildIntegratedProject {
    fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    async fn installed_packages(
        &self,
        _token: &CancellationToken,
    ) -> Result<Vec<PackageReference>, NuGetError> {
        Ok(self
            .lock_file()
            .map(|lock| lock.libraries)
            .unwrap_or_default()
            .into_iter()
            .map(|identity| PackageReference::new(identity, self.metadata.target_framework.clone()))
            .collect())
    }

    async fn install_package(
        &self,
        _identity: &PackageIdentity,
        _package: &[u8],
        _context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        Err(NuGetError::execution("lock-file projects install through restore"))
    }

    async fn uninstall_package(
        &self,
        _identity: &PackageIdentity,
        _context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        Err(NuGetError::execution("lock-file projects uninstall through restore"))
    }

    fn is_integrated(&self) -> bool {
        true
    }

    fn as_build_integrated(&self) -> Option<&dyn BuildIntegratedProject> {
        Some(self)
    }
}

#[async_trait]
impl BuildIntegratedProject for TestBuildIntegratedProject {
    async fn read_spec(&self) -> Result<PackageSpec, NuGetError> {
        Ok(self.spec())
    }

    async fn write_spec(&self, spec: &PackageSpec) -> Result<(), NuGetError> {
        *self.spec.lock().unwrap() = spec.clone();
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockFile>, NuGetError> {
        Ok(self.lock_file())
    }

    async fn write_lock_file(&self, lock_file: &LockFile) -> Result<(), NuGetError> {
        *self.lock_file.lock().unwrap() = Some(lock_file.clone());
        Ok(())
    }

    async fn on_package_installed(
        &self,
        identity: &PackageIdentity,
        _context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        self.check_hooks()?;
        self.installed_hooks.lock().unwrap().push(identity.clone());
        Ok(())
    }

    async fn on_package_uninstalled(
        &self,
        identity: &PackageIdentity,
        _context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        self.check_hooks()?;
        self.uninstalled_hooks.lock().unwrap().push(identity.clone());
        Ok(())
    }
}

/// Picks the lowest listed identity satisfying each direct dependency.
pub struct TestRestoreEngine {
    available: Vec<PackageIdentity>,
    fail: AtomicBool,
}

impl TestRestoreEngine {
    pub fn new(available: Vec<PackageIdentity>) -> Arc<Self> {
        Arc::new(Self {
            available,
            fail: AtomicBool::new(false),
        })
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RestoreEngine for TestRestoreEngine {
    async fn restore(
        &self,
        _project: &dyn BuildIntegratedProject,
        spec: &PackageSpec,
        _sources: &[Arc<dyn SourceRepository>],
        _context: &dyn ProjectContext,
        _token: &CancellationToken,
    ) -> Result<RestoreResult, NuGetError> {
        if self.fail.load(Ordering::SeqCst) {
            return Ok(RestoreResult::failed("NU1101: Unable to find package"));
        }

        let mut libraries = Vec::new();
        for (id, range) in &spec.dependencies {
            let chosen = self
                .available
                .iter()
                .filter(|p| &p.id == id && range.satisfies(&p.version))
                .min();
            match chosen {
                Some(identity) => libraries.push(identity.clone()),
                None => return Ok(RestoreResult::failed(format!("Unable to find package {}", id))),
            }
        }
        Ok(RestoreResult::succeeded(LockFile::new(libraries)))
    }
}

/// A solution made of a fixed set of projects.
pub struct TestSolution {
    projects: Vec<Arc<dyn NuGetProject>>,
}

impl TestSolution {
    pub fn new(projects: Vec<Arc<dyn NuGetProject>>) -> Arc<Self> {
        Arc::new(Self { projects })
    }
}

#[async_trait]
impl SolutionManager for TestSolution {
    async fn projects(&self) -> Result<Vec<Arc<dyn NuGetProject>>, NuGetError> {
        Ok(self.projects.clone())
    }
}

pub fn manager(
    temp: &TempDir,
    sources: &[Arc<TestSource>],
    restore_engine: Option<Arc<dyn RestoreEngine>>,
) -> NuGetPackageManager {
    manager_in_solution(temp, sources, None, restore_engine)
}

pub fn manager_in_solution(
    temp: &TempDir,
    sources: &[Arc<TestSource>],
    solution: Option<Arc<dyn SolutionManager>>,
    restore_engine: Option<Arc<dyn RestoreEngine>>,
) -> NuGetPackageManager {
    init_tracing();
    let mut config = PackageManagerConfig::new(temp.path().join("packages"));
    for source in sources {
        config = config.with_source(source.package_source().clone());
    }
    let provider = SourceRepositoryProvider::new(
        Arc::new(TestFactory {
            sources: sources.to_vec(),
        }),
        &config.sources,
    );
    NuGetPackageManager::new(config, provider, solution, restore_engine).unwrap()
}
