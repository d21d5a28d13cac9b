use crate::{
    DependencyBehavior, MessageLevel, NuGetError, NuGetProjectAction, PackageDependencyInfo, PackageId,
    PackageIdentity, PackageManagerConfig, PackageReference, ResolutionContext,
    SourceDependencyInfo, UninstallationContext, normalize_dependency_infos,
    application::{
        executor::{ActionExecutor, BuildIntegratedExecutor, package_exists_in_another_project},
        planner,
    },
    ports::{
        BuildIntegratedProject, NuGetProject, ProjectContext, ProjectMetadata, RestoreEngine,
        SolutionManager, SourceRepository,
    },
    repositories::{
        PackageArchive, PackagesFolderProject, PackagesFolderSourceRepository,
        check_min_client_version,
    },
    resolution::{
        GatherContext, PackageResolverContext, gather, prune, resolve, utility::topological_sort,
    },
    services::{PackageDownloader, SourceRepositoryProvider},
};
use semver::Version;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Entry point for previewing and applying package operations on projects.
///
/// Previews never touch a project. Mutating operations hold a per-project
/// lock for their whole duration, so two operations against the same project
/// never interleave.
pub struct NuGetPackageManager {
    config: PackageManagerConfig,
    client_version: Version,
    sources: RwLock<SourceRepositoryProvider>,
    solution_manager: Option<Arc<dyn SolutionManager>>,
    restore_engine: Option<Arc<dyn RestoreEngine>>,
    packages_folder: Arc<PackagesFolderProject>,
    packages_folder_source: Arc<dyn SourceRepository>,
    downloader: PackageDownloader,
    executor: ActionExecutor,
    project_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Source lists for one preview.
#[derive(Clone, Default)]
pub struct SourceSelection {
    /// Where the targets must come from.
    pub primary: Vec<Arc<dyn SourceRepository>>,
    /// Extra sources that may only supply dependencies.
    pub secondary: Vec<Arc<dyn SourceRepository>>,
}

impl SourceSelection {
    pub fn new(primary: Vec<Arc<dyn SourceRepository>>) -> Self {
        Self {
            primary,
            secondary: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, secondary: Vec<Arc<dyn SourceRepository>>) -> Self {
        self.secondary = secondary;
        self
    }

    /// Primary then secondary, without duplicate locations.
    pub fn all(&self) -> Vec<Arc<dyn SourceRepository>> {
        let mut all: Vec<Arc<dyn SourceRepository>> = Vec::new();
        for source in self.primary.iter().chain(&self.secondary) {
            if !all.iter().any(|s| s.package_source() == source.package_source()) {
                all.push(source.clone());
            }
        }
        all
    }
}

impl NuGetPackageManager {
    pub fn new(
        config: PackageManagerConfig,
        sources: SourceRepositoryProvider,
        solution_manager: Option<Arc<dyn SolutionManager>>,
        restore_engine: Option<Arc<dyn RestoreEngine>>,
    ) -> Result<Self, NuGetError> {
        config.validate()?;
        let client_version = config.client_version()?;
        let packages_folder = Arc::new(PackagesFolderProject::new(config.packages_folder_path.clone()));
        let packages_folder_source: Arc<dyn SourceRepository> =
            Arc::new(PackagesFolderSourceRepository::new(packages_folder.clone()));
        let downloader = PackageDownloader::new(config.request_timeout());
        let executor = ActionExecutor::new(
            packages_folder.clone(),
            downloader.clone(),
            client_version.clone(),
            solution_manager.clone(),
        );

        info!(
            "Package manager ready, packages folder '{}'",
            config.packages_folder_path.display()
        );

        Ok(Self {
            config,
            client_version,
            sources: RwLock::new(sources),
            solution_manager,
            restore_engine,
            packages_folder,
            packages_folder_source,
            downloader,
            executor,
            project_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &PackageManagerConfig {
        &self.config
    }

    pub fn packages_folder(&self) -> &Arc<PackagesFolderProject> {
        &self.packages_folder
    }

    pub fn packages_folder_source(&self) -> &Arc<dyn SourceRepository> {
        &self.packages_folder_source
    }

    /// The current source snapshot. In-flight operations keep the one they started with.
    pub fn sources(&self) -> SourceRepositoryProvider {
        match self.sources.read() {
            Ok(sources) => sources.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the source snapshot for operations started from now on.
    pub fn reload_sources(&self, sources: &[crate::PackageSource]) {
        let reloaded = self.sources().reload(sources);
        match self.sources.write() {
            Ok(mut current) => *current = reloaded,
            Err(poisoned) => *poisoned.into_inner() = reloaded,
        }
    }

    /// State of the last batch executed against `project`.
    pub fn execution_state(&self, project: &ProjectMetadata) -> crate::ExecutionState {
        self.executor.state(project)
    }

    fn project_lock(&self, project: &ProjectMetadata) -> Arc<tokio::sync::Mutex<()>> {
        let key = project.unique_name_or_name().to_ascii_lowercase();
        let mut locks = match self.project_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(key).or_default().clone()
    }

    fn default_sources(&self) -> SourceSelection {
        SourceSelection::new(self.sources().enabled())
    }

    pub async fn install_package_by_id(
        &self,
        project: &dyn NuGetProject,
        id: &PackageId,
        resolution_context: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: Option<&SourceSelection>,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let lock = self.project_lock(project.metadata());
        let _guard = lock.lock().await;

        let sources = sources.cloned().unwrap_or_else(|| self.default_sources());
        let identity = self
            .resolve_latest_target(project, id, resolution_context, &sources, token)
            .await?;
        self.install_locked(project, &identity, resolution_context, context, &sources, token)
            .await
    }

    pub async fn install_package(
        &self,
        project: &dyn NuGetProject,
        identity: &PackageIdentity,
        resolution_context: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: Option<&SourceSelection>,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let lock = self.project_lock(project.metadata());
        let _guard = lock.lock().await;

        let sources = sources.cloned().unwrap_or_else(|| self.default_sources());
        self.install_locked(project, identity, resolution_context, context, &sources, token)
            .await
    }

    async fn install_locked(
        &self,
        project: &dyn NuGetProject,
        identity: &PackageIdentity,
        resolution_context: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: &SourceSelection,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let actions = self
            .preview_install_package(project, identity, resolution_context, context, Some(sources), token)
            .await?;
        self.set_direct_install(identity, context);
        self.execute_locked(project, &actions, context, token).await
    }

    pub async fn uninstall_package(
        &self,
        project: &dyn NuGetProject,
        id: &PackageId,
        uninstallation_context: &UninstallationContext,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let lock = self.project_lock(project.metadata());
        let _guard = lock.lock().await;

        let actions = self
            .preview_uninstall_package_by_id(project, id, uninstallation_context, context, token)
            .await?;
        self.execute_locked(project, &actions, context, token).await
    }

    /// Plans installing the latest version of `id` from the primary sources.
    pub async fn preview_install_package_by_id(
        &self,
        project: &dyn NuGetProject,
        id: &PackageId,
        resolution_context: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: Option<&SourceSelection>,
        token: &CancellationToken,
    ) -> Result<Vec<NuGetProjectAction>, NuGetError> {
        let sources = sources.cloned().unwrap_or_else(|| self.default_sources());
        let identity = self
            .resolve_latest_target(project, id, resolution_context, &sources, token)
            .await?;
        self.preview_install_package(project, &identity, resolution_context, context, Some(&sources), token)
            .await
    }

    async fn resolve_latest_target(
        &self,
        project: &dyn NuGetProject,
        id: &PackageId,
        resolution_context: &ResolutionContext,
        sources: &SourceSelection,
        token: &CancellationToken,
    ) -> Result<PackageIdentity, NuGetError> {
        let latest = self
            .downloader
            .latest_version(&sources.primary, id, resolution_context, token)
            .await?
            .ok_or_else(|| NuGetError::UnknownPackage(id.to_string()))?;

        let installed = project.installed_packages(token).await?;
        if let Some(current) = installed.iter().find(|r| r.id() == id) {
            if current.identity.version > latest && !resolution_context.allow_downgrade {
                return Err(NuGetError::NewerVersionAlreadyReferenced(current.identity.to_string()));
            }
        }
        Ok(PackageIdentity::new(id.clone(), latest))
    }

    /// Plans installing `identity` together with whatever its dependencies need.
    pub async fn preview_install_package(
        &self,
        project: &dyn NuGetProject,
        identity: &PackageIdentity,
        resolution_context: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: Option<&SourceSelection>,
        token: &CancellationToken,
    ) -> Result<Vec<NuGetProjectAction>, NuGetError> {
        let sources = sources.cloned().unwrap_or_else(|| self.default_sources());
        if sources.primary.is_empty() {
            return Err(NuGetError::invalid_argument("at least one primary source is required"));
        }

        let installed = project.installed_packages(token).await?;
        if installed.iter().any(|r| &r.identity == identity) {
            return Err(NuGetError::AlreadyInstalled {
                package: identity.to_string(),
                project: project.name().to_string(),
            });
        }
        let installed_ids: Vec<PackageIdentity> = installed.iter().map(|r| r.identity.clone()).collect();
        if let Some(current) = installed.iter().find(|r| r.id() == &identity.id) {
            if current.identity.version > identity.version && !resolution_context.allow_downgrade {
                return Err(NuGetError::NewerVersionAlreadyReferenced(current.identity.to_string()));
            }
        }

        context.log(
            MessageLevel::Info,
            &format!("Attempting to gather dependency information for package '{}' with respect to project '{}'", identity, project.name()),
        );

        if project.as_build_integrated().is_some() {
            let source = self
                .find_source_with_package(identity, &sources.primary, token)
                .await?
                .unwrap_or_else(|| sources.primary[0].clone());
            return Ok(vec![NuGetProjectAction::install(identity.clone(), source)]);
        }

        if resolution_context.dependency_behavior == DependencyBehavior::Ignore {
            let source = self
                .find_source_with_package(identity, &sources.primary, token)
                .await?
                .ok_or_else(|| NuGetError::PackageNotFound(identity.to_string()))?;
            return planner::plan_single_install(
                identity,
                &installed_ids,
                source,
                resolution_context.allow_downgrade,
            );
        }

        let gather_context = self
            .gather_context(project, resolution_context, &sources)
            .with_primary_targets(vec![identity.clone()])
            .with_installed_packages(installed_ids.clone())
            .with_allow_downgrades(resolution_context.allow_downgrade);
        let available = gather(&gather_context, token).await?;

        let mut available = prune::remove_all_versions_for_id_except(available, identity);
        if !resolution_context.include_prerelease {
            let mut pinned = installed_ids.clone();
            pinned.push(identity.clone());
            available = prune::prune_prerelease_for_stable_targets(available, &pinned);
        }
        prune::ensure_versions_allowed(std::slice::from_ref(&identity.id), &installed, &available)?;
        let available = prune::prune_disallowed_versions(available, &installed);

        context.log(
            MessageLevel::Info,
            &format!("Attempting to resolve dependencies for package '{}' with DependencyBehavior '{}'", identity, resolution_context.dependency_behavior),
        );
        let resolved = self.resolve_with(
            resolution_context,
            [identity.id.clone()],
            &installed,
            &[],
            available.clone(),
            &sources,
            token,
        )?;

        let actions = planner::plan_install(
            &installed_ids,
            &resolved,
            std::slice::from_ref(&identity.id),
            &available,
            resolution_context.allow_downgrade,
        )?;
        log_actions(context, &actions);
        Ok(actions)
    }

    /// Plans updating `ids`, or every installed package when `ids` is empty.
    pub async fn preview_update_packages(
        &self,
        project: &dyn NuGetProject,
        ids: &[PackageId],
        resolution_context: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: Option<&SourceSelection>,
        token: &CancellationToken,
    ) -> Result<Vec<NuGetProjectAction>, NuGetError> {
        let sources = sources.cloned().unwrap_or_else(|| self.default_sources());
        let installed = project.installed_packages(token).await?;
        let installed_ids: Vec<PackageIdentity> = installed.iter().map(|r| r.identity.clone()).collect();
        let is_update_all = ids.is_empty();

        let targets: Vec<PackageId> = if is_update_all {
            installed.iter().map(|r| r.id().clone()).collect()
        } else {
            ids.iter()
                .filter(|id| {
                    let found = installed.iter().any(|r| r.id() == *id);
                    if !found {
                        context.log(
                            MessageLevel::Warning,
                            &format!("'{}' is not installed in project '{}'", id, project.name()),
                        );
                    }
                    found
                })
                .cloned()
                .collect()
        };
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let gather_context = self
            .gather_context(project, resolution_context, &sources)
            .with_primary_target_ids(targets.clone())
            .with_installed_packages(installed_ids.clone())
            .with_update_all(is_update_all);
        let mut available = gather(&gather_context, token).await?;
        if is_update_all {
            // every installed id is a target, so gather never reads their installed copies
            available.extend(self.packages_folder_dependency_infos(project, &installed_ids, token).await?);
            available = normalize_dependency_infos(available);
        }

        let mut available = if resolution_context.include_prerelease {
            available
        } else {
            let pinned: Vec<PackageIdentity> = installed_ids.iter().filter(|p| p.is_prerelease()).cloned().collect();
            prune::prune_prerelease_for_stable_targets(available, &pinned)
        };
        available = prune::prune_disallowed_versions(available, &installed);
        available = prune::prune_by_update_constraints(
            available,
            &installed,
            resolution_context.version_constraints,
        );
        if !resolution_context.allow_downgrade {
            available = prune::prune_downgrades(available, &installed);
        }
        if !is_update_all {
            for id in &targets {
                available = prune::prune_all_but_highest(available, id);
            }
        }

        let resolved = self.resolve_with(
            resolution_context,
            targets.iter().cloned(),
            &installed,
            &[],
            available.clone(),
            &sources,
            token,
        )?;

        let actions = planner::plan_install(
            &installed_ids,
            &resolved,
            &targets,
            &available,
            resolution_context.allow_downgrade,
        )?;
        log_actions(context, &actions);
        Ok(actions)
    }

    /// Plans uninstalling and installing back `identities`, or everything when empty.
    pub async fn preview_reinstall_packages(
        &self,
        project: &dyn NuGetProject,
        identities: &[PackageIdentity],
        resolution_context: &ResolutionContext,
        context: &dyn ProjectContext,
        sources: Option<&SourceSelection>,
        token: &CancellationToken,
    ) -> Result<Vec<NuGetProjectAction>, NuGetError> {
        let sources = sources.cloned().unwrap_or_else(|| self.default_sources());
        let installed = project.installed_packages(token).await?;
        let installed_ids: Vec<PackageIdentity> = installed.iter().map(|r| r.identity.clone()).collect();

        let reinstall: Vec<PackageIdentity> = if identities.is_empty() {
            installed_ids.clone()
        } else {
            for identity in identities {
                if !installed_ids.contains(identity) {
                    return Err(NuGetError::PackageToUninstallNotFound {
                        package: identity.to_string(),
                        project: project.name().to_string(),
                    });
                }
            }
            identities.to_vec()
        };
        if reinstall.is_empty() {
            return Ok(Vec::new());
        }

        // the packages folder first, so reinstalling works offline
        let mut primary = vec![self.packages_folder_source.clone()];
        primary.extend(sources.primary.iter().cloned());
        let sources = SourceSelection {
            primary,
            secondary: sources.secondary.clone(),
        };

        let gather_context = self
            .gather_context(project, resolution_context, &sources)
            .with_primary_targets(reinstall.clone())
            .with_installed_packages(installed_ids.clone());
        let mut available = gather(&gather_context, token).await?;
        for identity in &installed_ids {
            available = prune::remove_all_versions_for_id_except(available, identity);
        }

        let resolved = self.resolve_with(
            resolution_context,
            reinstall.iter().map(|p| p.id.clone()),
            &installed,
            &installed_ids,
            available.clone(),
            &sources,
            token,
        )?;

        let infos = self.installed_dependency_infos(project, &installed_ids, token).await?;
        let actions = planner::plan_reinstall(&infos, &reinstall, &installed_ids, &resolved, &available)?;
        log_actions(context, &actions);
        Ok(actions)
    }

    pub async fn preview_uninstall_package_by_id(
        &self,
        project: &dyn NuGetProject,
        id: &PackageId,
        uninstallation_context: &UninstallationContext,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<Vec<NuGetProjectAction>, NuGetError> {
        let installed = project.installed_packages(token).await?;
        let identity = installed
            .iter()
            .find(|r| r.id() == id)
            .map(|r| r.identity.clone())
            .ok_or_else(|| NuGetError::PackageToUninstallNotFound {
                package: id.to_string(),
                project: project.name().to_string(),
            })?;
        self.preview_uninstall_package(project, &identity, uninstallation_context, context, token)
            .await
    }

    pub async fn preview_uninstall_package(
        &self,
        project: &dyn NuGetProject,
        identity: &PackageIdentity,
        uninstallation_context: &UninstallationContext,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<Vec<NuGetProjectAction>, NuGetError> {
        let installed = project.installed_packages(token).await?;
        if !installed.iter().any(|r| &r.identity == identity) {
            return Err(NuGetError::PackageToUninstallNotFound {
                package: identity.to_string(),
                project: project.name().to_string(),
            });
        }

        if project.as_build_integrated().is_some() {
            return Ok(vec![NuGetProjectAction::uninstall(identity.clone())]);
        }

        context.log(
            MessageLevel::Info,
            &format!("Resolving actions to uninstall package '{}'", identity),
        );
        let installed_ids: Vec<PackageIdentity> = installed.into_iter().map(|r| r.identity).collect();
        let infos = self.installed_dependency_infos(project, &installed_ids, token).await?;
        let actions = planner::plan_uninstall(identity, &infos, &installed_ids, uninstallation_context)?;
        log_actions(context, &actions);
        Ok(actions)
    }

    pub async fn execute_project_actions(
        &self,
        project: &dyn NuGetProject,
        actions: &[NuGetProjectAction],
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let lock = self.project_lock(project.metadata());
        let _guard = lock.lock().await;
        self.execute_locked(project, actions, context, token).await
    }

    async fn execute_locked(
        &self,
        project: &dyn NuGetProject,
        actions: &[NuGetProjectAction],
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        if let Some(integrated) = project.as_build_integrated() {
            return self
                .execute_build_integrated_unlocked(integrated, actions, context, token)
                .await;
        }
        self.executor.execute(project, actions, context, token).await
    }

    pub async fn execute_build_integrated_actions(
        &self,
        project: &dyn BuildIntegratedProject,
        actions: &[NuGetProjectAction],
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let lock = self.project_lock(project.metadata());
        let _guard = lock.lock().await;
        self.execute_build_integrated_unlocked(project, actions, context, token)
            .await
    }

    async fn execute_build_integrated_unlocked(
        &self,
        project: &dyn BuildIntegratedProject,
        actions: &[NuGetProjectAction],
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let engine = self
            .restore_engine
            .clone()
            .ok_or_else(|| NuGetError::ConfigError("no restore engine is configured".to_string()))?;
        let sources = self.sources().enabled();
        BuildIntegratedExecutor::new(engine)
            .execute(project, actions, &sources, context, token)
            .await
    }

    /// Installed packages, dependencies before their dependants.
    pub async fn installed_packages_in_dependency_order(
        &self,
        project: &dyn NuGetProject,
        token: &CancellationToken,
    ) -> Result<Vec<PackageIdentity>, NuGetError> {
        let installed: Vec<PackageIdentity> = project
            .installed_packages(token)
            .await?
            .into_iter()
            .map(|r| r.identity)
            .collect();
        let infos = self.installed_dependency_infos(project, &installed, token).await?;
        Ok(topological_sort(&infos)
            .into_iter()
            .map(|info| info.identity.clone())
            .collect())
    }

    /// Puts `identity` into the packages folder without touching any project.
    ///
    /// Returns `false` when it is already there or no source could deliver it.
    pub async fn restore_package(
        &self,
        identity: &PackageIdentity,
        context: &dyn ProjectContext,
        sources: &[Arc<dyn SourceRepository>],
        token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        if self.packages_folder.package_exists(identity).await {
            return Ok(false);
        }

        let Some(source) = self.find_source_with_package(identity, sources, token).await? else {
            context.log(
                MessageLevel::Warning,
                &format!("Unable to find package '{}' in any source", identity),
            );
            return Ok(false);
        };

        let package = match self.downloader.download(&source, identity, token).await {
            Ok(package) => package,
            Err(NuGetError::Cancelled) => return Err(NuGetError::Cancelled),
            Err(e) => {
                warn!("Restore of {} failed: {}", identity, e);
                context.log(MessageLevel::Warning, &e.to_string());
                return Ok(false);
            }
        };

        let manifest = PackageArchive::read_manifest(&package)?;
        check_min_client_version(&manifest, &self.client_version)?;
        let extracted = self.packages_folder.extract(identity, &package).await?;
        if extracted {
            context.log(
                MessageLevel::Info,
                &format!("Restored package '{}'", identity),
            );
        }
        Ok(extracted)
    }

    pub async fn latest_version(
        &self,
        id: &PackageId,
        resolution_context: &ResolutionContext,
        sources: &[Arc<dyn SourceRepository>],
        token: &CancellationToken,
    ) -> Result<Option<Version>, NuGetError> {
        self.downloader
            .latest_version(sources, id, resolution_context, token)
            .await
    }

    pub async fn find_source_with_package(
        &self,
        identity: &PackageIdentity,
        sources: &[Arc<dyn SourceRepository>],
        token: &CancellationToken,
    ) -> Result<Option<Arc<dyn SourceRepository>>, NuGetError> {
        self.downloader
            .find_source_with_package(sources, identity, token)
            .await
    }

    pub async fn package_exists_in_packages_folder(&self, identity: &PackageIdentity) -> bool {
        self.packages_folder.package_exists(identity).await
    }

    /// Whether a project other than `project` references `identity`.
    /// Without a solution manager no other project is known.
    pub async fn package_exists_in_another_project(
        &self,
        project: &dyn NuGetProject,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        match &self.solution_manager {
            Some(solution) => {
                package_exists_in_another_project(solution.as_ref(), project, identity, token).await
            }
            None => Ok(false),
        }
    }

    pub fn set_direct_install(&self, identity: &PackageIdentity, context: &dyn ProjectContext) {
        if let Some(execution) = context.execution_context() {
            execution.set_direct_install(Some(identity.clone()));
        }
    }

    pub fn clear_direct_install(&self, context: &dyn ProjectContext) {
        if let Some(execution) = context.execution_context() {
            execution.set_direct_install(None);
        }
    }

    fn gather_context(
        &self,
        project: &dyn NuGetProject,
        resolution_context: &ResolutionContext,
        sources: &SourceSelection,
    ) -> GatherContext {
        GatherContext::new(
            project.target_framework().clone(),
            sources.primary.clone(),
            sources.all(),
            resolution_context.clone(),
        )
        .with_packages_folder_source(self.packages_folder_source.clone())
        .with_max_degree_of_parallelism(self.config.max_degree_of_parallelism())
        .with_request_timeout(self.config.request_timeout())
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_with<T: IntoIterator<Item = PackageId>>(
        &self,
        resolution_context: &ResolutionContext,
        targets: T,
        installed: &[PackageReference],
        preferred: &[PackageIdentity],
        available: Vec<SourceDependencyInfo>,
        sources: &SourceSelection,
        token: &CancellationToken,
    ) -> Result<Vec<PackageIdentity>, NuGetError> {
        let targets: Vec<PackageId> = targets.into_iter().collect();
        let required = targets
            .iter()
            .cloned()
            .chain(installed.iter().map(|r| r.id().clone()));

        let preferred = if preferred.is_empty() {
            installed
                .iter()
                .filter(|r| !targets.contains(r.id()))
                .map(|r| r.identity.clone())
                .collect()
        } else {
            preferred.to_vec()
        };

        let resolver_context = PackageResolverContext::new(
            resolution_context.dependency_behavior,
            targets.iter().cloned(),
            required,
            available,
        )
        .with_installed(installed.to_vec())
        .with_preferred_versions(preferred)
        .with_sources(sources.all().iter().map(|s| s.package_source().clone()).collect());

        let resolved = resolve(&resolver_context, token)?;
        debug!("Resolved {} package(s)", resolved.len());
        Ok(resolved)
    }

    /// Dependency information of installed packages, read from the packages folder.
    /// Packages missing there are treated as having no dependencies.
    /// Dependency information for the installed packages that are in the
    /// packages folder. Packages missing from it are skipped.
    async fn packages_folder_dependency_infos(
        &self,
        project: &dyn NuGetProject,
        installed: &[PackageIdentity],
        token: &CancellationToken,
    ) -> Result<Vec<SourceDependencyInfo>, NuGetError> {
        let Some(resource) = self.packages_folder_source.dependency_info_resource().await? else {
            return Ok(Vec::new());
        };
        let mut infos = Vec::with_capacity(installed.len());
        for identity in installed {
            if let Some(info) = resource
                .resolve_package(identity, project.target_framework(), token)
                .await?
            {
                infos.push(info.with_source(self.packages_folder_source.clone()));
            }
        }
        Ok(infos)
    }

    async fn installed_dependency_infos(
        &self,
        project: &dyn NuGetProject,
        installed: &[PackageIdentity],
        token: &CancellationToken,
    ) -> Result<Vec<PackageDependencyInfo>, NuGetError> {
        let resource = self.packages_folder_source.dependency_info_resource().await?;
        let mut infos = Vec::with_capacity(installed.len());
        for identity in installed {
            let info = match &resource {
                Some(resource) => {
                    resource
                        .resolve_package(identity, project.target_framework(), token)
                        .await?
                }
                None => None,
            };
            infos.push(info.unwrap_or_else(|| PackageDependencyInfo::new(identity.clone(), Vec::new())));
        }
        Ok(infos)
    }
}

fn log_actions(context: &dyn ProjectContext, actions: &[NuGetProjectAction]) {
    if actions.is_empty() {
        context.log(MessageLevel::Info, "No package actions are required");
    }
    for action in actions {
        context.log(MessageLevel::Info, &format!("Resolved action: {}", action));
    }
}
