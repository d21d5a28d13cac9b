use crate::{
    ExecutionState, LockFile, MessageLevel, NuGetError, NuGetProjectAction, PackageIdentity,
    PackageSpec, TransactionLog, VersionRange,
    paths::PackagePaths,
    ports::{
        BuildIntegratedProject, NuGetProject, ProjectContext, ProjectMetadata, RestoreEngine,
        SolutionManager, SourceRepository,
    },
    repositories::{PackageArchive, PackagesFolderProject, check_min_client_version},
    services::PackageDownloader,
};
use chrono::Utc;
use semver::Version;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Applies a batch of actions to a project, all or nothing.
///
/// Applied actions go to a [`TransactionLog`]. When an action fails the log is
/// replayed backwards, then queued package directories are deleted.
pub struct ActionExecutor {
    packages_folder: Arc<PackagesFolderProject>,
    downloader: PackageDownloader,
    client_version: Version,
    solution_manager: Option<Arc<dyn SolutionManager>>,
    states: Mutex<HashMap<String, ExecutionState>>,
}

fn state_key(project: &ProjectMetadata) -> String {
    project.unique_name_or_name().to_ascii_lowercase()
}

impl ActionExecutor {
    pub fn new(
        packages_folder: Arc<PackagesFolderProject>,
        downloader: PackageDownloader,
        client_version: Version,
        solution_manager: Option<Arc<dyn SolutionManager>>,
    ) -> Self {
        Self {
            packages_folder,
            downloader,
            client_version,
            solution_manager,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// State of the last batch executed against `project`.
    pub fn state(&self, project: &ProjectMetadata) -> ExecutionState {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(&state_key(project)).copied())
            .unwrap_or(ExecutionState::NotStarted)
    }

    fn set_state(&self, project: &dyn NuGetProject, state: ExecutionState) {
        debug!(project = project.name(), %state, "execution state changed");
        if let Ok(mut states) = self.states.lock() {
            states.insert(state_key(project.metadata()), state);
        }
    }

    pub async fn execute(
        &self,
        project: &dyn NuGetProject,
        actions: &[NuGetProjectAction],
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let mut log = TransactionLog::new();
        self.set_state(project, ExecutionState::NotStarted);
        info!(
            transaction = %log.id(),
            "Executing {} action(s) against '{}'",
            actions.len(),
            project.name()
        );

        let result = self.apply_all(project, actions, &mut log, context, token).await;

        if let Err(e) = &result {
            context.log(
                MessageLevel::Error,
                &format!("Package action failed, rolling back '{}': {}", project.name(), e),
            );
            self.set_state(project, ExecutionState::RollingBack);
            let clean = self.rollback(project, &mut log, context).await;
            self.set_state(
                project,
                if clean {
                    ExecutionState::RolledBack
                } else {
                    ExecutionState::PartiallyRolledBack
                },
            );
        }

        if result.is_ok() {
            info!(
                transaction = %log.id(),
                applied = log.applied().len(),
                elapsed_ms = (Utc::now() - log.started_at()).num_milliseconds(),
                "Finished actions against '{}'",
                project.name()
            );
        }

        self.delete_queued(&mut log, context).await;
        if let Some(execution) = context.execution_context() {
            execution.set_direct_install(None);
        }
        result
    }

    async fn apply_all(
        &self,
        project: &dyn NuGetProject,
        actions: &[NuGetProjectAction],
        log: &mut TransactionLog,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        check_cancelled(token)?;
        project.pre_process(context, token).await?;

        for (index, action) in actions.iter().enumerate() {
            check_cancelled(token)?;
            self.set_state(project, ExecutionState::Executing(index));
            match action {
                NuGetProjectAction::Uninstall { identity } => {
                    self.uninstall(project, identity, action, log, context, token).await?;
                }
                NuGetProjectAction::Install { identity, source } => {
                    self.install(project, identity, source, action, log, context, token).await?;
                }
            }
        }

        project.post_process(context, token).await?;
        self.set_state(project, ExecutionState::Completed);
        self.open_readme(actions, context).await;
        Ok(())
    }

    async fn uninstall(
        &self,
        project: &dyn NuGetProject,
        identity: &PackageIdentity,
        action: &NuGetProjectAction,
        log: &mut TransactionLog,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        if project.uninstall_package(identity, context, token).await? {
            log.record(action.clone());
        }

        if !project.is_integrated()
            && !self.referenced_elsewhere(project, identity, token).await?
        {
            log.queue_deletion(identity.clone());
        }

        context.log(
            MessageLevel::Info,
            &format!("Successfully uninstalled '{}' from {}", identity, project.name()),
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn install(
        &self,
        project: &dyn NuGetProject,
        identity: &PackageIdentity,
        source: &Arc<dyn SourceRepository>,
        action: &NuGetProjectAction,
        log: &mut TransactionLog,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let package = self.downloader.download(source, identity, token).await?;
        let manifest = PackageArchive::read_manifest(&package)?;
        check_min_client_version(&manifest, &self.client_version)?;

        check_cancelled(token)?;
        if self.packages_folder.extract(identity, &package).await? {
            log.mark_extracted(identity.clone());
        }
        log.cancel_deletion(identity);

        let installed = match project.install_package(identity, &package, context, token).await {
            Ok(installed) => installed,
            Err(e) => {
                // never recorded, so rollback will not see it
                if log.was_extracted(identity)
                    && !self
                        .referenced_elsewhere(project, identity, token)
                        .await
                        .unwrap_or(true)
                {
                    log.queue_deletion(identity.clone());
                }
                return Err(e);
            }
        };
        if installed {
            log.record(action.clone());
        }

        context.log(
            MessageLevel::Info,
            &format!("Successfully installed '{}' to {}", identity, project.name()),
        );
        Ok(())
    }

    /// Undoes the log, newest first. Returns `false` if anything could not be undone.
    ///
    /// Runs with a fresh token so a cancelled batch still gets unwound.
    async fn rollback(
        &self,
        project: &dyn NuGetProject,
        log: &mut TransactionLog,
        context: &dyn ProjectContext,
    ) -> bool {
        if log.is_empty() {
            debug!(transaction = %log.id(), "nothing was applied to {}", project.name());
        }
        let token = CancellationToken::new();
        let mut clean = true;

        while let Some(applied) = log.pop() {
            let identity = applied.action.identity().clone();
            let outcome = match &applied.action {
                NuGetProjectAction::Install { .. } => {
                    let removed = project.uninstall_package(&identity, context, &token).await;
                    if removed.is_ok()
                        && log.was_extracted(&identity)
                        && !self
                            .referenced_elsewhere(project, &identity, &token)
                            .await
                            .unwrap_or(true)
                    {
                        log.queue_deletion(identity.clone());
                    }
                    removed.map(|_| ())
                }
                NuGetProjectAction::Uninstall { .. } => {
                    self.reinstall_from_packages_folder(project, &identity, log, context, &token)
                        .await
                }
            };

            if let Err(e) = outcome {
                clean = false;
                warn!("Rollback of '{}' for {} failed: {}", applied.action, project.name(), e);
                context.log(
                    MessageLevel::Warning,
                    &format!("Unable to roll back '{}': {}", applied.action, e),
                );
            }
        }
        clean
    }

    async fn reinstall_from_packages_folder(
        &self,
        project: &dyn NuGetProject,
        identity: &PackageIdentity,
        log: &mut TransactionLog,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        let package = self
            .packages_folder
            .read_archive(identity)
            .await?
            .ok_or_else(|| NuGetError::PackageNotFound(identity.to_string()))?;
        log.cancel_deletion(identity);
        project.install_package(identity, &package, context, token).await?;
        Ok(())
    }

    async fn delete_queued(&self, log: &mut TransactionLog, context: &dyn ProjectContext) {
        for identity in log.take_deletions() {
            match self.packages_folder.delete_package(&identity).await {
                Ok(_) => context.log(
                    MessageLevel::Debug,
                    &format!("Removed package '{}' from the packages folder", identity),
                ),
                Err(e) => warn!("Unable to delete the directory of {}: {}", identity, e),
            }
        }
    }

    async fn referenced_elsewhere(
        &self,
        project: &dyn NuGetProject,
        identity: &PackageIdentity,
        token: &CancellationToken,
    ) -> Result<bool, NuGetError> {
        match &self.solution_manager {
            Some(solution) => package_exists_in_another_project(solution.as_ref(), project, identity, token).await,
            None => Ok(false),
        }
    }

    async fn open_readme(&self, actions: &[NuGetProjectAction], context: &dyn ProjectContext) {
        let Some(execution) = context.execution_context() else {
            return;
        };
        let Some(direct) = execution.direct_install() else {
            return;
        };
        if !actions.iter().any(|a| a.is_install() && a.identity() == &direct) {
            return;
        }

        let readme = match self.packages_folder.read_manifest(&direct).await {
            Ok(Some(manifest)) => manifest.readme,
            _ => None,
        };
        if let Some(readme) = readme {
            let path = self.packages_folder.paths().package_directory(&direct).join(readme);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                if let Err(e) = execution.open_file(&path).await {
                    warn!("Unable to open {}: {}", path.display(), e);
                }
            }
        }
    }
}

pub(crate) async fn package_exists_in_another_project(
    solution: &dyn SolutionManager,
    project: &dyn NuGetProject,
    identity: &PackageIdentity,
    token: &CancellationToken,
) -> Result<bool, NuGetError> {
    let name = project.metadata().unique_name_or_name().to_ascii_lowercase();
    for other in solution.projects().await? {
        if other.metadata().unique_name_or_name().to_ascii_lowercase() == name {
            continue;
        }
        let installed = other.installed_packages(token).await?;
        if installed.iter().any(|r| &r.identity == identity) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn check_cancelled(token: &CancellationToken) -> Result<(), NuGetError> {
    if token.is_cancelled() {
        Err(NuGetError::Cancelled)
    } else {
        Ok(())
    }
}

/// Applies actions to a build-integrated project by editing its spec and
/// running a full restore.
pub struct BuildIntegratedExecutor {
    restore_engine: Arc<dyn RestoreEngine>,
}

impl BuildIntegratedExecutor {
    pub fn new(restore_engine: Arc<dyn RestoreEngine>) -> Self {
        Self { restore_engine }
    }

    /// Edits an in-memory copy of the spec and restores it. Nothing is written
    /// unless the restore succeeds; if writing or the content hooks fail after
    /// that, the previous spec and lock file are put back.
    pub async fn execute(
        &self,
        project: &dyn BuildIntegratedProject,
        actions: &[NuGetProjectAction],
        sources: &[Arc<dyn SourceRepository>],
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        check_cancelled(token)?;
        let before: BTreeSet<PackageIdentity> = project
            .installed_packages(token)
            .await?
            .into_iter()
            .map(|r| r.identity)
            .collect();

        let original_spec = project.read_spec().await?;
        let original_lock = project.read_lock_file().await?;
        let spec = edit_spec(&original_spec, actions);

        context.log(
            MessageLevel::Info,
            &format!("Restoring packages for '{}'", project.name()),
        );
        let restored = self
            .restore_engine
            .restore(project, &spec, sources, context, token)
            .await;

        let lock_file = match restored {
            Ok(result) if result.success => result.lock_file,
            Ok(result) => {
                for message in &result.messages {
                    context.log(MessageLevel::Error, message);
                }
                return Err(NuGetError::RestoreFailed(project.name().to_string()));
            }
            Err(NuGetError::Cancelled) => return Err(NuGetError::Cancelled),
            Err(e) => {
                context.log(MessageLevel::Error, &e.to_string());
                return Err(NuGetError::RestoreFailed(project.name().to_string()));
            }
        };

        let applied = self
            .commit(project, &spec, &lock_file, &before, context, token)
            .await;

        if let Err(e) = &applied {
            warn!("Restoring the previous spec of '{}' after: {}", project.name(), e);
            if let Err(revert) = project.write_spec(&original_spec).await {
                warn!("Unable to restore the spec of '{}': {}", project.name(), revert);
            }
            let previous = original_lock.unwrap_or_default();
            if let Err(revert) = project.write_lock_file(&previous).await {
                warn!("Unable to restore the lock file of '{}': {}", project.name(), revert);
            }
        }

        if let Some(execution) = context.execution_context() {
            execution.set_direct_install(None);
        }
        applied
    }

    async fn commit(
        &self,
        project: &dyn BuildIntegratedProject,
        spec: &PackageSpec,
        lock_file: &LockFile,
        before: &BTreeSet<PackageIdentity>,
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<(), NuGetError> {
        project.write_spec(spec).await?;
        project.write_lock_file(lock_file).await?;

        let after: BTreeSet<PackageIdentity> = project
            .installed_packages(token)
            .await?
            .into_iter()
            .map(|r| r.identity)
            .collect();

        for removed in before.difference(&after) {
            project.on_package_uninstalled(removed, context, token).await?;
            context.log(
                MessageLevel::Info,
                &format!("Successfully uninstalled '{}' from {}", removed, project.name()),
            );
        }
        for added in after.difference(before) {
            project.on_package_installed(added, context, token).await?;
            context.log(
                MessageLevel::Info,
                &format!("Successfully installed '{}' to {}", added, project.name()),
            );
        }
        Ok(())
    }
}

fn edit_spec(original: &PackageSpec, actions: &[NuGetProjectAction]) -> PackageSpec {
    let mut spec = original.clone();
    for action in actions {
        let identity = action.identity();
        match action {
            NuGetProjectAction::Uninstall { .. } => {
                spec.remove_dependency(&identity.id);
            }
            NuGetProjectAction::Install { .. } => {
                spec.add_dependency(
                    identity.id.clone(),
                    VersionRange::at_least(identity.version.clone()),
                );
            }
        }
    }
    spec
}
