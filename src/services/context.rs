use crate::{
    FileConflictAction, MessageLevel, NuGetError, PackageIdentity,
    ports::{ExecutionContext, ProjectContext},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Forwards project messages to `tracing` and tracks the direct install.
#[derive(Debug, Default)]
pub struct TracingProjectContext {
    conflict_action: FileConflictAction,
    execution: DirectInstallContext,
}

impl TracingProjectContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conflict_action(mut self, action: FileConflictAction) -> Self {
        self.conflict_action = action;
        self
    }

    pub fn execution(&self) -> &DirectInstallContext {
        &self.execution
    }
}

impl ProjectContext for TracingProjectContext {
    fn log(&self, level: MessageLevel, message: &str) {
        match level {
            MessageLevel::Debug => debug!("{}", message),
            MessageLevel::Info => info!("{}", message),
            MessageLevel::Warning => warn!("{}", message),
            MessageLevel::Error => error!("{}", message),
        }
    }

    fn resolve_file_conflict(&self, message: &str) -> FileConflictAction {
        debug!("File conflict: {}", message);
        self.conflict_action
    }

    fn execution_context(&self) -> Option<&dyn ExecutionContext> {
        Some(&self.execution)
    }
}

/// Remembers the directly installed package and the files opened for it.
#[derive(Debug, Default)]
pub struct DirectInstallContext {
    direct_install: Mutex<Option<PackageIdentity>>,
    opened: Mutex<Vec<PathBuf>>,
}

impl DirectInstallContext {
    pub fn opened_files(&self) -> Vec<PathBuf> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ExecutionContext for DirectInstallContext {
    fn direct_install(&self) -> Option<PackageIdentity> {
        self.direct_install.lock().ok().and_then(|d| d.clone())
    }

    fn set_direct_install(&self, identity: Option<PackageIdentity>) {
        if let Ok(mut direct) = self.direct_install.lock() {
            *direct = identity;
        }
    }

    async fn open_file(&self, path: &Path) -> Result<(), NuGetError> {
        info!("Opening {}", path.display());
        self.opened
            .lock()
            .map_err(|_| NuGetError::execution("execution context lock poisoned"))?
            .push(path.to_path_buf());
        Ok(())
    }
}
