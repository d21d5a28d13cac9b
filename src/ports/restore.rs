use crate::{
    LockFile, NuGetError, PackageSpec,
    ports::{BuildIntegratedProject, ProjectContext, SourceRepository},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct RestoreResult {
    pub success: bool,
    pub lock_file: LockFile,
    pub messages: Vec<String>,
}

impl RestoreResult {
    pub fn succeeded(lock_file: LockFile) -> Self {
        Self {
            success: true,
            lock_file,
            messages: Vec::new(),
        }
    }

    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            lock_file: LockFile::default(),
            messages: vec![message.into()],
        }
    }
}

/// Resolves a build-integrated spec into a lock file. Does not persist anything.
#[async_trait]
pub trait RestoreEngine: Send + Sync {
    async fn restore(
        &self,
        project: &dyn BuildIntegratedProject,
        spec: &PackageSpec,
        sources: &[Arc<dyn SourceRepository>],
        context: &dyn ProjectContext,
        token: &CancellationToken,
    ) -> Result<RestoreResult, NuGetError>;
}
