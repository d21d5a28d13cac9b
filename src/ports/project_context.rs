use crate::{FileConflictAction, MessageLevel, NuGetError, PackageIdentity};
use async_trait::async_trait;
use std::path::Path;

/// Host callbacks for one operation: user-visible log and conflict prompts.
pub trait ProjectContext: Send + Sync {
    fn log(&self, level: MessageLevel, message: &str);

    fn resolve_file_conflict(&self, _message: &str) -> FileConflictAction {
        FileConflictAction::Ignore
    }

    fn execution_context(&self) -> Option<&dyn ExecutionContext> {
        None
    }
}

/// Tracks the package the user asked for directly, for host affordances.
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    fn direct_install(&self) -> Option<PackageIdentity>;

    fn set_direct_install(&self, identity: Option<PackageIdentity>);

    async fn open_file(&self, path: &Path) -> Result<(), NuGetError>;
}
