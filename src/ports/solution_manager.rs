use crate::{NuGetError, ports::NuGetProject};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

#[async_trait]
pub trait SolutionManager: Send + Sync {
    async fn projects(&self) -> Result<Vec<Arc<dyn NuGetProject>>, NuGetError>;

    fn solution_directory(&self) -> Option<PathBuf> {
        None
    }
}
