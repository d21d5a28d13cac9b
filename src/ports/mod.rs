// src/ports/mod.rs

pub use build_integrated::BuildIntegratedProject;
pub use project::{NuGetProject, ProjectMetadata};
pub use project_context::{ExecutionContext, ProjectContext};
pub use restore::{RestoreEngine, RestoreResult};
pub use solution_manager::SolutionManager;
pub use source_repository::{
    DependencyInfoResource, DownloadResource, MetadataResource, SourceRepository,
    SourceRepositoryFactory,
};

pub mod build_integrated;
pub mod project;
pub mod project_context;
pub mod restore;
pub mod solution_manager;
pub mod source_repository;
