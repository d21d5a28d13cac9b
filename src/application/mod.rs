pub mod executor;
pub mod package_manager;
pub mod planner;

pub use executor::{ActionExecutor, BuildIntegratedExecutor};
pub use package_manager::{NuGetPackageManager, SourceSelection};
