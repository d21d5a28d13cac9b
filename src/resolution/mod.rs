pub mod gather;
pub mod prune;
pub mod resolver;
pub mod uninstall;
pub mod utility;

pub use gather::{GatherContext, gather};
pub use resolver::{PackageResolverContext, resolve};
pub use uninstall::UninstallResolver;
pub use utility::DependencyNode;
