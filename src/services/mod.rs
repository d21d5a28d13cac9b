pub mod context;
pub mod package_downloader;
pub mod source_provider;

pub use context::{DirectInstallContext, TracingProjectContext};
pub use package_downloader::PackageDownloader;
pub use source_provider::SourceRepositoryProvider;
