pub mod package_archive;
pub mod packages_folder;

pub use package_archive::{PackageArchive, check_min_client_version};
pub use packages_folder::{PackagesFolderProject, PackagesFolderSourceRepository};
