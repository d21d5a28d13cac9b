use crate::PackageIdentity;
use std::path::{Path, PathBuf};

pub const PACKAGE_EXTENSION: &str = "nupkg";
pub const HASH_EXTENSION: &str = "sha512";

/// Layout of a packages folder: `<root>/<id>.<version>/<id>.<version>.nupkg`.
pub trait PackagePaths: Send + Sync {
    fn root(&self) -> &Path;

    fn package_directory_name(&self, identity: &PackageIdentity) -> String {
        format!("{}.{}", identity.id, identity.version)
    }

    fn package_directory(&self, identity: &PackageIdentity) -> PathBuf {
        self.root().join(self.package_directory_name(identity))
    }

    fn archive_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.package_directory(identity).join(format!(
            "{}.{}",
            self.package_directory_name(identity),
            PACKAGE_EXTENSION
        ))
    }

    fn hash_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.package_directory(identity).join(format!(
            "{}.{}.{}",
            self.package_directory_name(identity),
            PACKAGE_EXTENSION,
            HASH_EXTENSION
        ))
    }

    fn manifest_path(&self, identity: &PackageIdentity) -> PathBuf {
        self.package_directory(identity).join(crate::MANIFEST_FILE_NAME)
    }

    /// Scratch directory used while a package is being extracted.
    fn temp_directory(&self) -> PathBuf {
        self.root().join(format!(".tmp-{}", uuid::Uuid::new_v4()))
    }
}

#[derive(Debug, Clone)]
pub struct PackagePathResolver {
    root: PathBuf,
}

impl PackagePathResolver {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

impl PackagePaths for PackagePathResolver {
    fn root(&self) -> &Path {
        &self.root
    }
}
