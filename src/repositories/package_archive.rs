use crate::{MANIFEST_FILE_NAME, NuGetError, PackageIdentity, PackageManifest};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use semver::Version;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tar::{Archive, Builder, Header};

/// A package container: a gzip tarball with `package.toml` at its root.
#[derive(Debug, Clone)]
pub struct PackageArchive {
    manifest: PackageManifest,
    files: BTreeMap<String, Vec<u8>>,
}

impl PackageArchive {
    pub fn new(manifest: PackageManifest) -> Self {
        Self {
            manifest,
            files: BTreeMap::new(),
        }
    }

    pub fn with_file<P: Into<String>, C: Into<Vec<u8>>>(mut self, path: P, content: C) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    pub fn identity(&self) -> Result<PackageIdentity, NuGetError> {
        self.manifest.identity()
    }

    pub fn read(data: &[u8]) -> Result<Self, NuGetError> {
        let mut archive = Archive::new(GzDecoder::new(data));
        let mut manifest = None;
        let mut files = BTreeMap::new();

        for entry in archive.entries().map_err(corrupt)? {
            let mut entry = entry.map_err(corrupt)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().map_err(corrupt)?.to_string_lossy().replace('\\', "/");
            let mut content = Vec::new();
            entry.read_to_end(&mut content).map_err(corrupt)?;

            if path == MANIFEST_FILE_NAME {
                let text = String::from_utf8(content)
                    .map_err(|e| NuGetError::InvalidManifest(e.to_string()))?;
                manifest = Some(PackageManifest::from_toml_str(&text)?);
            } else {
                files.insert(path, content);
            }
        }

        let manifest = manifest.ok_or_else(|| {
            NuGetError::InvalidManifest(format!("archive has no {}", MANIFEST_FILE_NAME))
        })?;
        Ok(Self { manifest, files })
    }

    /// Reads only the manifest.
    pub fn read_manifest(data: &[u8]) -> Result<PackageManifest, NuGetError> {
        Self::read(data).map(|archive| archive.manifest)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, NuGetError> {
        let manifest = self.manifest.to_toml_string()?;

        let mut archive_data = Vec::new();
        {
            let enc = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(enc);

            append(&mut tar, MANIFEST_FILE_NAME, manifest.as_bytes())?;
            for (path, content) in &self.files {
                append(&mut tar, path, content)?;
            }

            tar.into_inner()?.finish()?;
        }

        Ok(archive_data)
    }

    /// Unpacks `data` into `destination`, which is created if missing.
    pub fn extract(data: &[u8], destination: &Path) -> Result<(), NuGetError> {
        std::fs::create_dir_all(destination)?;
        let mut archive = Archive::new(GzDecoder::new(data));
        archive
            .unpack(destination)
            .map_err(|e| NuGetError::InvalidManifest(format!("Failed to extract package: {}", e)))
    }
}

fn append<W: std::io::Write>(tar: &mut Builder<W>, path: &str, content: &[u8]) -> Result<(), NuGetError> {
    let mut header = Header::new_gnu();
    header.set_path(path).map_err(corrupt)?;
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append(&header, content)?;
    Ok(())
}

fn corrupt(e: std::io::Error) -> NuGetError {
    NuGetError::InvalidManifest(format!("corrupt package archive: {}", e))
}

/// Rejects packages that need a newer client than `client_version`.
pub fn check_min_client_version(
    manifest: &PackageManifest,
    client_version: &Version,
) -> Result<(), NuGetError> {
    if let Some(required) = manifest.min_client_version()? {
        if &required > client_version {
            return Err(NuGetError::MinClientVersion {
                package: manifest.identity()?.to_string(),
                required,
                current: client_version.clone(),
            });
        }
    }
    Ok(())
}
