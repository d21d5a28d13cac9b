use crate::{NuGetError, PackageSource, parse_version};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_DEGREE_OF_PARALLELISM: usize = 16;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PackageManagerConfig {
    pub packages_folder_path: PathBuf,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_degree_of_parallelism")]
    pub max_degree_of_parallelism: usize,
    #[serde(default)]
    pub sources: Vec<PackageSource>,
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_degree_of_parallelism() -> usize {
    DEFAULT_MAX_DEGREE_OF_PARALLELISM
}

impl PackageManagerConfig {
    pub fn new<P: Into<PathBuf>>(packages_folder_path: P) -> Self {
        Self {
            packages_folder_path: packages_folder_path.into(),
            client_version: default_client_version(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_degree_of_parallelism: DEFAULT_MAX_DEGREE_OF_PARALLELISM,
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: PackageSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_client_version<S: Into<String>>(mut self, version: S) -> Self {
        self.client_version = version.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn from_toml_str(input: &str) -> Result<Self, NuGetError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, NuGetError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), NuGetError> {
        if self.packages_folder_path.as_os_str().is_empty() {
            return Err(NuGetError::ConfigError(
                "packages_folder_path must not be empty".to_string(),
            ));
        }
        self.client_version()?;
        Ok(())
    }

    pub fn client_version(&self) -> Result<Version, NuGetError> {
        parse_version(&self.client_version).map_err(|_| {
            NuGetError::ConfigError(format!("Invalid client version '{}'", self.client_version))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn max_degree_of_parallelism(&self) -> usize {
        self.max_degree_of_parallelism.max(1)
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &PackageSource> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

impl Default for PackageManagerConfig {
    fn default() -> Self {
        Self::new("packages")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_applies_defaults() {
        let config = PackageManagerConfig::from_toml_str(
            r#"
            packages_folder_path = "/tmp/packages"

            [[sources]]
            name = "nuget.org"
            source = "https://api.nuget.org/v3/index.json"

            [[sources]]
            name = "offline"
            source = "/srv/feed"
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.request_timeout(), Duration::from_secs(300));
        assert_eq!(config.max_degree_of_parallelism(), 16);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.enabled_sources().count(), 1);
    }

    #[test]
    fn test_invalid_client_version_is_rejected() {
        let result = PackageManagerConfig::from_toml_str(
            r#"
            packages_folder_path = "/tmp/packages"
            client_version = "latest"
            "#,
        );
        assert!(matches!(result, Err(NuGetError::ConfigError(_))));
    }

    #[test]
    fn test_parallelism_never_drops_below_one() {
        let mut config = PackageManagerConfig::default();
        config.max_degree_of_parallelism = 0;
        assert_eq!(config.max_degree_of_parallelism(), 1);
    }
}
