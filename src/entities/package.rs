use crate::{NuGetError, TargetFramework, VersionRange};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Package id. Compared, hashed and ordered case-insensitively; displayed as given.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn key(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b.to_ascii_lowercase())
    }

    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for PackageId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for PackageId {}

impl Hash for PackageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.key() {
            state.write_u8(b);
        }
        state.write_u8(0xff);
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(other.key())
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PackageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Parses a version, padding `1` and `1.0` to three components.
pub fn parse_version(input: &str) -> Result<Version, NuGetError> {
    let trimmed = input.trim();
    let (core, suffix) = match trimmed.find(['-', '+']) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };

    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => trimmed.to_string(),
    };

    Version::parse(&padded).map_err(|_| NuGetError::InvalidVersion(input.to_string()))
}

/// A concrete package: id plus version.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    pub id: PackageId,
    pub version: Version,
}

impl PackageIdentity {
    pub fn new<I: Into<PackageId>>(id: I, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    pub fn parse<I: Into<PackageId>>(id: I, version: &str) -> Result<Self, NuGetError> {
        Ok(Self::new(id, parse_version(version)?))
    }

    pub fn is_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }

    /// Same id, any version.
    pub fn same_id(&self, other: &PackageIdentity) -> bool {
        self.id == other.id
    }
}

impl Ord for PackageIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for PackageIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// A package recorded as installed in a project.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PackageReference {
    pub identity: PackageIdentity,
    pub target_framework: TargetFramework,
    #[serde(default)]
    pub allowed_versions: Option<VersionRange>,
    #[serde(default)]
    pub user_installed: bool,
    #[serde(default)]
    pub development_dependency: bool,
}

impl PackageReference {
    pub fn new(identity: PackageIdentity, target_framework: TargetFramework) -> Self {
        Self {
            identity,
            target_framework,
            allowed_versions: None,
            user_installed: true,
            development_dependency: false,
        }
    }

    pub fn with_allowed_versions(mut self, range: VersionRange) -> Self {
        self.allowed_versions = Some(range);
        self
    }

    pub fn id(&self) -> &PackageId {
        &self.identity.id
    }

    pub fn has_allowed_versions(&self) -> bool {
        self.allowed_versions.is_some()
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identity, self.target_framework)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_package_id_ignores_case() {
        let mut set = HashSet::new();
        set.insert(PackageId::new("Newtonsoft.Json"));

        assert!(set.contains(&PackageId::new("newtonsoft.json")));
        assert_eq!(PackageId::new("ABC").to_string(), "ABC");
    }

    #[test]
    fn test_parse_version_pads_components() {
        assert_eq!(parse_version("1").unwrap(), Version::new(1, 0, 0));
        assert_eq!(parse_version("2.1").unwrap(), Version::new(2, 1, 0));
        assert_eq!(parse_version("1.0-beta").unwrap().pre.as_str(), "beta");
        assert!(parse_version("one").is_err());
    }

    #[test]
    fn test_identity_ordering_is_id_then_version() {
        let mut identities = vec![
            PackageIdentity::parse("b", "1.0").unwrap(),
            PackageIdentity::parse("A", "2.0").unwrap(),
            PackageIdentity::parse("a", "1.0").unwrap(),
        ];
        identities.sort();

        assert_eq!(identities[0], PackageIdentity::parse("a", "1.0").unwrap());
        assert_eq!(identities[1].version, Version::new(2, 0, 0));
        assert_eq!(identities[2].id.as_str(), "b");
    }
}
