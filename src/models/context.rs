use crate::NuGetError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy for picking dependency versions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DependencyBehavior {
    Ignore,
    Lowest,
    HighestPatch,
    HighestMinor,
    Highest,
}

impl Default for DependencyBehavior {
    fn default() -> Self {
        Self::Lowest
    }
}

impl fmt::Display for DependencyBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "Ignore"),
            Self::Lowest => write!(f, "Lowest"),
            Self::HighestPatch => write!(f, "HighestPatch"),
            Self::HighestMinor => write!(f, "HighestMinor"),
            Self::Highest => write!(f, "Highest"),
        }
    }
}

impl TryFrom<&str> for DependencyBehavior {
    type Error = NuGetError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "lowest" => Ok(Self::Lowest),
            "highestpatch" => Ok(Self::HighestPatch),
            "highestminor" => Ok(Self::HighestMinor),
            "highest" => Ok(Self::Highest),
            _ => Err(NuGetError::invalid_argument(format!(
                "Invalid dependency behavior: '{}'. Use 'Ignore', 'Lowest', 'HighestPatch', 'HighestMinor' or 'Highest'",
                value
            ))),
        }
    }
}

/// Restricts update flows to versions sharing parts of the installed version.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionConstraints {
    pub exact_major: bool,
    pub exact_minor: bool,
    pub exact_patch: bool,
    pub exact_release: bool,
}

impl VersionConstraints {
    pub fn none() -> Self {
        Self::default()
    }

    /// All parts pinned, used by reinstall.
    pub fn exact() -> Self {
        Self {
            exact_major: true,
            exact_minor: true,
            exact_patch: true,
            exact_release: true,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.exact_major && self.exact_minor && self.exact_patch && self.exact_release
    }

    pub fn is_empty(&self) -> bool {
        !(self.exact_major || self.exact_minor || self.exact_patch || self.exact_release)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    pub dependency_behavior: DependencyBehavior,
    pub include_prerelease: bool,
    pub include_unlisted: bool,
    #[serde(default)]
    pub version_constraints: VersionConstraints,
    /// Lets an install replace an installed version with a lower one.
    #[serde(default)]
    pub allow_downgrade: bool,
}

impl ResolutionContext {
    pub fn new(
        dependency_behavior: DependencyBehavior,
        include_prerelease: bool,
        include_unlisted: bool,
    ) -> Self {
        Self {
            dependency_behavior,
            include_prerelease,
            include_unlisted,
            version_constraints: VersionConstraints::none(),
            allow_downgrade: false,
        }
    }

    pub fn with_version_constraints(mut self, constraints: VersionConstraints) -> Self {
        self.version_constraints = constraints;
        self
    }

    pub fn with_prerelease(mut self, include_prerelease: bool) -> Self {
        self.include_prerelease = include_prerelease;
        self
    }

    pub fn with_downgrade_allowed(mut self, allow_downgrade: bool) -> Self {
        self.allow_downgrade = allow_downgrade;
        self
    }
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self::new(DependencyBehavior::Lowest, false, true)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UninstallationContext {
    pub remove_dependencies: bool,
    pub force_remove: bool,
}

impl UninstallationContext {
    pub fn new(remove_dependencies: bool, force_remove: bool) -> Self {
        Self {
            remove_dependencies,
            force_remove,
        }
    }
}
