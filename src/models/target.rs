use serde::{Deserialize, Serialize};
use std::fmt;

/// Short target framework moniker such as `net45` or `netstandard2.0`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TargetFramework(String);

impl TargetFramework {
    pub const ANY: &'static str = "any";

    pub fn new<S: Into<String>>(moniker: S) -> Self {
        Self(moniker.into().to_ascii_lowercase())
    }

    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY || self.0.is_empty()
    }

    /// Exact moniker match, or either side is framework-agnostic.
    pub fn matches(&self, other: &TargetFramework) -> bool {
        self.is_any() || other.is_any() || self.0 == other.0
    }
}

impl Default for TargetFramework {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for TargetFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetFramework {
    fn from(moniker: &str) -> Self {
        Self::new(moniker)
    }
}
