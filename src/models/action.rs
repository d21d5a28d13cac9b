use crate::{PackageIdentity, ports::SourceRepository};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Install,
    Uninstall,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Uninstall => write!(f, "uninstall"),
        }
    }
}

/// One step of a plan. Installs carry the source the package is downloaded from.
#[derive(Clone)]
pub enum NuGetProjectAction {
    Install {
        identity: PackageIdentity,
        source: Arc<dyn SourceRepository>,
    },
    Uninstall {
        identity: PackageIdentity,
    },
}

impl NuGetProjectAction {
    pub fn install(identity: PackageIdentity, source: Arc<dyn SourceRepository>) -> Self {
        Self::Install { identity, source }
    }

    pub fn uninstall(identity: PackageIdentity) -> Self {
        Self::Uninstall { identity }
    }

    pub fn identity(&self) -> &PackageIdentity {
        match self {
            Self::Install { identity, .. } | Self::Uninstall { identity } => identity,
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Install { .. } => ActionType::Install,
            Self::Uninstall { .. } => ActionType::Uninstall,
        }
    }

    pub fn source(&self) -> Option<&Arc<dyn SourceRepository>> {
        match self {
            Self::Install { source, .. } => Some(source),
            Self::Uninstall { .. } => None,
        }
    }

    pub fn is_install(&self) -> bool {
        matches!(self, Self::Install { .. })
    }

    pub fn is_uninstall(&self) -> bool {
        matches!(self, Self::Uninstall { .. })
    }
}

impl PartialEq for NuGetProjectAction {
    fn eq(&self, other: &Self) -> bool {
        self.action_type() == other.action_type() && self.identity() == other.identity()
    }
}

impl Eq for NuGetProjectAction {}

impl fmt::Debug for NuGetProjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install { identity, source } => f
                .debug_struct("Install")
                .field("identity", identity)
                .field("source", &source.package_source().name)
                .finish(),
            Self::Uninstall { identity } => f
                .debug_struct("Uninstall")
                .field("identity", identity)
                .finish(),
        }
    }
}

impl fmt::Display for NuGetProjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action_type(), self.identity())
    }
}
