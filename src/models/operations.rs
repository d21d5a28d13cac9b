use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Answer of the host when a package file would overwrite an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileConflictAction {
    Overwrite,
    #[default]
    Ignore,
    OverwriteAll,
    IgnoreAll,
}

/// Progress of one batch of project actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    NotStarted,
    Executing(usize),
    Completed,
    RollingBack,
    RolledBack,
    PartiallyRolledBack,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::RolledBack | Self::PartiallyRolledBack
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Executing(index) => write!(f, "executing action {}", index + 1),
            Self::Completed => write!(f, "completed"),
            Self::RollingBack => write!(f, "rolling back"),
            Self::RolledBack => write!(f, "rolled back"),
            Self::PartiallyRolledBack => write!(f, "partially rolled back"),
        }
    }
}
