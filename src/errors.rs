use thiserror::Error;

#[derive(Error, Debug)]
pub enum NuGetError {
    #[error("Unable to gather dependency information: {0}")]
    GatherFailure(String),

    #[error("Unable to resolve dependencies: {0}")]
    ResolutionFailure(String),

    #[error("Package '{package}' already exists in project '{project}'")]
    AlreadyInstalled { package: String, project: String },

    #[error("A newer version of '{0}' is already referenced")]
    NewerVersionAlreadyReferenced(String),

    #[error("Unable to find package '{0}'")]
    UnknownPackage(String),

    #[error("Package '{0}' is not found")]
    PackageNotFound(String),

    #[error("Package '{package}' to be uninstalled could not be found in project '{project}'")]
    PackageToUninstallNotFound { package: String, project: String },

    #[error("{0}")]
    UninstallFailure(String),

    #[error(
        "The '{package}' package requires client version '{required}' or above, but the current version is '{current}'"
    )]
    MinClientVersion {
        package: String,
        required: semver::Version,
        current: semver::Version,
    },

    #[error("Failed to download package '{package}' from '{source_name}': {message}")]
    DownloadFailed {
        package: String,
        source_name: String,
        message: String,
    },

    #[error("Package action failed: {0}")]
    ExecutionFailure(String),

    #[error("Restore failed for project '{0}'. The project was returned to its original state")]
    RestoreFailed(String),

    #[error("Invalid version `{0}`")]
    InvalidVersion(String),

    #[error("Invalid version range `{0}`")]
    InvalidVersionRange(String),

    #[error("Invalid package manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source '{source_name}' failed: {message}")]
    SourceError {
        source_name: String,
        message: String,
    },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to write TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl NuGetError {
    pub fn gather<S: Into<String>>(msg: S) -> Self {
        Self::GatherFailure(msg.into())
    }

    pub fn resolution<S: Into<String>>(msg: S) -> Self {
        Self::ResolutionFailure(msg.into())
    }

    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionFailure(msg.into())
    }

    pub fn source_error<S: Into<String>, M: Into<String>>(source_name: S, message: M) -> Self {
        Self::SourceError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
