mod archive;
mod channel;
mod config;
mod error;
mod progress;
mod version;

pub use archive::ArchiveType;
pub use channel::{Platform, ReleaseChannel};
pub use config::{
    PortfoxConfig, DEFAULT_CONFIG_FILE_NAME, DEFAULT_DEVEDITION_BASE_URL,
    DEFAULT_RELEASES_BASE_URL, DEFAULT_VERSIONS_URL, ENV_LOCALE, ENV_PLATFORM,
    ENV_RESOLVE_TIMEOUT_SECS, ENV_VERSIONS_URL,
};
pub use error::{BoxError, LifecycleError};
pub use progress::{
    no_progress, scoped, stage_progress, stage_span, CancelToken, Flow, ProgressEvent,
    ProgressFn, Stage,
};
pub use version::{
    compare_versions, is_update_available, validate_version, DottedVersion, VersionInfo,
};

#[cfg(test)]
mod tests;
