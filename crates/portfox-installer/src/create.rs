use std::path::{Path, PathBuf};

use portfox_core::{
    scoped, stage_progress, CancelToken, Flow, LifecycleError, Platform, PortfoxConfig,
    ProgressEvent, ProgressFn, ReleaseChannel, Stage,
};
use portfox_resolver::{ProductDetailsResolver, VersionResolver};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::guards::{contains_system_install, host_system_install_dirs, is_within_system_install};
use crate::metadata::{read_installed_version, InstalledVersion};
use crate::update::record_metadata;
use crate::{
    ArchiveExtractor, ArtifactDownloader, DownloadTask, HttpDownloader, PayloadExtractor,
    PortableLayout, PortableStructureBuilder,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CreateReport {
    pub root: PathBuf,
    pub launcher: PathBuf,
    pub version: String,
    pub channel: ReleaseChannel,
    pub size_mb: f64,
}

/// Builds a fresh portable installation from the newest release of a channel.
pub struct PortableCreator {
    resolver: Box<dyn VersionResolver>,
    downloader: Box<dyn ArtifactDownloader>,
    extractor: Box<dyn PayloadExtractor>,
    builder: PortableStructureBuilder,
    platform: Platform,
    system_dirs: Vec<PathBuf>,
}

impl PortableCreator {
    pub fn new(
        resolver: Box<dyn VersionResolver>,
        downloader: Box<dyn ArtifactDownloader>,
        extractor: Box<dyn PayloadExtractor>,
        platform: Platform,
    ) -> Self {
        Self {
            resolver,
            downloader,
            extractor,
            builder: PortableStructureBuilder::new(platform),
            platform,
            system_dirs: host_system_install_dirs(),
        }
    }

    pub fn from_config(config: &PortfoxConfig) -> Result<Self, LifecycleError> {
        Ok(Self::new(
            Box::new(ProductDetailsResolver::new(config.clone())?),
            Box::new(HttpDownloader::new(config)?),
            Box::new(ArchiveExtractor::for_platform(config.platform)),
            config.platform,
        ))
    }

    pub fn with_system_dirs(mut self, system_dirs: Vec<PathBuf>) -> Self {
        self.system_dirs = system_dirs;
        self
    }

    pub fn create(
        &self,
        channel: ReleaseChannel,
        destination: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<CreateReport, LifecycleError> {
        progress(ProgressEvent::new("Validating destination...", 0.0));
        let destination = absolute_destination(destination)?;
        let destination = destination.as_path();
        validate_destination(destination, &self.system_dirs)?;

        cancel.check()?;
        progress(ProgressEvent::new(
            format!("Resolving latest {} version...", channel.display_name()),
            stage_progress(Flow::Create, Stage::CheckingVersion, 0.0),
        ));
        let descriptor = self.resolver.resolve(channel)?;

        cancel.check()?;
        let workspace = tempfile::Builder::new()
            .prefix("portfox-create-")
            .tempdir()
            .map_err(|err| LifecycleError::filesystem("failed to create temp directory", err))?;
        let task = DownloadTask {
            url: descriptor.download_url.clone(),
            destination_path: workspace.path().join(&descriptor.file_name),
            expected_digest: descriptor.digest.clone(),
            channel,
        };
        let artifact = self.downloader.download(
            &task,
            &scoped(Flow::Create, Stage::Downloading, progress),
            cancel,
        )?;

        cancel.check()?;
        let payload = workspace.path().join("payload");
        self.extractor.extract(
            &artifact,
            descriptor.archive_type,
            &payload,
            &scoped(Flow::Create, Stage::Extracting, progress),
            cancel,
        )?;

        let built = self.builder.build(
            destination,
            &payload,
            &scoped(Flow::Create, Stage::Building, progress),
            cancel,
        )?;

        progress(ProgressEvent::new(
            "Removing temporary files...",
            stage_progress(Flow::Create, Stage::CleaningUp, 0.0),
        ));
        if let Err(err) = workspace.close() {
            warn!(error = %err, "could not remove create temp directory");
        }

        progress(ProgressEvent::new(
            "Writing metadata...",
            stage_progress(Flow::Create, Stage::Finalizing, 0.0),
        ));
        let installed = read_installed_version(&built.app_dir, self.platform).unwrap_or_else(|err| {
            warn!(error = %err, "could not re-read application.ini; recording resolved version");
            InstalledVersion {
                version: descriptor.info.version.clone(),
                build_id: descriptor.info.build_id.clone(),
            }
        });
        record_metadata(&PortableLayout::new(destination), &installed, channel);

        info!(
            root = %destination.display(),
            version = %installed.version,
            channel = channel.as_str(),
            "portable Firefox created"
        );
        progress(ProgressEvent::new(
            format!("Created portable Firefox {}", installed.version),
            1.0,
        ));
        Ok(CreateReport {
            root: built.root,
            launcher: built.launcher,
            version: installed.version,
            channel,
            size_mb: built.size_mb,
        })
    }
}

/// Rejects destinations that are empty, already portable roots, unwritable, or overlap a
/// system-wide Firefox install.
pub fn validate_destination(
    destination: &Path,
    system_dirs: &[PathBuf],
) -> Result<(), LifecycleError> {
    let destination = absolute_destination(destination)?;
    let destination = destination.as_path();
    if destination.exists() && !destination.is_dir() {
        return Err(LifecycleError::Destination(format!(
            "{} exists and is not a directory",
            destination.display()
        )));
    }
    if PortableLayout::new(destination).app_container().exists() {
        return Err(LifecycleError::Destination(format!(
            "{} already contains a portable installation",
            destination.display()
        )));
    }
    if is_within_system_install(destination, system_dirs) {
        return Err(LifecycleError::Destination(
            "destination cannot be inside a system Firefox installation".to_string(),
        ));
    }
    if contains_system_install(destination, system_dirs) {
        return Err(LifecycleError::Destination(
            "destination cannot be a parent of a system Firefox installation".to_string(),
        ));
    }

    let Some(existing) = destination.ancestors().find(|ancestor| ancestor.is_dir()) else {
        return Err(LifecycleError::Destination(format!(
            "{} is not a valid path",
            destination.display()
        )));
    };
    NamedTempFile::new_in(existing).map_err(|_| {
        LifecycleError::Destination(format!(
            "no write permission to {}; try a different folder",
            existing.display()
        ))
    })?;
    Ok(())
}

/// Resolves a relative destination against the working directory.
fn absolute_destination(destination: &Path) -> Result<PathBuf, LifecycleError> {
    if destination.as_os_str().is_empty() {
        return Err(LifecycleError::Destination(
            "no destination selected".to_string(),
        ));
    }
    if destination.is_absolute() {
        return Ok(destination.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(destination))
        .map_err(|err| {
            LifecycleError::Destination(format!(
                "cannot resolve {} against the working directory: {err}",
                destination.display()
            ))
        })
}
