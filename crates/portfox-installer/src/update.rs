use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use portfox_core::{
    is_update_available, scoped, stage_progress, CancelToken, Flow, LifecycleError, Platform,
    PortfoxConfig, ProgressEvent, ProgressFn, ReleaseChannel, Stage,
};
use portfox_resolver::{ProductDetailsResolver, ReleaseDescriptor, VersionResolver};
use tracing::{error, info, warn};

use crate::fs_utils::remove_dir_if_exists;
use crate::guards::{
    host_system_install_dirs, is_within_system_install, ProcessProbe, SystemProcessProbe,
};
use crate::layout::{backup_sibling, staging_sibling};
use crate::metadata::{read_installed_version, read_metadata, write_metadata, InstalledVersion};
use crate::{
    ArchiveExtractor, ArtifactDownloader, DownloadTask, HttpDownloader, PayloadExtractor,
    PortableInstallation, PortableLayout,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    CheckingVersion,
    Downloading,
    Extracting,
    Swapping,
    CleaningUp,
    Done,
    /// The swap failed and the previous payload was restored.
    RolledBack,
    Error,
}

impl UpdateState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingVersion => "checking-version",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Swapping => "swapping",
            Self::CleaningUp => "cleaning-up",
            Self::Done => "done",
            Self::RolledBack => "rolled-back",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    AlreadyUpToDate {
        version: String,
    },
    Updated {
        old_version: String,
        new_version: String,
        build_id: String,
    },
}

/// Everything an update run produced. Stage failures never escape as panics or early
/// returns; they land in `result`.
#[derive(Debug)]
pub struct UpdateReport {
    pub old_version: String,
    pub new_version: String,
    pub final_state: UpdateState,
    pub result: Result<UpdateOutcome, LifecycleError>,
}

impl UpdateReport {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn already_up_to_date(&self) -> bool {
        matches!(self.result, Ok(UpdateOutcome::AlreadyUpToDate { .. }))
    }

    pub fn error(&self) -> Option<&LifecycleError> {
        self.result.as_ref().err()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    pub channel: ReleaseChannel,
    pub current_version: String,
    pub latest_version: String,
    pub update_available: bool,
}

pub type Renamer = dyn Fn(&Path, &Path) -> io::Result<()> + Send + Sync;

/// Download, extract into `<AppDir>.new`, swap by rename with rollback, clean up.
pub struct UpdateCoordinator {
    resolver: Box<dyn VersionResolver>,
    downloader: Box<dyn ArtifactDownloader>,
    extractor: Box<dyn PayloadExtractor>,
    platform: Platform,
    channel: Option<ReleaseChannel>,
    probe: Box<dyn ProcessProbe>,
    system_dirs: Vec<PathBuf>,
    rename: Box<Renamer>,
}

impl UpdateCoordinator {
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
            platform,
            channel: None,
            probe: Box::new(SystemProcessProbe),
            system_dirs: host_system_install_dirs(),
            rename: Box::new(|from: &Path, to: &Path| fs::rename(from, to)),
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

    /// Channel to track. Without one, the channel recorded in the metadata is used,
    /// falling back to stable.
    pub fn with_channel(mut self, channel: Option<ReleaseChannel>) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_process_probe(mut self, probe: Box<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_system_dirs(mut self, system_dirs: Vec<PathBuf>) -> Self {
        self.system_dirs = system_dirs;
        self
    }

    pub fn with_renamer(mut self, rename: Box<Renamer>) -> Self {
        self.rename = rename;
        self
    }

    /// Compares the installed version with the newest published one without changing anything.
    pub fn check_for_update(&self, root: &Path) -> Result<UpdateCheck, LifecycleError> {
        let installation = self.open(root)?;
        let installed = read_installed_version(&installation.app_dir, self.platform)?;
        let channel = self.channel_for(&installation);
        let descriptor = self.resolver.resolve(channel)?;

        Ok(UpdateCheck {
            channel,
            update_available: is_update_available(&installed.version, &descriptor.info.version),
            current_version: installed.version,
            latest_version: descriptor.info.version,
        })
    }

    pub fn run(&self, root: &Path, progress: ProgressFn<'_>, cancel: &CancelToken) -> UpdateReport {
        let mut run = UpdateRun {
            state: UpdateState::Idle,
            old_version: String::new(),
            new_version: String::new(),
        };
        let result = self.execute(&mut run, root, progress, cancel);

        let final_state = match (&result, run.state) {
            (Ok(_), _) => UpdateState::Done,
            (Err(_), UpdateState::RolledBack) => UpdateState::RolledBack,
            (Err(err), state) => {
                error!(state = state.as_str(), error = %err, "update failed");
                UpdateState::Error
            }
        };

        UpdateReport {
            old_version: run.old_version,
            new_version: run.new_version,
            final_state,
            result,
        }
    }

    fn execute(
        &self,
        run: &mut UpdateRun,
        root: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<UpdateOutcome, LifecycleError> {
        let installation = self.open(root)?;

        run.state = UpdateState::CheckingVersion;
        progress(ProgressEvent::new(
            "Reading current version...",
            stage_progress(Flow::Update, Stage::CheckingVersion, 0.0),
        ));
        let installed = read_installed_version(&installation.app_dir, self.platform)?;
        run.old_version = installed.version.clone();

        cancel.check()?;
        progress(ProgressEvent::new(
            "Checking latest version...",
            stage_progress(Flow::Update, Stage::CheckingVersion, 0.4),
        ));
        let channel = self.channel_for(&installation);
        let descriptor = self.resolver.resolve(channel)?;
        run.new_version = descriptor.info.version.clone();

        if !is_update_available(&installed.version, &descriptor.info.version) {
            info!(version = %installed.version, "portable Firefox is already up to date");
            progress(ProgressEvent::new("Already up to date", 1.0));
            return Ok(UpdateOutcome::AlreadyUpToDate {
                version: installed.version,
            });
        }
        self.ensure_not_running()?;

        cancel.check()?;
        run.state = UpdateState::Downloading;
        let workspace = tempfile::Builder::new()
            .prefix("portfox-update-")
            .tempdir()
            .map_err(|err| LifecycleError::filesystem("failed to create temp directory", err))?;
        let artifact = self.download(&descriptor, channel, workspace.path(), progress, cancel)?;

        cancel.check()?;
        run.state = UpdateState::Extracting;
        let live = installation.app_dir.clone();
        let staged = staging_sibling(&live);
        self.extractor.extract(
            &artifact,
            descriptor.archive_type,
            &staged,
            &scoped(Flow::Update, Stage::Extracting, progress),
            cancel,
        )?;
        if let Err(err) = cancel.check().and_then(|()| self.ensure_not_running()) {
            discard_dir(&staged);
            return Err(err);
        }

        // Cancellation is no longer honored from here on.
        run.state = UpdateState::Swapping;
        progress(ProgressEvent::new(
            "Replacing Firefox files...",
            stage_progress(Flow::Update, Stage::Swapping, 0.0),
        ));
        let backup = self.swap(run, &live, &staged)?;

        run.state = UpdateState::CleaningUp;
        progress(ProgressEvent::new(
            "Cleaning up old version...",
            stage_progress(Flow::Update, Stage::CleaningUp, 0.0),
        ));
        if let Err(err) = remove_dir_if_exists(&backup) {
            warn!(path = %backup.display(), error = %err, "could not remove previous Firefox directory");
        }
        if let Err(err) = workspace.close() {
            warn!(error = %err, "could not remove update temp directory");
        }

        progress(ProgressEvent::new(
            "Updating metadata...",
            stage_progress(Flow::Update, Stage::Finalizing, 0.0),
        ));
        let fresh = read_installed_version(&live, self.platform).unwrap_or_else(|err| {
            warn!(error = %err, "could not re-read application.ini; recording resolved version");
            InstalledVersion {
                version: descriptor.info.version.clone(),
                build_id: descriptor.info.build_id.clone(),
            }
        });
        record_metadata(&installation.layout(), &fresh, channel);
        run.new_version = fresh.version.clone();

        info!(old = %run.old_version, new = %fresh.version, "portable Firefox updated");
        progress(ProgressEvent::new(
            format!("Updated to Firefox {}!", fresh.version),
            1.0,
        ));
        Ok(UpdateOutcome::Updated {
            old_version: run.old_version.clone(),
            new_version: fresh.version,
            build_id: fresh.build_id,
        })
    }

    fn open(&self, root: &Path) -> Result<PortableInstallation, LifecycleError> {
        if is_within_system_install(root, &self.system_dirs) {
            return Err(LifecycleError::NotAPortableInstallation {
                root: root.to_path_buf(),
                reason: "this appears to be a system Firefox installation; only portable installations are updated".to_string(),
            });
        }
        PortableInstallation::open(root, self.platform)
    }

    fn channel_for(&self, installation: &PortableInstallation) -> ReleaseChannel {
        self.channel
            .or(installation.metadata.channel)
            .unwrap_or(ReleaseChannel::Stable)
    }

    fn ensure_not_running(&self) -> Result<(), LifecycleError> {
        if self.probe.is_running(self.platform) {
            return Err(LifecycleError::ApplicationRunning);
        }
        Ok(())
    }

    fn download(
        &self,
        descriptor: &ReleaseDescriptor,
        channel: ReleaseChannel,
        workspace: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<PathBuf, LifecycleError> {
        let task = DownloadTask {
            url: descriptor.download_url.clone(),
            destination_path: workspace.join(&descriptor.file_name),
            expected_digest: descriptor.digest.clone(),
            channel,
        };
        self.downloader
            .download(&task, &scoped(Flow::Update, Stage::Downloading, progress), cancel)
    }

    /// Renames `live` to `<live>.old` and `staged` to `live`, restoring the backup when the
    /// second rename fails. Returns the backup path.
    fn swap(
        &self,
        run: &mut UpdateRun,
        live: &Path,
        staged: &Path,
    ) -> Result<PathBuf, LifecycleError> {
        let backup = backup_sibling(live);
        if let Err(err) = remove_dir_if_exists(&backup) {
            discard_dir(staged);
            return Err(LifecycleError::filesystem(
                format!("failed to remove leftover backup {}", backup.display()),
                err,
            ));
        }

        if let Err(err) = (self.rename)(live, &backup) {
            discard_dir(staged);
            return Err(LifecycleError::LiveDirectoryLocked {
                path: live.to_path_buf(),
                source: err,
            });
        }

        let swap_error = match (self.rename)(staged, live) {
            Ok(()) => return Ok(backup),
            Err(err) => err,
        };
        error!(error = %swap_error, "failed to place new Firefox files; rolling back");

        match (self.rename)(&backup, live) {
            Ok(()) => {
                run.state = UpdateState::RolledBack;
                discard_dir(staged);
                Err(LifecycleError::SwapFailed {
                    live: live.to_path_buf(),
                    source: swap_error,
                })
            }
            Err(rollback_error) => {
                error!(
                    backup = %backup.display(),
                    error = %rollback_error,
                    "rollback failed; previous Firefox files remain in the backup directory"
                );
                Err(LifecycleError::CriticalRollbackFailed {
                    backup,
                    swap_error,
                    rollback_error,
                })
            }
        }
    }
}

struct UpdateRun {
    state: UpdateState,
    old_version: String,
    new_version: String,
}

fn discard_dir(path: &Path) {
    if let Err(err) = remove_dir_if_exists(path) {
        warn!(path = %path.display(), error = %err, "failed to remove staged Firefox directory");
    }
}

/// Rewrites the metadata document whole. A failure here does not undo a finished install.
pub(crate) fn record_metadata(
    layout: &PortableLayout,
    installed: &InstalledVersion,
    channel: ReleaseChannel,
) {
    let mut metadata = read_metadata(layout);
    metadata.record_install(installed);
    metadata.channel = Some(channel);
    if let Err(err) = write_metadata(layout, &metadata) {
        warn!(error = %err, "failed to write portable metadata");
    }
}
