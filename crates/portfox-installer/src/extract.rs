use std::cell::Cell;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use portfox_core::{ArchiveType, CancelToken, LifecycleError, Platform, ProgressEvent, ProgressFn};
use tracing::{info, warn};

use crate::fs_utils::{
    copy_dir_recursive, error_chain_has_not_found, is_cancellation, move_dir_or_copy,
    remove_dir_if_exists, reset_dir,
};
use crate::layout::sibling_with_suffix;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);
const TOOL_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub trait PayloadExtractor: Send + Sync {
    /// Unpacks `archive` into `dest`, which ends up holding the payload itself.
    fn extract(
        &self,
        archive: &Path,
        archive_type: ArchiveType,
        dest: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<(), LifecycleError>;
}

impl<T: PayloadExtractor + ?Sized> PayloadExtractor for Box<T> {
    fn extract(
        &self,
        archive: &Path,
        archive_type: ArchiveType,
        dest: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<(), LifecycleError> {
        (**self).extract(archive, archive_type, dest, progress, cancel)
    }
}

/// Zip and tar.gz are unpacked in-process; tar.xz, NSIS installers and disk images go
/// through `tar`, `7z` and `hdiutil`, polled so cancellation can kill the child.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    payload_marker: Option<PathBuf>,
    tool_timeout: Duration,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self {
            payload_marker: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor that requires the platform executable to be present after extraction.
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            payload_marker: Some(PathBuf::from(platform.executable_rel_path())),
            ..Self::default()
        }
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    fn unpack(
        &self,
        archive: &Path,
        archive_type: ArchiveType,
        dest: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let run = |command: &mut Command, context_message: &str| {
            run_tool_cancellable(command, context_message, cancel, self.tool_timeout)
        };

        match archive_type {
            ArchiveType::Zip => extract_zip(archive, dest, progress, cancel),
            ArchiveType::TarGz => extract_tar_gz(archive, dest, progress, cancel),
            ArchiveType::TarXz | ArchiveType::TarBz2 => run(
                &mut build_tar_extract_command(archive, dest),
                "failed to extract tar archive",
            ),
            ArchiveType::Exe => stage_exe_payload_with_runner(archive, dest, cfg!(windows), run),
            ArchiveType::Dmg => {
                if !cfg!(target_os = "macos") {
                    return Err(anyhow!("DMG artifacts are supported only on macOS hosts"));
                }
                let mount_point = sibling_with_suffix(dest, ".mount");
                fs::create_dir_all(&mount_point)
                    .with_context(|| format!("failed to create {}", mount_point.display()))?;
                let result = stage_dmg_payload_with_hooks(
                    archive,
                    dest,
                    &mount_point,
                    run,
                    |mount, raw| copy_dmg_payload(mount, raw, cancel),
                );
                let _ = fs::remove_dir_all(&mount_point);
                result
            }
        }
    }
}

impl PayloadExtractor for ArchiveExtractor {
    fn extract(
        &self,
        archive: &Path,
        archive_type: ArchiveType,
        dest: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<(), LifecycleError> {
        cancel.check()?;
        progress(ProgressEvent::new("Extracting...", 0.0));
        info!(
            archive = %archive.display(),
            kind = archive_type.as_str(),
            dest = %dest.display(),
            "extracting payload"
        );

        let result = reset_dir(dest)
            .and_then(|()| self.unpack(archive, archive_type, dest, progress, cancel))
            .and_then(|()| {
                cancel.check()?;
                hoist_payload(dest, self.payload_marker.as_deref())?;
                ensure_marker(dest, self.payload_marker.as_deref())
            });

        if let Err(err) = result {
            if let Err(cleanup_err) = remove_dir_if_exists(dest) {
                warn!(path = %dest.display(), error = %cleanup_err, "failed to remove extraction directory");
            }
            return Err(into_extraction_error(err, archive));
        }

        progress(ProgressEvent::new("Extraction complete", 1.0));
        Ok(())
    }
}

fn into_extraction_error(err: anyhow::Error, archive: &Path) -> LifecycleError {
    if is_cancellation(&err) {
        return LifecycleError::Cancelled;
    }
    LifecycleError::extraction(format!("failed to extract {}", archive.display()), err)
}

fn ensure_marker(dest: &Path, marker: Option<&Path>) -> Result<()> {
    match marker {
        Some(marker) if !dest.join(marker).is_file() => Err(anyhow!(
            "extraction completed but {} was not found in {}",
            marker.display(),
            dest.display()
        )),
        _ => Ok(()),
    }
}

/// Moves the contents of a wrapping directory up into `dest`.
///
/// A lone top-level directory is always hoisted. With a marker, a directory containing the
/// marker is hoisted when `dest` does not already contain it. Returns whether anything moved.
pub(crate) fn hoist_payload(dest: &Path, marker: Option<&Path>) -> Result<bool> {
    if marker.is_some_and(|marker| dest.join(marker).is_file()) {
        return Ok(false);
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dest).with_context(|| format!("failed to read {}", dest.display()))? {
        entries.push(entry?.path());
    }

    let is_dir = |path: &PathBuf| {
        fs::symlink_metadata(path)
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    };
    let wrapper = match entries.as_slice() {
        [only] if is_dir(only) => Some(only.clone()),
        _ => marker.and_then(|marker| {
            entries
                .iter()
                .find(|entry| is_dir(*entry) && entry.join(marker).is_file())
                .cloned()
        }),
    };
    let Some(wrapper) = wrapper else {
        return Ok(false);
    };

    let staging = sibling_with_suffix(dest, ".staging");
    remove_dir_if_exists(&staging)
        .with_context(|| format!("failed to clear {}", staging.display()))?;
    fs::rename(&wrapper, &staging).with_context(|| {
        format!(
            "failed to move {} to {}",
            wrapper.display(),
            staging.display()
        )
    })?;

    let swapped = fs::remove_dir_all(dest)
        .with_context(|| format!("failed to clear {}", dest.display()))
        .and_then(|()| move_dir_or_copy(&staging, dest));
    if let Err(err) = swapped {
        let _ = remove_dir_if_exists(&staging);
        return Err(err).with_context(|| format!("failed to hoist payload into {}", dest.display()));
    }
    Ok(true)
}

fn extract_zip(
    archive_path: &Path,
    dest: &Path,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("failed to read zip archive: {}", archive_path.display()))?;

    let total = archive.len().max(1);
    for index in 0..archive.len() {
        cancel.check()?;
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read archive entry {index}"))?;
        let entry_path = entry
            .enclosed_name()
            .with_context(|| format!("zip entry '{}' escapes the destination", entry.name()))?;
        let output_path = dest.join(entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&output_path)
                .with_context(|| format!("failed to create {}", output_path.display()))?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let mut outfile = File::create(&output_path)
                .with_context(|| format!("failed to create {}", output_path.display()))?;
            io::copy(&mut entry, &mut outfile)
                .with_context(|| format!("failed to extract {}", output_path.display()))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&output_path, fs::Permissions::from_mode(mode & 0o777))
                    .with_context(|| format!("failed to set mode on {}", output_path.display()))?;
            }
        }

        progress(ProgressEvent::new(
            "Extracting...",
            (index + 1) as f32 / total as f32,
        ));
    }
    Ok(())
}

struct CountingReader<R> {
    inner: R,
    consumed: Rc<Cell<u64>>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.consumed.set(self.consumed.get() + read as u64);
        Ok(read)
    }
}

fn extract_tar_gz(
    archive_path: &Path,
    dest: &Path,
    progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<()> {
    let mut file = File::open(archive_path)
        .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;
    let total = file.seek(SeekFrom::End(0))?.max(1);
    file.seek(SeekFrom::Start(0))?;

    let consumed = Rc::new(Cell::new(0_u64));
    let reader = CountingReader {
        inner: BufReader::new(file),
        consumed: Rc::clone(&consumed),
    };
    let mut archive = tar::Archive::new(GzDecoder::new(reader));

    for entry in archive
        .entries()
        .with_context(|| format!("failed to read tar archive: {}", archive_path.display()))?
    {
        cancel.check()?;
        let mut entry = entry.context("failed to read tar entry")?;
        let entry_path = entry.path()?.display().to_string();
        let unpacked = entry
            .unpack_in(dest)
            .with_context(|| format!("failed to extract {entry_path}"))?;
        if !unpacked {
            return Err(anyhow!("tar entry '{entry_path}' escapes the destination"));
        }
        progress(ProgressEvent::new(
            "Extracting...",
            consumed.get() as f32 / total as f32,
        ));
    }
    Ok(())
}

/// Runs an external extraction tool, polling it so a cancel request or the timeout
/// kills the child instead of waiting for it.
pub(crate) fn run_tool_cancellable(
    command: &mut Command,
    context_message: &str,
    cancel: &CancelToken,
    timeout: Duration,
) -> Result<()> {
    let stderr_sink = tempfile::tempfile()
        .with_context(|| format!("{context_message}: failed to capture stderr"))?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_sink.try_clone()?));

    let mut child = command
        .spawn()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    let started = Instant::now();

    loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("{context_message}: failed to poll child process"))?
        {
            if status.success() {
                return Ok(());
            }
            return Err(anyhow!(
                "{context_message}: status={} stderr='{}'",
                status,
                read_captured(stderr_sink).trim()
            ));
        }

        if cancel.is_cancelled() {
            kill_child(&mut child);
            return Err(LifecycleError::Cancelled.into());
        }
        if started.elapsed() >= timeout {
            kill_child(&mut child);
            return Err(anyhow!(
                "{context_message}: timed out after {}s",
                timeout.as_secs()
            ));
        }
        thread::sleep(TOOL_POLL_INTERVAL);
    }
}

fn kill_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        warn!(pid = child.id(), error = %err, "failed to kill extraction tool");
    }
    let _ = child.wait();
}

fn read_captured(mut file: File) -> String {
    let mut captured = String::new();
    if file.seek(SeekFrom::Start(0)).is_ok() {
        let _ = file.read_to_string(&mut captured);
    }
    captured
}

pub(crate) fn build_tar_extract_command(archive_path: &Path, dest: &Path) -> Command {
    let mut command = Command::new("tar");
    command.arg("-xf").arg(archive_path).arg("-C").arg(dest);
    command
}

pub(crate) fn build_exe_extract_command(archive_path: &Path, dest: &Path) -> Command {
    let mut command = Command::new("7z");
    command
        .arg("x")
        .arg(archive_path)
        .arg(format!("-o{}", dest.display()))
        .arg("-y");
    command
}

/// The NSIS installer's own silent extraction switch.
pub(crate) fn build_installer_self_extract_command(archive_path: &Path, dest: &Path) -> Command {
    let mut command = Command::new(archive_path);
    command.arg(format!("/ExtractDir={}", dest.display()));
    command
}

pub(crate) fn stage_exe_payload_with_runner<RunCommand>(
    archive_path: &Path,
    dest: &Path,
    allow_self_extract: bool,
    mut run: RunCommand,
) -> Result<()>
where
    RunCommand: FnMut(&mut Command, &str) -> Result<()>,
{
    let mut command = build_exe_extract_command(archive_path, dest);
    let Err(err) = run(&mut command, "failed to extract installer with 7z") else {
        return Ok(());
    };
    if is_cancellation(&err) {
        return Err(err);
    }

    if !error_chain_has_not_found(&err) {
        return Err(anyhow!(
            "failed to extract installer: artifact={} dest={} extraction_command={:?}: {err}",
            archive_path.display(),
            dest.display(),
            command
        ));
    }
    if !allow_self_extract {
        return Err(anyhow!(
            "failed to extract installer: required extraction tool '7z' was not found on PATH; install 7-Zip CLI and ensure '7z' is available, then retry. artifact={} dest={}",
            archive_path.display(),
            dest.display()
        ));
    }

    warn!("7z not found; falling back to the installer's /ExtractDir switch");
    let mut fallback = build_installer_self_extract_command(archive_path, dest);
    run(&mut fallback, "failed to extract installer with /ExtractDir")
}

pub(crate) fn build_dmg_attach_command(archive_path: &Path, mount_point: &Path) -> Command {
    let mut command = Command::new("hdiutil");
    command
        .arg("attach")
        .arg(archive_path)
        .arg("-readonly")
        .arg("-nobrowse")
        .arg("-mountpoint")
        .arg(mount_point);
    command
}

pub(crate) fn build_dmg_detach_command(mount_point: &Path) -> Command {
    let mut command = Command::new("hdiutil");
    command.arg("detach").arg(mount_point);
    command
}

pub(crate) fn stage_dmg_payload_with_hooks<RunCommand, CopyPayload>(
    archive_path: &Path,
    dest: &Path,
    mount_point: &Path,
    mut run: RunCommand,
    mut copy_payload: CopyPayload,
) -> Result<()>
where
    RunCommand: FnMut(&mut Command, &str) -> Result<()>,
    CopyPayload: FnMut(&Path, &Path) -> Result<()>,
{
    let mut attach_command = build_dmg_attach_command(archive_path, mount_point);
    run(&mut attach_command, "failed to attach disk image")?;

    let copy_result = copy_payload(mount_point, dest);

    let mut detach_command = build_dmg_detach_command(mount_point);
    let detach_result = run(&mut detach_command, "failed to detach disk image");

    match (copy_result, detach_result) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(copy_err), Ok(())) => Err(copy_err),
        (Ok(()), Err(detach_err)) => Err(detach_err),
        (Err(copy_err), Err(detach_err)) => Err(anyhow!(
            "failed to copy mounted disk image payload: {copy_err}; additionally failed to detach mount {}: {detach_err}",
            mount_point.display()
        )),
    }
}

/// Copies the mounted image, dropping the root `Applications` symlink image authors add.
pub(crate) fn copy_dmg_payload(mount_point: &Path, dest: &Path, cancel: &CancelToken) -> Result<()> {
    copy_dir_recursive(mount_point, dest, &mut |_| {
        cancel.check()?;
        Ok(())
    })?;

    let applications_entry = dest.join("Applications");
    let metadata = match fs::symlink_metadata(&applications_entry) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| {
                format!(
                    "failed to inspect copied Applications entry: {}",
                    applications_entry.display()
                )
            });
        }
    };

    if metadata.file_type().is_symlink() {
        fs::remove_file(&applications_entry).with_context(|| {
            format!(
                "failed to remove root Applications symlink from disk image copy: {}",
                applications_entry.display()
            )
        })?;
    }

    Ok(())
}
