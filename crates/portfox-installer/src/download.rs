use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use portfox_core::{
    CancelToken, LifecycleError, PortfoxConfig, ProgressEvent, ProgressFn, ReleaseChannel,
};
use portfox_resolver::map_request_error;
use portfox_security::{digests_match, HashingWriter};
use reqwest::blocking::{Client, Response};
use tracing::{info, warn};

use crate::fs_utils::{bytes_to_mb, remove_file_if_exists};

/// One artifact fetch. The downloader is the only writer of `destination_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub destination_path: PathBuf,
    /// SHA-512 hex published for the artifact; compared case-insensitively.
    pub expected_digest: Option<String>,
    pub channel: ReleaseChannel,
}

pub trait ArtifactDownloader: Send + Sync {
    fn download(
        &self,
        task: &DownloadTask,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<PathBuf, LifecycleError>;
}

impl<T: ArtifactDownloader + ?Sized> ArtifactDownloader for Box<T> {
    fn download(
        &self,
        task: &DownloadTask,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<PathBuf, LifecycleError> {
        (**self).download(task, progress, cancel)
    }
}

/// Streams artifacts over HTTP into `<destination>.part`, hashing as it writes, and
/// renames into place only after the digest matched.
pub struct HttpDownloader {
    client: Client,
    timeout: Duration,
    chunk_size: usize,
}

impl HttpDownloader {
    pub fn new(config: &PortfoxConfig) -> Result<Self, LifecycleError> {
        let client = Client::builder()
            .connect_timeout(config.resolve_timeout())
            .timeout(config.download_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| LifecycleError::network("failed to build HTTP client", err))?;
        Ok(Self {
            client,
            timeout: config.download_timeout(),
            chunk_size: config.chunk_size.max(1),
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn stream_to_part(
        &self,
        task: &DownloadTask,
        response: &mut Response,
        part_path: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<String, LifecycleError> {
        let total = response.content_length().filter(|length| *length > 0);
        let file = File::create(part_path).map_err(|err| {
            LifecycleError::filesystem(format!("failed to create {}", part_path.display()), err)
        })?;
        let mut writer = HashingWriter::new(BufWriter::new(file));
        let mut buffer = vec![0_u8; self.chunk_size];

        loop {
            cancel.check()?;

            let read = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_read_error(&task.url, self.timeout, err)),
            };
            writer.write_all(&buffer[..read]).map_err(|err| {
                LifecycleError::filesystem(format!("failed to write {}", part_path.display()), err)
            })?;

            progress(download_progress(writer.bytes_written(), total));
        }

        let (mut inner, actual) = writer.finish().map_err(|err| {
            LifecycleError::filesystem(format!("failed to write {}", part_path.display()), err)
        })?;
        inner.flush().map_err(|err| {
            LifecycleError::filesystem(format!("failed to flush {}", part_path.display()), err)
        })?;
        Ok(actual)
    }
}

impl ArtifactDownloader for HttpDownloader {
    fn download(
        &self,
        task: &DownloadTask,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<PathBuf, LifecycleError> {
        // Only a verified artifact may ever sit at the destination path.
        remove_file_if_exists(&task.destination_path).map_err(|err| {
            LifecycleError::filesystem(
                format!("failed to remove stale {}", task.destination_path.display()),
                err,
            )
        })?;
        cancel.check()?;
        if let Some(parent) = task.destination_path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                LifecycleError::filesystem(format!("failed to create {}", parent.display()), err)
            })?;
        }

        info!(url = %task.url, channel = task.channel.as_str(), "downloading Firefox artifact");
        progress(ProgressEvent::new("Downloading...", 0.0));

        let mut response = self
            .client
            .get(&task.url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| map_request_error(&task.url, self.timeout, err))?;

        let part_path = part_path_for(&task.destination_path);
        let streamed = self.stream_to_part(task, &mut response, &part_path, progress, cancel);
        drop(response);

        let actual = match streamed {
            Ok(actual) => actual,
            Err(err) => {
                discard_part(&part_path);
                return Err(err);
            }
        };

        match task.expected_digest.as_deref() {
            Some(expected) if !digests_match(expected, &actual) => {
                discard_part(&part_path);
                return Err(LifecycleError::Integrity {
                    expected: expected.trim().to_ascii_lowercase(),
                    actual,
                });
            }
            Some(_) => info!(url = %task.url, "SHA-512 verified"),
            None => warn!(url = %task.url, "no published checksum; download is unverified"),
        }

        fs::rename(&part_path, &task.destination_path)
            .map_err(|err| {
                discard_part(&part_path);
                LifecycleError::filesystem(
                    format!(
                        "failed to move downloaded artifact to {}",
                        task.destination_path.display()
                    ),
                    err,
                )
            })?;

        Ok(task.destination_path.clone())
    }
}

pub fn part_path_for(destination: &Path) -> PathBuf {
    let file_name = destination
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("artifact");
    destination.with_file_name(format!("{file_name}.part"))
}

/// Fraction stays at zero when the server sent no length; the text still moves.
pub fn download_progress(downloaded: u64, total: Option<u64>) -> ProgressEvent {
    match total {
        Some(total) => ProgressEvent::new(
            format!(
                "Downloading: {:.1} / {:.1} MB",
                bytes_to_mb(downloaded),
                bytes_to_mb(total)
            ),
            downloaded as f32 / total as f32,
        ),
        None => ProgressEvent::new(
            format!("Downloading: {:.1} MB", bytes_to_mb(downloaded)),
            0.0,
        ),
    }
}

fn discard_part(part_path: &Path) {
    if let Err(err) = remove_file_if_exists(part_path) {
        warn!(path = %part_path.display(), error = %err, "failed to remove partial download");
    }
}

fn map_read_error(url: &str, timeout: Duration, err: io::Error) -> LifecycleError {
    if err.kind() == io::ErrorKind::TimedOut {
        return LifecycleError::Timeout {
            url: url.to_string(),
            after_secs: timeout.as_secs(),
        };
    }
    LifecycleError::network(format!("download from {url} was interrupted"), err)
}
