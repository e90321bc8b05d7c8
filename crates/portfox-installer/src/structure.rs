use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use portfox_core::{CancelToken, LifecycleError, Platform, ProgressEvent, ProgressFn};
use tracing::{info, warn};

use crate::fs_utils::{
    bytes_to_mb, copy_dir_recursive, dir_size_bytes, is_cancellation, remove_dir_if_exists,
    remove_file_if_exists,
};
use crate::metadata::looks_like_payload;
use crate::PortableLayout;

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPortable {
    pub root: PathBuf,
    pub app_dir: PathBuf,
    pub launcher: PathBuf,
    pub size_mb: f64,
}

/// Lays out `App/<AppDir>`, `Data/profile` and a launcher under a destination root.
///
/// On any failure or cancellation every path the builder created is removed again, so the
/// destination is left exactly as it was found.
#[derive(Debug, Clone, Copy)]
pub struct PortableStructureBuilder {
    platform: Platform,
}

impl PortableStructureBuilder {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn build(
        &self,
        dest_root: &Path,
        source_payload: &Path,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<BuiltPortable, LifecycleError> {
        cancel.check()?;
        if !looks_like_payload(source_payload, self.platform) {
            return Err(LifecycleError::structure(
                format!(
                    "{} does not contain {}",
                    source_payload.display(),
                    self.platform.executable_rel_path()
                ),
                "payload is incomplete",
            ));
        }

        let layout = PortableLayout::new(dest_root);
        if layout.app_container().exists() {
            return Err(LifecycleError::Destination(format!(
                "{} already contains an App directory",
                dest_root.display()
            )));
        }

        let mut created = CreatedPaths::default();
        match self.build_into(&layout, source_payload, &mut created, progress, cancel) {
            Ok(built) => {
                info!(root = %built.root.display(), size_mb = built.size_mb, "portable structure built");
                Ok(built)
            }
            Err(err) => {
                created.remove_all();
                if is_cancellation(&err) {
                    return Err(LifecycleError::Cancelled);
                }
                Err(LifecycleError::structure(
                    format!("could not build portable tree in {}", dest_root.display()),
                    err,
                ))
            }
        }
    }

    fn build_into(
        &self,
        layout: &PortableLayout,
        source_payload: &Path,
        created: &mut CreatedPaths,
        progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<BuiltPortable> {
        progress(ProgressEvent::new("Creating directory structure...", 0.0));
        if !layout.root().exists() {
            fs::create_dir_all(layout.root())
                .with_context(|| format!("failed to create {}", layout.root().display()))?;
            created.push(layout.root());
        }

        let app_container = layout.app_container();
        fs::create_dir_all(&app_container)
            .with_context(|| format!("failed to create {}", app_container.display()))?;
        created.push(&app_container);

        let total_bytes = dir_size_bytes(source_payload)?.max(1);
        let app_dir = layout.app_dir(self.platform.app_dir_name());
        let mut copied_bytes = 0_u64;
        copy_dir_recursive(source_payload, &app_dir, &mut |file_bytes| {
            cancel.check()?;
            copied_bytes += file_bytes;
            progress(ProgressEvent::new(
                format!(
                    "Copying Firefox files: {:.1} / {:.1} MB",
                    bytes_to_mb(copied_bytes),
                    bytes_to_mb(total_bytes)
                ),
                0.9 * (copied_bytes as f32 / total_bytes as f32),
            ));
            Ok(())
        })?;
        cancel.check()?;

        progress(ProgressEvent::new("Creating launcher...", 0.9));
        let launcher = layout.launcher_path(self.platform);
        if !launcher.exists() {
            created.push(&launcher);
        }
        write_launcher(&launcher, self.platform)?;

        let data_dir = layout.data_dir();
        let data_existed = data_dir.exists();
        fs::create_dir_all(layout.profile_dir())
            .with_context(|| format!("failed to create {}", layout.profile_dir().display()))?;
        if !data_existed {
            created.push(&data_dir);
        }
        cancel.check()?;

        let size_mb = (bytes_to_mb(dir_size_bytes(layout.root())?) * 10.0).round() / 10.0;
        progress(ProgressEvent::new("Portable structure ready", 1.0));

        Ok(BuiltPortable {
            root: layout.root().to_path_buf(),
            app_dir,
            launcher,
            size_mb,
        })
    }
}

pub fn launcher_script(platform: Platform) -> String {
    let app_dir = platform.app_dir_name();
    match platform {
        Platform::Win64 => format!(
            "@echo off\r\n\
             setlocal enableextensions disabledelayedexpansion\r\n\
             set \"BASE=%~dp0\"\r\n\
             set \"FFDIR=%BASE%App\\{app_dir}\"\r\n\
             if not exist \"%FFDIR%\\firefox.exe\" set \"FFDIR=%BASE%App\\Firefox\"\r\n\
             set \"PROFILE=%BASE%Data\\profile\"\r\n\
             if not exist \"%PROFILE%\\\" mkdir \"%PROFILE%\"\r\n\
             start \"\" \"%FFDIR%\\firefox.exe\" -profile \"%PROFILE%\" -no-remote\r\n\
             endlocal\r\n"
        ),
        Platform::Linux64 | Platform::Mac => format!(
            "#!/bin/sh\n\
             BASE=\"$(cd \"$(dirname \"$0\")\" && pwd)\"\n\
             PROFILE=\"$BASE/Data/profile\"\n\
             mkdir -p \"$PROFILE\"\n\
             exec \"$BASE/App/{app_dir}/{}\" -profile \"$PROFILE\" -no-remote \"$@\"\n",
            platform.executable_rel_path()
        ),
    }
}

fn write_launcher(path: &Path, platform: Platform) -> Result<()> {
    fs::write(path, launcher_script(platform))
        .with_context(|| format!("failed to write launcher {}", path.display()))?;

    #[cfg(unix)]
    if platform != Platform::Win64 {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed to mark launcher executable: {}", path.display()))?;
    }
    Ok(())
}

/// Paths created during a build, removed newest first on failure.
#[derive(Debug, Default)]
struct CreatedPaths {
    paths: Vec<PathBuf>,
}

impl CreatedPaths {
    fn push(&mut self, path: &Path) {
        self.paths.push(path.to_path_buf());
    }

    fn remove_all(&mut self) {
        while let Some(path) = self.paths.pop() {
            let removed = if path.is_dir() {
                remove_dir_if_exists(&path)
            } else {
                remove_file_if_exists(&path)
            };
            if let Err(err) = removed {
                warn!(path = %path.display(), error = %err, "failed to remove partially built path");
            }
        }
    }
}
