use anyhow::{Context, Result};
use portfox_core::Platform;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "App";
pub const DATA_DIR_NAME: &str = "Data";
pub const PROFILE_DIR_NAME: &str = "profile";
pub const METADATA_FILE_NAME: &str = "portable_metadata.json";

/// Paths of a portable installation rooted at `root`:
/// `App/<AppDir>/`, `Data/profile/`, `portable_metadata.json` and the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortableLayout {
    root: PathBuf,
}

impl PortableLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn app_container(&self) -> PathBuf {
        self.root.join(APP_DIR_NAME)
    }

    pub fn app_dir(&self, name: &str) -> PathBuf {
        self.app_container().join(name)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR_NAME)
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.data_dir().join(PROFILE_DIR_NAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE_NAME)
    }

    pub fn launcher_path(&self, platform: Platform) -> PathBuf {
        self.root.join(platform.launcher_file_name())
    }

    pub fn has_app_container(&self) -> bool {
        self.app_container().is_dir()
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.app_container(), self.profile_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// `<dir>.new`: staging sibling for an incoming payload.
pub fn staging_sibling(live: &Path) -> PathBuf {
    sibling_with_suffix(live, ".new")
}

/// `<dir>.old`: backup sibling holding the previous payload during a swap.
pub fn backup_sibling(live: &Path) -> PathBuf {
    sibling_with_suffix(live, ".old")
}

pub(crate) fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("payload"));
    name.push(suffix);
    path.with_file_name(name)
}
