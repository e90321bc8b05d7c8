use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use portfox_core::{LifecycleError, Platform, ReleaseChannel};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::PortableLayout;

/// Directory names probed under `App/`, in order.
pub const APP_DIR_CANDIDATES: [&str; 2] = ["Firefox64", "Firefox"];

/// Contents of `portable_metadata.json`. Keys this type does not know are kept in
/// `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortableMetadata {
    #[serde(default)]
    pub firefox_version: String,
    #[serde(default)]
    pub firefox_build_id: String,
    #[serde(default)]
    pub last_updated: String,
    /// Channel the installation follows. An unrecognised value reads as `None` instead of
    /// discarding the whole document.
    #[serde(
        default,
        deserialize_with = "deserialize_channel",
        skip_serializing_if = "Option::is_none"
    )]
    pub channel: Option<ReleaseChannel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PortableMetadata {
    /// Records a freshly installed payload and stamps `last_updated` with the current UTC time.
    pub fn record_install(&mut self, installed: &InstalledVersion) {
        self.firefox_version = installed.version.clone();
        self.firefox_build_id = installed.build_id.clone();
        self.last_updated = current_timestamp();
    }
}

fn deserialize_channel<'de, D>(deserializer: D) -> Result<Option<ReleaseChannel>, D::Error>
where
    D: Deserializer<'de>,
{
    let channel = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) => {
            let parsed = ReleaseChannel::parse(&name);
            if parsed.is_none() {
                warn!(channel = %name, "ignoring unknown release channel in portable metadata");
            }
            parsed
        }
        Some(other) => {
            warn!(channel = %other, "ignoring malformed release channel in portable metadata");
            None
        }
    };
    Ok(channel)
}

pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Version data read from a payload's `application.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: String,
    pub build_id: String,
}

/// An existing portable tree whose live payload directory was located.
#[derive(Debug, Clone, PartialEq)]
pub struct PortableInstallation {
    pub root: PathBuf,
    pub app_dir: PathBuf,
    pub metadata: PortableMetadata,
}

impl PortableInstallation {
    /// Opens `root`, which must contain `App/` and a recognizable payload directory.
    pub fn open(root: &Path, platform: Platform) -> Result<Self, LifecycleError> {
        let layout = PortableLayout::new(root);
        if !root.is_dir() {
            return Err(LifecycleError::NotAPortableInstallation {
                root: root.to_path_buf(),
                reason: "directory does not exist".to_string(),
            });
        }
        if !layout.has_app_container() {
            return Err(LifecycleError::NotAPortableInstallation {
                root: root.to_path_buf(),
                reason: "expected an 'App' directory inside the portable root".to_string(),
            });
        }

        let app_dir = find_app_dir(&layout, platform).ok_or_else(|| {
            LifecycleError::FirefoxDirectoryNotFound {
                root: root.to_path_buf(),
            }
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            app_dir,
            metadata: read_metadata(&layout),
        })
    }

    pub fn layout(&self) -> PortableLayout {
        PortableLayout::new(&self.root)
    }
}

/// First `App/<candidate>` holding the platform executable or manifest.
pub fn find_app_dir(layout: &PortableLayout, platform: Platform) -> Option<PathBuf> {
    APP_DIR_CANDIDATES
        .iter()
        .map(|name| layout.app_dir(name))
        .find(|candidate| looks_like_payload(candidate, platform))
}

pub(crate) fn looks_like_payload(dir: &Path, platform: Platform) -> bool {
    dir.join(platform.executable_rel_path()).is_file()
        || dir.join(platform.manifest_rel_path()).is_file()
}

pub fn read_installed_version(
    app_dir: &Path,
    platform: Platform,
) -> Result<InstalledVersion, LifecycleError> {
    let ini_path = app_dir.join(platform.manifest_rel_path());
    let undeterminable = || LifecycleError::VersionUndeterminable {
        path: ini_path.clone(),
    };

    let raw = match fs::read_to_string(&ini_path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %ini_path.display(), error = %err, "could not read application.ini");
            return Err(undeterminable());
        }
    };

    let (version, build_id) = parse_application_ini(&raw);
    match version {
        Some(version) => Ok(InstalledVersion {
            version,
            build_id: build_id.unwrap_or_default(),
        }),
        None => Err(undeterminable()),
    }
}

/// Returns `Version` and `BuildID` from the `[App]` section.
pub fn parse_application_ini(raw: &str) -> (Option<String>, Option<String>) {
    let mut in_app_section = false;
    let mut version = None;
    let mut build_id = None;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            in_app_section = section.trim().eq_ignore_ascii_case("App");
            continue;
        }
        if !in_app_section {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "Version" => version = Some(value.to_string()),
            "BuildID" => build_id = Some(value.to_string()),
            _ => {}
        }
    }

    (version, build_id)
}

/// Missing or unreadable metadata yields the default value.
pub fn read_metadata(layout: &PortableLayout) -> PortableMetadata {
    let path = layout.metadata_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return PortableMetadata::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read portable metadata");
            return PortableMetadata::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(metadata) => metadata,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unparseable portable metadata");
            PortableMetadata::default()
        }
    }
}

/// Writes the whole document to a temp file beside the target, then renames it into place.
pub fn write_metadata(layout: &PortableLayout, metadata: &PortableMetadata) -> Result<PathBuf> {
    let path = layout.metadata_path();
    let mut payload =
        serde_json::to_vec_pretty(metadata).context("failed to serialize portable metadata")?;
    payload.push(b'\n');

    let mut temp = NamedTempFile::new_in(layout.root())
        .with_context(|| format!("failed to create temp file in {}", layout.root().display()))?;
    temp.write_all(&payload)
        .with_context(|| format!("failed to write {}", temp.path().display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync {}", temp.path().display()))?;
    temp.persist(&path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
