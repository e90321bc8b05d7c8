use serde::{Deserialize, Serialize};

use crate::ArchiveType;

/// A Firefox release track with its own version numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    Stable,
    Beta,
    #[serde(rename = "devedition")]
    DevEdition,
}

impl ReleaseChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Beta => "beta",
            Self::DevEdition => "devedition",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Stable => "Stable",
            Self::Beta => "Beta",
            Self::DevEdition => "Developer Edition",
        }
    }

    /// Key of this channel in the product-details `firefox_versions.json` document.
    pub fn version_key(self) -> &'static str {
        match self {
            Self::Stable => "LATEST_FIREFOX_VERSION",
            Self::Beta => "LATEST_FIREFOX_DEVEL_VERSION",
            Self::DevEdition => "FIREFOX_DEVEDITION",
        }
    }

    /// Lenient name lookup for persisted values; accepts `release` for Stable.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "stable" | "release" => Some(Self::Stable),
            "beta" => Some(Self::Beta),
            "devedition" | "dev-edition" | "developer" => Some(Self::DevEdition),
            _ => None,
        }
    }

    pub fn uses_devedition_tree(self) -> bool {
        self == Self::DevEdition
    }
}

impl std::fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build platform of the Firefox payload, named the way the release CDN names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "win64")]
    Win64,
    #[serde(rename = "linux-x86_64")]
    Linux64,
    #[serde(rename = "mac")]
    Mac,
}

impl Platform {
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Win64
        } else if cfg!(target_os = "macos") {
            Self::Mac
        } else {
            Self::Linux64
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win64 => "win64",
            Self::Linux64 => "linux-x86_64",
            Self::Mac => "mac",
        }
    }

    /// Lenient name lookup for persisted values; accepts `release` for Stable.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "win64" | "windows" => Some(Self::Win64),
            "linux-x86_64" | "linux64" | "linux" => Some(Self::Linux64),
            "mac" | "macos" | "osx" => Some(Self::Mac),
            _ => None,
        }
    }

    pub fn archive_type(self) -> ArchiveType {
        match self {
            Self::Win64 => ArchiveType::Exe,
            Self::Linux64 => ArchiveType::TarXz,
            Self::Mac => ArchiveType::Dmg,
        }
    }

    /// Installer file name as published under `<version>/<platform>/<locale>/`.
    pub fn artifact_file_name(self, version: &str) -> String {
        match self {
            Self::Win64 => format!("Firefox Setup {version}.exe"),
            Self::Linux64 => format!("firefox-{version}.tar.xz"),
            Self::Mac => format!("Firefox {version}.dmg"),
        }
    }

    /// Directory name under `App/` holding the payload.
    pub fn app_dir_name(self) -> &'static str {
        "Firefox64"
    }

    /// Path of the browser executable relative to the payload directory.
    pub fn executable_rel_path(self) -> &'static str {
        match self {
            Self::Win64 => "firefox.exe",
            Self::Linux64 => "firefox",
            Self::Mac => "Contents/MacOS/firefox",
        }
    }

    /// Path of `application.ini` relative to the payload directory.
    pub fn manifest_rel_path(self) -> &'static str {
        match self {
            Self::Win64 | Self::Linux64 => "application.ini",
            Self::Mac => "Contents/Resources/application.ini",
        }
    }

    pub fn launcher_file_name(self) -> &'static str {
        match self {
            Self::Win64 => "FirefoxPortable.bat",
            Self::Linux64 | Self::Mac => "firefox-portable.sh",
        }
    }

    /// Name of the running browser process as reported by the OS process table.
    pub fn process_name(self) -> &'static str {
        match self {
            Self::Win64 => "firefox.exe",
            Self::Linux64 | Self::Mac => "firefox",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
