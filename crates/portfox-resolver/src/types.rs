use portfox_core::{ArchiveType, VersionInfo};

/// Everything needed to fetch and verify one release artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    pub info: VersionInfo,
    pub download_url: String,
    pub file_name: String,
    pub archive_type: ArchiveType,
    /// Lowercase SHA-512 hex, `None` when the publisher's checksum list had no entry.
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactUrls {
    pub download_url: String,
    pub sums_url: String,
    /// Path of the artifact as listed inside `SHA512SUMS`.
    pub sums_entry: String,
    pub file_name: String,
}
