use std::cmp::Ordering;

use crate::{LifecycleError, ReleaseChannel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    /// Empty when the source does not publish one (the release endpoint never does).
    pub build_id: String,
    pub channel: ReleaseChannel,
}

impl VersionInfo {
    pub fn new(version: impl Into<String>, build_id: impl Into<String>, channel: ReleaseChannel) -> Self {
        Self {
            version: version.into(),
            build_id: build_id.into(),
            channel,
        }
    }

    pub fn is_newer_than(&self, installed: &str) -> bool {
        is_update_available(installed, &self.version)
    }
}

/// A dotted Firefox version such as `121.0.1` or `122.0b3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedVersion {
    parts: Vec<u64>,
    beta: Option<u64>,
}

impl DottedVersion {
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (numeric, beta) = match trimmed.split_once('b') {
            Some((head, tail)) => (head, Some(tail.parse::<u64>().ok()?)),
            None => (trimmed, None),
        };

        let parts = numeric
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                part.parse::<u64>().ok()
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Self { parts, beta })
    }

    fn part(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.parts.len().max(other.parts.len());
        for index in 0..width {
            match self.part(index).cmp(&other.part(index)) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }

        // A beta sorts below the final release carrying the same numbers.
        match (self.beta, other.beta) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(left), Some(right)) => left.cmp(&right),
        }
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Component-wise numeric comparison; `None` when either side is not a dotted version.
pub fn compare_versions(left: &str, right: &str) -> Option<Ordering> {
    let left = DottedVersion::parse(left)?;
    let right = DottedVersion::parse(right)?;
    Some(left.cmp(&right))
}

/// True when `latest` is strictly newer than `current`. Unparseable versions that
/// differ are treated as an available update.
pub fn is_update_available(current: &str, latest: &str) -> bool {
    match compare_versions(current, latest) {
        Some(ordering) => ordering == Ordering::Less,
        None => current.trim() != latest.trim(),
    }
}

/// Accepts `N.N`, `N.N.N` and an optional `bN` beta suffix. Anything else is rejected
/// before it can be spliced into a download URL.
pub fn validate_version(version: &str) -> Result<(), LifecycleError> {
    let invalid = || LifecycleError::InvalidVersion(version.to_string());

    let (numeric, beta) = match version.split_once('b') {
        Some((head, tail)) => (head, Some(tail)),
        None => (version, None),
    };

    if let Some(beta) = beta {
        if beta.is_empty() || !beta.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
    }

    let parts: Vec<&str> = numeric.split('.').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }
    if parts
        .iter()
        .any(|part| part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid());
    }

    Ok(())
}
