use std::time::Duration;

use portfox_core::{
    validate_version, BoxError, LifecycleError, PortfoxConfig, ReleaseChannel, VersionInfo,
};
use portfox_security::parse_sha512sums;
use reqwest::blocking::Client;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{artifact_urls, ReleaseDescriptor, VersionResolver};

/// Resolves channels against the product-details `firefox_versions.json` document and
/// the release tree's `SHA512SUMS`.
pub struct ProductDetailsResolver {
    client: Client,
    config: PortfoxConfig,
}

impl ProductDetailsResolver {
    pub fn new(config: PortfoxConfig) -> Result<Self, LifecycleError> {
        let client = Client::builder()
            .timeout(config.resolve_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| LifecycleError::network("failed to build HTTP client", err))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &PortfoxConfig {
        &self.config
    }

    /// Latest published version string for `channel`.
    pub fn latest_version(&self, channel: ReleaseChannel) -> Result<String, LifecycleError> {
        let url = &self.config.versions_url;
        let body = get_text(&self.client, url, self.config.resolve_timeout())?;
        let version = parse_channel_version(&body, channel).map_err(|err| match err {
            ParseFailure::Missing => LifecycleError::NotFound {
                channel: channel.as_str().to_string(),
            },
            ParseFailure::Malformed(source) => {
                LifecycleError::network(format!("invalid release metadata from {url}"), source)
            }
        })?;

        info!(channel = channel.as_str(), version = %version, "resolved latest Firefox version");
        Ok(version)
    }

    fn published_digest(&self, sums_url: &str, sums_entry: &str) -> Option<String> {
        match get_text(&self.client, sums_url, self.config.resolve_timeout()) {
            Ok(body) => {
                let digest = parse_sha512sums(&body, sums_entry);
                if digest.is_none() {
                    warn!(entry = sums_entry, "SHA-512 checksum not listed in SHA512SUMS");
                }
                digest
            }
            Err(err) => {
                warn!(url = sums_url, error = %err, "could not fetch SHA512SUMS");
                None
            }
        }
    }
}

impl VersionResolver for ProductDetailsResolver {
    fn resolve(&self, channel: ReleaseChannel) -> Result<ReleaseDescriptor, LifecycleError> {
        let version = self.latest_version(channel)?;
        let urls = artifact_urls(&self.config, channel, &version)?;
        let digest = self.published_digest(&urls.sums_url, &urls.sums_entry);

        Ok(ReleaseDescriptor {
            info: VersionInfo::new(version, "", channel),
            download_url: urls.download_url,
            file_name: urls.file_name,
            archive_type: self.config.platform.archive_type(),
            digest,
        })
    }
}

pub(crate) enum ParseFailure {
    Missing,
    Malformed(BoxError),
}

pub(crate) fn parse_channel_version(
    body: &str,
    channel: ReleaseChannel,
) -> Result<String, ParseFailure> {
    let document: Map<String, Value> =
        serde_json::from_str(body).map_err(|err| ParseFailure::Malformed(err.into()))?;

    let version = match document.get(channel.version_key()) {
        None | Some(Value::Null) => return Err(ParseFailure::Missing),
        Some(Value::String(version)) if version.trim().is_empty() => {
            return Err(ParseFailure::Missing)
        }
        Some(Value::String(version)) => version.trim().to_string(),
        Some(other) => {
            return Err(ParseFailure::Malformed(
                LifecycleError::InvalidVersion(other.to_string()).into(),
            ))
        }
    };

    validate_version(&version).map_err(|err| ParseFailure::Malformed(err.into()))?;
    Ok(version)
}

fn get_text(client: &Client, url: &str, timeout: Duration) -> Result<String, LifecycleError> {
    let response = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(|err| map_request_error(url, timeout, err))?;
    response
        .text()
        .map_err(|err| map_request_error(url, timeout, err))
}

/// Converts a transport failure into the lifecycle taxonomy, keeping the cause.
pub fn map_request_error(url: &str, timeout: Duration, err: reqwest::Error) -> LifecycleError {
    if err.is_timeout() {
        return LifecycleError::Timeout {
            url: url.to_string(),
            after_secs: timeout.as_secs(),
        };
    }
    if let Some(status) = err.status() {
        return LifecycleError::network(format!("{url} returned HTTP {status}"), err);
    }
    LifecycleError::network(format!("failed to reach {url}"), err)
}
