use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::Platform;

pub const DEFAULT_VERSIONS_URL: &str = "https://product-details.mozilla.org/1.0/firefox_versions.json";
pub const DEFAULT_RELEASES_BASE_URL: &str =
    "https://download-installer.cdn.mozilla.net/pub/firefox/releases";
pub const DEFAULT_DEVEDITION_BASE_URL: &str =
    "https://download-installer.cdn.mozilla.net/pub/devedition/releases";
pub const DEFAULT_CONFIG_FILE_NAME: &str = "portfox.toml";

pub const ENV_VERSIONS_URL: &str = "PORTFOX_VERSIONS_URL";
pub const ENV_LOCALE: &str = "PORTFOX_LOCALE";
pub const ENV_PLATFORM: &str = "PORTFOX_PLATFORM";
pub const ENV_RESOLVE_TIMEOUT_SECS: &str = "PORTFOX_RESOLVE_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortfoxConfig {
    pub versions_url: String,
    pub releases_base_url: String,
    pub devedition_base_url: String,
    pub locale: String,
    pub platform: Platform,
    pub resolve_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub chunk_size: usize,
    pub user_agent: String,
}

impl Default for PortfoxConfig {
    fn default() -> Self {
        Self {
            versions_url: DEFAULT_VERSIONS_URL.to_string(),
            releases_base_url: DEFAULT_RELEASES_BASE_URL.to_string(),
            devedition_base_url: DEFAULT_DEVEDITION_BASE_URL.to_string(),
            locale: "en-US".to_string(),
            platform: Platform::host(),
            resolve_timeout_secs: 15,
            download_timeout_secs: 1800,
            chunk_size: 64 * 1024,
            user_agent: concat!("portfox/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl PortfoxConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse portfox config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` when given, else `portfox.toml` in the working directory if present,
    /// then applies `PORTFOX_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file: {}", path.display()))?;
                Self::from_toml_str(&raw)
                    .with_context(|| format!("invalid config file: {}", path.display()))?
            }
            None => match fs::read_to_string(DEFAULT_CONFIG_FILE_NAME) {
                Ok(raw) => Self::from_toml_str(&raw)
                    .with_context(|| format!("invalid config file: {DEFAULT_CONFIG_FILE_NAME}"))?,
                Err(err) if err.kind() == io::ErrorKind::NotFound => Self::default(),
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed to read config file: {DEFAULT_CONFIG_FILE_NAME}")
                    });
                }
            },
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = non_empty(lookup(ENV_VERSIONS_URL)) {
            self.versions_url = value;
        }
        if let Some(value) = non_empty(lookup(ENV_LOCALE)) {
            self.locale = value;
        }
        if let Some(value) = non_empty(lookup(ENV_PLATFORM)) {
            self.platform = parse_platform_override(&value, ENV_PLATFORM)?;
        }
        if let Some(value) = non_empty(lookup(ENV_RESOLVE_TIMEOUT_SECS)) {
            self.resolve_timeout_secs = value.parse::<u64>().map_err(|_| {
                anyhow!("invalid {ENV_RESOLVE_TIMEOUT_SECS} value '{value}'; expected whole seconds")
            })?;
        }
        self.validate()
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.resolve_timeout_secs == 0 {
            return Err(anyhow!("resolve_timeout_secs must be greater than zero"));
        }
        if self.download_timeout_secs == 0 {
            return Err(anyhow!("download_timeout_secs must be greater than zero"));
        }
        if self.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be greater than zero"));
        }
        if self.locale.trim().is_empty() || self.locale.contains(['/', '\\', ' ']) {
            return Err(anyhow!("invalid locale '{}'", self.locale));
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_platform_override(value: &str, var_name: &str) -> Result<Platform> {
    Platform::parse(value).ok_or_else(|| {
        anyhow!("invalid {var_name} value '{value}'; expected one of: win64, linux-x86_64, mac")
    })
}
