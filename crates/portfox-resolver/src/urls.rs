use portfox_core::{validate_version, LifecycleError, PortfoxConfig, ReleaseChannel};

use crate::ArtifactUrls;

pub fn artifact_urls(
    config: &PortfoxConfig,
    channel: ReleaseChannel,
    version: &str,
) -> Result<ArtifactUrls, LifecycleError> {
    validate_version(version)?;

    let base = if channel.uses_devedition_tree() {
        &config.devedition_base_url
    } else {
        &config.releases_base_url
    };
    let base = base.trim_end_matches('/');
    let platform = config.platform.as_str();
    let file_name = config.platform.artifact_file_name(version);
    let sums_entry = format!("{platform}/{}/{file_name}", config.locale);

    Ok(ArtifactUrls {
        download_url: format!("{base}/{version}/{}", encode_path(&sums_entry)),
        sums_url: format!("{base}/{version}/SHA512SUMS"),
        sums_entry,
        file_name,
    })
}

fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use portfox_core::Platform;

    use super::*;

    fn config(platform: Platform) -> PortfoxConfig {
        PortfoxConfig {
            platform,
            ..PortfoxConfig::default()
        }
    }

    #[test]
    fn stable_windows_urls_encode_spaces() {
        let urls = artifact_urls(&config(Platform::Win64), ReleaseChannel::Stable, "121.0")
            .expect("urls must build");
        assert_eq!(
            urls.download_url,
            "https://download-installer.cdn.mozilla.net/pub/firefox/releases/121.0/win64/en-US/Firefox%20Setup%20121.0.exe"
        );
        assert_eq!(
            urls.sums_url,
            "https://download-installer.cdn.mozilla.net/pub/firefox/releases/121.0/SHA512SUMS"
        );
        assert_eq!(urls.sums_entry, "win64/en-US/Firefox Setup 121.0.exe");
    }

    #[test]
    fn devedition_uses_its_own_tree() {
        let urls = artifact_urls(
            &config(Platform::Linux64),
            ReleaseChannel::DevEdition,
            "122.0b3",
        )
        .expect("urls must build");
        assert_eq!(
            urls.download_url,
            "https://download-installer.cdn.mozilla.net/pub/devedition/releases/122.0b3/linux-x86_64/en-US/firefox-122.0b3.tar.xz"
        );
    }

    #[test]
    fn rejects_versions_that_could_escape_the_url() {
        let err = artifact_urls(
            &config(Platform::Linux64),
            ReleaseChannel::Stable,
            "121.0/../../evil",
        )
        .expect_err("invalid version must be rejected");
        assert!(matches!(err, LifecycleError::InvalidVersion(_)));
    }
}
