use crate::checksum::is_sha512_hex;

/// Looks up `entry` (e.g. `win64/en-US/Firefox Setup 121.0.exe`) in a `SHA512SUMS`
/// document and returns its lowercase digest.
pub fn parse_sha512sums(content: &str, entry: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let (digest, name) = line.split_once(char::is_whitespace)?;
        let name = name.trim_start();
        let name = name.strip_prefix('*').unwrap_or(name).trim_end();
        if name != entry || !is_sha512_hex(digest) {
            return None;
        }
        Some(digest.to_ascii_lowercase())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(fill: char) -> String {
        std::iter::repeat(fill).take(128).collect()
    }

    #[test]
    fn finds_entry_with_spaces_in_name() {
        let content = format!(
            "{}  linux-x86_64/en-US/firefox-121.0.tar.xz\n{}  win64/en-US/Firefox Setup 121.0.exe\n",
            digest('a'),
            digest('B')
        );
        assert_eq!(
            parse_sha512sums(&content, "win64/en-US/Firefox Setup 121.0.exe"),
            Some(digest('b'))
        );
    }

    #[test]
    fn accepts_binary_marker() {
        let content = format!("{} *mac/en-US/Firefox 121.0.dmg\n", digest('c'));
        assert_eq!(
            parse_sha512sums(&content, "mac/en-US/Firefox 121.0.dmg"),
            Some(digest('c'))
        );
    }

    #[test]
    fn ignores_prefix_matches_and_short_digests() {
        let content = format!(
            "{}  win64/en-US/Firefox Setup 121.0.exe.asc\nabc  win64/en-US/Firefox Setup 121.0.exe\n",
            digest('d')
        );
        assert_eq!(
            parse_sha512sums(&content, "win64/en-US/Firefox Setup 121.0.exe"),
            None
        );
    }
}
