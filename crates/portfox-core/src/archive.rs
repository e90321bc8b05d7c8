#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    TarGz,
    TarXz,
    TarBz2,
    Exe,
    Dmg,
}

impl ArchiveType {
    /// File-name suffix, without the leading dot.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
            Self::TarBz2 => "tar.bz2",
            Self::Exe => "exe",
            Self::Dmg => "dmg",
        }
    }
}
