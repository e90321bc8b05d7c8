mod create;
mod download;
mod extract;
mod fs_utils;
mod guards;
mod layout;
mod metadata;
mod structure;
mod update;
mod workers;

pub use create::{validate_destination, CreateReport, PortableCreator};
pub use download::{
    download_progress, part_path_for, ArtifactDownloader, DownloadTask, HttpDownloader,
};
pub use extract::{ArchiveExtractor, PayloadExtractor, DEFAULT_TOOL_TIMEOUT};
pub use fs_utils::{remove_dir_if_exists, remove_file_if_exists};
pub use guards::{
    contains_system_install, host_system_install_dirs, is_within_system_install,
    system_install_dirs, NoProcessProbe, ProcessProbe, SystemProcessProbe,
};
pub use layout::{
    backup_sibling, staging_sibling, PortableLayout, APP_DIR_NAME, DATA_DIR_NAME,
    METADATA_FILE_NAME, PROFILE_DIR_NAME,
};
pub use metadata::{
    current_timestamp, find_app_dir, parse_application_ini, read_installed_version,
    read_metadata, write_metadata, InstalledVersion, PortableInstallation, PortableMetadata,
    APP_DIR_CANDIDATES,
};
pub use structure::{launcher_script, BuiltPortable, PortableStructureBuilder};
pub use update::{
    Renamer, UpdateCheck, UpdateCoordinator, UpdateOutcome, UpdateReport, UpdateState,
};
pub use workers::{OperationKind, TaskHandle, WorkerState, Workers};
