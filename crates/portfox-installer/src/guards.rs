use std::path::{Path, PathBuf};
use std::process::Command;

use portfox_core::Platform;
use tracing::debug;

use crate::fs_utils::run_command;

/// Answers whether the browser is currently running. Advisory only: a process can start
/// right after the probe, so callers still rely on rename failures.
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, platform: Platform) -> bool;
}

/// Queries the OS process table with `tasklist` on Windows and `pgrep` elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    fn is_running(&self, platform: Platform) -> bool {
        let process_name = platform.process_name();
        if cfg!(windows) {
            let mut command = build_tasklist_command(process_name);
            return match command.output() {
                Ok(output) => {
                    tasklist_lists_process(&String::from_utf8_lossy(&output.stdout), process_name)
                }
                Err(err) => {
                    debug!(error = %err, "tasklist unavailable; assuming browser is not running");
                    false
                }
            };
        }

        // pgrep exits 1 when nothing matched, so any failure reads as "not running".
        let mut command = build_pgrep_command(process_name);
        match run_command(&mut command, "pgrep found no matching process") {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "process probe reported no running browser");
                false
            }
        }
    }
}

/// Probe for callers that want the check skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProcessProbe;

impl ProcessProbe for NoProcessProbe {
    fn is_running(&self, _platform: Platform) -> bool {
        false
    }
}

pub(crate) fn build_tasklist_command(process_name: &str) -> Command {
    let mut command = Command::new("tasklist");
    command
        .arg("/FI")
        .arg(format!("IMAGENAME eq {process_name}"))
        .arg("/NH");
    command
}

pub(crate) fn build_pgrep_command(process_name: &str) -> Command {
    let mut command = Command::new("pgrep");
    command.arg("-x").arg(process_name);
    command
}

pub(crate) fn tasklist_lists_process(stdout: &str, process_name: &str) -> bool {
    stdout.lines().any(|line| {
        line.split_whitespace()
            .next()
            .is_some_and(|image| image.eq_ignore_ascii_case(process_name))
    })
}

/// Directories of system-wide Firefox installs, which the lifecycle never touches.
pub fn system_install_dirs<F>(lookup: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let program_files =
        lookup("ProgramFiles").unwrap_or_else(|| r"C:\Program Files".to_string());
    let program_files_x86 =
        lookup("ProgramFiles(x86)").unwrap_or_else(|| r"C:\Program Files (x86)".to_string());

    vec![
        PathBuf::from(program_files).join("Mozilla Firefox"),
        PathBuf::from(program_files_x86).join("Mozilla Firefox"),
        PathBuf::from("/usr/lib/firefox"),
        PathBuf::from("/usr/lib64/firefox"),
        PathBuf::from("/opt/firefox"),
        PathBuf::from("/Applications/Firefox.app"),
    ]
}

pub fn host_system_install_dirs() -> Vec<PathBuf> {
    system_install_dirs(|name| std::env::var(name).ok())
}

/// True when `path` is one of `system_dirs` or lies inside one.
pub fn is_within_system_install(path: &Path, system_dirs: &[PathBuf]) -> bool {
    let resolved = resolve_lossy(path);
    system_dirs.iter().any(|dir| resolved.starts_with(resolve_lossy(dir)))
}

/// True when `path` is a strict ancestor of an existing entry of `system_dirs`.
pub fn contains_system_install(path: &Path, system_dirs: &[PathBuf]) -> bool {
    let resolved = resolve_lossy(path);
    system_dirs.iter().filter(|dir| dir.exists()).any(|dir| {
        let dir = resolve_lossy(dir);
        dir != resolved && dir.starts_with(&resolved)
    })
}

fn resolve_lossy(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
