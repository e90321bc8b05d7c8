use super::*;
use std::io;
use std::path::Path;

use clap::error::ErrorKind;
use clap::CommandFactory;
use portfox_core::{ArchiveType, LifecycleError, VersionInfo};
use portfox_installer::{CreateReport, UpdateCheck, UpdateOutcome, UpdateReport, UpdateState};
use portfox_resolver::ReleaseDescriptor;

use crate::command_flows::{
    format_check_lines, format_create_lines, format_latest_lines, format_update_lines,
};
use crate::completion::write_completions_script;
use crate::render::{
    fraction_to_position, plain_status_key, render_progress_line, render_status_line,
    resolve_output_style, OutputStyle, PROGRESS_SCALE,
};

fn sample_descriptor(digest: Option<&str>) -> ReleaseDescriptor {
    ReleaseDescriptor {
        info: VersionInfo::new("121.0.1", "", ReleaseChannel::Stable),
        download_url: "https://download-installer.cdn.mozilla.net/pub/firefox/releases/121.0.1/linux-x86_64/en-US/firefox-121.0.1.tar.xz".to_string(),
        file_name: "firefox-121.0.1.tar.xz".to_string(),
        archive_type: ArchiveType::TarXz,
        digest: digest.map(str::to_string),
    }
}

fn report(
    old_version: &str,
    final_state: UpdateState,
    result: Result<UpdateOutcome, LifecycleError>,
) -> UpdateReport {
    UpdateReport {
        old_version: old_version.to_string(),
        new_version: "121.0.1".to_string(),
        final_state,
        result,
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn cli_parses_update_with_channel_and_global_flags() {
    let cli = Cli::try_parse_from([
        "portfox",
        "update",
        "/portable/firefox",
        "--channel",
        "devedition",
        "--plain",
        "--config",
        "custom.toml",
    ])
    .expect("must parse update command");

    assert!(cli.plain);
    assert_eq!(cli.config.as_deref(), Some(Path::new("custom.toml")));
    match cli.command {
        Commands::Update { root, channel } => {
            assert_eq!(root, Path::new("/portable/firefox"));
            assert_eq!(channel, Some(CliChannel::Devedition));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_defaults_create_channel_to_stable() {
    let cli = Cli::try_parse_from(["portfox", "create", "D:/Portable/Firefox"])
        .expect("must parse create command");
    match cli.command {
        Commands::Create { channel, .. } => assert_eq!(channel, CliChannel::Stable),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_rejects_unknown_channel() {
    let err = Cli::try_parse_from(["portfox", "latest", "--channel", "nightly"])
        .expect_err("unknown channel must be rejected");
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn cli_requires_root_for_check() {
    let err = Cli::try_parse_from(["portfox", "check"]).expect_err("root is required");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn cli_channels_map_to_release_channels() {
    assert_eq!(
        ReleaseChannel::from(CliChannel::Stable),
        ReleaseChannel::Stable
    );
    assert_eq!(ReleaseChannel::from(CliChannel::Beta), ReleaseChannel::Beta);
    assert_eq!(
        ReleaseChannel::from(CliChannel::Devedition),
        ReleaseChannel::DevEdition
    );
}

#[test]
fn completions_script_names_binary_and_subcommands() {
    for shell in [
        CliCompletionShell::Bash,
        CliCompletionShell::Zsh,
        CliCompletionShell::Fish,
        CliCompletionShell::Powershell,
    ] {
        let mut output = Vec::new();
        write_completions_script(shell, &mut output).expect("must write completions");
        let script = String::from_utf8(output).expect("completions must be utf-8");
        assert!(script.contains("portfox"), "{shell:?} script lacks binary name");
        assert!(script.contains("update"), "{shell:?} script lacks subcommands");
    }
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "updated Firefox 120.0 -> 121.0"),
        "updated Firefox 120.0 -> 121.0"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "up to date"),
        "[OK] up to date"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "no published SHA-512 checksum"),
        "[WARN] no published SHA-512 checksum"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "err", "manual recovery required"),
        "[ERR] manual recovery required"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "step", "latest: 121.0.1"),
        "[..] latest: 121.0.1"
    );
}

#[test]
fn output_style_falls_back_to_plain() {
    assert_eq!(resolve_output_style(false, None, true), OutputStyle::Rich);
    assert_eq!(resolve_output_style(true, None, true), OutputStyle::Plain);
    assert_eq!(resolve_output_style(false, Some("1"), true), OutputStyle::Plain);
    assert_eq!(resolve_output_style(false, Some(""), true), OutputStyle::Rich);
    assert_eq!(resolve_output_style(false, None, false), OutputStyle::Plain);
}

#[test]
fn plain_status_key_ignores_counters() {
    assert_eq!(
        plain_status_key("Downloading: 1.0 / 80.0 MB"),
        plain_status_key("Downloading: 2.5 / 80.0 MB")
    );
    assert_eq!(plain_status_key("Extracting..."), "Extracting");
    assert_ne!(
        plain_status_key("Downloading: 1.0 MB"),
        plain_status_key("Extracting...")
    );
}

#[test]
fn fraction_to_position_clamps_to_scale() {
    assert_eq!(fraction_to_position(0.0), 0);
    assert_eq!(fraction_to_position(0.5), PROGRESS_SCALE / 2);
    assert_eq!(fraction_to_position(1.5), PROGRESS_SCALE);
    assert_eq!(fraction_to_position(-1.0), 0);
    assert_eq!(fraction_to_position(f32::NAN), 0);
}

#[test]
fn progress_line_is_rich_only() {
    assert!(render_progress_line(OutputStyle::Plain, "update", PROGRESS_SCALE, None).is_none());
    let line = render_progress_line(
        OutputStyle::Rich,
        "update",
        PROGRESS_SCALE,
        Some(std::time::Duration::from_millis(1500)),
    )
    .expect("rich output must render progress line");
    assert!(line.contains("100%"), "unexpected line: {line}");
    assert!(line.contains("complete in 1.500s"), "unexpected line: {line}");
}

#[test]
fn latest_lines_show_digest_or_warning() {
    let digest = "ab".repeat(64);
    let lines = format_latest_lines(
        ReleaseChannel::Stable,
        &sample_descriptor(Some(&digest)),
        OutputStyle::Plain,
    );
    assert_eq!(lines[0], "Firefox Stable 121.0.1");
    assert_eq!(lines[1], "artifact: firefox-121.0.1.tar.xz (tar.xz)");
    assert_eq!(lines[3], format!("sha512: {digest}"));

    let lines = format_latest_lines(
        ReleaseChannel::Stable,
        &sample_descriptor(None),
        OutputStyle::Rich,
    );
    assert_eq!(
        lines.last().map(String::as_str),
        Some("[WARN] no published SHA-512 checksum")
    );
}

#[test]
fn check_lines_report_available_update() {
    let check = UpdateCheck {
        channel: ReleaseChannel::Beta,
        current_version: "121.0b3".to_string(),
        latest_version: "122.0b1".to_string(),
        update_available: true,
    };
    assert_eq!(
        format_check_lines(&check, OutputStyle::Plain),
        vec![
            "channel: Beta".to_string(),
            "installed: 121.0b3".to_string(),
            "latest: 122.0b1".to_string(),
            "update available: 121.0b3 -> 122.0b1".to_string(),
        ]
    );
}

#[test]
fn update_lines_summarize_success() {
    let updated = report(
        "120.0",
        UpdateState::Done,
        Ok(UpdateOutcome::Updated {
            old_version: "120.0".to_string(),
            new_version: "121.0.1".to_string(),
            build_id: "20231219164548".to_string(),
        }),
    );
    assert_eq!(
        format_update_lines(&updated, OutputStyle::Rich),
        vec![
            "[OK] updated Firefox 120.0 -> 121.0.1".to_string(),
            "[..] build id: 20231219164548".to_string(),
        ]
    );

    let current = report(
        "121.0.1",
        UpdateState::Done,
        Ok(UpdateOutcome::AlreadyUpToDate {
            version: "121.0.1".to_string(),
        }),
    );
    assert_eq!(
        format_update_lines(&current, OutputStyle::Plain),
        vec!["Firefox 121.0.1 is already up to date".to_string()]
    );
}

#[test]
fn update_lines_explain_rollback_and_critical_failure() {
    let rolled_back = report(
        "120.0",
        UpdateState::RolledBack,
        Err(LifecycleError::SwapFailed {
            live: "/portable/App/Firefox64".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "locked"),
        }),
    );
    assert_eq!(
        format_update_lines(&rolled_back, OutputStyle::Plain),
        vec!["update rolled back; Firefox 120.0 was restored".to_string()]
    );

    let critical = report(
        "120.0",
        UpdateState::Error,
        Err(LifecycleError::CriticalRollbackFailed {
            backup: "/portable/App/Firefox64.old".into(),
            swap_error: io::Error::new(io::ErrorKind::PermissionDenied, "locked"),
            rollback_error: io::Error::new(io::ErrorKind::PermissionDenied, "locked"),
        }),
    );
    assert_eq!(
        format_update_lines(&critical, OutputStyle::Rich),
        vec!["[ERR] manual recovery required; see the error below".to_string()]
    );

    let offline = report(
        "120.0",
        UpdateState::Error,
        Err(LifecycleError::Timeout {
            url: "https://product-details.mozilla.org/1.0/firefox_versions.json".to_string(),
            after_secs: 15,
        }),
    );
    assert_eq!(
        format_update_lines(&offline, OutputStyle::Plain),
        vec!["network problem; retry the update later".to_string()]
    );
}

#[test]
fn create_lines_include_launcher_and_size() {
    let created = CreateReport {
        root: "/portable".into(),
        launcher: "/portable/firefox-portable.sh".into(),
        version: "121.0.1".to_string(),
        channel: ReleaseChannel::Stable,
        size_mb: 245.26,
    };
    assert_eq!(
        format_create_lines(&created, OutputStyle::Plain),
        vec![
            "created portable Firefox 121.0.1 (Stable) at /portable".to_string(),
            "launcher: /portable/firefox-portable.sh".to_string(),
            "size: 245.3 MB".to_string(),
        ]
    );
}
