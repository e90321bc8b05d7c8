use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use super::*;

#[test]
fn numeric_comparison_beats_string_order() {
    assert_eq!(compare_versions("9.0.1", "10.0.0"), Some(Ordering::Less));
    assert_eq!(compare_versions("9.0", "10.0"), Some(Ordering::Less));
    assert_eq!(compare_versions("121.0.1", "121.0"), Some(Ordering::Greater));
    assert_eq!(compare_versions("120", "120.0.0"), Some(Ordering::Equal));
}

#[test]
fn beta_sorts_below_final_release() {
    assert_eq!(compare_versions("122.0b3", "122.0"), Some(Ordering::Less));
    assert_eq!(compare_versions("122.0b3", "122.0b10"), Some(Ordering::Less));
    assert_eq!(compare_versions("122.0b9", "121.0.1"), Some(Ordering::Greater));
}

#[test]
fn comparison_rejects_non_numeric_components() {
    assert_eq!(compare_versions("120.x", "121.0"), None);
    assert_eq!(compare_versions("", "121.0"), None);
    assert_eq!(compare_versions("121..0", "121.0"), None);
}

#[test]
fn update_available_only_for_strictly_newer() {
    assert!(is_update_available("119.0", "120.0"));
    assert!(!is_update_available("100.0", "100.0"));
    assert!(!is_update_available("121.0.1", "121.0"));
    assert!(is_update_available("garbage", "121.0"));
    assert!(!is_update_available("same-garbage", "same-garbage"));
}

#[test]
fn version_info_reports_newer() {
    let info = VersionInfo::new("120.0", "", ReleaseChannel::Stable);
    assert!(info.is_newer_than("119.0.1"));
    assert!(!info.is_newer_than("120.0"));
}

#[test]
fn validate_version_accepts_release_and_beta_shapes() {
    for version in ["121.0", "121.0.1", "122.0b3"] {
        validate_version(version).expect("version must be accepted");
    }
}

#[test]
fn validate_version_rejects_injection_and_odd_shapes() {
    for version in ["", "121", "121.0.1.2", "121.0b", "121.0/../../etc", "121.0 ", "1a.0"] {
        let err = validate_version(version).expect_err("version must be rejected");
        assert!(matches!(err, LifecycleError::InvalidVersion(_)));
    }
}

#[test]
fn channel_tokens_round_trip() {
    for channel in [
        ReleaseChannel::Stable,
        ReleaseChannel::Beta,
        ReleaseChannel::DevEdition,
    ] {
        assert_eq!(ReleaseChannel::parse(channel.as_str()), Some(channel));
    }
    assert_eq!(ReleaseChannel::parse("release"), Some(ReleaseChannel::Stable));
    assert_eq!(ReleaseChannel::parse("nightly"), None);
    assert_eq!(ReleaseChannel::DevEdition.display_name(), "Developer Edition");
    assert_eq!(ReleaseChannel::Beta.version_key(), "LATEST_FIREFOX_DEVEL_VERSION");
}

#[test]
fn platform_artifact_names_match_cdn_layout() {
    assert_eq!(
        Platform::Win64.artifact_file_name("121.0"),
        "Firefox Setup 121.0.exe"
    );
    assert_eq!(
        Platform::Linux64.artifact_file_name("121.0"),
        "firefox-121.0.tar.xz"
    );
    assert_eq!(Platform::Mac.artifact_file_name("121.0"), "Firefox 121.0.dmg");
    assert_eq!(Platform::Linux64.archive_type(), ArchiveType::TarXz);
    assert_eq!(Platform::Win64.launcher_file_name(), "FirefoxPortable.bat");
}

#[test]
fn platform_artifacts_end_with_archive_suffix() {
    for platform in [Platform::Win64, Platform::Linux64, Platform::Mac] {
        let file_name = platform.artifact_file_name("121.0");
        let suffix = format!(".{}", platform.archive_type().as_str());
        assert!(
            file_name.ends_with(&suffix),
            "{file_name} must end with {suffix}"
        );
    }
}

#[test]
fn stage_progress_maps_into_stage_span() {
    let close = |actual: f32, expected: f32| (actual - expected).abs() < 1e-6;
    assert!(close(stage_progress(Flow::Create, Stage::Downloading, 0.0), 0.05));
    assert!(close(stage_progress(Flow::Create, Stage::Downloading, 1.0), 0.55));
    assert!(close(stage_progress(Flow::Update, Stage::Downloading, 0.5), 0.325));
    assert!(close(stage_progress(Flow::Update, Stage::Finalizing, 2.0), 1.0));
    assert!(close(stage_progress(Flow::Update, Stage::Extracting, -1.0), 0.60));
}

#[test]
fn stage_spans_are_contiguous_and_cover_unit_interval() {
    let order = [
        Stage::Validating,
        Stage::CheckingVersion,
        Stage::Downloading,
        Stage::Extracting,
        Stage::Building,
        Stage::Swapping,
        Stage::CleaningUp,
        Stage::Finalizing,
    ];
    for flow in [Flow::Update, Flow::Create] {
        let mut cursor = 0.0_f32;
        for stage in order {
            let (start, end) = stage_span(flow, stage);
            assert!((start - cursor).abs() < 1e-6, "{flow:?} {stage:?} gap");
            assert!(end >= start);
            cursor = end;
        }
        assert!((cursor - 1.0).abs() < 1e-6);
    }
}

#[test]
fn scoped_progress_rescales_events() {
    let seen = Mutex::new(Vec::new());
    {
        let sink = |event: ProgressEvent| seen.lock().expect("lock").push(event);
        let scoped_sink = scoped(Flow::Update, Stage::Extracting, &sink);
        scoped_sink(ProgressEvent::new("Extracting", 0.5));
    }

    let seen = seen.into_inner().expect("lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].status_text, "Extracting");
    assert!((seen[0].fraction - 0.70).abs() < 1e-6);
}

#[test]
fn progress_event_clamps_fraction() {
    assert_eq!(ProgressEvent::new("x", 1.5).fraction, 1.0);
    assert_eq!(ProgressEvent::new("x", f32::NAN).fraction, 0.0);
}

#[test]
fn cancel_token_is_shared_between_clones() {
    let token = CancelToken::new();
    let clone = token.clone();
    token.check().expect("not cancelled yet");
    clone.cancel();
    assert!(token.is_cancelled());
    assert!(matches!(token.check(), Err(LifecycleError::Cancelled)));
}

#[test]
fn config_defaults_and_partial_toml() {
    let config = PortfoxConfig::from_toml_str(
        r#"
locale = "de"
platform = "linux-x86_64"
resolve_timeout_secs = 10
"#,
    )
    .expect("config must parse");
    assert_eq!(config.locale, "de");
    assert_eq!(config.platform, Platform::Linux64);
    assert_eq!(config.resolve_timeout_secs, 10);
    assert_eq!(config.versions_url, DEFAULT_VERSIONS_URL);
    assert_eq!(config.chunk_size, 64 * 1024);
}

#[test]
fn config_rejects_unknown_keys_and_zero_timeouts() {
    assert!(PortfoxConfig::from_toml_str("mirror = \"x\"\n").is_err());
    assert!(PortfoxConfig::from_toml_str("resolve_timeout_secs = 0\n").is_err());
}

#[test]
fn config_env_overrides_apply_and_validate() {
    let env: HashMap<&str, &str> = HashMap::from([
        (ENV_PLATFORM, "win64"),
        (ENV_LOCALE, " fr "),
        (ENV_VERSIONS_URL, "http://127.0.0.1:9/versions.json"),
    ]);
    let mut config = PortfoxConfig::default();
    config
        .apply_env_overrides(|name| env.get(name).map(|value| value.to_string()))
        .expect("overrides must apply");
    assert_eq!(config.platform, Platform::Win64);
    assert_eq!(config.locale, "fr");
    assert_eq!(config.versions_url, "http://127.0.0.1:9/versions.json");
}

#[test]
fn config_env_override_rejects_unknown_platform() {
    let mut config = PortfoxConfig::default();
    let err = config
        .apply_env_overrides(|name| (name == ENV_PLATFORM).then(|| "amiga".to_string()))
        .expect_err("unknown platform must fail");
    assert!(
        err.to_string()
            .contains("invalid PORTFOX_PLATFORM value 'amiga'"),
        "unexpected error: {err}"
    );
}

#[test]
fn critical_rollback_message_names_backup_path() {
    let err = LifecycleError::CriticalRollbackFailed {
        backup: std::path::PathBuf::from("/portable/App/Firefox64.old"),
        swap_error: std::io::Error::other("swap"),
        rollback_error: std::io::Error::other("rollback"),
    };
    let message = err.to_string();
    assert!(message.contains("/portable/App/Firefox64.old"));
    assert!(message.contains("swap"));
    assert!(message.contains("rollback"));
    assert!(err.requires_manual_recovery());
    assert!(!err.is_retryable());
}
