use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use portfox_core::{PortfoxConfig, ProgressEvent, ReleaseChannel};
use portfox_installer::{
    CreateReport, OperationKind, PortableCreator, UpdateCheck, UpdateCoordinator, UpdateOutcome,
    UpdateReport, UpdateState, Workers,
};
use portfox_resolver::{ProductDetailsResolver, ReleaseDescriptor, VersionResolver};
use tracing::debug;

use crate::render::{render_status_line, OutputStyle, TerminalRenderer};

pub(crate) fn run_latest_command(
    config: &PortfoxConfig,
    channel: ReleaseChannel,
) -> Result<ReleaseDescriptor> {
    let resolver = ProductDetailsResolver::new(config.clone())?;
    resolver.resolve(channel).with_context(|| {
        format!(
            "failed to resolve the latest {} release",
            channel.display_name()
        )
    })
}

pub(crate) fn run_check_command(
    workers: &Workers,
    config: &PortfoxConfig,
    root: &Path,
    channel: Option<ReleaseChannel>,
) -> Result<UpdateCheck> {
    let coordinator = UpdateCoordinator::from_config(config)?.with_channel(channel);
    let target = root.to_path_buf();
    let handle = workers.spawn(OperationKind::Check, root, move |_cancel| {
        coordinator.check_for_update(&target)
    })?;
    let check = handle.join()??;
    Ok(check)
}

pub(crate) fn run_update_command(
    workers: &Workers,
    config: &PortfoxConfig,
    root: &Path,
    channel: Option<ReleaseChannel>,
    renderer: TerminalRenderer,
) -> Result<UpdateReport> {
    let coordinator = UpdateCoordinator::from_config(config)?.with_channel(channel);
    renderer.print_section(&format!("Updating {}", root.display()));

    let progress = Arc::new(renderer.start_progress("update"));
    let worker_progress = Arc::clone(&progress);
    let target = root.to_path_buf();
    let spawned = workers.spawn(OperationKind::Update, root, move |cancel| {
        let sink = |event: ProgressEvent| worker_progress.report(&event);
        coordinator.run(&target, &sink, &cancel)
    });

    let report = match spawned.and_then(|handle| handle.join()) {
        Ok(report) => report,
        Err(err) => {
            progress.finish_abandon();
            return Err(err.into());
        }
    };
    if report.success() {
        progress.finish_success();
    } else {
        progress.finish_abandon();
    }
    debug!(state = report.final_state.as_str(), "update finished");
    Ok(report)
}

pub(crate) fn run_create_command(
    workers: &Workers,
    config: &PortfoxConfig,
    destination: &Path,
    channel: ReleaseChannel,
    renderer: TerminalRenderer,
) -> Result<CreateReport> {
    let creator = PortableCreator::from_config(config)?;
    renderer.print_section(&format!(
        "Creating portable Firefox {} in {}",
        channel.display_name(),
        destination.display()
    ));

    let progress = Arc::new(renderer.start_progress("create"));
    let worker_progress = Arc::clone(&progress);
    let target = destination.to_path_buf();
    let spawned = workers.spawn(OperationKind::Create, destination, move |cancel| {
        let sink = |event: ProgressEvent| worker_progress.report(&event);
        creator.create(channel, &target, &sink, &cancel)
    });

    match spawned.and_then(|handle| handle.join()).and_then(|result| result) {
        Ok(report) => {
            progress.finish_success();
            Ok(report)
        }
        Err(err) => {
            progress.finish_abandon();
            Err(err.into())
        }
    }
}

pub(crate) fn format_latest_lines(
    channel: ReleaseChannel,
    descriptor: &ReleaseDescriptor,
    style: OutputStyle,
) -> Vec<String> {
    let mut lines = vec![
        render_status_line(
            style,
            "ok",
            &format!(
                "Firefox {} {}",
                channel.display_name(),
                descriptor.info.version
            ),
        ),
        render_status_line(
            style,
            "step",
            &format!(
                "artifact: {} ({})",
                descriptor.file_name,
                descriptor.archive_type.as_str()
            ),
        ),
        render_status_line(style, "step", &format!("url: {}", descriptor.download_url)),
    ];
    lines.push(match &descriptor.digest {
        Some(digest) => render_status_line(style, "step", &format!("sha512: {digest}")),
        None => render_status_line(style, "warn", "no published SHA-512 checksum"),
    });
    lines
}

pub(crate) fn format_check_lines(check: &UpdateCheck, style: OutputStyle) -> Vec<String> {
    let verdict = if check.update_available {
        render_status_line(
            style,
            "ok",
            &format!(
                "update available: {} -> {}",
                check.current_version, check.latest_version
            ),
        )
    } else {
        render_status_line(style, "ok", "up to date")
    };

    vec![
        render_status_line(
            style,
            "step",
            &format!("channel: {}", check.channel.display_name()),
        ),
        render_status_line(
            style,
            "step",
            &format!("installed: {}", check.current_version),
        ),
        render_status_line(style, "step", &format!("latest: {}", check.latest_version)),
        verdict,
    ]
}

/// Summary lines for an update. Failures only get context lines here; the error itself
/// is returned to `main`.
pub(crate) fn format_update_lines(report: &UpdateReport, style: OutputStyle) -> Vec<String> {
    match &report.result {
        Ok(UpdateOutcome::AlreadyUpToDate { version }) => vec![render_status_line(
            style,
            "ok",
            &format!("Firefox {version} is already up to date"),
        )],
        Ok(UpdateOutcome::Updated {
            old_version,
            new_version,
            build_id,
        }) => {
            let mut lines = vec![render_status_line(
                style,
                "ok",
                &format!("updated Firefox {old_version} -> {new_version}"),
            )];
            if !build_id.is_empty() {
                lines.push(render_status_line(
                    style,
                    "step",
                    &format!("build id: {build_id}"),
                ));
            }
            lines
        }
        Err(err) => {
            let mut lines = Vec::new();
            if report.final_state == UpdateState::RolledBack {
                lines.push(render_status_line(
                    style,
                    "warn",
                    &format!(
                        "update rolled back; Firefox {} was restored",
                        report.old_version
                    ),
                ));
            }
            if err.requires_manual_recovery() {
                lines.push(render_status_line(
                    style,
                    "err",
                    "manual recovery required; see the error below",
                ));
            }
            if err.is_retryable() {
                lines.push(render_status_line(
                    style,
                    "step",
                    "network problem; retry the update later",
                ));
            }
            lines
        }
    }
}

pub(crate) fn format_create_lines(report: &CreateReport, style: OutputStyle) -> Vec<String> {
    vec![
        render_status_line(
            style,
            "ok",
            &format!(
                "created portable Firefox {} ({}) at {}",
                report.version,
                report.channel.display_name(),
                report.root.display()
            ),
        ),
        render_status_line(
            style,
            "step",
            &format!("launcher: {}", report.launcher.display()),
        ),
        render_status_line(style, "step", &format!("size: {:.1} MB", report.size_mb)),
    ]
}
