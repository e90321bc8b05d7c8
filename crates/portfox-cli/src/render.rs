use std::io::IsTerminal;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use portfox_core::ProgressEvent;

/// Resolution of the lifecycle's 0.0..=1.0 fraction on the terminal bar.
pub(crate) const PROGRESS_SCALE: u64 = 1000;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
enum Tone {
    Heading,
    Label,
    Bar,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

/// Progress display fed from a worker thread.
pub(crate) struct TerminalProgress {
    style: OutputStyle,
    label: String,
    progress_bar: Option<ProgressBar>,
    last_plain_key: Mutex<String>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    /// Rich output gets a highlighted banner; plain output stays quiet until the first stage.
    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Rich {
            println!("\n{}", paint(Tone::Heading, &format!("== {title} ==")));
        }
    }

    pub(crate) fn start_progress(self, label: &str) -> TerminalProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(PROGRESS_SCALE);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.magenta} {prefix:.bold} [{bar:30.cyan}] {percent:>3}% {wide_msg}",
            ) {
                progress_bar.set_style(
                    style
                        .tick_chars(progress_tick_chars(label))
                        .progress_chars("#>."),
                );
            }
            progress_bar.set_prefix(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            progress_bar,
            last_plain_key: Mutex::new(String::new()),
            started_at: Instant::now(),
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

impl TerminalProgress {
    pub(crate) fn report(&self, event: &ProgressEvent) {
        match &self.progress_bar {
            Some(progress_bar) => {
                progress_bar.set_position(fraction_to_position(event.fraction));
                progress_bar.set_message(event.status_text.clone());
            }
            None => {
                let key = plain_status_key(&event.status_text);
                let mut last = self
                    .last_plain_key
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if *last != key {
                    *last = key.to_string();
                    println!("{}", event.status_text);
                }
            }
        }
    }

    pub(crate) fn finish_success(&self) {
        let Some(progress_bar) = &self.progress_bar else {
            return;
        };

        progress_bar.finish_and_clear();
        if let Some(line) = render_progress_line(
            self.style,
            &self.label,
            PROGRESS_SCALE,
            Some(self.started_at.elapsed()),
        ) {
            println!("{line}");
        }
    }

    pub(crate) fn finish_abandon(&self) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.finish_and_clear();
        }
    }
}

pub(crate) fn fraction_to_position(fraction: f32) -> u64 {
    let bounded = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    (bounded * PROGRESS_SCALE as f32).round() as u64
}

/// Status lines that only differ in their counters ("Downloading: 3.0 / 80.0 MB")
/// share a key, so plain output prints each stage once.
pub(crate) fn plain_status_key(status_text: &str) -> &str {
    status_text
        .split(':')
        .next()
        .unwrap_or(status_text)
        .trim()
        .trim_end_matches('.')
}

/// Rich output when stdout is a terminal and `NO_COLOR` is unset, unless forced plain.
pub(crate) fn resolve_output_style(
    force_plain: bool,
    no_color: Option<&str>,
    stdout_is_terminal: bool,
) -> OutputStyle {
    let no_color = no_color.is_some_and(|value| !value.is_empty());
    if force_plain || no_color || !stdout_is_terminal {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn current_output_style(force_plain: bool) -> OutputStyle {
    let no_color = std::env::var("NO_COLOR").ok();
    resolve_output_style(
        force_plain,
        no_color.as_deref(),
        std::io::stdout().is_terminal(),
    )
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" | "error" => "[ERR]",
        _ => "[..]",
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

fn progress_tick_chars(label: &str) -> &'static str {
    match label {
        "update" => "-=≡=- ",
        "create" => ".oO0Oo. ",
        _ => "|/-\\ ",
    }
}

fn paint(tone: Tone, text: &str) -> String {
    let style = match tone {
        Tone::Heading => Style::new()
            .fg_color(Some(AnsiColor::Magenta.into()))
            .effects(Effects::BOLD),
        Tone::Label => Style::new().effects(Effects::BOLD),
        Tone::Bar => Style::new().fg_color(Some(AnsiColor::Cyan.into())),
    };
    format!("{}{text}{}", style.render(), style.render_reset())
}

const SUMMARY_BAR_WIDTH: u64 = 20;

/// One-line summary printed after the live bar is cleared; `None` in plain mode.
pub(crate) fn render_progress_line(
    style: OutputStyle,
    label: &str,
    position: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let position = position.min(PROGRESS_SCALE);
    let filled = position * SUMMARY_BAR_WIDTH / PROGRESS_SCALE;
    let bar: String = (0..SUMMARY_BAR_WIDTH)
        .map(|cell| if cell < filled { '#' } else { '.' })
        .collect();
    let mut line = format!(
        "{} [{}] {:>3}%",
        paint(Tone::Label, label),
        paint(Tone::Bar, &bar),
        position * 100 / PROGRESS_SCALE
    );
    if let Some(elapsed) = elapsed {
        line.push_str(&format!(" complete in {}", format_elapsed(elapsed)));
    }
    Some(line)
}
