use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::LifecycleError;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub status_text: String,
    pub fraction: f32,
}

impl ProgressEvent {
    pub fn new(status_text: impl Into<String>, fraction: f32) -> Self {
        Self {
            status_text: status_text.into(),
            fraction: clamp_fraction(fraction),
        }
    }
}

fn clamp_fraction(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Progress sink. May be invoked from a worker thread.
pub type ProgressFn<'a> = &'a (dyn Fn(ProgressEvent) + Sync);

pub fn no_progress(_event: ProgressEvent) {}

/// Cooperative cancellation flag. Setting it only affects the next checked boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), LifecycleError> {
        if self.is_cancelled() {
            return Err(LifecycleError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Update,
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    CheckingVersion,
    Downloading,
    Extracting,
    Building,
    Swapping,
    CleaningUp,
    Finalizing,
}

/// Global span `[start, end]` each stage occupies in a flow.
///
/// | stage           | update      | create      |
/// |-----------------|-------------|-------------|
/// | Validating      | 0.00 - 0.00 | 0.00 - 0.02 |
/// | CheckingVersion | 0.00 - 0.05 | 0.02 - 0.05 |
/// | Downloading     | 0.05 - 0.60 | 0.05 - 0.55 |
/// | Extracting      | 0.60 - 0.80 | 0.55 - 0.75 |
/// | Building        | 0.80 - 0.80 | 0.75 - 0.95 |
/// | Swapping        | 0.80 - 0.90 | 0.95 - 0.95 |
/// | CleaningUp      | 0.90 - 0.95 | 0.95 - 0.98 |
/// | Finalizing      | 0.95 - 1.00 | 0.98 - 1.00 |
///
/// Stages a flow never runs have zero width so the table stays monotonic.
pub fn stage_span(flow: Flow, stage: Stage) -> (f32, f32) {
    match (flow, stage) {
        (Flow::Update, Stage::Validating) => (0.0, 0.0),
        (Flow::Update, Stage::CheckingVersion) => (0.0, 0.05),
        (Flow::Update, Stage::Downloading) => (0.05, 0.60),
        (Flow::Update, Stage::Extracting) => (0.60, 0.80),
        (Flow::Update, Stage::Building) => (0.80, 0.80),
        (Flow::Update, Stage::Swapping) => (0.80, 0.90),
        (Flow::Update, Stage::CleaningUp) => (0.90, 0.95),
        (Flow::Update, Stage::Finalizing) => (0.95, 1.0),
        (Flow::Create, Stage::Validating) => (0.0, 0.02),
        (Flow::Create, Stage::CheckingVersion) => (0.02, 0.05),
        (Flow::Create, Stage::Downloading) => (0.05, 0.55),
        (Flow::Create, Stage::Extracting) => (0.55, 0.75),
        (Flow::Create, Stage::Building) => (0.75, 0.95),
        (Flow::Create, Stage::Swapping) => (0.95, 0.95),
        (Flow::Create, Stage::CleaningUp) => (0.95, 0.98),
        (Flow::Create, Stage::Finalizing) => (0.98, 1.0),
    }
}

/// Maps a stage-local fraction into the flow-global fraction.
pub fn stage_progress(flow: Flow, stage: Stage, local_fraction: f32) -> f32 {
    let (start, end) = stage_span(flow, stage);
    let local = clamp_fraction(local_fraction);
    clamp_fraction(start + (end - start) * local)
}

/// Wraps `sink` so events reported with stage-local fractions arrive rescaled.
pub fn scoped<'a>(
    flow: Flow,
    stage: Stage,
    sink: ProgressFn<'a>,
) -> impl Fn(ProgressEvent) + Sync + 'a {
    move |event: ProgressEvent| {
        sink(ProgressEvent {
            fraction: stage_progress(flow, stage, event.fraction),
            status_text: event.status_text,
        })
    }
}
