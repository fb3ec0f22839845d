//! Progress reporting for an export run.

use std::fmt;

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Cover,
    Chapters,
    Assembly,
    Packaging,
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportStage::Cover => "cover",
            ExportStage::Chapters => "chapters",
            ExportStage::Assembly => "assembly",
            ExportStage::Packaging => "packaging",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: ExportStage,
    pub current: u64,
    pub total: Option<u64>,
    pub message: Option<String>,
}

/// Receives progress updates. The CLI drives a progress bar with it.
pub trait ProgressHandler: Send {
    fn on_progress(&self, event: ProgressEvent);
}

pub struct NoopProgress;

impl ProgressHandler for NoopProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

pub fn emit_progress(
    handler: Option<&dyn ProgressHandler>,
    stage: ExportStage,
    current: u64,
    total: Option<u64>,
    message: Option<&str>,
) {
    if let Some(h) = handler {
        h.on_progress(ProgressEvent {
            stage,
            current,
            total,
            message: message.map(|s| s.to_string()),
        });
    }
}
