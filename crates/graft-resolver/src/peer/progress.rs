//! Analysis phases and progress reporting
//!
//! The analyzer only emits structured [`ProgressEvent`]s; how they are shown
//! is up to the observer.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisPhase {
    #[default]
    Idle,
    Initializing,
    Fetching,
    Extracting,
    Analyzing,
    Resolving,
    Finalizing,
    Complete,
    Error,
}

impl AnalysisPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisPhase::Idle => "idle",
            AnalysisPhase::Initializing => "initializing",
            AnalysisPhase::Fetching => "fetching",
            AnalysisPhase::Extracting => "extracting",
            AnalysisPhase::Analyzing => "analyzing",
            AnalysisPhase::Resolving => "resolving",
            AnalysisPhase::Finalizing => "finalizing",
            AnalysisPhase::Complete => "complete",
            AnalysisPhase::Error => "error",
        }
    }

    /// Whether the analysis has stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisPhase::Complete | AnalysisPhase::Error)
    }
}

impl fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One phase transition or progress step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: AnalysisPhase,
    pub message: String,
    pub processed: usize,
    pub total: usize,
    /// 0-100; 100 when there is nothing to process
    pub percentage: u8,
}

impl ProgressEvent {
    pub fn new(phase: AnalysisPhase, message: impl Into<String>, processed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            (processed.min(total) * 100 / total) as u8
        };
        Self {
            phase,
            message: message.into(),
            processed,
            total,
            percentage,
        }
    }
}

/// Receives progress events from a running analysis
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Forward events into a channel; a closed receiver is ignored
impl ProgressObserver for UnboundedSender<ProgressEvent> {
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = self.send(event.clone());
    }
}

/// Logs progress to tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        match event.phase {
            AnalysisPhase::Complete => info!(
                phase = %event.phase,
                processed = event.processed,
                total = event.total,
                "{}",
                event.message
            ),
            AnalysisPhase::Error => warn!(phase = %event.phase, "{}", event.message),
            _ => debug!(
                phase = %event.phase,
                processed = event.processed,
                total = event.total,
                percentage = event.percentage,
                "{}",
                event.message
            ),
        }
    }
}
