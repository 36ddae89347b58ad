//! Presentation layer seam and operator console

mod console;

pub use console::{run_operator_console, ConsolePresenter};

use crate::monitor::{ActivityLog, AlertKind, AlertLevel, Severity};

/// Values shown in the live counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counters {
    pub face_count: u32,
    pub eye_status: String,
    pub movement_status: String,
}

impl Counters {
    /// Counters for a stopped session
    pub fn idle() -> Self {
        Self {
            face_count: 0,
            eye_status: "Inactive".to_string(),
            movement_status: "-".to_string(),
        }
    }
}

/// Everything the capture loop shows to the operator goes through here
pub trait Presenter: Send {
    /// Activity log entry appended
    fn log(&mut self, message: &str, severity: Severity);

    /// Counters changed
    fn counters(&mut self, counters: &Counters);

    /// Transient alert cue
    fn alert(&mut self, kind: AlertKind, level: AlertLevel);

    /// Show the bounded activity log, newest first (operator `status`)
    fn recent_activity(&mut self, log: &ActivityLog);
}
