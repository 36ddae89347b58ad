//! Alert decisions for sampled frames
//!
//! Everything in here is pure: the engine hands in a [`FrameSignal`] and the
//! current [`EyeTrackingState`] and gets back the log lines and alerts the
//! frame produced. Nothing here touches the network or the presenter.
//!
//! [`FrameSignal`]: crate::detection::FrameSignal

mod activity;
mod tracking;

pub use activity::{ActivityEntry, ActivityLog, Severity};
pub use tracking::{evaluate_frame, status_texts, EyeTrackingState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tunable limits for the alert heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Movements at or below this magnitude are ignored (px)
    pub movement_threshold_px: f64,
    /// Consecutive inactive-tracking frames before `eyes_not_detected`
    pub away_frame_limit: u32,
    /// Suspicious movements before `multiple_movements`
    pub movement_burst_limit: u32,
    /// Movement history length
    pub history_capacity: usize,
    /// How many recent movements pattern detection looks at
    pub pattern_window: usize,
    /// Distinct directions within the window that count as rapid movement
    pub rapid_direction_count: usize,
    /// Off-center movements within the window that count as looking away
    pub off_center_count: usize,
    /// A movement larger than `factor * movement_threshold_px` is "large"
    pub large_movement_factor: f64,
    /// Activity log length
    pub activity_log_capacity: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            movement_threshold_px: 15.0,
            away_frame_limit: 5,
            movement_burst_limit: 3,
            history_capacity: 10,
            pattern_window: 5,
            rapid_direction_count: 3,
            off_center_count: 4,
            large_movement_factor: 2.0,
            activity_log_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    MultipleFaces,
    EyesNotDetected,
    RapidEyeMovements,
    LookingAway,
    LargeMovement,
    MultipleMovements,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Medium,
    High,
}

impl AlertKind {
    pub fn level(self) -> AlertLevel {
        match self {
            Self::EyesNotDetected | Self::LookingAway => AlertLevel::Medium,
            Self::MultipleFaces
            | Self::RapidEyeMovements
            | Self::LargeMovement
            | Self::MultipleMovements => AlertLevel::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MultipleFaces => "multiple_faces",
            Self::EyesNotDetected => "eyes_not_detected",
            Self::RapidEyeMovements => "rapid_eye_movements",
            Self::LookingAway => "looking_away",
            Self::LargeMovement => "large_movement",
            Self::MultipleMovements => "multiple_movements",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AlertLevel {
    /// Activity log severity used for an alert of this level
    pub fn severity(self) -> Severity {
        match self {
            Self::Medium => Severity::Warning,
            Self::High => Severity::Danger,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A derived alert; never stored beyond the activity log
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            level: kind.level(),
            message: message.into(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_levels() {
        assert_eq!(AlertKind::MultipleFaces.level(), AlertLevel::High);
        assert_eq!(AlertKind::EyesNotDetected.level(), AlertLevel::Medium);
        assert_eq!(AlertKind::LookingAway.level(), AlertLevel::Medium);
        assert_eq!(AlertKind::LargeMovement.level().severity(), Severity::Danger);
    }

    #[test]
    fn test_alert_kind_wire_name() {
        let json = serde_json::to_string(&AlertKind::RapidEyeMovements).unwrap();
        assert_eq!(json, "\"rapid_eye_movements\"");
        assert_eq!(AlertKind::RapidEyeMovements.as_str(), "rapid_eye_movements");
    }
}
