//! End-of-session summary

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::monitor::{AlertKind, Severity};

/// Running counts for the active session.
///
/// Unlike the activity log these are never truncated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTally {
    pub frames_sampled: u64,
    pub failed_samples: u64,
    pub skipped_ticks: u64,
    pub warnings: u64,
    pub alert_counts: BTreeMap<AlertKind, u64>,
    pub last_face_count: u32,
}

impl SessionTally {
    /// Count a plain (non-alert) log entry
    pub fn record_log(&mut self, severity: Severity) {
        if severity == Severity::Warning {
            self.warnings += 1;
        }
    }

    pub fn record_alert(&mut self, kind: AlertKind) {
        *self.alert_counts.entry(kind).or_insert(0) += 1;
    }

    pub fn alerts(&self) -> u64 {
        self.alert_counts.values().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Passed,
    Review,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub frames_sampled: u64,
    pub failed_samples: u64,
    pub skipped_ticks: u64,
    pub last_face_count: u32,
    pub warnings: u64,
    pub alerts: u64,
    pub violations: u64,
    pub status: SessionStatus,
    pub score: u64,
    pub alert_counts: BTreeMap<AlertKind, u64>,
}

impl SessionSummary {
    pub fn new(
        id: Uuid,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        tally: &SessionTally,
    ) -> Self {
        let warnings = tally.warnings;
        let alerts = tally.alerts();
        let violations = warnings + alerts * 2;

        let status = if alerts > 0 {
            SessionStatus::Failed
        } else if warnings > 0 {
            SessionStatus::Review
        } else {
            SessionStatus::Passed
        };

        Self {
            id,
            started_at,
            ended_at,
            duration_secs: (ended_at - started_at).num_seconds().max(0),
            frames_sampled: tally.frames_sampled,
            failed_samples: tally.failed_samples,
            skipped_ticks: tally.skipped_ticks,
            last_face_count: tally.last_face_count,
            warnings,
            alerts,
            violations,
            status,
            score: score_for(violations),
            alert_counts: tally.alert_counts.clone(),
        }
    }
}

/// 10 points per violation, floored at 50
fn score_for(violations: u64) -> u64 {
    100u64.saturating_sub(violations.saturating_mul(10)).max(50)
}
