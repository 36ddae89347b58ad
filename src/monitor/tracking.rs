//! Face-count and eye-movement evaluation

use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};

use super::activity::LogLine;
use super::{AlertEvent, AlertKind, Severity, Thresholds};
use crate::detection::{EyeDirection, FrameSignal, TrackingStatus};

/// One qualifying eye movement
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRecord {
    pub direction: EyeDirection,
    pub magnitude_px: f64,
    pub timestamp: DateTime<Utc>,
}

/// Accumulated eye-tracking state for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EyeTrackingState {
    pub suspicious_movement_count: u32,
    pub away_from_screen_count: u32,
    /// Oldest first
    pub movement_history: VecDeque<MovementRecord>,
    pub calibration_complete: bool,
    /// Face count of the previous sample
    pub previous_face_count: u32,
}

impl EyeTrackingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the zero value (session start/stop)
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn record_movement(&mut self, record: MovementRecord, capacity: usize) {
        self.movement_history.push_back(record);
        while self.movement_history.len() > capacity {
            self.movement_history.pop_front();
        }
    }

    /// The last `window` movements, oldest first
    fn recent(&self, window: usize) -> impl Iterator<Item = &MovementRecord> {
        let skip = self.movement_history.len().saturating_sub(window);
        self.movement_history.iter().skip(skip)
    }
}

/// Everything one frame produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    pub logs: Vec<LogLine>,
    pub alerts: Vec<AlertEvent>,
    /// True only on the frame that completed calibration
    pub calibrated_now: bool,
}

impl FrameOutcome {
    #[cfg(test)]
    pub fn alert_kinds(&self) -> Vec<AlertKind> {
        self.alerts.iter().map(|alert| alert.kind).collect()
    }

    fn log(&mut self, severity: Severity, message: impl Into<String>) {
        self.logs.push(LogLine::new(severity, message));
    }

    fn alert(&mut self, kind: AlertKind, message: impl Into<String>, now: DateTime<Utc>) {
        self.alerts.push(AlertEvent::new(kind, message, now));
    }
}

/// Run face-count then eye-movement evaluation for one frame
pub fn evaluate_frame(
    state: &mut EyeTrackingState,
    signal: &FrameSignal,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> FrameOutcome {
    let mut outcome = FrameOutcome::default();
    evaluate_faces(state, signal.face_count, now, &mut outcome);
    evaluate_eyes(state, signal, thresholds, now, &mut outcome);
    outcome
}

fn evaluate_faces(
    state: &mut EyeTrackingState,
    count: u32,
    now: DateTime<Utc>,
    outcome: &mut FrameOutcome,
) {
    let previous = state.previous_face_count;

    if count > 1 {
        outcome.alert(
            AlertKind::MultipleFaces,
            format!("Multiple faces detected ({})", count),
            now,
        );
    } else if count == 0 && previous > 0 {
        outcome.log(Severity::Warning, "No face detected");
    } else if count == 1 && previous != 1 {
        outcome.log(Severity::Success, "Face verified");
    }

    state.previous_face_count = count;
}

fn evaluate_eyes(
    state: &mut EyeTrackingState,
    signal: &FrameSignal,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
    outcome: &mut FrameOutcome,
) {
    if signal.tracking_status != TrackingStatus::Active {
        state.away_from_screen_count += 1;
        if state.away_from_screen_count >= thresholds.away_frame_limit {
            outcome.alert(
                AlertKind::EyesNotDetected,
                format!(
                    "Eyes not detected for {} consecutive frames",
                    state.away_from_screen_count
                ),
                now,
            );
            state.away_from_screen_count = 0;
        }
        return;
    }

    state.away_from_screen_count = 0;

    if !state.calibration_complete && signal.eyes_detected >= 2 {
        state.calibration_complete = true;
        outcome.calibrated_now = true;
        outcome.log(Severity::Success, "Eye tracking calibrated");
    }

    let magnitude = signal.movement_magnitude_px;
    if !signal.movement_detected || magnitude <= thresholds.movement_threshold_px {
        return;
    }

    state.suspicious_movement_count += 1;
    state.record_movement(
        MovementRecord {
            direction: signal.eye_direction,
            magnitude_px: magnitude,
            timestamp: now,
        },
        thresholds.history_capacity,
    );
    outcome.log(
        Severity::Warning,
        format!(
            "Eye movement detected: {} ({:.1}px)",
            signal.eye_direction, magnitude
        ),
    );

    detect_patterns(state, signal.eye_direction, magnitude, thresholds, now, outcome);
}

fn detect_patterns(
    state: &mut EyeTrackingState,
    direction: EyeDirection,
    magnitude: f64,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
    outcome: &mut FrameOutcome,
) {
    let recent: Vec<&MovementRecord> = state.recent(thresholds.pattern_window).collect();

    let distinct: HashSet<EyeDirection> = recent.iter().map(|m| m.direction).collect();
    if recent.len() >= thresholds.rapid_direction_count
        && distinct.len() >= thresholds.rapid_direction_count
    {
        outcome.alert(
            AlertKind::RapidEyeMovements,
            format!(
                "Rapid eye movements: {} directions in last {} movements",
                distinct.len(),
                recent.len()
            ),
            now,
        );
    }

    let off_center = recent.iter().filter(|m| m.direction.is_off_center()).count();
    if direction.is_off_center() && off_center >= thresholds.off_center_count {
        outcome.alert(
            AlertKind::LookingAway,
            format!("Looking away from screen ({})", direction),
            now,
        );
    }

    if magnitude > thresholds.large_movement_factor * thresholds.movement_threshold_px {
        outcome.alert(
            AlertKind::LargeMovement,
            format!("Large eye movement ({:.1}px)", magnitude),
            now,
        );
    }

    if state.suspicious_movement_count >= thresholds.movement_burst_limit {
        outcome.alert(
            AlertKind::MultipleMovements,
            format!(
                "{} suspicious eye movements",
                state.suspicious_movement_count
            ),
            now,
        );
        state.suspicious_movement_count = 0;
    }
}

/// Eye and movement status texts for the counters display
pub fn status_texts(signal: &FrameSignal, state: &EyeTrackingState) -> (String, String) {
    let eye_status = match signal.tracking_status {
        TrackingStatus::Inactive => "Not detected".to_string(),
        TrackingStatus::Active if !state.calibration_complete => "Calibrating".to_string(),
        TrackingStatus::Active => format!("Tracking ({} eyes)", signal.eyes_detected),
    };

    let movement_status = if signal.movement_detected {
        format!(
            "{} ({:.1}px)",
            signal.eye_direction, signal.movement_magnitude_px
        )
    } else {
        "Stable".to_string()
    };

    (eye_status, movement_status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracking(direction: EyeDirection, magnitude: f64) -> FrameSignal {
        FrameSignal {
            face_count: 1,
            tracking_status: TrackingStatus::Active,
            eyes_detected: 2,
            eye_direction: direction,
            movement_detected: magnitude > 0.0,
            movement_magnitude_px: magnitude,
        }
    }

    fn run(state: &mut EyeTrackingState, signal: &FrameSignal) -> FrameOutcome {
        evaluate_frame(state, signal, &Thresholds::default(), Utc::now())
    }

    fn messages(outcome: &FrameOutcome) -> Vec<&str> {
        outcome.logs.iter().map(|l| l.message.as_str()).collect()
    }

    #[test]
    fn test_face_count_transitions() {
        let mut state = EyeTrackingState::new();
        let produced: Vec<Vec<String>> = [1, 1, 0, 1]
            .into_iter()
            .map(|count| {
                let outcome = run(&mut state, &FrameSignal::faces_only(count));
                outcome
                    .logs
                    .iter()
                    .filter(|l| l.message.contains("face") || l.message.contains("Face"))
                    .map(|l| l.message.clone())
                    .collect()
            })
            .collect();

        assert_eq!(produced[0], vec!["Face verified"]);
        assert!(produced[1].is_empty());
        assert_eq!(produced[2], vec!["No face detected"]);
        assert_eq!(produced[3], vec!["Face verified"]);
    }

    #[test]
    fn test_zero_faces_from_zero_is_silent() {
        let mut state = EyeTrackingState::new();
        let outcome = run(&mut state, &FrameSignal::faces_only(0));
        assert!(outcome.logs.is_empty());
        assert!(outcome.alerts.is_empty());
    }

    #[test]
    fn test_multiple_faces_alert_every_frame() {
        let mut state = EyeTrackingState::new();
        for _ in 0..3 {
            let outcome = run(&mut state, &FrameSignal::faces_only(3));
            assert_eq!(outcome.alert_kinds(), vec![AlertKind::MultipleFaces]);
            assert!(outcome.alerts[0].message.contains('3'));
        }

        // 3 -> 1 is a transition into a single face
        let outcome = run(&mut state, &FrameSignal::faces_only(1));
        assert_eq!(messages(&outcome), vec!["Face verified"]);
    }

    #[test]
    fn test_eyes_not_detected_is_edge_triggered() {
        let mut state = EyeTrackingState::new();
        let inactive = FrameSignal::faces_only(1);

        let fired: Vec<bool> = (0..12)
            .map(|_| {
                run(&mut state, &inactive)
                    .alert_kinds()
                    .contains(&AlertKind::EyesNotDetected)
            })
            .collect();

        // frames 5 and 10 only
        let expected: Vec<bool> = (1..=12).map(|n| n % 5 == 0).collect();
        assert_eq!(fired, expected);
        assert_eq!(state.away_from_screen_count, 2);
    }

    #[test]
    fn test_active_frame_resets_away_count() {
        let mut state = EyeTrackingState::new();
        let inactive = FrameSignal::faces_only(1);
        for _ in 0..4 {
            run(&mut state, &inactive);
        }
        run(&mut state, &tracking(EyeDirection::Center, 0.0));
        assert_eq!(state.away_from_screen_count, 0);

        let outcome = run(&mut state, &inactive);
        assert!(outcome.alerts.is_empty());
    }

    #[test]
    fn test_calibration_happens_once() {
        let mut state = EyeTrackingState::new();

        let mut one_eye = tracking(EyeDirection::Center, 0.0);
        one_eye.eyes_detected = 1;
        assert!(!run(&mut state, &one_eye).calibrated_now);
        assert!(!state.calibration_complete);

        let transitions = (0..5)
            .filter(|_| run(&mut state, &tracking(EyeDirection::Center, 0.0)).calibrated_now)
            .count();
        assert_eq!(transitions, 1);

        // losing the eyes does not revert it
        run(&mut state, &FrameSignal::faces_only(1));
        run(&mut state, &one_eye);
        assert!(state.calibration_complete);
    }

    #[test]
    fn test_small_movements_ignored() {
        let mut state = EyeTrackingState::new();
        run(&mut state, &tracking(EyeDirection::Left, 15.0));
        run(&mut state, &tracking(EyeDirection::Left, 9.0));
        assert!(state.movement_history.is_empty());
        assert_eq!(state.suspicious_movement_count, 0);
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let mut state = EyeTrackingState::new();
        for n in 0..25 {
            run(&mut state, &tracking(EyeDirection::Center, 16.0 + n as f64));
            assert!(state.movement_history.len() <= 10);
        }

        let magnitudes: Vec<f64> = state
            .movement_history
            .iter()
            .map(|m| m.magnitude_px)
            .collect();
        let expected: Vec<f64> = (15..25).map(|n| 16.0 + n as f64).collect();
        assert_eq!(magnitudes, expected);
    }

    #[test]
    fn test_burst_alert_resets_counter() {
        let mut state = EyeTrackingState::new();

        let first = run(&mut state, &tracking(EyeDirection::Center, 20.0));
        let second = run(&mut state, &tracking(EyeDirection::Center, 20.0));
        assert!(!first.alert_kinds().contains(&AlertKind::MultipleMovements));
        assert!(!second.alert_kinds().contains(&AlertKind::MultipleMovements));

        let third = run(&mut state, &tracking(EyeDirection::Center, 20.0));
        assert!(third.alert_kinds().contains(&AlertKind::MultipleMovements));
        assert_eq!(state.suspicious_movement_count, 0);

        let fourth = run(&mut state, &tracking(EyeDirection::Center, 20.0));
        assert!(!fourth.alert_kinds().contains(&AlertKind::MultipleMovements));
        assert_eq!(state.suspicious_movement_count, 1);
    }

    #[test]
    fn test_rapid_direction_changes() {
        let mut state = EyeTrackingState::new();
        run(&mut state, &tracking(EyeDirection::Left, 20.0));
        let second = run(&mut state, &tracking(EyeDirection::Right, 20.0));
        assert!(!second.alert_kinds().contains(&AlertKind::RapidEyeMovements));

        let third = run(&mut state, &tracking(EyeDirection::Up, 20.0));
        assert!(third.alert_kinds().contains(&AlertKind::RapidEyeMovements));
    }

    #[test]
    fn test_rapid_needs_distinct_directions() {
        let mut state = EyeTrackingState::new();
        for direction in [EyeDirection::Left, EyeDirection::Right, EyeDirection::Left] {
            let outcome = run(&mut state, &tracking(direction, 20.0));
            assert!(!outcome.alert_kinds().contains(&AlertKind::RapidEyeMovements));
        }
    }

    #[test]
    fn test_pattern_window_is_last_five() {
        let mut state = EyeTrackingState::new();
        for direction in [EyeDirection::Left, EyeDirection::Right] {
            run(&mut state, &tracking(direction, 20.0));
        }
        // push left/right out of the window
        for _ in 0..5 {
            run(&mut state, &tracking(EyeDirection::Up, 20.0));
        }
        let outcome = run(&mut state, &tracking(EyeDirection::Up, 20.0));
        assert!(!outcome.alert_kinds().contains(&AlertKind::RapidEyeMovements));
    }

    #[test]
    fn test_looking_away() {
        let mut state = EyeTrackingState::new();
        let mut fired = Vec::new();
        for _ in 0..4 {
            fired.push(
                run(&mut state, &tracking(EyeDirection::Down, 20.0))
                    .alert_kinds()
                    .contains(&AlertKind::LookingAway),
            );
        }
        assert_eq!(fired, vec![false, false, false, true]);

        // current frame centered: no looking_away even with an off-center history
        let centered = run(&mut state, &tracking(EyeDirection::Center, 20.0));
        assert!(!centered.alert_kinds().contains(&AlertKind::LookingAway));
    }

    #[test]
    fn test_large_movement_and_independent_checks() {
        let mut state = EyeTrackingState::new();
        let outcome = run(&mut state, &tracking(EyeDirection::Left, 30.0));
        assert!(!outcome.alert_kinds().contains(&AlertKind::LargeMovement));

        run(&mut state, &tracking(EyeDirection::Right, 20.0));
        let outcome = run(&mut state, &tracking(EyeDirection::Up, 31.0));
        let kinds = outcome.alert_kinds();
        assert!(kinds.contains(&AlertKind::LargeMovement));
        assert!(kinds.contains(&AlertKind::RapidEyeMovements));
        assert!(kinds.contains(&AlertKind::MultipleMovements));
    }

    #[test]
    fn test_inactive_frame_skips_movement() {
        let mut state = EyeTrackingState::new();
        let mut signal = tracking(EyeDirection::Left, 40.0);
        signal.tracking_status = TrackingStatus::Inactive;
        run(&mut state, &signal);
        assert!(state.movement_history.is_empty());
        assert!(!state.calibration_complete);
    }

    #[test]
    fn test_reset_returns_zero_value() {
        let mut state = EyeTrackingState::new();
        for direction in [EyeDirection::Left, EyeDirection::Right] {
            run(&mut state, &tracking(direction, 20.0));
        }
        run(&mut state, &FrameSignal::faces_only(2));
        assert_ne!(state, EyeTrackingState::default());

        state.reset();
        assert_eq!(state, EyeTrackingState::default());
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = Thresholds {
            movement_threshold_px: 5.0,
            away_frame_limit: 2,
            ..Thresholds::default()
        };
        let mut state = EyeTrackingState::new();

        let outcome = evaluate_frame(
            &mut state,
            &tracking(EyeDirection::Left, 11.0),
            &thresholds,
            Utc::now(),
        );
        assert!(outcome.alert_kinds().contains(&AlertKind::LargeMovement));

        evaluate_frame(&mut state, &FrameSignal::faces_only(1), &thresholds, Utc::now());
        let outcome =
            evaluate_frame(&mut state, &FrameSignal::faces_only(1), &thresholds, Utc::now());
        assert!(outcome.alert_kinds().contains(&AlertKind::EyesNotDetected));
    }

    #[test]
    fn test_status_texts() {
        let state = EyeTrackingState::new();
        let (eyes, movement) = status_texts(&FrameSignal::faces_only(1), &state);
        assert_eq!(eyes, "Not detected");
        assert_eq!(movement, "Stable");

        let mut calibrated = EyeTrackingState::new();
        calibrated.calibration_complete = true;
        let (eyes, movement) = status_texts(&tracking(EyeDirection::Left, 18.24), &calibrated);
        assert_eq!(eyes, "Tracking (2 eyes)");
        assert_eq!(movement, "left (18.2px)");
    }
}
