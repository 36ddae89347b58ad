//! Detection service boundary
//!
//! The face/eye detection itself runs in an external service. This module
//! owns the request/response contract and turns the loosely-typed JSON the
//! service returns into a validated [`FrameSignal`].

mod client;

pub use client::DetectionClient;

use serde::{Deserialize, Serialize};
use std::future::Future;

/// Errors talking to the detection service. All of them are recoverable:
/// the sample that produced them is dropped and the next tick tries again.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("detection service returned {0}")]
    Status(reqwest::StatusCode),

    #[error("detection service error: {0}")]
    Service(String),

    #[error("malformed detection response: {0}")]
    Decode(String),
}

/// The operations the capture loop needs from a detection backend
pub trait DetectionService: Send + Sync + 'static {
    /// Submit one encoded frame (`data:image/jpeg;base64,...`)
    fn process_frame(
        &self,
        image_data_url: String,
    ) -> impl Future<Output = Result<FrameSignal, DetectionError>> + Send;

    /// Ask the service to drop its own eye-tracking history
    fn reset_tracking(&self) -> impl Future<Output = Result<(), DetectionError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeDirection {
    Center,
    Left,
    Right,
    Up,
    Down,
    Unknown,
}

impl EyeDirection {
    /// Lenient parse; anything unrecognised is `Unknown`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "center" | "centre" => Self::Center,
            "left" => Self::Left,
            "right" => Self::Right,
            "up" => Self::Up,
            "down" => Self::Down,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_off_center(self) -> bool {
        !matches!(self, Self::Center | Self::Unknown)
    }
}

impl std::fmt::Display for EyeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detection response for a single sampled frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSignal {
    pub face_count: u32,
    pub tracking_status: TrackingStatus,
    pub eyes_detected: u32,
    pub eye_direction: EyeDirection,
    pub movement_detected: bool,
    pub movement_magnitude_px: f64,
}

impl FrameSignal {
    /// A frame with the given face count and no usable eye data
    pub fn faces_only(face_count: u32) -> Self {
        Self {
            face_count,
            tracking_status: TrackingStatus::Inactive,
            eyes_detected: 0,
            eye_direction: EyeDirection::Unknown,
            movement_detected: false,
            movement_magnitude_px: 0.0,
        }
    }

    /// Validate a raw `/process_frame` body.
    ///
    /// `face_count` is required. `eye_data` is optional: when it is missing
    /// or does not have the expected shape the frame is treated as
    /// "tracking inactive".
    pub fn from_response(response: ProcessFrameResponse) -> Result<Self, DetectionError> {
        if let Some(message) = response.error {
            return Err(DetectionError::Service(message));
        }

        let face_count = response
            .face_count
            .ok_or_else(|| DetectionError::Decode("missing face_count".to_string()))?;
        let face_count = u32::try_from(face_count)
            .map_err(|_| DetectionError::Decode(format!("invalid face_count {}", face_count)))?;

        let eye_data = response
            .eye_data
            .and_then(|value| serde_json::from_value::<RawEyeData>(value).ok());

        let Some(eye) = eye_data else {
            return Ok(Self::faces_only(face_count));
        };

        let tracking_status = match eye.tracking_status.as_deref() {
            Some(status) if status.eq_ignore_ascii_case("active") => TrackingStatus::Active,
            _ => TrackingStatus::Inactive,
        };

        let magnitude = eye.movement_magnitude.unwrap_or(0.0);
        let movement_magnitude_px = if magnitude.is_finite() && magnitude > 0.0 {
            magnitude
        } else {
            0.0
        };

        Ok(Self {
            face_count,
            tracking_status,
            eyes_detected: eye
                .eyes_detected
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            eye_direction: eye
                .eye_direction
                .as_deref()
                .map(EyeDirection::parse)
                .unwrap_or(EyeDirection::Unknown),
            movement_detected: eye.movement_detected.unwrap_or(false),
            movement_magnitude_px,
        })
    }
}

/// Request body for `/process_frame`
#[derive(Debug, Serialize)]
pub(crate) struct ProcessFrameRequest {
    pub image: String,
}

/// Response body from `/process_frame`
#[derive(Debug, Default, Deserialize)]
pub struct ProcessFrameResponse {
    #[serde(default)]
    pub face_count: Option<i64>,
    /// Kept untyped so a malformed block degrades instead of failing the frame
    #[serde(default)]
    pub eye_data: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEyeData {
    #[serde(default)]
    tracking_status: Option<String>,
    #[serde(default)]
    eyes_detected: Option<i64>,
    #[serde(default)]
    eye_direction: Option<String>,
    #[serde(default)]
    movement_detected: Option<bool>,
    #[serde(default)]
    movement_magnitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<FrameSignal, DetectionError> {
        let response: ProcessFrameResponse = serde_json::from_str(json).unwrap();
        FrameSignal::from_response(response)
    }

    #[test]
    fn test_full_response() {
        let signal = parse(
            r#"{"face_count": 1, "eye_data": {"tracking_status": "active", "eyes_detected": 2,
                "eye_direction": "left", "movement_detected": true, "movement_magnitude": 21.5}}"#,
        )
        .unwrap();

        assert_eq!(signal.face_count, 1);
        assert_eq!(signal.tracking_status, TrackingStatus::Active);
        assert_eq!(signal.eyes_detected, 2);
        assert_eq!(signal.eye_direction, EyeDirection::Left);
        assert!(signal.movement_detected);
        assert_eq!(signal.movement_magnitude_px, 21.5);
    }

    #[test]
    fn test_missing_eye_data_is_inactive() {
        let signal = parse(r#"{"face_count": 2}"#).unwrap();
        assert_eq!(signal, FrameSignal::faces_only(2));
    }

    #[test]
    fn test_malformed_eye_data_is_inactive() {
        let signal = parse(r#"{"face_count": 1, "eye_data": {"eyes_detected": "two"}}"#).unwrap();
        assert_eq!(signal.tracking_status, TrackingStatus::Inactive);

        let signal = parse(r#"{"face_count": 1, "eye_data": "broken"}"#).unwrap();
        assert_eq!(signal.tracking_status, TrackingStatus::Inactive);
    }

    #[test]
    fn test_unknown_direction_and_bad_magnitude() {
        let signal = parse(
            r#"{"face_count": 1, "eye_data": {"tracking_status": "active",
                "eye_direction": "sideways", "movement_detected": true, "movement_magnitude": -4}}"#,
        )
        .unwrap();
        assert_eq!(signal.eye_direction, EyeDirection::Unknown);
        assert_eq!(signal.movement_magnitude_px, 0.0);
    }

    #[test]
    fn test_error_and_missing_count() {
        assert!(matches!(
            parse(r#"{"error": "No image data received"}"#),
            Err(DetectionError::Service(_))
        ));
        assert!(matches!(parse(r#"{}"#), Err(DetectionError::Decode(_))));
        assert!(matches!(
            parse(r#"{"face_count": -1}"#),
            Err(DetectionError::Decode(_))
        ));
    }

    #[test]
    fn test_off_center() {
        assert!(!EyeDirection::Center.is_off_center());
        assert!(!EyeDirection::Unknown.is_off_center());
        assert!(EyeDirection::Down.is_off_center());
        assert_eq!(EyeDirection::parse(" RIGHT "), EyeDirection::Right);
    }
}
