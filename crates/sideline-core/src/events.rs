use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message pushed by the detector over the event channel.
///
/// Frames are internally tagged; anything with an unrecognized `type` fails
/// deserialization and is dropped by the channel layer without closing the
/// connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    ActionDetected {
        action: String,
        successful: bool,
        /// Detector confidence in [0, 1].
        confidence: f64,
        #[serde(default)]
        details: Value,
    },
    Feedback {
        /// success, improvement, instruction, encouragement — unknown kinds
        /// pass through untouched.
        kind: String,
        message: String,
    },
    CameraStatus {
        active: bool,
    },
    TrackingStatus {
        tracking: bool,
        #[serde(default)]
        camera_active: bool,
        #[serde(default)]
        detector_active: bool,
    },
}

impl InboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ActionDetected { .. } => "action_detected",
            Self::Feedback { .. } => "feedback",
            Self::CameraStatus { .. } => "camera_status",
            Self::TrackingStatus { .. } => "tracking_status",
        }
    }
}

/// A command sent to the detector over the event channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    CameraControl { action: CameraAction },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraAction {
    Start,
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_detected_wire_format() {
        let frame = r#"{
            "type": "action_detected",
            "action": "serve",
            "successful": true,
            "confidence": 0.85,
            "details": { "speed_kmh": 142.0 }
        }"#;
        let event: InboundEvent = serde_json::from_str(frame).unwrap();
        match &event {
            InboundEvent::ActionDetected { action, successful, confidence, details } => {
                assert_eq!(action, "serve");
                assert!(successful);
                assert!((confidence - 0.85).abs() < f64::EPSILON);
                assert_eq!(details["speed_kmh"], json!(142.0));
            }
            other => panic!("wrong variant: {other:?}"),
        }
        assert_eq!(event.event_type(), "action_detected");
    }

    #[test]
    fn action_detected_details_default_to_null() {
        let event: InboundEvent = serde_json::from_value(json!({
            "type": "action_detected",
            "action": "shot",
            "successful": false,
            "confidence": 0.4,
        }))
        .unwrap();
        assert!(matches!(
            event,
            InboundEvent::ActionDetected { details: Value::Null, .. }
        ));
    }

    #[test]
    fn all_inbound_variants_roundtrip() {
        let events = vec![
            InboundEvent::ActionDetected {
                action: "putt".into(),
                successful: true,
                confidence: 0.91,
                details: json!({ "break_cm": 12 }),
            },
            InboundEvent::Feedback { kind: "encouragement".into(), message: "Keep it up!".into() },
            InboundEvent::CameraStatus { active: true },
            InboundEvent::TrackingStatus {
                tracking: true,
                camera_active: true,
                detector_active: false,
            },
        ];
        for event in &events {
            let json = serde_json::to_string(event).unwrap();
            let parsed: InboundEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(*event, parsed);
        }
    }

    #[test]
    fn unknown_type_discriminant_is_an_error() {
        let result = serde_json::from_str::<InboundEvent>(r#"{"type":"pose_frame","landmarks":[]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn camera_control_wire_format() {
        let cmd = OutboundCommand::CameraControl { action: CameraAction::Start };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"camera_control","action":"start"}"#);

        let parsed: OutboundCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn camera_stop_serializes_lowercase() {
        let cmd = OutboundCommand::CameraControl { action: CameraAction::Stop };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains(r#""action":"stop""#));
    }
}
