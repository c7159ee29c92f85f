use serde_json::{Map, Value};

use sideline_core::events::InboundEvent;
use sideline_core::session::{ConnectionState, Session, Settings, Stats, TrackingState};

/// The last feedback message the detector pushed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedbackNote {
    pub kind: String,
    pub message: String,
}

/// One complete, immutable view of the store. Published whole; readers never
/// see a half-applied transition.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Server-ordered session list, replaced wholesale by `list_sessions`.
    pub sessions: Vec<Session>,
    /// At most one current session.
    pub current: Option<Session>,
    pub tracking: TrackingState,
    pub connection: ConnectionState,
    /// Live per-run aggregates; reset when a run is initiated.
    pub stats: Stats,
    pub settings: Settings,
    pub camera_active: bool,
    pub last_feedback: Option<FeedbackNote>,
    /// Last REST failure, last write wins. Cleared by the consumer.
    pub error: Option<String>,
    /// Last channel failure, last write wins. Cleared by the consumer or by a
    /// successful reconnect.
    pub connection_error: Option<String>,
}

/// Everything that can move the store from one snapshot to the next.
#[derive(Clone, Debug)]
pub enum Action {
    SessionCreated(Session),
    SessionsListed(Vec<Session>),
    SessionFetched(Session),
    TrackingChanged(TrackingState),
    /// API failure on a tracking transition: revert and surface in one commit.
    TrackingReverted { state: TrackingState, message: String },
    SettingsMerged(Map<String, Value>),
    Inbound(InboundEvent),
    ConnectionChanged(ConnectionState),
    ConnectionFailed(String),
    ApiFailed(String),
    ErrorsCleared,
}

/// The single state-transition function. Pure: the next snapshot derives
/// entirely from the previous one plus the action, which is what makes the
/// Stats group atomic — all four fields are computed against the same prior
/// value and land in the same snapshot.
pub fn reduce(prev: &Snapshot, action: Action) -> Snapshot {
    let mut next = prev.clone();
    match action {
        Action::SessionCreated(session) => {
            next.sessions.insert(0, session.clone());
            next.current = Some(session);
        }
        Action::SessionsListed(sessions) => {
            next.sessions = sessions;
        }
        Action::SessionFetched(session) => {
            // The server returned a fresh representation: update the cached
            // list entry in place if we hold one.
            if let Some(entry) = next.sessions.iter_mut().find(|s| s.id == session.id) {
                *entry = session.clone();
            }
            next.current = Some(session);
        }
        Action::TrackingChanged(state) => {
            if state == TrackingState::Starting {
                // A new logical run: aggregates restart from zero so
                // detections racing ahead of the start ack land in this run.
                next.stats = Stats::default();
            }
            next.tracking = state;
        }
        Action::TrackingReverted { state, message } => {
            next.tracking = state;
            next.error = Some(message);
        }
        Action::SettingsMerged(partial) => {
            next.settings.merge(partial);
        }
        Action::Inbound(event) => apply_inbound(&mut next, event),
        Action::ConnectionChanged(state) => {
            next.connection = state;
            if state == ConnectionState::Connected {
                next.connection_error = None;
            }
        }
        Action::ConnectionFailed(message) => {
            next.connection_error = Some(message);
        }
        Action::ApiFailed(message) => {
            next.error = Some(message);
        }
        Action::ErrorsCleared => {
            next.error = None;
            next.connection_error = None;
        }
    }
    next
}

/// Inbound events update derived state only; they never transition the
/// tracking machine.
fn apply_inbound(next: &mut Snapshot, event: InboundEvent) {
    match event {
        InboundEvent::ActionDetected { successful, confidence, .. } => {
            next.stats = next.stats.record(successful, confidence);
        }
        InboundEvent::Feedback { kind, message } => {
            next.last_feedback = Some(FeedbackNote { kind, message });
        }
        InboundEvent::CameraStatus { active } => {
            next.camera_active = active;
        }
        InboundEvent::TrackingStatus { camera_active, .. } => {
            next.camera_active = camera_active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sideline_core::ids::SessionId;
    use sideline_core::session::Sport;

    fn session(id: &str, sport: Sport) -> Session {
        Session {
            id: SessionId::from_raw(id),
            sport,
            name: format!("{sport} drills"),
            description: None,
            target_actions: 20,
            created_at: Utc::now(),
            active: false,
            total_actions: 0,
            successful_actions: 0,
            average_confidence: 0.0,
        }
    }

    fn detected(successful: bool, confidence: f64) -> Action {
        Action::Inbound(InboundEvent::ActionDetected {
            action: "serve".into(),
            successful,
            confidence,
            details: Value::Null,
        })
    }

    #[test]
    fn created_session_becomes_current_and_is_prepended() {
        let base = reduce(
            &Snapshot::default(),
            Action::SessionsListed(vec![session("sess_old", Sport::Golf)]),
        );
        let next = reduce(&base, Action::SessionCreated(session("sess_new", Sport::Tennis)));

        assert_eq!(next.current.as_ref().unwrap().id.as_str(), "sess_new");
        assert_eq!(next.sessions.len(), 2);
        assert_eq!(next.sessions[0].id.as_str(), "sess_new");
        assert_eq!(next.sessions[1].id.as_str(), "sess_old");
    }

    #[test]
    fn listing_replaces_the_cached_list_wholesale() {
        let base = reduce(
            &Snapshot::default(),
            Action::SessionsListed(vec![
                session("sess_a", Sport::Golf),
                session("sess_b", Sport::Tennis),
            ]),
        );
        let next = reduce(
            &base,
            Action::SessionsListed(vec![session("sess_c", Sport::Soccer)]),
        );
        assert_eq!(next.sessions.len(), 1);
        assert_eq!(next.sessions[0].id.as_str(), "sess_c");
    }

    #[test]
    fn fetched_session_replaces_current_and_list_entry() {
        let base = reduce(
            &Snapshot::default(),
            Action::SessionsListed(vec![session("sess_a", Sport::Golf)]),
        );
        let mut updated = session("sess_a", Sport::Golf);
        updated.total_actions = 42;

        let next = reduce(&base, Action::SessionFetched(updated));
        assert_eq!(next.current.as_ref().unwrap().total_actions, 42);
        assert_eq!(next.sessions[0].total_actions, 42);
    }

    #[test]
    fn aggregation_chains_on_the_prior_snapshot() {
        // Two events applied back-to-back, the second building on the first
        // commit — the stale-snapshot hazard this reducer exists to prevent.
        let one = reduce(&Snapshot::default(), detected(true, 0.8));
        let two = reduce(&one, detected(false, 0.4));

        assert_eq!(two.stats.total_actions, 2);
        assert_eq!(two.stats.successful_actions, 1);
        assert!((two.stats.success_rate - 50.0).abs() < 1e-9);
        assert!((two.stats.average_score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn stats_fields_commit_as_one_group() {
        let next = reduce(&Snapshot::default(), detected(true, 1.0));
        // A single reduce produced a snapshot where every derived field is
        // already consistent.
        assert_eq!(next.stats.total_actions, 1);
        assert_eq!(next.stats.successful_actions, 1);
        assert!((next.stats.success_rate - 100.0).abs() < f64::EPSILON);
        assert!((next.stats.average_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn starting_a_run_resets_stats() {
        let mut snap = reduce(&Snapshot::default(), detected(true, 0.9));
        assert_eq!(snap.stats.total_actions, 1);

        snap = reduce(&snap, Action::TrackingChanged(TrackingState::Starting));
        assert_eq!(snap.stats, Stats::default());
        assert_eq!(snap.tracking, TrackingState::Starting);

        // Moving on to Active keeps the (possibly already fed) aggregates.
        snap = reduce(&snap, detected(true, 0.5));
        snap = reduce(&snap, Action::TrackingChanged(TrackingState::Active));
        assert_eq!(snap.stats.total_actions, 1);
    }

    #[test]
    fn inbound_events_never_touch_tracking_state() {
        let base = reduce(&Snapshot::default(), Action::TrackingChanged(TrackingState::Active));
        let next = reduce(
            &base,
            Action::Inbound(InboundEvent::TrackingStatus {
                tracking: false,
                camera_active: true,
                detector_active: false,
            }),
        );
        assert_eq!(next.tracking, TrackingState::Active);
        assert!(next.camera_active);
    }

    #[test]
    fn tracking_revert_lands_with_error_in_one_snapshot() {
        let base = reduce(&Snapshot::default(), Action::TrackingChanged(TrackingState::Starting));
        let next = reduce(
            &base,
            Action::TrackingReverted {
                state: TrackingState::Idle,
                message: "server error 500: tracker wedged".into(),
            },
        );
        assert_eq!(next.tracking, TrackingState::Idle);
        assert_eq!(next.error.as_deref(), Some("server error 500: tracker wedged"));
    }

    #[test]
    fn reconnect_clears_the_connection_error_slot() {
        let base = reduce(&Snapshot::default(), Action::ConnectionFailed("gone".into()));
        assert!(base.connection_error.is_some());

        let next = reduce(&base, Action::ConnectionChanged(ConnectionState::Connected));
        assert_eq!(next.connection, ConnectionState::Connected);
        assert!(next.connection_error.is_none());
    }

    #[test]
    fn error_slots_are_last_write_wins_until_cleared() {
        let mut snap = reduce(&Snapshot::default(), Action::ApiFailed("first".into()));
        snap = reduce(&snap, Action::ApiFailed("second".into()));
        assert_eq!(snap.error.as_deref(), Some("second"));

        snap = reduce(&snap, Action::ErrorsCleared);
        assert!(snap.error.is_none());
        assert!(snap.connection_error.is_none());
    }

    #[test]
    fn feedback_and_camera_events_update_derived_state() {
        let mut snap = reduce(
            &Snapshot::default(),
            Action::Inbound(InboundEvent::Feedback {
                kind: "encouragement".into(),
                message: "Nice follow-through!".into(),
            }),
        );
        snap = reduce(&snap, Action::Inbound(InboundEvent::CameraStatus { active: true }));

        assert_eq!(
            snap.last_feedback,
            Some(FeedbackNote {
                kind: "encouragement".into(),
                message: "Nice follow-through!".into(),
            })
        );
        assert!(snap.camera_active);
    }

    #[test]
    fn settings_merge_flows_through_the_reducer() {
        let mut partial = Map::new();
        let _ = partial.insert("min_detection_confidence".into(), Value::from(0.8));
        let next = reduce(&Snapshot::default(), Action::SettingsMerged(partial));
        assert_eq!(
            next.settings.get("min_detection_confidence"),
            Some(&Value::from(0.8))
        );
    }
}
