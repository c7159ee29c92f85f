use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use sideline_channel::{ChannelEvent, ChannelManager};
use sideline_core::api::TrackerApi;
use sideline_core::events::{CameraAction, OutboundCommand};
use sideline_core::ids::SessionId;
use sideline_core::session::{ConnectionState, Session, SessionDraft, TrackingState};

use crate::error::StoreError;
use crate::state::{reduce, Action, Snapshot};

/// The session/tracking state engine.
///
/// Holds the canonical snapshot and funnels every mutation — REST results
/// and inbound channel events alike — through one serialized reducer commit,
/// published whole via a `watch` channel. Construct one instance at the
/// composition root and hand out clones.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    api: Arc<dyn TrackerApi>,
    channel: ChannelManager,
    /// Serializes reducer commits; readers go through the watch channel and
    /// never contend with writers.
    write_lock: Mutex<()>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn TrackerApi>, channel: ChannelManager) -> Self {
        let initial = Snapshot {
            connection: channel.state(),
            ..Snapshot::default()
        };
        let (snapshot_tx, _) = watch::channel(Arc::new(initial));

        let inner = Arc::new(StoreInner {
            api,
            channel,
            write_lock: Mutex::new(()),
            snapshot_tx,
            pump: Mutex::new(None),
        });

        let pump = spawn_event_pump(&inner);
        *inner.pump.lock() = Some(pump);

        Self { inner }
    }

    /// The current complete snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Watch receiver for snapshot updates; every observed value is a
    /// complete, consistent state.
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    /// The channel this store is wired to.
    pub fn channel(&self) -> &ChannelManager {
        &self.inner.channel
    }

    /// POST the draft; on success the new session becomes current and is
    /// prepended to the list, and the channel binding moves to it. The
    /// channel itself is not rebound automatically — callers reconnect.
    pub async fn create_session(&self, draft: SessionDraft) -> Result<Session, StoreError> {
        match self.inner.api.create_session(&draft).await {
            Ok(session) => {
                self.rebind(&session.id);
                let _ = commit(&self.inner, Action::SessionCreated(session.clone()));
                Ok(session)
            }
            Err(e) => {
                let _ = commit(&self.inner, Action::ApiFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// GET the collection; the server's ordering replaces the local list
    /// wholesale.
    pub async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        match self.inner.api.list_sessions().await {
            Ok(sessions) => {
                let _ = commit(&self.inner, Action::SessionsListed(sessions.clone()));
                Ok(sessions)
            }
            Err(e) => {
                let _ = commit(&self.inner, Action::ApiFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// GET one session and make it current, replacing the prior current
    /// session entirely.
    pub async fn fetch_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        match self.inner.api.fetch_session(id).await {
            Ok(session) => {
                self.rebind(&session.id);
                let _ = commit(&self.inner, Action::SessionFetched(session.clone()));
                Ok(session)
            }
            Err(e) => {
                let _ = commit(&self.inner, Action::ApiFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Begin a tracking run: Idle → Starting, then Active on API success or
    /// back to Idle on failure. Rejected before any network call when the
    /// channel is down, no session is current, or a run is already underway.
    pub async fn start_tracking(&self) -> Result<(), StoreError> {
        let (sport, settings) = {
            let snap = self.snapshot();
            if snap.tracking != TrackingState::Idle {
                return Err(StoreError::Precondition(format!(
                    "tracking is {:?}, expected idle",
                    snap.tracking
                )));
            }
            let Some(current) = snap.current.as_ref() else {
                return Err(StoreError::Precondition("no current session".into()));
            };
            if self.inner.channel.state() != ConnectionState::Connected {
                return Err(StoreError::Precondition(
                    "event channel is not connected".into(),
                ));
            }
            (current.sport, snap.settings.clone())
        };

        let _ = commit(&self.inner, Action::TrackingChanged(TrackingState::Starting));
        match self.inner.api.start_tracking(sport, &settings).await {
            Ok(()) => {
                let _ = commit(&self.inner, Action::TrackingChanged(TrackingState::Active));
                Ok(())
            }
            Err(e) => {
                let _ = commit(
                    &self.inner,
                    Action::TrackingReverted {
                        state: TrackingState::Idle,
                        message: e.to_string(),
                    },
                );
                Err(e.into())
            }
        }
    }

    /// End the current run: Active → Stopping, then Idle on API success or
    /// back to Active on failure.
    pub async fn stop_tracking(&self) -> Result<(), StoreError> {
        {
            let snap = self.snapshot();
            if snap.tracking != TrackingState::Active {
                return Err(StoreError::Precondition(format!(
                    "tracking is {:?}, expected active",
                    snap.tracking
                )));
            }
        }

        let _ = commit(&self.inner, Action::TrackingChanged(TrackingState::Stopping));
        match self.inner.api.stop_tracking().await {
            Ok(()) => {
                let _ = commit(&self.inner, Action::TrackingChanged(TrackingState::Idle));
                Ok(())
            }
            Err(e) => {
                let _ = commit(
                    &self.inner,
                    Action::TrackingReverted {
                        state: TrackingState::Active,
                        message: e.to_string(),
                    },
                );
                Err(e.into())
            }
        }
    }

    /// Shallow-merge the given keys into Settings. No validation, no network.
    pub fn update_settings(&self, partial: Map<String, Value>) {
        let _ = commit(&self.inner, Action::SettingsMerged(partial));
    }

    /// GET the analytics payload for a session. Opaque: returned to the
    /// caller, never folded into the snapshot.
    pub async fn session_analytics(&self, id: &SessionId) -> Result<Value, StoreError> {
        match self.inner.api.session_analytics(id).await {
            Ok(payload) => Ok(payload),
            Err(e) => {
                let _ = commit(&self.inner, Action::ApiFailed(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Forward a camera command over the channel, best-effort. Fails with no
    /// I/O while disconnected.
    pub fn camera_control(&self, action: CameraAction) -> Result<(), StoreError> {
        self.inner
            .channel
            .send(&OutboundCommand::CameraControl { action })
            .map_err(StoreError::from)
    }

    /// Clear both error slots. The store never does this on its own; it is
    /// the presentation layer's display-interval timer that calls it.
    pub fn clear_errors(&self) {
        let _ = commit(&self.inner, Action::ErrorsCleared);
    }

    /// Move the channel binding to a new current session, warning when a
    /// live channel keeps serving the old one (teardown is caller-driven).
    fn rebind(&self, id: &SessionId) {
        let changed = self.inner.channel.session().as_ref() != Some(id);
        if changed && self.inner.channel.state() != ConnectionState::Disconnected {
            warn!(
                session = %id,
                "current session changed while the channel is live; \
                 disconnect() and connect() to rebind"
            );
        }
        self.inner.channel.bind_session(Some(id.clone()));
    }
}

/// Serialize one reducer commit and publish the resulting snapshot.
fn commit(inner: &StoreInner, action: Action) -> Arc<Snapshot> {
    let _guard = inner.write_lock.lock();
    let prev = inner.snapshot_tx.borrow().clone();
    let next = Arc::new(reduce(&prev, action));
    let _ = inner.snapshot_tx.send_replace(Arc::clone(&next));
    next
}

/// Drain the channel's ordered event stream into reducer commits. Holds only
/// a weak reference so a dropped store shuts its pump down.
fn spawn_event_pump(inner: &Arc<StoreInner>) -> JoinHandle<()> {
    let mut events = inner.channel.subscribe();
    let weak: Weak<StoreInner> = Arc::downgrade(inner);

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Some(inner) = weak.upgrade() else { break };
                    apply_channel_event(&inner, event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event pump lagged, dropped channel events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("event pump stopped");
    })
}

fn apply_channel_event(inner: &StoreInner, event: ChannelEvent) {
    let action = match event {
        ChannelEvent::Inbound(event) => Action::Inbound(event),
        ChannelEvent::State(state) => Action::ConnectionChanged(state),
        ChannelEvent::ConnectionError(error) => Action::ConnectionFailed(error.to_string()),
    };
    let _ = commit(inner, action);
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}
