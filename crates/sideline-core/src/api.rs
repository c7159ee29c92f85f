use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ApiError;
use crate::ids::SessionId;
use crate::session::{Session, SessionDraft, Settings, Sport};

/// The REST collaborator the store talks to.
///
/// The server owns historical persistence and session records; this trait is
/// only the request/response surface the core consumes. Implementations live
/// in `sideline-api` (HTTP and a scripted mock).
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// POST /api/sessions — the server assigns the id.
    async fn create_session(&self, draft: &SessionDraft) -> Result<Session, ApiError>;

    /// GET /api/sessions — the server-ordered list, taken wholesale.
    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError>;

    /// GET /api/sessions/{id}
    async fn fetch_session(&self, id: &SessionId) -> Result<Session, ApiError>;

    /// POST /api/tracking/start
    async fn start_tracking(&self, sport: Sport, settings: &Settings) -> Result<(), ApiError>;

    /// POST /api/tracking/stop
    async fn stop_tracking(&self) -> Result<(), ApiError>;

    /// GET /api/analytics/session/{id} — payload is opaque to the core.
    async fn session_analytics(&self, id: &SessionId) -> Result<Value, ApiError>;
}
