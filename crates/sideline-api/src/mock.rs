use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use sideline_core::api::TrackerApi;
use sideline_core::errors::ApiError;
use sideline_core::ids::SessionId;
use sideline_core::session::{Session, SessionDraft, Settings, Sport};

/// Pre-programmed [`TrackerApi`] for deterministic tests without a server.
///
/// Each endpoint has its own response queue; calls past the end of a queue
/// return an error rather than panicking, so a store under test surfaces the
/// misconfiguration as a visible failure.
#[derive(Default)]
pub struct MockApi {
    create_queue: Mutex<VecDeque<Result<Session, ApiError>>>,
    list_queue: Mutex<VecDeque<Result<Vec<Session>, ApiError>>>,
    fetch_queue: Mutex<VecDeque<Result<Session, ApiError>>>,
    start_queue: Mutex<VecDeque<Result<(), ApiError>>>,
    stop_queue: Mutex<VecDeque<Result<(), ApiError>>>,
    analytics_queue: Mutex<VecDeque<Result<Value, ApiError>>>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    total_calls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_create(&self, response: Result<Session, ApiError>) {
        self.create_queue.lock().push_back(response);
    }

    pub fn push_list(&self, response: Result<Vec<Session>, ApiError>) {
        self.list_queue.lock().push_back(response);
    }

    pub fn push_fetch(&self, response: Result<Session, ApiError>) {
        self.fetch_queue.lock().push_back(response);
    }

    pub fn push_start(&self, response: Result<(), ApiError>) {
        self.start_queue.lock().push_back(response);
    }

    pub fn push_stop(&self, response: Result<(), ApiError>) {
        self.stop_queue.lock().push_back(response);
    }

    pub fn push_analytics(&self, response: Result<Value, ApiError>) {
        self.analytics_queue.lock().push_back(response);
    }

    /// How many tracking-start requests reached the "server".
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::Relaxed)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::Relaxed)
    }

    /// Total requests across every endpoint.
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::Relaxed)
    }

    fn pop<T>(&self, queue: &Mutex<VecDeque<Result<T, ApiError>>>, endpoint: &str) -> Result<T, ApiError> {
        let _ = self.total_calls.fetch_add(1, Ordering::Relaxed);
        queue.lock().pop_front().unwrap_or_else(|| {
            Err(ApiError::InvalidRequest(format!(
                "MockApi: no response configured for {endpoint}"
            )))
        })
    }
}

#[async_trait]
impl TrackerApi for MockApi {
    async fn create_session(&self, _draft: &SessionDraft) -> Result<Session, ApiError> {
        self.pop(&self.create_queue, "create_session")
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.pop(&self.list_queue, "list_sessions")
    }

    async fn fetch_session(&self, _id: &SessionId) -> Result<Session, ApiError> {
        self.pop(&self.fetch_queue, "fetch_session")
    }

    async fn start_tracking(&self, _sport: Sport, _settings: &Settings) -> Result<(), ApiError> {
        let _ = self.start_calls.fetch_add(1, Ordering::Relaxed);
        self.pop(&self.start_queue, "start_tracking")
    }

    async fn stop_tracking(&self) -> Result<(), ApiError> {
        let _ = self.stop_calls.fetch_add(1, Ordering::Relaxed);
        self.pop(&self.stop_queue, "stop_tracking")
    }

    async fn session_analytics(&self, _id: &SessionId) -> Result<Value, ApiError> {
        self.pop(&self.analytics_queue, "session_analytics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(id: &str) -> Session {
        Session {
            id: SessionId::from_raw(id),
            sport: Sport::Tennis,
            name: "test".into(),
            description: None,
            target_actions: 10,
            created_at: Utc::now(),
            active: false,
            total_actions: 0,
            successful_actions: 0,
            average_confidence: 0.0,
        }
    }

    #[tokio::test]
    async fn responses_pop_in_order() {
        let api = MockApi::new();
        api.push_fetch(Ok(session("sess_1")));
        api.push_fetch(Err(ApiError::NotFound("gone".into())));

        let first = api.fetch_session(&SessionId::from_raw("sess_1")).await;
        assert_eq!(first.unwrap().id.as_str(), "sess_1");

        let second = api.fetch_session(&SessionId::from_raw("sess_1")).await;
        assert!(matches!(second, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn exhausted_queue_is_an_error_not_a_panic() {
        let api = MockApi::new();
        let result = api.stop_tracking().await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert_eq!(api.stop_calls(), 1);
    }

    #[tokio::test]
    async fn call_counters_track_endpoints() {
        let api = MockApi::new();
        api.push_start(Ok(()));
        api.push_stop(Ok(()));

        api.start_tracking(Sport::Golf, &Settings::default()).await.unwrap();
        api.stop_tracking().await.unwrap();

        assert_eq!(api.start_calls(), 1);
        assert_eq!(api.stop_calls(), 1);
        assert_eq!(api.total_calls(), 2);
    }
}
