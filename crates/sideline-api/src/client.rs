use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::instrument;

use sideline_core::api::TrackerApi;
use sideline_core::errors::ApiError;
use sideline_core::ids::SessionId;
use sideline_core::session::{Session, SessionDraft, Settings, Sport};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the HTTP collaborator client.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// e.g. "http://localhost:8000"
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Whole-request deadline. Cancellation propagates to the underlying
    /// connection when the future is dropped.
    pub request_timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// `reqwest`-backed [`TrackerApi`].
pub struct HttpApi {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpApi {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn transport_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.request_timeout)
        } else {
            ApiError::Network(e.to_string())
        }
    }

    /// Map a non-success status to an error, draining the body for context.
    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), body))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let resp = self.check(resp).await?;
        resp.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TrackerApi for HttpApi {
    #[instrument(skip(self, draft), fields(sport = %draft.sport))]
    async fn create_session(&self, draft: &SessionDraft) -> Result<Session, ApiError> {
        let resp = self
            .client
            .post(self.url("/api/sessions"))
            .json(draft)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let resp = self.check(resp).await?;
        resp.json::<Session>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.get_json("/api/sessions").await
    }

    async fn fetch_session(&self, id: &SessionId) -> Result<Session, ApiError> {
        self.get_json(&format!("/api/sessions/{id}")).await
    }

    #[instrument(skip(self, settings), fields(sport = %sport))]
    async fn start_tracking(&self, sport: Sport, settings: &Settings) -> Result<(), ApiError> {
        let body = json!({ "sport": sport, "settings": settings });
        let resp = self
            .client
            .post(self.url("/api/tracking/start"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let _ = self.check(resp).await?;
        Ok(())
    }

    async fn stop_tracking(&self) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.url("/api/tracking/stop"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let _ = self.check(resp).await?;
        Ok(())
    }

    async fn session_analytics(&self, id: &SessionId) -> Result<Value, ApiError> {
        self.get_json(&format!("/api/analytics/session/{id}")).await
    }
}
