//! Client for the episodic memory backend.
//!
//! The backend owns raw conversation memory; the gateway only fronts
//! it. All calls are session-scoped and the wire session shape carries
//! user and agent ids as arrays, which is what the backend expects.

use crate::models::Session;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Session identity as the backend expects it.
#[derive(Debug, Serialize)]
struct WireSession<'a> {
    group_id: Option<&'a str>,
    agent_id: &'a [String],
    user_id: [&'a str; 1],
    session_id: &'a str,
}

impl<'a> WireSession<'a> {
    fn from_session(session: &'a Session) -> Self {
        Self {
            group_id: session.group_id.as_deref(),
            agent_id: &session.agent_ids,
            user_id: [&session.user_id],
            session_id: &session.session_id,
        }
    }
}

/// Async REST client for the episodic backend.
#[derive(Debug, Clone)]
pub struct EpisodicClient {
    base_url: String,
    http: reqwest::Client,
}

impl EpisodicClient {
    /// Creates a client from the episodic configuration.
    #[must_use]
    pub fn new(config: &crate::config::EpisodicConfig) -> Self {
        let mut builder = reqwest::Client::builder();
        if config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        }
        let http = builder.build().unwrap_or_else(|err| {
            tracing::warn!("Failed to build episodic HTTP client: {err}");
            reqwest::Client::new()
        });
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Stores one episode of session activity.
    pub async fn add_episode(&self, session: &Session, content: &str) -> Result<()> {
        let body = serde_json::json!({
            "session": WireSession::from_session(session),
            "producer": session.user_id,
            "produced_for": session.user_id,
            "episode_content": content,
            "episode_type": "message",
            "metadata": Value::Null,
        });

        let response = self
            .http
            .post(format!("{}/memories", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("episodic_add", &e))?;
        check_status(response).await?;
        Ok(())
    }

    /// Searches episodic memory, returning the backend's JSON verbatim.
    pub async fn search(&self, session: &Session, query: &str, limit: usize) -> Result<Value> {
        let response = self
            .search_request(session, query, limit)
            .await
            .map_err(|e| map_transport_error("episodic_search", &e))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::BackendUnavailable {
                service: "episodic".to_string(),
                cause: format!("invalid response body: {e}"),
            })
    }

    /// Searches episodic memory, returning the raw streaming response.
    ///
    /// Used by the pass-through path, which forwards the backend's bytes
    /// without buffering the body.
    pub async fn search_raw(
        &self,
        session: &Session,
        query: &str,
        limit: usize,
    ) -> Result<reqwest::Response> {
        let response = self
            .search_request(session, query, limit)
            .await
            .map_err(|e| map_transport_error("episodic_search", &e))?;
        check_status(response).await
    }

    /// Deletes every episode held for the session.
    pub async fn delete_session(&self, session: &Session) -> Result<()> {
        let body = serde_json::json!({
            "session": WireSession::from_session(session),
        });

        let response = self
            .http
            .delete(format!("{}/memories", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("episodic_delete", &e))?;
        check_status(response).await?;
        Ok(())
    }

    /// Whether the backend answers its health endpoint.
    pub async fn healthy(&self) -> bool {
        self.http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn search_request(
        &self,
        session: &Session,
        query: &str,
        limit: usize,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let body = serde_json::json!({
            "session": WireSession::from_session(session),
            "query": query,
            "limit": limit,
            "filter": Value::Null,
        });

        self.http
            .post(format!("{}/memories/search", self.base_url))
            .json(&body)
            .send()
            .await
    }
}

fn map_transport_error(operation: &str, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            operation: operation.to_string(),
        }
    } else {
        Error::BackendUnavailable {
            service: "episodic".to_string(),
            cause: err.to_string(),
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::BackendUnavailable {
        service: "episodic".to_string(),
        cause: format!("backend returned status: {status} - {body}"),
    })
}
