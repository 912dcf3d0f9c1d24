//! reqwest adapter for the relay's event store.

use crate::domain::{RelayError, RelaySession};
use crate::ports::{UnseenEvent, UnseenEventsApi};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct UnseenEventsResponse {
    #[serde(default)]
    events: Option<Vec<UnseenEvent>>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for `GET /events?unseen=true` and `POST /events/{id}/seen`.
pub struct HttpEventsApi {
    client: Client,
    base_url: String,
}

impl HttpEventsApi {
    /// Client for the relay at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RelayError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> RelayError {
        if e.is_connect() {
            RelayError::Http(format!("Cannot connect to {}", self.base_url))
        } else {
            RelayError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl UnseenEventsApi for HttpEventsApi {
    async fn fetch_unseen_events(
        &self,
        session: &RelaySession,
    ) -> Result<Vec<UnseenEvent>, RelayError> {
        let response = self
            .client
            .get(format!("{}/events", self.base_url))
            .query(&[("unseen", "true")])
            .basic_auth(session.id(), Some(session.key()))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Http(format!(
                "Check unseen events failed: {}",
                status.as_u16()
            )));
        }

        let body: UnseenEventsResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Protocol(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(RelayError::Http(format!("Check unseen events failed: {}", error)));
        }
        Ok(body.events.unwrap_or_default())
    }

    async fn mark_seen(&self, session: &RelaySession, event_id: &str) -> Result<(), RelayError> {
        let response = self
            .client
            .post(format!("{}/events/{}/seen", self.base_url, event_id))
            .basic_auth(session.id(), Some(session.key()))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if !response.status().is_success() {
            return Err(RelayError::Http(format!(
                "Unable to mark event {} as seen: {}",
                event_id,
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}
