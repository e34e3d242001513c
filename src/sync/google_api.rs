use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::sync::remote_event::RemoteEvent;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ApiError {
    /// True for the 401 family: the presented token is no longer accepted.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ApiError::AuthenticationFailed => true,
            ApiError::HttpError(e) => e.status() == Some(StatusCode::UNAUTHORIZED),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The four remote operations the sync core relies on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Returns the id the remote service assigned to the new event.
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &RemoteEvent,
    ) -> Result<String, ApiError>;

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        remote_event_id: &str,
        event: &RemoteEvent,
    ) -> Result<(), ApiError>;

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        remote_event_id: &str,
    ) -> Result<(), ApiError>;

    async fn query_free_busy(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ApiError>;
}

/// Account lookups used by the auth session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Id of the account's primary calendar, which is the account address.
    /// Cheap enough to double as a token validity check.
    async fn primary_identity(&self, access_token: &str) -> Result<String, ApiError>;
}

pub struct GoogleCalendarClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarResource {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    items: Vec<FreeBusyItem<'a>>,
}

#[derive(Debug, Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyInterval>,
    #[serde(default)]
    errors: Vec<FreeBusyError>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyError {
    reason: Option<String>,
}

impl GoogleCalendarClient {
    pub fn new() -> Self {
        Self {
            base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, remote_event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(remote_event_id)
        )
    }
}

impl Default for GoogleCalendarClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a non-success response onto the matching `ApiError`.
async fn check_status(response: Response, operation: &str, subject: &str) -> Result<Response, ApiError> {
    let status = response.status();
    tracing::info!("{} response status: {}", operation, status);

    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => {
            tracing::error!("Authentication failed during {}", operation);
            Err(ApiError::AuthenticationFailed)
        }
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            tracing::error!("{} target not found: {}", operation, subject);
            Err(ApiError::NotFound(subject.to_string()))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!("Rate limit exceeded during {}", operation);
            Err(ApiError::RateLimited)
        }
        _ => {
            let body = response.text().await?;
            tracing::error!("{} failed. Status: {}, Body: {}", operation, status, body);
            Err(ApiError::RequestError(format!("Status {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &RemoteEvent,
    ) -> Result<String, ApiError> {
        let url = self.events_url(calendar_id);

        tracing::info!("Creating event on {}: {}", calendar_id, event.summary);
        tracing::debug!("POST {} with payload: {:?}", url, event);

        let response = self.client
            .post(&url)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;

        let response = check_status(response, "Create event", calendar_id).await?;

        let created: CreatedEvent = response.json().await?;
        let id = created.id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::ParseError("Created event has no id".to_string()))?;

        tracing::info!("Event created successfully with ID: {}", id);
        Ok(id)
    }

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        remote_event_id: &str,
        event: &RemoteEvent,
    ) -> Result<(), ApiError> {
        let url = self.event_url(calendar_id, remote_event_id);

        tracing::info!("Updating event {} on {}: {}", remote_event_id, calendar_id, event.summary);
        tracing::debug!("PUT {} with payload: {:?}", url, event);

        let response = self.client
            .put(&url)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;

        check_status(response, "Update event", remote_event_id).await?;

        tracing::info!("Event {} updated successfully", remote_event_id);
        Ok(())
    }

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        remote_event_id: &str,
    ) -> Result<(), ApiError> {
        let url = self.event_url(calendar_id, remote_event_id);

        tracing::info!("Deleting event {} from {}", remote_event_id, calendar_id);

        let response = self.client
            .delete(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        check_status(response, "Delete event", remote_event_id).await?;
        Ok(())
    }

    async fn query_free_busy(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ApiError> {
        let url = format!("{}/freeBusy", self.base_url);
        let request = FreeBusyRequest {
            time_min: time_min.to_rfc3339(),
            time_max: time_max.to_rfc3339(),
            items: vec![FreeBusyItem { id: calendar_id }],
        };

        tracing::debug!("POST {} with payload: {:?}", url, request);

        let response = self.client
            .post(&url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await?;

        let response = check_status(response, "Free/busy query", calendar_id).await?;
        let mut result: FreeBusyResponse = response.json().await?;

        let calendar = result.calendars
            .remove(calendar_id)
            .ok_or_else(|| ApiError::ParseError(format!("No free/busy entry for {}", calendar_id)))?;

        if let Some(error) = calendar.errors.first() {
            let reason = error.reason.clone().unwrap_or_else(|| "unknown".to_string());
            return Err(ApiError::RequestError(format!(
                "Free/busy unavailable for {}: {}",
                calendar_id, reason
            )));
        }

        Ok(calendar.busy)
    }
}

#[async_trait]
impl AccountApi for GoogleCalendarClient {
    async fn primary_identity(&self, access_token: &str) -> Result<String, ApiError> {
        let url = format!("{}/calendars/primary", self.base_url);

        let response = self.client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = check_status(response, "Primary calendar lookup", "primary").await?;
        let calendar: CalendarResource = response.json().await?;
        Ok(calendar.id)
    }
}
