use chrono_tz::Tz;
use std::sync::Arc;
use thiserror::Error;

use crate::schedule::{EventPatch, ScheduleEvent};
use crate::storage::event_store::{EventStore, StoreError};
use crate::sync::calendar_id::normalize_calendar_id;
use crate::sync::google_api::{ApiError, CalendarApi};
use crate::sync::google_auth::AuthSession;
use crate::sync::remote_event::{InvalidEvent, RemoteEvent};

/// Failures that are not expected during normal operation. Everything the
/// remote side or the user configuration can cause is a [`SyncFailure`] instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    InvalidEvent(#[from] InvalidEvent),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncFailure {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("no calendar configured")]
    ConfigurationMissing,
    #[error("calendar authorization expired, please re-authenticate")]
    AuthExpired,
    #[error("{0}")]
    RemoteCallFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncResult {
    Created { remote_event_id: String },
    Updated { remote_event_id: String },
    Failed(SyncFailure),
}

impl SyncResult {
    pub fn success(&self) -> bool {
        !matches!(self, SyncResult::Failed(_))
    }

    pub fn message(&self) -> Option<String> {
        match self {
            SyncResult::Failed(failure) => Some(failure.to_string()),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&SyncFailure> {
        match self {
            SyncResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteDeletion {
    Deleted,
    AlreadyGone,
    Skipped(SyncFailure),
}

pub struct SyncEngine {
    store: Arc<EventStore>,
    session: Arc<AuthSession>,
    api: Arc<dyn CalendarApi>,
    time_zone: Tz,
}

impl SyncEngine {
    pub fn new(
        store: Arc<EventStore>,
        session: Arc<AuthSession>,
        api: Arc<dyn CalendarApi>,
        time_zone: Tz,
    ) -> Self {
        Self {
            store,
            session,
            api,
            time_zone,
        }
    }

    /// Reconciles one local event with the remote calendar.
    ///
    /// The local record is never rolled back. On a first successful create the
    /// remote id is written back to the store; nothing else is modified.
    pub async fn sync_event(&self, event: &ScheduleEvent) -> Result<SyncResult, SyncError> {
        let Some(access_token) = self.session.access_token() else {
            tracing::warn!("Not authenticated, skipping sync of {}", event.id);
            return Ok(SyncResult::Failed(SyncFailure::NotAuthenticated));
        };

        let calendar = self.store
            .executive(&event.executive_id)?
            .map(|e| e.calendar_id)
            .filter(|id| !id.is_empty());
        let Some(raw_calendar_id) = calendar else {
            tracing::warn!(
                "Executive {} has no calendar configured, skipping sync of {}",
                event.executive_id,
                event.id
            );
            return Ok(SyncResult::Failed(SyncFailure::ConfigurationMissing));
        };

        let calendar_id = normalize_calendar_id(&raw_calendar_id, self.session.primary_identity().as_deref());
        let body = RemoteEvent::from_schedule_event(event, self.time_zone)?;

        match event.remote_id() {
            Some(remote_event_id) => {
                match self.api.update_event(&access_token, &calendar_id, remote_event_id, &body).await {
                    Ok(()) => Ok(SyncResult::Updated {
                        remote_event_id: remote_event_id.to_string(),
                    }),
                    Err(e) => Ok(SyncResult::Failed(self.classify(e, &event.id, &access_token))),
                }
            }
            None => match self.api.create_event(&access_token, &calendar_id, &body).await {
                Ok(remote_event_id) => {
                    let stored = self.store
                        .update_event(&event.id, EventPatch::remote_event_id(remote_event_id.clone()))?;
                    if stored.is_none() {
                        tracing::warn!(
                            "Event {} was deleted locally while remote event {} was being created",
                            event.id,
                            remote_event_id
                        );
                    }
                    Ok(SyncResult::Created { remote_event_id })
                }
                Err(e) => Ok(SyncResult::Failed(self.classify(e, &event.id, &access_token))),
            },
        }
    }

    /// Removes a mirrored event. Local deletion never waits on this succeeding.
    pub async fn delete_remote(
        &self,
        calendar_id: &str,
        remote_event_id: &str,
    ) -> Result<RemoteDeletion, SyncFailure> {
        let Some(access_token) = self.session.access_token() else {
            tracing::warn!("Not authenticated, skipping remote deletion of {}", remote_event_id);
            return Ok(RemoteDeletion::Skipped(SyncFailure::NotAuthenticated));
        };
        if calendar_id.is_empty() {
            return Ok(RemoteDeletion::Skipped(SyncFailure::ConfigurationMissing));
        }

        let calendar_id = normalize_calendar_id(calendar_id, self.session.primary_identity().as_deref());

        match self.api.delete_event(&access_token, &calendar_id, remote_event_id).await {
            Ok(()) => Ok(RemoteDeletion::Deleted),
            Err(ApiError::NotFound(_)) => {
                tracing::info!("Remote event {} was already gone", remote_event_id);
                Ok(RemoteDeletion::AlreadyGone)
            }
            Err(e) => Err(self.classify(e, remote_event_id, &access_token)),
        }
    }

    /// A 401 ends the session, whichever operation observed it, unless the
    /// rejected token has already been replaced.
    fn classify(&self, error: ApiError, subject: &str, used_token: &str) -> SyncFailure {
        if self.session.observe(&error, used_token) {
            tracing::warn!("Access token expired while syncing {}", subject);
            return SyncFailure::AuthExpired;
        }

        tracing::error!("Remote call for {} failed: {}", subject, error);
        SyncFailure::RemoteCallFailed(error.to_string())
    }
}
