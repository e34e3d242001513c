use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::schedule::{EventPatch, NewEvent, ScheduleEvent};
use crate::storage::config::{Config, ConfigError};
use crate::storage::event_store::{EventStore, StoreError};
use crate::sync::conflict::ConflictChecker;
use crate::sync::google_api::GoogleCalendarClient;
use crate::sync::google_auth::{AuthSession, AuthorizationPrompt, GoogleConsentFlow};
use crate::sync::sync_engine::{RemoteDeletion, SyncEngine, SyncError, SyncFailure, SyncResult};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Outcome of a save: the local commit always happened, the remote side may not have.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub event: ScheduleEvent,
    pub sync: SyncResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteReport {
    pub event: ScheduleEvent,
    /// `None` when the event was never mirrored or its executive has no calendar.
    pub remote: Option<Result<RemoteDeletion, SyncFailure>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictCheck {
    Clear,
    Conflict { executive_title: String },
}

impl ConflictCheck {
    pub fn warning(&self) -> Option<String> {
        match self {
            ConflictCheck::Clear => None,
            ConflictCheck::Conflict { executive_title } => Some(format!(
                "{} already has an event in this time slot. Continue?",
                executive_title
            )),
        }
    }
}

/// Per-event async locks so two operations on one event never interleave.
/// An entry lives only while some operation holds or waits for it.
#[derive(Default)]
struct EventLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

struct EventLockGuard<'a> {
    locks: &'a EventLocks,
    event_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl EventLocks {
    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn acquire(&self, event_id: &str) -> EventLockGuard<'_> {
        let lock = self.map().entry(event_id.to_string()).or_default().clone();
        EventLockGuard {
            locks: self,
            event_id: event_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

impl Drop for EventLockGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.map();
        // The map's own reference is the only one left: no holder, no waiter.
        if locks.get(&self.event_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.event_id);
        }
    }
}

/// Two-phase coordinator used by the UI handlers: commit locally, then
/// reconcile with the remote calendar and report both outcomes.
pub struct ScheduleBoard {
    store: Arc<EventStore>,
    session: Arc<AuthSession>,
    engine: SyncEngine,
    conflicts: ConflictChecker,
    check_conflicts: bool,
    locks: EventLocks,
}

impl ScheduleBoard {
    pub fn new(
        store: Arc<EventStore>,
        session: Arc<AuthSession>,
        engine: SyncEngine,
        conflicts: ConflictChecker,
        check_conflicts: bool,
    ) -> Self {
        Self {
            store,
            session,
            engine,
            conflicts,
            check_conflicts,
            locks: EventLocks::default(),
        }
    }

    /// Wires the board to the Google adapters and the on-disk store. `prompt`
    /// collects the authorization code whenever consent is needed.
    pub fn connect(
        config: &Config,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> Result<Self, BoardError> {
        let time_zone = config.sync.tz()?;
        let store = Arc::new(EventStore::open(&config.storage.database_path)?);
        let client = Arc::new(
            GoogleCalendarClient::new().with_base_url(config.google.api_base_url.clone()),
        );
        let session = Arc::new(AuthSession::new(
            store.clone(),
            client.clone(),
            Arc::new(GoogleConsentFlow::new(config.google.clone(), prompt)),
        ));
        let engine = SyncEngine::new(store.clone(), session.clone(), client.clone(), time_zone);
        let conflicts = ConflictChecker::new(session.clone(), client);

        Ok(Self::new(store, session, engine, conflicts, config.sync.check_conflicts))
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub async fn create_event(&self, mut new_event: NewEvent) -> Result<SaveReport, BoardError> {
        if !new_event.event_type.allows_location() {
            new_event.location = None;
        }

        let event = self.store.create_event(new_event)?;
        let _guard = self.locks.acquire(&event.id).await;
        self.sync_committed(event).await
    }

    /// Edit, drag and resize all land here.
    pub async fn edit_event(
        &self,
        event_id: &str,
        mut patch: EventPatch,
    ) -> Result<Option<SaveReport>, BoardError> {
        let _guard = self.locks.acquire(event_id).await;

        let Some(current) = self.store.get_event(event_id)? else {
            return Ok(None);
        };
        let event_type = patch.event_type.unwrap_or(current.event_type);
        if !event_type.allows_location() {
            patch.location = Some(None);
        }

        let Some(event) = self.store.update_event(event_id, patch)? else {
            return Ok(None);
        };
        self.sync_committed(event).await.map(Some)
    }

    pub async fn move_event(
        &self,
        event_id: &str,
        executive_id: Option<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<SaveReport>, BoardError> {
        self.edit_event(event_id, EventPatch::reschedule(executive_id, start, end)).await
    }

    /// Deletes locally no matter what the remote side answers.
    pub async fn delete_event(&self, event_id: &str) -> Result<Option<DeleteReport>, BoardError> {
        let _guard = self.locks.acquire(event_id).await;

        let Some(event) = self.store.get_event(event_id)? else {
            return Ok(None);
        };

        let calendar_id = self.store
            .executive(&event.executive_id)?
            .map(|e| e.calendar_id)
            .filter(|id| !id.is_empty());

        let remote = match (event.remote_id(), calendar_id) {
            (Some(remote_event_id), Some(calendar_id)) => {
                let outcome = self.engine.delete_remote(&calendar_id, remote_event_id).await;
                if let Err(failure) = &outcome {
                    tracing::warn!(
                        "Remote deletion of {} failed, deleting locally anyway: {}",
                        event.id,
                        failure
                    );
                }
                Some(outcome)
            }
            _ => None,
        };

        self.store.delete_event(&event.id)?;

        Ok(Some(DeleteReport { event, remote }))
    }

    /// Re-syncs one stored event, e.g. after the user re-authenticated.
    pub async fn sync_event(&self, event_id: &str) -> Result<Option<SyncResult>, BoardError> {
        let _guard = self.locks.acquire(event_id).await;

        let Some(event) = self.store.get_event(event_id)? else {
            return Ok(None);
        };
        Ok(Some(self.engine.sync_event(&event).await?))
    }

    /// Syncs every event that has never reached the remote calendar, such as
    /// events brought in by a backup import.
    pub async fn sync_unsynced(&self) -> Result<Vec<(String, SyncResult)>, BoardError> {
        let pending: Vec<String> = self.store
            .events()?
            .into_iter()
            .filter(|e| e.remote_id().is_none())
            .map(|e| e.id)
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for event_id in pending {
            if let Some(result) = self.sync_event(&event_id).await? {
                results.push((event_id, result));
            }
        }
        Ok(results)
    }

    /// Advisory check shown to the user before a save is confirmed.
    pub async fn check_conflicts(
        &self,
        executive_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ConflictCheck, BoardError> {
        if !self.check_conflicts {
            return Ok(ConflictCheck::Clear);
        }

        let Some(executive) = self.store.executive(executive_id)? else {
            return Ok(ConflictCheck::Clear);
        };
        if !executive.has_calendar() {
            return Ok(ConflictCheck::Clear);
        }

        if self.conflicts.has_conflict(&executive.calendar_id, start, end).await {
            Ok(ConflictCheck::Conflict {
                executive_title: executive.title,
            })
        } else {
            Ok(ConflictCheck::Clear)
        }
    }

    async fn sync_committed(&self, event: ScheduleEvent) -> Result<SaveReport, BoardError> {
        let sync = self.engine.sync_event(&event).await?;
        if let Some(message) = sync.message() {
            tracing::warn!("Event {} saved locally but not synced: {}", event.id, message);
        }

        let event = self.store.get_event(&event.id)?.unwrap_or(event);
        Ok(SaveReport { event, sync })
    }
}
