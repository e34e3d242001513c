use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::schedule::{Executive, ExecutiveUpdate, ScheduleEvent};
use crate::storage::event_store::{generate_event_id, EventStore, StoreError};

pub const BACKUP_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub executives: Vec<Executive>,
    pub events: Vec<ScheduleEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub executives: usize,
    pub events_imported: usize,
}

impl ExportData {
    pub fn from_json(content: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl EventStore {
    pub fn export_data(&self) -> Result<ExportData, StoreError> {
        let data = ExportData {
            version: BACKUP_VERSION.to_string(),
            export_date: Utc::now(),
            executives: self.executives()?,
            events: self.events()?,
        };

        tracing::info!(
            "Exported {} executives and {} events",
            data.executives.len(),
            data.events.len()
        );
        Ok(data)
    }

    /// Merges a backup into the store.
    ///
    /// Only the email and calendar of executives that already exist are taken
    /// over. Every imported event is appended with its remote id cleared, since
    /// the copy has never been synced from this store; an id that collides with
    /// a stored event is replaced by a fresh one.
    pub fn import_data(
        &self,
        data: ExportData,
        accept_version_mismatch: bool,
    ) -> Result<ImportSummary, StoreError> {
        if data.version != BACKUP_VERSION && !accept_version_mismatch {
            return Err(StoreError::UnsupportedVersion(data.version));
        }

        let existing_executives: HashSet<String> =
            self.executives()?.into_iter().map(|e| e.id).collect();
        for imported in &data.executives {
            if existing_executives.contains(&imported.id) {
                self.update_executive(
                    &imported.id,
                    ExecutiveUpdate {
                        email: Some(imported.email.clone()),
                        calendar_id: Some(imported.calendar_id.clone()),
                        ..ExecutiveUpdate::default()
                    },
                )?;
            }
        }

        let mut events_imported = 0;
        for mut event in data.events {
            if self.event_exists(&event.id)? {
                let now = Utc::now();
                event.id = generate_event_id();
                event.created_at = now;
                event.updated_at = now;
            }
            event.remote_event_id = None;
            self.store_event(&event)?;
            events_imported += 1;
        }

        tracing::info!(
            "Imported backup: {} executives, {} events",
            data.executives.len(),
            events_imported
        );

        Ok(ImportSummary {
            executives: data.executives.len(),
            events_imported,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{EventType, NewEvent};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn create_test_store() -> EventStore {
        EventStore::open_in_memory().unwrap()
    }

    fn synced_event(store: &EventStore) -> ScheduleEvent {
        let start = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();
        let event = store
            .create_event(NewEvent {
                executive_id: "exec-1".to_string(),
                title: "Site visit".to_string(),
                event_type: EventType::Trip,
                start_date: start,
                end_date: start + chrono::Duration::hours(3),
                is_all_day: false,
                location: Some("Annex".to_string()),
            })
            .unwrap();
        store
            .update_event(&event.id, crate::schedule::EventPatch::remote_event_id("remote-1"))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn export_contains_executives_and_events() {
        let store = create_test_store();
        synced_event(&store);

        let data = store.export_data().unwrap();

        assert_eq!(data.version, BACKUP_VERSION);
        assert_eq!(data.executives.len(), 5);
        assert_eq!(data.events.len(), 1);
    }

    #[test]
    fn export_json_can_be_parsed_back() {
        let store = create_test_store();
        synced_event(&store);
        let data = store.export_data().unwrap();

        let parsed = ExportData::from_json(&data.to_json().unwrap()).unwrap();

        assert_eq!(parsed, data);
    }

    #[test]
    fn importing_into_same_store_duplicates_with_fresh_id_and_no_remote_id() {
        let store = create_test_store();
        let original = synced_event(&store);
        let data = store.export_data().unwrap();

        let summary = store.import_data(data, false).unwrap();

        assert_eq!(summary.events_imported, 1);
        let events = store.events().unwrap();
        assert_eq!(events.len(), 2);
        let copy = events.iter().find(|e| e.id != original.id).unwrap();
        assert_eq!(copy.title, original.title);
        assert_eq!(copy.remote_event_id, None);
        assert_eq!(
            store.get_event(&original.id).unwrap().unwrap().remote_event_id,
            Some("remote-1".to_string())
        );
    }

    #[test]
    fn importing_into_empty_store_keeps_ids_but_clears_remote_ids() {
        let source = create_test_store();
        let original = synced_event(&source);
        let data = source.export_data().unwrap();
        let target = create_test_store();

        target.import_data(data, false).unwrap();

        let imported = target.get_event(&original.id).unwrap().unwrap();
        assert_eq!(imported.created_at, original.created_at);
        assert_eq!(imported.remote_event_id, None);
    }

    #[test]
    fn import_updates_only_email_and_calendar_of_known_executives() {
        let store = create_test_store();
        let mut data = store.export_data().unwrap();
        data.executives[0].calendar_id = "dg@example.com".to_string();
        data.executives[0].email = "dg@example.com".to_string();
        data.executives[0].title = "Renamed".to_string();
        data.executives.push(Executive {
            id: "exec-99".to_string(),
            title: "Stranger".to_string(),
            email: String::new(),
            calendar_id: String::new(),
            order: 99,
        });

        store.import_data(data, false).unwrap();

        let executives = store.executives().unwrap();
        assert_eq!(executives.len(), 5);
        assert_eq!(executives[0].calendar_id, "dg@example.com");
        assert_eq!(executives[0].title, "Director General");
    }

    #[test]
    fn unknown_version_is_rejected_unless_accepted() {
        let store = create_test_store();
        let mut data = store.export_data().unwrap();
        data.version = "2.0".to_string();

        let rejected = store.import_data(data.clone(), false);
        assert!(matches!(rejected, Err(StoreError::UnsupportedVersion(v)) if v == "2.0"));

        assert!(store.import_data(data, true).is_ok());
    }
}
